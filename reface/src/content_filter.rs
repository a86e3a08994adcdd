//! Content screening of targets before any work is done.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::utils::command::run_command_with_logs;
use crate::{Error, Result};

/// Decides whether a target may be processed.
#[async_trait]
pub trait ContentFilter: Send + Sync {
    /// `true` rejects the target.
    async fn check(&self, path: &Path) -> Result<bool>;
}

/// Configuration of an external classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentFilterSpec {
    pub program: PathBuf,
    /// Arguments; `{path}` is replaced by the checked file.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Runs a classifier command: exit status 0 accepts, anything else rejects.
///
/// Failing to start the classifier is an error, not an acceptance.
#[derive(Debug, Clone)]
pub struct CommandContentFilter {
    spec: ContentFilterSpec,
}

impl CommandContentFilter {
    pub fn new(spec: ContentFilterSpec) -> Self {
        Self { spec }
    }

    fn args_for(&self, path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self
            .spec
            .args
            .iter()
            .map(|arg| arg.replace("{path}", &path.to_string_lossy()).into())
            .collect();
        if !self.spec.args.iter().any(|arg| arg.contains("{path}")) {
            args.push(path.as_os_str().to_owned());
        }
        args
    }
}

#[async_trait]
impl ContentFilter for CommandContentFilter {
    async fn check(&self, path: &Path) -> Result<bool> {
        let args = self.args_for(path);
        debug!(
            "Running content filter: {}",
            process_utils::command_line(&self.spec.program, &args)
        );

        let mut cmd = process_utils::tool_command(&self.spec.program);
        cmd.args(&args);
        let output = run_command_with_logs(&mut cmd)
            .await
            .map_err(|e| Error::ContentFilter(format!("{}: {e}", self.spec.program.display())))?;

        let rejected = !output.success();
        if rejected {
            info!(
                "Content filter rejected {} ({})",
                path.display(),
                process_utils::describe_exit(&output.status)
            );
        }
        Ok(rejected)
    }
}
