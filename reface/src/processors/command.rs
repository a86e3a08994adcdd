//! Processor that delegates to an external command.
//!
//! The face swapper, enhancer and similar inference steps run as separate
//! programs. Each invocation gets `{source}`, `{target}` and `{output}`
//! substituted into its arguments, plus the run's tuning knobs as
//! environment variables. In frame-sequence mode the command runs once per
//! frame (target and output both being the frame) on a bounded task pool.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::traits::FrameProcessor;
use crate::context::PipelineContext;
use crate::utils::command::run_command_with_logs;
use crate::{Error, Result};

/// Configuration of one command-backed processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSpec {
    /// Identifier used in chains.
    pub name: String,
    pub program: PathBuf,
    /// Arguments; `{source}`, `{target}` and `{output}` are substituted.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra argument appended when `many_faces` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub many_faces_arg: Option<String>,
    /// Per-invocation timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            many_faces_arg: None,
            timeout_secs: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// One fully resolved command line.
#[derive(Debug, Clone)]
struct Invocation {
    args: Vec<OsString>,
    env: Vec<(&'static str, String)>,
}

/// Frame processor backed by [`CommandSpec`].
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    spec: Arc<CommandSpec>,
}

impl CommandProcessor {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec: Arc::new(spec),
        }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    fn invocation(
        spec: &CommandSpec,
        source: &Path,
        target: &Path,
        output: &Path,
        ctx: &PipelineContext,
    ) -> Invocation {
        let mut args: Vec<OsString> = spec
            .args
            .iter()
            .map(|arg| substitute_placeholders(arg, source, target, output))
            .collect();
        if ctx.many_faces {
            if let Some(flag) = &spec.many_faces_arg {
                args.push(flag.into());
            }
        }

        let env = vec![
            ("REFACE_MANY_FACES", if ctx.many_faces { "1" } else { "0" }.to_string()),
            ("REFACE_MAX_MEMORY", ctx.max_memory.to_string()),
            ("REFACE_EXECUTION_THREADS", ctx.execution_threads.to_string()),
        ];

        Invocation { args, env }
    }

    async fn run(spec: &CommandSpec, invocation: Invocation) -> Result<()> {
        debug!(
            processor = %spec.name,
            "Running: {}",
            process_utils::command_line(&spec.program, &invocation.args)
        );

        let mut cmd = process_utils::tool_command(&spec.program);
        cmd.args(&invocation.args);
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }

        let output = match spec.timeout_secs {
            Some(secs) => {
                match tokio::time::timeout(
                    Duration::from_secs(secs),
                    run_command_with_logs(&mut cmd),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        error!(processor = %spec.name, "Command timed out after {}s", secs);
                        return Err(Error::processor(
                            &spec.name,
                            format!("timed out after {secs}s"),
                        ));
                    }
                }
            }
            None => run_command_with_logs(&mut cmd).await,
        }
        .map_err(|e| Error::processor(&spec.name, e.to_string()))?;

        if !output.success() {
            error!(processor = %spec.name, "Command failed: {}", output.failure_summary());
            return Err(Error::processor(&spec.name, output.failure_summary()));
        }
        Ok(())
    }
}

/// Replace `{source}`, `{target}` and `{output}` in one argument.
fn substitute_placeholders(arg: &str, source: &Path, target: &Path, output: &Path) -> OsString {
    arg.replace("{source}", &source.to_string_lossy())
        .replace("{target}", &target.to_string_lossy())
        .replace("{output}", &output.to_string_lossy())
        .into()
}

#[async_trait]
impl FrameProcessor for CommandProcessor {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn process_image(
        &self,
        source: &Path,
        target: &Path,
        output: &Path,
        ctx: &PipelineContext,
    ) -> Result<()> {
        let invocation = Self::invocation(&self.spec, source, target, output, ctx);
        Self::run(&self.spec, invocation).await
    }

    async fn process_video(
        &self,
        source: &Path,
        frames: &[PathBuf],
        ctx: &PipelineContext,
    ) -> Result<()> {
        let start = std::time::Instant::now();
        let workers = ctx
            .execution_threads
            .min(frames.len())
            .clamp(1, Semaphore::MAX_PERMITS);
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();

        for frame in frames {
            let invocation = Self::invocation(&self.spec, source, frame, frame, ctx);
            let spec = Arc::clone(&self.spec);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::processor(&spec.name, e.to_string()))?;
                Self::run(&spec, invocation).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| {
                Err(Error::processor(&self.spec.name, format!("worker task failed: {e}")))
            });
            if let Err(e) = result {
                tasks.abort_all();
                return Err(e);
            }
        }

        info!(
            processor = %self.spec.name,
            frames = frames.len(),
            "Processed frames in {:.2}s",
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }
}
