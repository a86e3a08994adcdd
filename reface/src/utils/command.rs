//! Running external tools with their output mirrored into `tracing`.

use std::time::Instant;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Lines of stderr kept for error messages.
const STDERR_TAIL_LINES: usize = 8;

/// Output of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: std::process::ExitStatus,
    pub duration: f64,
    pub stdout: String,
    pub stderr: Vec<String>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit description followed by the last few stderr lines.
    pub fn failure_summary(&self) -> String {
        let exit = process_utils::describe_exit(&self.status);
        let start = self.stderr.len().saturating_sub(STDERR_TAIL_LINES);
        let tail = self.stderr[start..].join("\n");
        if tail.is_empty() {
            exit
        } else {
            format!("{exit}: {tail}")
        }
    }
}

/// Spawn `command`, stream its stdout/stderr line by line into `tracing`
/// and wait for it to exit.
///
/// A spawn or wait failure is returned as [`Error::Other`]; callers map it
/// onto their own error kind. A non-zero exit is not an error here.
pub async fn run_command_with_logs(command: &mut Command) -> Result<CommandOutput> {
    let start = Instant::now();

    let mut child = command
        .spawn()
        .map_err(|e| Error::Other(format!("failed to spawn command: {e}")))?;

    let stdout_task = child.stdout.take().map(|stdout| {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut collected = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("stdout: {}", line);
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        })
    });

    let stderr_task = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.to_lowercase().contains("error") {
                    warn!("stderr: {}", line);
                } else {
                    debug!("stderr: {}", line);
                }
                if !line.trim().is_empty() {
                    collected.push(line);
                }
            }
            collected
        })
    });

    let status = child
        .wait()
        .await
        .map_err(|e| Error::Other(format!("failed to wait for command: {e}")))?;

    let stdout = match stdout_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };
    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };

    Ok(CommandOutput {
        status,
        duration: start.elapsed().as_secs_f64(),
        stdout,
        stderr,
    })
}
