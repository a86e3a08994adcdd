//! Logging setup for binaries embedding the pipeline.
//!
//! Installs a `tracing` subscriber with:
//! - an `EnvFilter` (`RUST_LOG` wins over the configured filter)
//! - console output, plain or JSON, with local-time timestamps
//! - an optional daily-rolling log file written off-thread

use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "reface=info,reface_cli=info";

/// Prefix of rolled log files (`reface.log.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "reface.log";

/// Timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Logging options, usually the `[logging]` table of a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingOptions {
    /// Filter directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
    /// Emit console logs as JSON lines.
    pub json: bool,
    /// Colorize console output.
    pub ansi: bool,
    /// Directory for daily-rolling log files; no file output when unset.
    pub dir: Option<PathBuf>,
    /// Days of rolled files to keep.
    pub retention_days: Option<i64>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            filter: None,
            json: false,
            ansi: true,
            dir: None,
            retention_days: Some(7),
        }
    }
}

/// Keeps the subscriber's resources alive.
///
/// Dropping it flushes and stops the file writer.
pub struct LoggingHandle {
    _guard: Option<WorkerGuard>,
}

/// Build the initial filter: `RUST_LOG`, then the configured directive,
/// then [`DEFAULT_LOG_FILTER`].
pub fn initial_filter(configured: Option<&str>) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = configured.unwrap_or(DEFAULT_LOG_FILTER);
    EnvFilter::try_new(directive)
        .map_err(|e| Error::config(format!("invalid filter directive '{directive}': {e}")))
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_logging(options: &LoggingOptions) -> Result<LoggingHandle> {
    let filter = initial_filter(options.filter.as_deref())?;

    let console = if options.json {
        fmt::layer()
            .json()
            .with_timer(LocalTimer)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_ansi(options.ansi)
            .with_timer(LocalTimer)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file, guard) = match &options.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::io_path("creating log directory", dir, e))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to set global default subscriber: {e}")))?;

    Ok(LoggingHandle { _guard: guard })
}

/// Delete rolled log files older than `retention_days`.
///
/// Returns how many files were removed.
pub async fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();
    let prefix = format!("{LOG_FILE_PREFIX}.");

    let mut entries = match tokio::fs::read_dir(log_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(Error::io_path("listing", log_dir, e)),
    };

    let mut deleted = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io_path("listing", log_dir, e))?
    {
        let path = entry.path();
        let Some(date) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(prefix.as_str()))
            .and_then(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        else {
            continue;
        };

        if date < cutoff {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    deleted += 1;
                    debug!(path = %path.display(), "Deleted old log file");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete old log file"),
            }
        }
    }

    if deleted > 0 {
        info!(count = deleted, "Cleaned up old log files");
    }
    Ok(deleted)
}
