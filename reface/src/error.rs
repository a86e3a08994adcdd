//! Library-wide error types.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::pipeline::PipelineState;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Library-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid path {}: {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    #[error("Unknown frame processor: {0}")]
    UnknownProcessor(String),

    #[error("Workspace {} is already in use by another run", .0.display())]
    WorkspaceBusy(PathBuf),

    #[error("Frame extraction failed: {0}")]
    Extraction(String),

    #[error("Video encoding failed: {0}")]
    Encoding(String),

    #[error("Frame processor '{name}' failed: {message}")]
    Processor { name: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Content filter error: {0}")]
    ContentFilter(String),

    #[error("Invalid pipeline state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: PipelineState,
        to: PipelineState,
    },

    #[error("IO error while {op} {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse failure category reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Extraction,
    Encoding,
    Processor,
    Validation,
    ContentFilter,
    Io,
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn processor(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Processor {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Category of this error in the pipeline's failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_)
            | Self::InvalidPath { .. }
            | Self::UnknownProcessor(_)
            | Self::WorkspaceBusy(_) => ErrorKind::Config,
            Self::Extraction(_) => ErrorKind::Extraction,
            Self::Encoding(_) => ErrorKind::Encoding,
            Self::Processor { .. } => ErrorKind::Processor,
            Self::Validation(_) | Self::InvalidStateTransition { .. } => ErrorKind::Validation,
            Self::ContentFilter(_) => ErrorKind::ContentFilter,
            Self::IoPath { .. } | Self::Io(_) | Self::Other(_) => ErrorKind::Io,
        }
    }
}
