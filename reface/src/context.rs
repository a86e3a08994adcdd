//! Per-run pipeline context.
//!
//! A [`PipelineContext`] is resolved once per job from the caller's
//! [`PipelineOptions`] layered over [`PipelineDefaults`], then shared
//! read-only (behind an `Arc`) with every stage of that run.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::artifact::ArtifactKind;
use crate::media::VideoEncoder;
use crate::output::resolve_output_path;
use crate::utils::fs;
use crate::{Error, Result};

const GIB: u64 = 1024 * 1024 * 1024;

/// Highest accepted `video_quality` (ffmpeg's CRF scale).
pub const MAX_VIDEO_QUALITY: u8 = 51;

/// Highest accepted `execution_threads`.
pub const MAX_EXECUTION_THREADS: usize = 1024;

/// Caller-supplied options for one run.
///
/// Every field is optional; unset fields fall back to [`PipelineDefaults`].
/// Unknown keys are rejected when deserializing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineOptions {
    #[serde(default, alias = "frame_processor", skip_serializing_if = "Option::is_none")]
    pub frame_processors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_fps: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_audio: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_frames: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub many_faces: Option<bool>,
    #[serde(default, alias = "nsfw_filter", skip_serializing_if = "Option::is_none")]
    pub content_filter: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_encoder: Option<VideoEncoder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_quality: Option<u8>,
    /// Advisory memory budget in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_threads: Option<usize>,
}

impl PipelineOptions {
    /// Parse options from a JSON object, rejecting unknown keys.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::config(format!("invalid options: {e}")))
    }

    /// Layer `overrides` on top of `self`; set fields in `overrides` win.
    pub fn merge(self, overrides: PipelineOptions) -> Self {
        Self {
            frame_processors: overrides.frame_processors.or(self.frame_processors),
            keep_fps: overrides.keep_fps.or(self.keep_fps),
            keep_audio: overrides.keep_audio.or(self.keep_audio),
            keep_frames: overrides.keep_frames.or(self.keep_frames),
            many_faces: overrides.many_faces.or(self.many_faces),
            content_filter: overrides.content_filter.or(self.content_filter),
            video_encoder: overrides.video_encoder.or(self.video_encoder),
            video_quality: overrides.video_quality.or(self.video_quality),
            max_memory: overrides.max_memory.or(self.max_memory),
            execution_threads: overrides.execution_threads.or(self.execution_threads),
        }
    }
}

/// Environment-derived defaults applied to every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDefaults {
    pub frame_processors: Vec<String>,
    pub keep_fps: bool,
    pub keep_audio: bool,
    pub keep_frames: bool,
    pub many_faces: bool,
    pub content_filter: bool,
    pub video_encoder: VideoEncoder,
    pub video_quality: u8,
    pub max_memory: u64,
    pub execution_threads: usize,
    /// Directory under which workspaces are created. `None` means a
    /// `temp/` directory next to each target.
    pub temp_root: Option<PathBuf>,
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self {
            frame_processors: vec!["face_swapper".to_string()],
            keep_fps: false,
            keep_audio: true,
            keep_frames: false,
            many_faces: false,
            content_filter: false,
            video_encoder: VideoEncoder::default(),
            video_quality: 18,
            max_memory: default_max_memory(),
            execution_threads: 8,
            temp_root: None,
        }
    }
}

fn default_max_memory() -> u64 {
    if cfg!(target_os = "macos") {
        4 * GIB
    } else {
        16 * GIB
    }
}

impl PipelineDefaults {
    /// Read defaults from `REFACE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read defaults through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut defaults = Self::default();

        if let Some(list) = lookup("REFACE_FRAME_PROCESSORS") {
            defaults.frame_processors = list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup("REFACE_KEEP_FPS") {
            defaults.keep_fps = parse_bool("REFACE_KEEP_FPS", &v)?;
        }
        if let Some(v) = lookup("REFACE_KEEP_AUDIO") {
            defaults.keep_audio = parse_bool("REFACE_KEEP_AUDIO", &v)?;
        }
        if let Some(v) = lookup("REFACE_KEEP_FRAMES") {
            defaults.keep_frames = parse_bool("REFACE_KEEP_FRAMES", &v)?;
        }
        if let Some(v) = lookup("REFACE_MANY_FACES") {
            defaults.many_faces = parse_bool("REFACE_MANY_FACES", &v)?;
        }
        if let Some(v) = lookup("REFACE_CONTENT_FILTER") {
            defaults.content_filter = parse_bool("REFACE_CONTENT_FILTER", &v)?;
        }
        if let Some(v) = lookup("REFACE_VIDEO_ENCODER") {
            defaults.video_encoder = parse_value("REFACE_VIDEO_ENCODER", &v)?;
        }
        if let Some(v) = lookup("REFACE_VIDEO_QUALITY") {
            defaults.video_quality = parse_value("REFACE_VIDEO_QUALITY", &v)?;
        }
        if let Some(v) = lookup("REFACE_MAX_MEMORY") {
            defaults.max_memory = parse_value("REFACE_MAX_MEMORY", &v)?;
        }
        if let Some(v) = lookup("REFACE_EXECUTION_THREADS") {
            defaults.execution_threads = parse_value("REFACE_EXECUTION_THREADS", &v)?;
        }
        if let Some(v) = lookup("REFACE_TEMP_DIR").filter(|v| !v.trim().is_empty()) {
            defaults.temp_root = Some(PathBuf::from(v));
        }

        Ok(defaults)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::config(format!("{key}: expected a boolean, got '{other}'"))),
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::config(format!("{key}: invalid value '{value}': {e}")))
}

/// One incoming job: the artifacts plus the caller's options.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub source: PathBuf,
    pub target: PathBuf,
    /// Output file or directory; `None` places the output next to the target.
    pub output: Option<PathBuf>,
    pub options: PipelineOptions,
}

impl PipelineRequest {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            output: None,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }
}

/// Immutable configuration of a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineContext {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub output_path: PathBuf,
    pub target_kind: ArtifactKind,
    pub processor_names: Vec<String>,
    pub keep_fps: bool,
    pub keep_audio: bool,
    pub keep_frames: bool,
    pub many_faces: bool,
    pub content_filter: bool,
    pub video_encoder: VideoEncoder,
    pub video_quality: u8,
    pub max_memory: u64,
    pub execution_threads: usize,
}

impl PipelineContext {
    /// Validate a request and resolve it into a context.
    ///
    /// Creates the output's parent directory; has no other side effects.
    pub async fn resolve(request: PipelineRequest, defaults: &PipelineDefaults) -> Result<Self> {
        let PipelineRequest {
            source,
            target,
            output,
            options,
        } = request;

        check_input("source", &source, ArtifactKind::Image).await?;
        let target_kind = ArtifactKind::from_path(&target).ok_or_else(|| {
            Error::invalid_path(&target, "target has no recognizable image or video extension")
        })?;
        check_input("target", &target, target_kind).await?;

        let processor_names = options
            .frame_processors
            .unwrap_or_else(|| defaults.frame_processors.clone());
        if let Some(blank) = processor_names.iter().find(|name| name.trim().is_empty()) {
            return Err(Error::config(format!("invalid frame processor name '{blank}'")));
        }

        let video_quality = options.video_quality.unwrap_or(defaults.video_quality);
        if video_quality > MAX_VIDEO_QUALITY {
            return Err(Error::config(format!(
                "video_quality must be between 0 and {MAX_VIDEO_QUALITY}, got {video_quality}"
            )));
        }

        let execution_threads = options
            .execution_threads
            .unwrap_or(defaults.execution_threads);
        if !(1..=MAX_EXECUTION_THREADS).contains(&execution_threads) {
            return Err(Error::config(format!(
                "execution_threads must be between 1 and {MAX_EXECUTION_THREADS}, got {execution_threads}"
            )));
        }

        let max_memory = options.max_memory.unwrap_or(defaults.max_memory);
        if max_memory == 0 {
            return Err(Error::config("max_memory must be greater than zero"));
        }

        let output_path = resolve_output_path(&source, &target, output.as_deref()).await?;
        if same_file(&output_path, &target).await || same_file(&output_path, &source).await {
            return Err(Error::invalid_path(
                &output_path,
                "output must not overwrite the source or target",
            ));
        }

        let context = Self {
            source_path: source,
            target_path: target,
            output_path,
            target_kind,
            processor_names,
            keep_fps: options.keep_fps.unwrap_or(defaults.keep_fps),
            keep_audio: options.keep_audio.unwrap_or(defaults.keep_audio),
            keep_frames: options.keep_frames.unwrap_or(defaults.keep_frames),
            many_faces: options.many_faces.unwrap_or(defaults.many_faces),
            content_filter: options.content_filter.unwrap_or(defaults.content_filter),
            video_encoder: options.video_encoder.unwrap_or(defaults.video_encoder),
            video_quality,
            max_memory,
            execution_threads,
        };
        debug!(?context, "Resolved pipeline context");
        Ok(context)
    }

    pub fn is_video(&self) -> bool {
        self.target_kind == ArtifactKind::Video
    }
}

async fn check_input(role: &str, path: &Path, expected: ArtifactKind) -> Result<()> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| Error::invalid_path(path, format!("{role} does not exist")))?;
    if !metadata.is_file() {
        return Err(Error::invalid_path(path, format!("{role} is not a file")));
    }
    match ArtifactKind::from_path(path) {
        Some(kind) if kind == expected => Ok(()),
        _ => Err(Error::invalid_path(
            path,
            format!("{role} must be an {expected}"),
        )),
    }
}

async fn same_file(a: &Path, b: &Path) -> bool {
    if !fs::exists(a).await {
        return false;
    }
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
