use anyhow::{Context, Result};
use reface::logging::LoggingOptions;
use reface::{
    CommandSpec, ContentFilterSpec, FfmpegTool, PipelineDefaults, PipelineOptions,
    ProcessorRegistry,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of `config.toml`.
///
/// ```toml
/// ffmpeg_path = "/usr/bin/ffmpeg"
/// temp_dir = "/var/tmp/reface"
///
/// [logging]
/// filter = "reface=debug"
///
/// [defaults]
/// frame_processors = ["face_swapper"]
/// video_quality = 20
///
/// [[processors]]
/// name = "face_swapper"
/// program = "python"
/// args = ["swap.py", "--source", "{source}", "--target", "{target}", "--output", "{output}"]
/// many_faces_arg = "--many-faces"
///
/// [content_filter]
/// program = "nsfw-check"
/// args = ["{path}"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    /// ffmpeg `-loglevel`
    pub ffmpeg_log_level: Option<String>,
    /// Root for workspaces; `temp/` next to each target when unset
    pub temp_dir: Option<PathBuf>,
    pub logging: LoggingOptions,
    /// Run options applied before command-line flags
    pub defaults: PipelineOptions,
    pub processors: Vec<CommandSpec>,
    pub content_filter: Option<ContentFilterSpec>,
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("reface").join("config.toml"))
    }

    /// Load `path`, or the default location when `None`.
    ///
    /// An explicit path must exist; a missing default file yields the
    /// built-in configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for spec in &self.processors {
            anyhow::ensure!(
                !spec.name.trim().is_empty(),
                "processor entries need a non-empty name"
            );
        }
        Ok(())
    }

    /// Built-in processors plus the configured command processors.
    pub fn registry(&self) -> ProcessorRegistry {
        let mut registry = ProcessorRegistry::with_builtins();
        for spec in &self.processors {
            registry.register_command(spec.clone());
        }
        registry
    }

    pub fn media_tool(&self) -> FfmpegTool {
        let mut tool = FfmpegTool::new();
        if let Some(path) = &self.ffmpeg_path {
            tool = tool.with_ffmpeg_path(path);
        }
        if let Some(path) = &self.ffprobe_path {
            tool = tool.with_ffprobe_path(path);
        }
        if let Some(level) = &self.ffmpeg_log_level {
            tool = tool.with_log_level(level);
        }
        tool
    }

    /// Environment defaults; `temp_dir` applies when `REFACE_TEMP_DIR` is unset.
    pub fn pipeline_defaults(&self) -> Result<PipelineDefaults> {
        let mut defaults = PipelineDefaults::from_env()?;
        if defaults.temp_root.is_none() {
            defaults.temp_root = self.temp_dir.clone();
        }
        Ok(defaults)
    }

    /// Config `[defaults]` overridden by `cli`.
    pub fn options(&self, cli: PipelineOptions) -> PipelineOptions {
        self.defaults.clone().merge(cli)
    }
}
