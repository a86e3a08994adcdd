//! [`MediaTool`] backed by the ffmpeg and ffprobe binaries.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{EncodeSettings, FRAME_PATTERN, MediaTool};
use crate::utils::command::run_command_with_logs;
use crate::{Error, Result};

/// ffmpeg/ffprobe driver.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
    log_level: String,
}

impl FfmpegTool {
    /// Use `FFMPEG_PATH` / `FFPROBE_PATH` when set, otherwise the binaries on `PATH`.
    pub fn new() -> Self {
        Self {
            ffmpeg_path: std::env::var_os("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("ffmpeg")),
            ffprobe_path: std::env::var_os("FFPROBE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("ffprobe")),
            log_level: "error".to_string(),
        }
    }

    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    pub fn with_ffprobe_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffprobe_path = path.into();
        self
    }

    /// ffmpeg `-loglevel` value.
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    fn base_args(&self) -> Vec<OsString> {
        vec![
            "-hide_banner".into(),
            "-hwaccel".into(),
            "auto".into(),
            "-loglevel".into(),
            self.log_level.clone().into(),
        ]
    }

    fn extract_args(&self, video: &Path, frames_dir: &Path) -> Vec<OsString> {
        let mut args = self.base_args();
        args.extend([
            "-i".into(),
            video.as_os_str().to_owned(),
            "-pix_fmt".into(),
            "rgb24".into(),
            frames_dir.join(FRAME_PATTERN).into_os_string(),
        ]);
        args
    }

    fn encode_args(
        &self,
        frames_dir: &Path,
        settings: EncodeSettings,
        output: &Path,
    ) -> Vec<OsString> {
        let mut args = self.base_args();
        args.extend([
            "-r".into(),
            format_fps(settings.fps).into(),
            "-i".into(),
            frames_dir.join(FRAME_PATTERN).into_os_string(),
            "-c:v".into(),
            settings.encoder.to_string().into(),
        ]);
        args.extend(
            settings
                .encoder
                .quality_args(settings.quality)
                .into_iter()
                .map(OsString::from),
        );
        args.extend([
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-vf".into(),
            "colorspace=bt709:iall=bt601-6-625:fast=1".into(),
            "-y".into(),
            output.as_os_str().to_owned(),
        ]);
        args
    }

    fn mux_args(&self, silent: &Path, audio_source: &Path, output: &Path) -> Vec<OsString> {
        let mut args = self.base_args();
        args.extend([
            "-i".into(),
            silent.as_os_str().to_owned(),
            "-i".into(),
            audio_source.as_os_str().to_owned(),
            "-c:v".into(),
            "copy".into(),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
            "-y".into(),
            output.as_os_str().to_owned(),
        ]);
        args
    }

    /// Run ffmpeg, mapping a failure through `to_error`.
    async fn run_ffmpeg(&self, args: Vec<OsString>, to_error: fn(String) -> Error) -> Result<()> {
        debug!(
            "Running: {}",
            process_utils::command_line(&self.ffmpeg_path, &args)
        );
        let mut cmd = process_utils::tool_command(&self.ffmpeg_path);
        cmd.args(&args);

        let output = run_command_with_logs(&mut cmd)
            .await
            .map_err(|e| to_error(format!("{}: {e}", self.ffmpeg_path.display())))?;
        if !output.success() {
            return Err(to_error(output.failure_summary()));
        }
        debug!("ffmpeg finished in {:.2}s", output.duration);
        Ok(())
    }
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn extract_frames(&self, video: &Path, frames_dir: &Path) -> Result<()> {
        info!("Extracting frames from {}", video.display());
        self.run_ffmpeg(self.extract_args(video, frames_dir), Error::Extraction)
            .await
    }

    async fn encode(
        &self,
        frames_dir: &Path,
        settings: EncodeSettings,
        output: &Path,
    ) -> Result<()> {
        info!(
            fps = settings.fps,
            encoder = %settings.encoder,
            "Encoding {}",
            output.display()
        );
        self.run_ffmpeg(
            self.encode_args(frames_dir, settings, output),
            Error::Encoding,
        )
        .await
    }

    async fn detect_fps(&self, video: &Path) -> Result<f64> {
        let mut cmd = process_utils::tool_command(&self.ffprobe_path);
        cmd.args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=r_frame_rate",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(video);

        let output = run_command_with_logs(&mut cmd)
            .await
            .map_err(|e| Error::Extraction(format!("{}: {e}", self.ffprobe_path.display())))?;
        if !output.success() {
            return Err(Error::Extraction(format!(
                "ffprobe failed: {}",
                output.failure_summary()
            )));
        }
        parse_frame_rate(&output.stdout).ok_or_else(|| {
            Error::Extraction(format!(
                "unrecognized frame rate '{}'",
                output.stdout.trim()
            ))
        })
    }

    async fn mux_audio(&self, silent: &Path, audio_source: &Path, output: &Path) -> Result<()> {
        self.run_ffmpeg(self.mux_args(silent, audio_source, output), Error::Encoding)
            .await
    }
}

/// Parse ffprobe's `r_frame_rate` (`num/den` or a plain number).
pub fn parse_frame_rate(text: &str) -> Option<f64> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let fps = match line.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => line.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Render an fps value for ffmpeg without trailing zeros.
fn format_fps(fps: f64) -> String {
    let text = format!("{fps:.3}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
