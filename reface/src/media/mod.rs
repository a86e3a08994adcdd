//! Decode/encode capability used by the video path.
//!
//! The pipeline never shells out to a media tool directly; it goes through
//! [`MediaTool`], so tests can substitute a fake and deployments can swap in
//! another backend. [`FfmpegTool`] is the production implementation.

pub mod ffmpeg;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

pub use ffmpeg::FfmpegTool;

/// printf-style pattern of frame files inside a workspace.
///
/// Fixed width keeps lexical order equal to decode order.
pub const FRAME_PATTERN: &str = "%08d.png";

/// Extension of frame files.
pub const FRAME_EXTENSION: &str = "png";

/// Frame rate used when the target's own rate is not kept or not detectable.
pub const DEFAULT_FPS: f64 = 30.0;

/// Video encoders accepted for reassembly.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum VideoEncoder {
    #[default]
    #[serde(rename = "libx264")]
    #[strum(serialize = "libx264")]
    Libx264,
    #[serde(rename = "libx265")]
    #[strum(serialize = "libx265")]
    Libx265,
    #[serde(rename = "libvpx-vp9")]
    #[strum(serialize = "libvpx-vp9")]
    LibvpxVp9,
    #[serde(rename = "h264_nvenc")]
    #[strum(serialize = "h264_nvenc")]
    H264Nvenc,
    #[serde(rename = "hevc_nvenc")]
    #[strum(serialize = "hevc_nvenc")]
    HevcNvenc,
}

impl VideoEncoder {
    pub fn is_nvenc(self) -> bool {
        matches!(self, Self::H264Nvenc | Self::HevcNvenc)
    }

    /// Encoder-specific quality arguments for a 0..=51 quality setting.
    pub fn quality_args(self, video_quality: u8) -> Vec<String> {
        let q = ((u32::from(video_quality) + 1) * 51 / 100).to_string();
        if self.is_nvenc() {
            vec!["-preset".into(), "p7".into(), "-qp".into(), q]
        } else {
            vec!["-crf".into(), q]
        }
    }
}

/// Settings for one reassembly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeSettings {
    pub fps: f64,
    pub encoder: VideoEncoder,
    pub quality: u8,
}

/// External decode/encode capability.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Decode `video` into [`FRAME_PATTERN`] files inside `frames_dir`.
    async fn extract_frames(&self, video: &Path, frames_dir: &Path) -> Result<()>;

    /// Encode the [`FRAME_PATTERN`] files in `frames_dir` into `output`.
    async fn encode(&self, frames_dir: &Path, settings: EncodeSettings, output: &Path)
    -> Result<()>;

    /// Native frame rate of `video`.
    async fn detect_fps(&self, video: &Path) -> Result<f64>;

    /// Copy the video stream of `silent` and the first audio stream of
    /// `audio_source` into `output`.
    async fn mux_audio(&self, silent: &Path, audio_source: &Path, output: &Path) -> Result<()>;
}
