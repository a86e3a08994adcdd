//! Artifact kinds and how they are recognised.
//!
//! A path's kind is first decided by its extension. Finalisation double
//! checks the produced file by sniffing its leading bytes, so a processor
//! that writes garbage under an image name is caught.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;

use crate::utils::fs::io_error;
use crate::Result;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mkv", "mov", "avi", "webm", "flv", "ts"];

/// Kind of a media artifact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ArtifactKind {
    Image,
    Video,
}

impl ArtifactKind {
    /// Kind implied by a file extension (case-insensitive, without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }

    /// Kind implied by a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Kind implied by a file's leading bytes.
    pub fn from_magic(header: &[u8]) -> Option<Self> {
        let starts = |sig: &[u8]| header.starts_with(sig);

        if starts(b"\x89PNG\r\n\x1a\n")
            || starts(&[0xFF, 0xD8, 0xFF])
            || starts(b"GIF87a")
            || starts(b"GIF89a")
            || starts(b"BM")
            || (starts(b"RIFF") && header.get(8..12) == Some(b"WEBP"))
        {
            return Some(Self::Image);
        }

        if header.get(4..8) == Some(b"ftyp")
            || starts(&[0x1A, 0x45, 0xDF, 0xA3])
            || (starts(b"RIFF") && header.get(8..12) == Some(b"AVI "))
            || starts(b"FLV")
            || (header.len() > 188 && header[0] == 0x47 && header[188] == 0x47)
        {
            return Some(Self::Video);
        }

        None
    }

    /// Kind of an existing file, decided by its content.
    pub async fn sniff(path: &Path) -> Result<Option<Self>> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| io_error("opening", path, e))?;
        let mut header = [0u8; 189];
        let mut read = 0;
        while read < header.len() {
            let n = file
                .read(&mut header[read..])
                .await
                .map_err(|e| io_error("reading", path, e))?;
            if n == 0 {
                break;
            }
            read += n;
        }
        Ok(Self::from_magic(&header[..read]))
    }
}
