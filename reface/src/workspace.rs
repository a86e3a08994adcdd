//! Per-target staging directories for the video path.
//!
//! A workspace lives at `<root>/<target stem>-<hash>/` where the hash is
//! derived from the target's absolute path, so repeated runs on the same
//! target land in the same directory. It holds the extracted frames
//! (`00000001.png`, ...) and the reassembled silent video
//! (`temp.<target ext>`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::media::{EncodeSettings, FRAME_EXTENSION, MediaTool};
use crate::utils::filename::short_stem;
use crate::utils::fs;
use crate::{Error, Result};

/// Default workspace root, relative to the target's directory.
pub const DEFAULT_TEMP_DIR: &str = "temp";

/// Hex characters of the path hash kept in a workspace name.
const KEY_HASH_LEN: usize = 16;

/// Stem of the reassembled silent video.
const TEMP_VIDEO_STEM: &str = "temp";

/// Creates, fills and removes workspaces.
#[derive(Clone)]
pub struct WorkspaceManager {
    root: Option<PathBuf>,
    media: Arc<dyn MediaTool>,
    leases: Arc<Mutex<HashSet<PathBuf>>>,
}

impl std::fmt::Debug for WorkspaceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceManager")
            .field("root", &self.root)
            .field("media", &self.media.name())
            .field("leases", &self.leases.lock().len())
            .finish()
    }
}

/// Exclusive use of one workspace, released on drop.
#[derive(Debug)]
pub struct WorkspaceLease {
    dir: PathBuf,
    leases: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Drop for WorkspaceLease {
    fn drop(&mut self) {
        self.leases.lock().remove(&self.dir);
        debug!("Released workspace lease {}", self.dir.display());
    }
}

impl WorkspaceManager {
    /// Workspaces go to `temp/` next to each target.
    pub fn new(media: Arc<dyn MediaTool>) -> Self {
        Self {
            root: None,
            media,
            leases: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Put every workspace under `root` instead.
    pub fn with_root(mut self, root: Option<PathBuf>) -> Self {
        self.root = root;
        self
    }

    pub fn media(&self) -> &Arc<dyn MediaTool> {
        &self.media
    }

    /// Directory that holds the workspaces for `target`.
    pub fn root_for(&self, target: &Path) -> PathBuf {
        match &self.root {
            Some(root) => root.clone(),
            None => target
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(DEFAULT_TEMP_DIR),
        }
    }

    /// Workspace directory for `target`; deterministic, no side effects.
    pub fn workspace_dir(&self, target: &Path) -> PathBuf {
        self.root_for(target).join(workspace_key(target))
    }

    /// Path of the reassembled silent video for `target`.
    pub fn temp_video_path(&self, target: &Path) -> PathBuf {
        let mut name = TEMP_VIDEO_STEM.to_string();
        if let Some(ext) = target.extension() {
            name.push('.');
            name.push_str(&ext.to_string_lossy());
        }
        self.workspace_dir(target).join(name)
    }

    /// Take exclusive use of the workspace for `target`.
    ///
    /// Fails with [`Error::WorkspaceBusy`] while another lease on the same
    /// workspace is alive.
    pub fn lease(&self, target: &Path) -> Result<WorkspaceLease> {
        let dir = self.workspace_dir(target);
        let mut leases = self.leases.lock();
        if !leases.insert(dir.clone()) {
            return Err(Error::WorkspaceBusy(dir));
        }
        debug!("Acquired workspace lease {}", dir.display());
        Ok(WorkspaceLease {
            dir,
            leases: Arc::clone(&self.leases),
        })
    }

    /// Create the workspace for `target`, reusing it if it already exists.
    pub async fn create(&self, target: &Path) -> Result<PathBuf> {
        let dir = self.workspace_dir(target);
        // Another run's cleanup may remove the shared empty root mid-way.
        if tokio::fs::create_dir_all(&dir).await.is_err() {
            fs::ensure_dir_all_with_op("creating workspace", &dir).await?;
        }
        debug!("Workspace ready at {}", dir.display());
        Ok(dir)
    }

    /// Decode `target` into frame files and return how many were written.
    ///
    /// Frames and the temp video left by an earlier run are removed first.
    pub async fn extract_frames(&self, target: &Path) -> Result<usize> {
        let dir = self.create(target).await?;
        self.clear_stale(target).await?;
        self.media.extract_frames(target, &dir).await?;

        let count = self
            .list_frame_paths(target)
            .await
            .map_err(|e| Error::Extraction(e.to_string()))?
            .len();
        if count == 0 {
            return Err(Error::Extraction(format!(
                "no frames were extracted from {}",
                target.display()
            )));
        }
        info!(frames = count, "Extracted frames from {}", target.display());
        Ok(count)
    }

    async fn clear_stale(&self, target: &Path) -> Result<()> {
        let stale = self.list_frame_paths(target).await?;
        if !stale.is_empty() {
            debug!(
                frames = stale.len(),
                "Removing stale frames from {}",
                self.workspace_dir(target).display()
            );
        }
        for frame in &stale {
            fs::remove_file_if_exists(frame).await?;
        }
        fs::remove_file_if_exists(&self.temp_video_path(target)).await
    }

    /// Frame files currently in the workspace, in decode order.
    ///
    /// A missing workspace yields an empty list.
    pub async fn list_frame_paths(&self, target: &Path) -> Result<Vec<PathBuf>> {
        let dir = self.workspace_dir(target);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(fs::io_error("listing", &dir, e)),
        };

        let mut frames = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| fs::io_error("listing", &dir, e))?
        {
            let path = entry.path();
            if is_frame_file(&path) {
                frames.push(path);
            }
        }
        frames.sort();
        Ok(frames)
    }

    /// Encode the workspace's frames into its silent temp video.
    pub async fn reassemble(&self, target: &Path, settings: EncodeSettings) -> Result<PathBuf> {
        let dir = self.workspace_dir(target);
        if self.list_frame_paths(target).await?.is_empty() {
            return Err(Error::Encoding(format!(
                "no frames to reassemble in {}",
                dir.display()
            )));
        }

        let temp_video = self.temp_video_path(target);
        fs::remove_file_if_exists(&temp_video).await?;
        self.media.encode(&dir, settings, &temp_video).await?;
        if !fs::exists(&temp_video).await {
            return Err(Error::Encoding(format!(
                "{} produced no video at {}",
                self.media.name(),
                temp_video.display()
            )));
        }
        Ok(temp_video)
    }

    /// Write the final video to `output`, with the target's audio when
    /// `keep_audio` is set.
    ///
    /// If muxing fails the silent video is used instead.
    pub async fn move_or_merge_audio(
        &self,
        target: &Path,
        output: &Path,
        keep_audio: bool,
    ) -> Result<()> {
        let temp_video = self.temp_video_path(target);
        if !fs::exists(&temp_video).await {
            return Err(Error::Encoding(format!(
                "reassembled video {} is missing",
                temp_video.display()
            )));
        }
        fs::ensure_parent_dir(output).await?;

        if keep_audio {
            match self.media.mux_audio(&temp_video, target, output).await {
                Ok(()) if fs::exists(output).await => {
                    fs::remove_file_if_exists(&temp_video).await?;
                    return Ok(());
                }
                Ok(()) => warn!(
                    "Restoring audio produced no file at {}, keeping silent video",
                    output.display()
                ),
                Err(e) => warn!("Restoring audio failed, keeping silent video: {e}"),
            }
        }

        fs::move_file(&temp_video, output).await
    }

    /// Remove the workspace for `target` unless `keep_frames` is set.
    ///
    /// Best effort: failures are logged and missing paths are ignored.
    /// The default `temp/` root is removed too once it is empty.
    pub async fn cleanup(&self, target: &Path, keep_frames: bool) {
        let dir = self.workspace_dir(target);
        if keep_frames {
            debug!("Keeping frames in {}", dir.display());
            return;
        }

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!("Removed workspace {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove workspace {}: {e}", dir.display()),
        }

        // A configured root belongs to the user and stays.
        if self.root.is_some() {
            return;
        }
        let root = self.root_for(target);
        if tokio::fs::remove_dir(&root).await.is_ok() {
            debug!("Removed empty workspace root {}", root.display());
        }
    }
}

/// `<sanitized stem>-<first 16 hex chars of sha256(absolute target path)>`.
pub fn workspace_key(target: &Path) -> String {
    let absolute = std::path::absolute(target).unwrap_or_else(|_| target.to_path_buf());
    let digest = Sha256::digest(absolute.to_string_lossy().as_bytes());
    let hash = hex::encode(digest);
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}-{}", short_stem(&stem), &hash[..KEY_HASH_LEN])
}

fn is_frame_file(path: &Path) -> bool {
    let ext_ok = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(FRAME_EXTENSION));
    let stem_ok = path
        .file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()));
    ext_ok && stem_ok
}
