//! Final output path resolution.

use std::path::{Path, PathBuf};

use crate::artifact::ArtifactKind;
use crate::utils::fs;
use crate::{Error, Result};

/// Resolve the path the pipeline will write its result to.
///
/// * `None` places `<source stem>-<target stem>.<target ext>` next to the target.
/// * A directory (existing, or written with a trailing separator) gets the
///   same synthesized name inside it.
/// * A file path keeps its name; its extension is replaced by the target's
///   when it is missing or names the other artifact kind.
///
/// The parent directory of the returned path is created if needed.
pub async fn resolve_output_path(
    source: &Path,
    target: &Path,
    output: Option<&Path>,
) -> Result<PathBuf> {
    let (target_ext, target_kind) = target
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| ArtifactKind::from_extension(ext).map(|kind| (ext, kind)))
        .ok_or_else(|| {
            Error::invalid_path(target, "target has no recognizable image or video extension")
        })?;

    let resolved = match output {
        None => {
            let dir = target.parent().unwrap_or_else(|| Path::new(""));
            dir.join(synthesized_name(source, target, target_ext))
        }
        Some(output) if is_directory_like(output).await => {
            output.join(synthesized_name(source, target, target_ext))
        }
        Some(output) => match ArtifactKind::from_path(output) {
            Some(kind) if kind == target_kind => output.to_path_buf(),
            _ => output.with_extension(target_ext),
        },
    };

    fs::ensure_parent_dir(&resolved).await?;
    Ok(resolved)
}

fn synthesized_name(source: &Path, target: &Path, ext: &str) -> String {
    let stem = |path: &Path| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    format!("{}-{}.{ext}", stem(source), stem(target))
}

async fn is_directory_like(path: &Path) -> bool {
    let text = path.as_os_str().to_string_lossy();
    if text.ends_with('/') || text.ends_with(std::path::MAIN_SEPARATOR) {
        return true;
    }
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
