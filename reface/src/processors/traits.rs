//! Frame processor trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::Result;
use crate::context::PipelineContext;

/// A named capability that mutates images in place.
///
/// Processors are invoked by the chain in caller-declared order and must
/// not add or remove frames. Any cache a processor keeps is private and is
/// dropped in [`release`](Self::release), which the chain calls after every
/// invocation.
#[async_trait]
pub trait FrameProcessor: Send + Sync {
    /// Identifier used in chains and status tags.
    fn name(&self) -> &str;

    /// Transfer `source` onto `target`, writing the result to `output`.
    ///
    /// In the image pipeline `target` and `output` are the same file: the
    /// output already holds the cumulative result of earlier processors.
    async fn process_image(
        &self,
        source: &Path,
        target: &Path,
        output: &Path,
        ctx: &PipelineContext,
    ) -> Result<()>;

    /// Transfer `source` onto every frame, in place.
    ///
    /// The whole sequence is one unit of work: either every frame was
    /// processed or an error is returned.
    async fn process_video(
        &self,
        source: &Path,
        frames: &[PathBuf],
        ctx: &PipelineContext,
    ) -> Result<()>;

    /// Drop private caches and accelerator memory.
    fn release(&self) {}
}
