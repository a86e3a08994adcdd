//! Ordered execution of frame processors.
//!
//! Each processor sees the cumulative result of the ones before it. After
//! every processor the chain releases its resources, then calls the
//! shared [`ResourceRelease`] hook, before the next one starts.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::Result;
use crate::context::PipelineContext;
use crate::pipeline::PipelineState;
use crate::processors::{FrameProcessor, ProcessorRegistry};
use crate::status::StatusReporter;

/// Message emitted before each processor runs.
pub const PROCESSING_MESSAGE: &str = "Processing...";

/// Returns accelerator/host memory between processors.
///
/// Called synchronously; a failure is logged and never fails the run.
pub trait ResourceRelease: Send + Sync {
    fn release(&self) -> Result<()>;
}

/// Release hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRelease;

impl ResourceRelease for NoopRelease {
    fn release(&self) -> Result<()> {
        Ok(())
    }
}

impl<F> ResourceRelease for F
where
    F: Fn() -> Result<()> + Send + Sync,
{
    fn release(&self) -> Result<()> {
        self()
    }
}

/// A resolved, ordered list of processors.
#[derive(Clone)]
pub struct FrameProcessorChain {
    processors: Vec<Arc<dyn FrameProcessor>>,
    release: Arc<dyn ResourceRelease>,
}

impl fmt::Debug for FrameProcessorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameProcessorChain")
            .field("processors", &self.names())
            .finish()
    }
}

impl FrameProcessorChain {
    pub fn new(processors: Vec<Arc<dyn FrameProcessor>>) -> Self {
        Self {
            processors,
            release: Arc::new(NoopRelease),
        }
    }

    /// Resolve `names` through `registry`; unknown names fail immediately.
    pub fn resolve<S: AsRef<str>>(registry: &ProcessorRegistry, names: &[S]) -> Result<Self> {
        Ok(Self::new(registry.build_chain(names)?))
    }

    pub fn with_release(mut self, release: Arc<dyn ResourceRelease>) -> Self {
        self.release = release;
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// Run every processor over the single image at `output`.
    pub async fn run_image(
        &self,
        ctx: &PipelineContext,
        status: &StatusReporter,
    ) -> Result<()> {
        for processor in &self.processors {
            status.emit_tagged(PipelineState::Process, processor.name(), PROCESSING_MESSAGE);
            let result = processor
                .process_image(&ctx.source_path, &ctx.output_path, &ctx.output_path, ctx)
                .await;
            self.release_after(processor.as_ref());
            result?;
        }
        Ok(())
    }

    /// Run every processor over the ordered frame sequence.
    pub async fn run_video(
        &self,
        ctx: &PipelineContext,
        frames: &[PathBuf],
        status: &StatusReporter,
    ) -> Result<()> {
        for processor in &self.processors {
            status.emit_tagged(PipelineState::Process, processor.name(), PROCESSING_MESSAGE);
            let result = processor
                .process_video(&ctx.source_path, frames, ctx)
                .await;
            self.release_after(processor.as_ref());
            result?;
        }
        Ok(())
    }

    fn release_after(&self, processor: &dyn FrameProcessor) {
        processor.release();
        match self.release.release() {
            Ok(()) => debug!(processor = processor.name(), "Released resources"),
            Err(e) => warn!(processor = processor.name(), "Resource release failed: {e}"),
        }
    }
}
