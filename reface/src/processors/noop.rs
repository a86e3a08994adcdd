//! Processor that leaves every artifact untouched.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::traits::FrameProcessor;
use crate::Result;
use crate::context::PipelineContext;

pub struct NoopProcessor;

impl NoopProcessor {
    pub const NAME: &'static str = "noop";
}

#[async_trait]
impl FrameProcessor for NoopProcessor {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn process_image(
        &self,
        _source: &Path,
        _target: &Path,
        output: &Path,
        _ctx: &PipelineContext,
    ) -> Result<()> {
        debug!("noop: leaving {} unchanged", output.display());
        Ok(())
    }

    async fn process_video(
        &self,
        _source: &Path,
        frames: &[PathBuf],
        _ctx: &PipelineContext,
    ) -> Result<()> {
        debug!("noop: leaving {} frames unchanged", frames.len());
        Ok(())
    }
}
