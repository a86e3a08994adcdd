//! Face identity transfer pipeline.
//!
//! A run takes a source face image and a target image or video, stages the
//! target (a copy for images, extracted frames for videos), applies an
//! ordered chain of [`FrameProcessor`]s and, for videos, reassembles the
//! frames and restores the audio track.
//!
//! ```no_run
//! use std::sync::Arc;
//! use reface::{FfmpegTool, Pipeline, PipelineDefaults, PipelineRequest};
//!
//! # async fn demo() -> reface::Result<()> {
//! let pipeline = Pipeline::new(Arc::new(FfmpegTool::new()), PipelineDefaults::from_env()?);
//! let report = pipeline
//!     .run(PipelineRequest::new("face.jpg", "clip.mp4").with_output("out/"))
//!     .await;
//! assert!(report.succeeded());
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod chain;
pub mod content_filter;
pub mod context;
pub mod error;
pub mod logging;
pub mod media;
pub mod output;
pub mod pipeline;
pub mod processors;
pub mod status;
pub mod utils;
pub mod workspace;

pub use artifact::ArtifactKind;
pub use chain::{FrameProcessorChain, NoopRelease, ResourceRelease};
pub use content_filter::{CommandContentFilter, ContentFilter, ContentFilterSpec};
pub use context::{PipelineContext, PipelineDefaults, PipelineOptions, PipelineRequest};
pub use error::{Error, ErrorKind, Result};
pub use media::{EncodeSettings, FfmpegTool, MediaTool, VideoEncoder};
pub use output::resolve_output_path;
pub use pipeline::{Pipeline, PipelineState, RejectHook, RunOutcome, RunReport};
pub use processors::{
    CommandProcessor, CommandSpec, FrameProcessor, NoopProcessor, ProcessorRegistry,
};
pub use status::{
    BroadcastStatusSink, MemoryStatusSink, StatusEvent, StatusReporter, StatusSink,
    TracingStatusSink,
};
pub use workspace::{WorkspaceLease, WorkspaceManager};
