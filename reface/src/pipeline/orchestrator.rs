//! Drives one request through the pipeline states.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::state::PipelineState;
use crate::artifact::ArtifactKind;
use crate::chain::{FrameProcessorChain, NoopRelease, ResourceRelease};
use crate::content_filter::ContentFilter;
use crate::context::{PipelineContext, PipelineDefaults, PipelineRequest};
use crate::media::{DEFAULT_FPS, EncodeSettings, MediaTool};
use crate::processors::ProcessorRegistry;
use crate::status::StatusReporter;
use crate::utils::fs;
use crate::workspace::{WorkspaceLease, WorkspaceManager};
use crate::{Error, Result};

/// Called with the target path when the content filter rejects it.
pub type RejectHook = Arc<dyn Fn(&Path) + Send + Sync>;

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Succeeded,
    /// The content filter refused the target. Not an error.
    PolicyRejected,
    Failed(Error),
}

/// Result of [`Pipeline::run`].
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Terminal state: `Succeeded` or `Failed`.
    pub state: PipelineState,
    /// Resolved output path, if the request got that far.
    pub output_path: Option<PathBuf>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, RunOutcome::Succeeded)
    }

    pub fn is_policy_rejected(&self) -> bool {
        matches!(self.outcome, RunOutcome::PolicyRejected)
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.outcome {
            RunOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Bookkeeping for one run, consulted when it fails.
struct RunState {
    state: PipelineState,
    ctx: Option<Arc<PipelineContext>>,
    lease: Option<WorkspaceLease>,
    staged: bool,
    output_written: bool,
}

impl RunState {
    fn new() -> Self {
        Self {
            state: PipelineState::Init,
            ctx: None,
            lease: None,
            staged: false,
            output_written: false,
        }
    }

    fn advance(&mut self, next: PipelineState) -> Result<()> {
        self.state = self.state.transition_to(next)?;
        debug!(state = %self.state, "Pipeline state changed");
        Ok(())
    }
}

/// Face transfer pipeline.
///
/// One `Pipeline` serves any number of runs; runs on distinct targets may
/// proceed concurrently, runs on the same target are refused while one is
/// in flight.
#[derive(Clone)]
pub struct Pipeline {
    defaults: PipelineDefaults,
    registry: ProcessorRegistry,
    workspaces: WorkspaceManager,
    content_filter: Option<Arc<dyn ContentFilter>>,
    release: Arc<dyn ResourceRelease>,
    status: StatusReporter,
    on_reject: Option<RejectHook>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("defaults", &self.defaults)
            .field("registry", &self.registry)
            .field("workspaces", &self.workspaces)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Pipeline with built-in processors, no content filter and status
    /// mirrored to `tracing`.
    pub fn new(media: Arc<dyn MediaTool>, defaults: PipelineDefaults) -> Self {
        let workspaces = WorkspaceManager::new(media).with_root(defaults.temp_root.clone());
        Self {
            defaults,
            registry: ProcessorRegistry::with_builtins(),
            workspaces,
            content_filter: None,
            release: Arc::new(NoopRelease),
            status: StatusReporter::new(),
            on_reject: None,
        }
    }

    pub fn with_registry(mut self, registry: ProcessorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_content_filter(mut self, filter: Arc<dyn ContentFilter>) -> Self {
        self.content_filter = Some(filter);
        self
    }

    pub fn with_resource_release(mut self, release: Arc<dyn ResourceRelease>) -> Self {
        self.release = release;
        self
    }

    pub fn with_status(mut self, status: StatusReporter) -> Self {
        self.status = status;
        self
    }

    pub fn with_reject_hook(mut self, hook: RejectHook) -> Self {
        self.on_reject = Some(hook);
        self
    }

    pub fn defaults(&self) -> &PipelineDefaults {
        &self.defaults
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Run one request to a terminal state.
    ///
    /// Never returns an error: failures are reported in the [`RunReport`]
    /// and on the status stream.
    pub async fn run(&self, request: PipelineRequest) -> RunReport {
        let started = Instant::now();
        let mut run = RunState::new();
        info!(
            source = %request.source.display(),
            target = %request.target.display(),
            "Starting pipeline run"
        );

        let outcome = match self.drive(&mut run, request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail(&mut run, &e).await;
                RunOutcome::Failed(e)
            }
        };
        drop(run.lease.take());

        let elapsed = started.elapsed();
        info!(
            state = %run.state,
            elapsed_secs = elapsed.as_secs_f64(),
            "Pipeline run finished"
        );
        RunReport {
            outcome,
            state: run.state,
            output_path: run.ctx.as_ref().map(|ctx| ctx.output_path.clone()),
            elapsed,
        }
    }

    async fn drive(&self, run: &mut RunState, request: PipelineRequest) -> Result<RunOutcome> {
        let ctx = Arc::new(PipelineContext::resolve(request, &self.defaults).await?);
        run.ctx = Some(Arc::clone(&ctx));
        let chain = FrameProcessorChain::resolve(&self.registry, &ctx.processor_names)?
            .with_release(Arc::clone(&self.release));

        let content_filter = match (&self.content_filter, ctx.content_filter) {
            (Some(filter), true) => Some(filter),
            (None, true) => {
                return Err(Error::config(
                    "content filtering was requested but no content filter is installed",
                ));
            }
            (_, false) => None,
        };

        run.advance(PipelineState::ContentCheck)?;
        let rejected = match content_filter {
            Some(filter) => filter.check(&ctx.target_path).await?,
            None => false,
        };
        if rejected {
            self.status
                .emit(PipelineState::ContentCheck, "Processing ignored!");
            if let Some(hook) = &self.on_reject {
                hook(&ctx.target_path);
            }
            run.advance(PipelineState::Failed)?;
            return Ok(RunOutcome::PolicyRejected);
        }

        run.advance(PipelineState::Stage)?;
        match ctx.target_kind {
            ArtifactKind::Image => self.run_image(run, &ctx, &chain).await?,
            ArtifactKind::Video => self.run_video(run, &ctx, &chain).await?,
        }

        run.advance(PipelineState::Finalize)?;
        verify_output(&ctx.output_path, ctx.target_kind).await?;
        self.status.emit(
            PipelineState::Finalize,
            format!("Processing to {} succeeded!", ctx.target_kind),
        );
        run.advance(PipelineState::Succeeded)?;
        Ok(RunOutcome::Succeeded)
    }

    async fn run_image(
        &self,
        run: &mut RunState,
        ctx: &PipelineContext,
        chain: &FrameProcessorChain,
    ) -> Result<()> {
        self.status
            .emit(PipelineState::Stage, "Processing image to image...");
        run.output_written = true;
        tokio::fs::copy(&ctx.target_path, &ctx.output_path)
            .await
            .map_err(|e| fs::io_error("copying", &ctx.target_path, e))?;

        run.advance(PipelineState::Process)?;
        chain.run_image(ctx, &self.status).await
    }

    async fn run_video(
        &self,
        run: &mut RunState,
        ctx: &PipelineContext,
        chain: &FrameProcessorChain,
    ) -> Result<()> {
        let target = ctx.target_path.as_path();
        self.status
            .emit(PipelineState::Stage, "Processing image to video...");

        run.lease = Some(self.workspaces.lease(target)?);
        self.status
            .emit(PipelineState::Stage, "Creating temp resources...");
        run.staged = true;
        self.workspaces.create(target).await?;

        self.status.emit(PipelineState::Stage, "Extracting frames...");
        let extracted = self.workspaces.extract_frames(target).await?;

        run.advance(PipelineState::Process)?;
        let frames = self.workspaces.list_frame_paths(target).await?;
        chain.run_video(ctx, &frames, &self.status).await?;

        let processed = self.workspaces.list_frame_paths(target).await?.len();
        if processed != extracted {
            return Err(Error::validation(format!(
                "frame count changed during processing: extracted {extracted}, found {processed}"
            )));
        }

        run.advance(PipelineState::Reassemble)?;
        let fps = self.choose_fps(ctx).await;
        self.status.emit(
            PipelineState::Reassemble,
            format!("Creating video with {fps} fps..."),
        );
        let settings = EncodeSettings {
            fps,
            encoder: ctx.video_encoder,
            quality: ctx.video_quality,
        };
        self.workspaces.reassemble(target, settings).await?;

        if ctx.keep_audio {
            self.status
                .emit(PipelineState::Reassemble, "Restoring audio...");
        }
        run.output_written = true;
        self.workspaces
            .move_or_merge_audio(target, &ctx.output_path, ctx.keep_audio)
            .await?;

        self.status
            .emit(PipelineState::Reassemble, "Cleaning temporary resources...");
        self.workspaces.cleanup(target, ctx.keep_frames).await;
        run.staged = false;
        Ok(())
    }

    async fn choose_fps(&self, ctx: &PipelineContext) -> f64 {
        if !ctx.keep_fps {
            return DEFAULT_FPS;
        }
        match self.workspaces.media().detect_fps(&ctx.target_path).await {
            Ok(fps) => {
                debug!(fps, "Detected target frame rate");
                fps
            }
            Err(e) => {
                warn!("Could not detect fps of {}, using {DEFAULT_FPS}: {e}", ctx.target_path.display());
                DEFAULT_FPS
            }
        }
    }

    /// Report the failure and undo what this run left behind.
    async fn fail(&self, run: &mut RunState, err: &Error) {
        error!(state = %run.state, kind = %err.kind(), "Pipeline run failed: {err}");

        let message = match &run.ctx {
            Some(ctx) => format!("Processing to {} failed!", ctx.target_kind),
            None => format!("Processing failed: {err}"),
        };
        self.status.emit(run.state, message);

        if let Some(ctx) = &run.ctx {
            if run.staged {
                self.workspaces
                    .cleanup(&ctx.target_path, ctx.keep_frames)
                    .await;
            }
            if run.output_written {
                if let Err(e) = fs::remove_file_if_exists(&ctx.output_path).await {
                    warn!("Failed to remove partial output: {e}");
                }
            }
        }

        if let Err(e) = run.advance(PipelineState::Failed) {
            // Already terminal; keep the recorded state.
            debug!("{e}");
        }
    }
}

/// Check the produced file exists and really is of `expected` kind.
async fn verify_output(output: &Path, expected: ArtifactKind) -> Result<()> {
    if !fs::exists(output).await {
        return Err(Error::validation(format!(
            "output {} was not produced",
            output.display()
        )));
    }
    if ArtifactKind::from_path(output) != Some(expected) {
        return Err(Error::validation(format!(
            "output {} does not have a {expected} extension",
            output.display()
        )));
    }
    match ArtifactKind::sniff(output).await? {
        Some(kind) if kind == expected => Ok(()),
        Some(kind) => Err(Error::validation(format!(
            "output {} is a {kind}, expected a {expected}",
            output.display()
        ))),
        None => Err(Error::validation(format!(
            "output {} is not a recognizable {expected}",
            output.display()
        ))),
    }
}
