//! End-to-end tests of the pipeline orchestrator.
//!
//! Video runs use a fake media tool that writes PNG-shaped frame files and
//! MP4-shaped containers, so the full state machine runs without ffmpeg.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use reface::{
    ContentFilter, EncodeSettings, Error, ErrorKind, FrameProcessor, MediaTool,
    MemoryStatusSink, Pipeline, PipelineContext, PipelineDefaults, PipelineOptions,
    PipelineRequest, PipelineState, ProcessorRegistry, RunOutcome, StatusReporter,
};

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const MP4_MAGIC: &[u8] = b"\0\0\0\x18ftypisom";
const AUDIO_MARKER: &[u8] = b"|AUDIO";

/// Media tool that fakes decode/encode with plain file writes.
struct FakeMedia {
    frames: usize,
    fps: Option<f64>,
    has_audio: bool,
    encodes: Mutex<Vec<EncodeSettings>>,
}

impl FakeMedia {
    fn new(frames: usize) -> Self {
        Self {
            frames,
            fps: Some(25.0),
            has_audio: true,
            encodes: Mutex::new(Vec::new()),
        }
    }

    fn last_encode(&self) -> Option<EncodeSettings> {
        self.encodes.lock().last().copied()
    }
}

#[async_trait]
impl MediaTool for FakeMedia {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn extract_frames(&self, _video: &Path, frames_dir: &Path) -> reface::Result<()> {
        for i in 1..=self.frames {
            let mut bytes = PNG_MAGIC.to_vec();
            bytes.extend_from_slice(format!("frame{i}").as_bytes());
            tokio::fs::write(frames_dir.join(format!("{i:08}.png")), bytes).await?;
        }
        Ok(())
    }

    async fn encode(
        &self,
        frames_dir: &Path,
        settings: EncodeSettings,
        output: &Path,
    ) -> reface::Result<()> {
        self.encodes.lock().push(settings);
        let mut names: Vec<PathBuf> = std::fs::read_dir(frames_dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|e| e == "png"))
            .collect();
        names.sort();

        let mut bytes = MP4_MAGIC.to_vec();
        for name in names {
            let frame = tokio::fs::read(&name).await?;
            bytes.extend_from_slice(frame.strip_prefix(PNG_MAGIC).unwrap_or(&frame));
            bytes.push(b';');
        }
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }

    async fn detect_fps(&self, _video: &Path) -> reface::Result<f64> {
        self.fps
            .ok_or_else(|| Error::Extraction("no video stream".into()))
    }

    async fn mux_audio(&self, silent: &Path, _audio: &Path, output: &Path) -> reface::Result<()> {
        if !self.has_audio {
            return Err(Error::Encoding("stream map '1:a:0' matches no streams".into()));
        }
        let mut bytes = tokio::fs::read(silent).await?;
        bytes.extend_from_slice(AUDIO_MARKER);
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }
}

type Journal = Arc<Mutex<Vec<String>>>;

/// Appends its name to every artifact it touches.
struct Append {
    name: &'static str,
    journal: Journal,
}

#[async_trait]
impl FrameProcessor for Append {
    fn name(&self) -> &str {
        self.name
    }

    async fn process_image(
        &self,
        _source: &Path,
        target: &Path,
        output: &Path,
        _ctx: &PipelineContext,
    ) -> reface::Result<()> {
        self.journal.lock().push(format!("{}:image", self.name));
        let mut bytes = tokio::fs::read(target).await?;
        bytes.extend_from_slice(self.name.as_bytes());
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }

    async fn process_video(
        &self,
        _source: &Path,
        frames: &[PathBuf],
        _ctx: &PipelineContext,
    ) -> reface::Result<()> {
        self.journal
            .lock()
            .push(format!("{}:video:{}", self.name, frames.len()));
        for frame in frames {
            let mut bytes = tokio::fs::read(frame).await?;
            bytes.extend_from_slice(self.name.as_bytes());
            tokio::fs::write(frame, bytes).await?;
        }
        Ok(())
    }

    fn release(&self) {
        self.journal.lock().push(format!("{}:release", self.name));
    }
}

/// Misbehaving processors.
enum Faulty {
    Fail,
    Corrupt,
    DropFrame,
}

#[async_trait]
impl FrameProcessor for Faulty {
    fn name(&self) -> &str {
        match self {
            Self::Fail => "fail",
            Self::Corrupt => "corrupt",
            Self::DropFrame => "drop_frame",
        }
    }

    async fn process_image(
        &self,
        _source: &Path,
        _target: &Path,
        output: &Path,
        _ctx: &PipelineContext,
    ) -> reface::Result<()> {
        match self {
            Self::Corrupt => {
                tokio::fs::write(output, b"definitely not an image").await?;
                Ok(())
            }
            _ => Err(Error::processor(self.name(), "no face detected")),
        }
    }

    async fn process_video(
        &self,
        _source: &Path,
        frames: &[PathBuf],
        _ctx: &PipelineContext,
    ) -> reface::Result<()> {
        match self {
            Self::DropFrame => {
                tokio::fs::remove_file(&frames[0]).await?;
                Ok(())
            }
            Self::Corrupt => {
                for frame in frames {
                    tokio::fs::write(frame, b"garbage").await?;
                }
                Ok(())
            }
            Self::Fail => Err(Error::processor(self.name(), "no face detected")),
        }
    }
}

/// Content filter with a fixed verdict that remembers whether it ran.
struct FixedFilter {
    reject: bool,
    called: AtomicBool,
}

impl FixedFilter {
    fn new(reject: bool) -> Self {
        Self {
            reject,
            called: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ContentFilter for FixedFilter {
    async fn check(&self, _path: &Path) -> reface::Result<bool> {
        self.called.store(true, Ordering::SeqCst);
        Ok(self.reject)
    }
}

struct Harness {
    dir: tempfile::TempDir,
    media: Arc<FakeMedia>,
    journal: Journal,
    status: Arc<MemoryStatusSink>,
    pipeline: Pipeline,
}

impl Harness {
    fn new(media: FakeMedia) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let media = Arc::new(media);
        let journal: Journal = Arc::default();
        let status = Arc::new(MemoryStatusSink::new());

        let mut registry = ProcessorRegistry::with_builtins();
        for name in ["a", "b"] {
            registry.register(Arc::new(Append {
                name,
                journal: Arc::clone(&journal),
            }));
        }
        registry.register(Arc::new(Faulty::Fail));
        registry.register(Arc::new(Faulty::Corrupt));
        registry.register(Arc::new(Faulty::DropFrame));

        let pipeline = Pipeline::new(media.clone(), PipelineDefaults::default())
            .with_registry(registry)
            .with_status(StatusReporter::silent().with_sink(status.clone()));

        Self {
            dir,
            media,
            journal,
            status,
            pipeline,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    async fn image_fixture(&self) -> (PathBuf, PathBuf) {
        let source = self.path("source.jpg");
        let target = self.path("target.png");
        tokio::fs::write(&source, [PNG_MAGIC, b"source"].concat()).await.unwrap();
        tokio::fs::write(&target, [PNG_MAGIC, b"target"].concat()).await.unwrap();
        (source, target)
    }

    async fn video_fixture(&self) -> (PathBuf, PathBuf) {
        let source = self.path("source.jpg");
        let target = self.path("clip.mp4");
        tokio::fs::write(&source, [PNG_MAGIC, b"source"].concat()).await.unwrap();
        tokio::fs::write(&target, [MP4_MAGIC, b"video"].concat()).await.unwrap();
        (source, target)
    }

    fn request(&self, source: &Path, target: &Path, chain: &[&str]) -> PipelineRequest {
        PipelineRequest::new(source, target)
            .with_output(self.path("out").join("result"))
            .with_options(PipelineOptions {
                frame_processors: Some(chain.iter().map(|s| s.to_string()).collect()),
                ..Default::default()
            })
    }

    fn workspace(&self, target: &Path) -> PathBuf {
        self.pipeline.workspaces().workspace_dir(target)
    }

    fn journal(&self) -> Vec<String> {
        self.journal.lock().clone()
    }
}

fn with_options(request: PipelineRequest, f: impl FnOnce(&mut PipelineOptions)) -> PipelineRequest {
    let mut options = request.options.clone();
    f(&mut options);
    request.with_options(options)
}

mod image_tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_chain_copies_target() {
        let h = Harness::new(FakeMedia::new(0));
        let (source, target) = h.image_fixture().await;

        let report = h.pipeline.run(h.request(&source, &target, &[])).await;

        assert!(report.succeeded(), "{:?}", report.error());
        assert_eq!(report.state, PipelineState::Succeeded);
        let output = report.output_path.unwrap();
        assert_eq!(output, h.path("out").join("result.png"));
        assert_eq!(
            tokio::fs::read(&output).await.unwrap(),
            tokio::fs::read(&target).await.unwrap()
        );
        assert_eq!(
            h.status.messages(),
            vec!["Processing image to image...", "Processing to image succeeded!"]
        );
    }

    #[tokio::test]
    async fn test_noop_chain_keeps_pixels() {
        let h = Harness::new(FakeMedia::new(0));
        let (source, target) = h.image_fixture().await;

        let report = h.pipeline.run(h.request(&source, &target, &["noop"])).await;

        assert!(report.succeeded());
        let output = report.output_path.unwrap();
        assert_eq!(
            tokio::fs::read(&output).await.unwrap(),
            tokio::fs::read(&target).await.unwrap()
        );
        let tagged: Vec<_> = h
            .status
            .events()
            .into_iter()
            .filter_map(|e| e.processor.map(|p| (p, e.message)))
            .collect();
        assert_eq!(tagged, [("noop".to_string(), "Processing...".to_string())]);
    }

    #[tokio::test]
    async fn test_chain_order_is_observable() {
        let h = Harness::new(FakeMedia::new(0));
        let (source, target) = h.image_fixture().await;

        let ab = h
            .pipeline
            .run(h.request(&source, &target, &["a", "b"]).with_output(h.path("ab.png")))
            .await;
        let ba = h
            .pipeline
            .run(h.request(&source, &target, &["b", "a"]).with_output(h.path("ba.png")))
            .await;

        assert!(ab.succeeded() && ba.succeeded());
        let ab = tokio::fs::read(h.path("ab.png")).await.unwrap();
        let ba = tokio::fs::read(h.path("ba.png")).await.unwrap();
        assert!(ab.ends_with(b"targetab"));
        assert!(ba.ends_with(b"targetba"));
        assert_eq!(
            h.journal(),
            [
                "a:image", "a:release", "b:image", "b:release", "b:image", "b:release", "a:image",
                "a:release"
            ]
        );
    }

    #[tokio::test]
    async fn test_wrong_kind_output_fails_validation() {
        let h = Harness::new(FakeMedia::new(0));
        let (source, target) = h.image_fixture().await;

        let report = h.pipeline.run(h.request(&source, &target, &["corrupt"])).await;

        assert!(!report.succeeded());
        assert_eq!(report.state, PipelineState::Failed);
        assert_eq!(report.error().map(Error::kind), Some(ErrorKind::Validation));
        assert!(!h.path("out").join("result.png").exists());
        assert_eq!(
            h.status.messages().last().map(String::as_str),
            Some("Processing to image failed!")
        );
    }

    #[tokio::test]
    async fn test_processor_failure_removes_output() {
        let h = Harness::new(FakeMedia::new(0));
        let (source, target) = h.image_fixture().await;

        let report = h.pipeline.run(h.request(&source, &target, &["a", "fail", "b"])).await;

        assert!(matches!(report.error(), Some(Error::Processor { .. })));
        assert!(!h.path("out").join("result.png").exists());
        assert_eq!(h.journal(), ["a:image", "a:release"]);
    }
}

mod config_tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_processor_fails_before_any_work() {
        let h = Harness::new(FakeMedia::new(3));
        let (source, target) = h.video_fixture().await;

        let report = h
            .pipeline
            .run(h.request(&source, &target, &["a", "face_swapper"]))
            .await;

        assert!(matches!(report.error(), Some(Error::UnknownProcessor(name)) if name == "face_swapper"));
        assert_eq!(report.error().map(Error::kind), Some(ErrorKind::Config));
        assert_eq!(report.state, PipelineState::Failed);
        assert!(h.journal().is_empty());
        assert!(!h.path("temp").exists());
        assert!(h.media.last_encode().is_none());
    }

    #[tokio::test]
    async fn test_missing_target_is_config_error() {
        let h = Harness::new(FakeMedia::new(3));
        let (source, _) = h.image_fixture().await;

        let report = h
            .pipeline
            .run(h.request(&source, &h.path("missing.png"), &[]))
            .await;

        assert_eq!(report.error().map(Error::kind), Some(ErrorKind::Config));
        assert!(report.output_path.is_none());
        assert!(h.status.messages()[0].starts_with("Processing failed:"));
    }

    #[tokio::test]
    async fn test_busy_workspace_is_refused() {
        let h = Harness::new(FakeMedia::new(3));
        let (source, target) = h.video_fixture().await;
        let _held = h.pipeline.workspaces().lease(&target).unwrap();

        let report = h.pipeline.run(h.request(&source, &target, &["a"])).await;

        assert!(matches!(report.error(), Some(Error::WorkspaceBusy(_))));
        assert!(h.journal().is_empty());
    }
}

mod content_filter_tests {
    use super::*;

    #[tokio::test]
    async fn test_rejected_target_halts_before_staging() {
        let h = Harness::new(FakeMedia::new(3));
        let (source, target) = h.video_fixture().await;
        let filter = Arc::new(FixedFilter::new(true));
        let rejected: Arc<Mutex<Option<PathBuf>>> = Arc::default();
        let seen = Arc::clone(&rejected);
        let pipeline = h
            .pipeline
            .clone()
            .with_content_filter(filter.clone())
            .with_reject_hook(Arc::new(move |path: &Path| {
                *seen.lock() = Some(path.to_path_buf());
            }));

        let request = with_options(h.request(&source, &target, &["a"]), |o| {
            o.content_filter = Some(true)
        });
        let report = pipeline.run(request).await;

        assert!(matches!(report.outcome, RunOutcome::PolicyRejected));
        assert!(report.is_policy_rejected());
        assert!(report.error().is_none());
        assert_eq!(report.state, PipelineState::Failed);
        assert!(!h.workspace(&target).exists());
        assert!(!h.path("temp").exists());
        assert!(!h.path("out").join("result.mp4").exists());
        assert!(h.journal().is_empty());
        assert_eq!(rejected.lock().as_deref(), Some(target.as_path()));
        assert_eq!(h.status.messages(), vec!["Processing ignored!"]);
    }

    #[tokio::test]
    async fn test_requested_filter_must_be_installed() {
        let h = Harness::new(FakeMedia::new(0));
        let (source, target) = h.image_fixture().await;
        let request = with_options(h.request(&source, &target, &["a"]), |o| {
            o.content_filter = Some(true)
        });

        let report = h.pipeline.run(request).await;

        assert!(!report.succeeded());
        assert!(!report.is_policy_rejected());
        assert!(matches!(report.error(), Some(Error::Config(_))));
        assert_eq!(report.state, PipelineState::Failed);
        assert!(h.journal().is_empty());
        assert!(!h.path("out").join("result.png").exists());
    }

    #[tokio::test]
    async fn test_disabled_filter_is_not_consulted() {
        let h = Harness::new(FakeMedia::new(0));
        let (source, target) = h.image_fixture().await;
        let filter = Arc::new(FixedFilter::new(true));
        let pipeline = h.pipeline.clone().with_content_filter(filter.clone());

        let report = pipeline.run(h.request(&source, &target, &[])).await;

        assert!(report.succeeded());
        assert!(!filter.called.load(Ordering::SeqCst));
    }
}

mod video_tests {
    use super::*;

    #[tokio::test]
    async fn test_keep_fps_and_audio() {
        let h = Harness::new(FakeMedia::new(10));
        let (source, target) = h.video_fixture().await;
        let request = with_options(h.request(&source, &target, &["a"]), |o| {
            o.keep_fps = Some(true);
            o.keep_audio = Some(true);
        });

        let report = h.pipeline.run(request).await;

        assert!(report.succeeded(), "{:?}", report.error());
        let output = report.output_path.unwrap();
        assert_eq!(output, h.path("out").join("result.mp4"));
        let bytes = tokio::fs::read(&output).await.unwrap();
        assert!(bytes.starts_with(MP4_MAGIC));
        assert!(bytes.ends_with(AUDIO_MARKER));
        let body = String::from_utf8_lossy(&bytes[MP4_MAGIC.len()..]);
        assert_eq!(body.matches("a;").count(), 10);
        assert!(body.starts_with("frame1a;frame2a;"));

        assert_eq!(h.media.last_encode().unwrap().fps, 25.0);
        assert_eq!(h.journal(), ["a:video:10", "a:release"]);
        assert!(!h.workspace(&target).exists());
        assert!(!h.path("temp").exists());

        assert_eq!(
            h.status.messages(),
            vec![
                "Processing image to video...",
                "Creating temp resources...",
                "Extracting frames...",
                "Processing...",
                "Creating video with 25 fps...",
                "Restoring audio...",
                "Cleaning temporary resources...",
                "Processing to video succeeded!",
            ]
        );
        let stages: Vec<PipelineState> = h.status.events().iter().map(|e| e.stage).collect();
        assert_eq!(stages.first(), Some(&PipelineState::Stage));
        assert_eq!(stages.last(), Some(&PipelineState::Finalize));
        let seqs: Vec<u64> = h.status.events().iter().map(|e| e.seq).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_default_fps_and_no_audio() {
        let h = Harness::new(FakeMedia::new(4));
        let (source, target) = h.video_fixture().await;
        let request = with_options(h.request(&source, &target, &["noop"]), |o| {
            o.keep_audio = Some(false);
        });

        let report = h.pipeline.run(request).await;

        assert!(report.succeeded());
        assert_eq!(h.media.last_encode().unwrap().fps, 30.0);
        let bytes = tokio::fs::read(report.output_path.unwrap()).await.unwrap();
        assert!(!bytes.ends_with(AUDIO_MARKER));
        assert!(!h.status.messages().iter().any(|m| m == "Restoring audio..."));
    }

    #[tokio::test]
    async fn test_undetectable_fps_falls_back() {
        let h = Harness::new(FakeMedia {
            fps: None,
            ..FakeMedia::new(2)
        });
        let (source, target) = h.video_fixture().await;
        let request = with_options(h.request(&source, &target, &[]), |o| o.keep_fps = Some(true));

        let report = h.pipeline.run(request).await;

        assert!(report.succeeded());
        assert_eq!(h.media.last_encode().unwrap().fps, 30.0);
    }

    #[tokio::test]
    async fn test_missing_audio_stream_keeps_silent_video() {
        let h = Harness::new(FakeMedia {
            has_audio: false,
            ..FakeMedia::new(2)
        });
        let (source, target) = h.video_fixture().await;

        let report = h.pipeline.run(h.request(&source, &target, &[])).await;

        assert!(report.succeeded());
        let bytes = tokio::fs::read(report.output_path.unwrap()).await.unwrap();
        assert!(bytes.starts_with(MP4_MAGIC));
        assert!(!bytes.ends_with(AUDIO_MARKER));
    }

    #[tokio::test]
    async fn test_encoder_settings_are_forwarded() {
        let h = Harness::new(FakeMedia::new(2));
        let (source, target) = h.video_fixture().await;
        let request = with_options(h.request(&source, &target, &[]), |o| {
            o.video_encoder = Some(reface::VideoEncoder::HevcNvenc);
            o.video_quality = Some(30);
        });

        assert!(h.pipeline.run(request).await.succeeded());
        let settings = h.media.last_encode().unwrap();
        assert_eq!(settings.encoder, reface::VideoEncoder::HevcNvenc);
        assert_eq!(settings.quality, 30);
    }

    #[tokio::test]
    async fn test_processor_failure_keeps_frames_when_asked() {
        let h = Harness::new(FakeMedia::new(5));
        let (source, target) = h.video_fixture().await;
        let request = with_options(h.request(&source, &target, &["a", "fail", "b"]), |o| {
            o.keep_frames = Some(true)
        });

        let report = h.pipeline.run(request).await;

        assert_eq!(report.error().map(Error::kind), Some(ErrorKind::Processor));
        assert_eq!(report.state, PipelineState::Failed);
        assert!(!h.path("out").join("result.mp4").exists());
        let frames = h.pipeline.workspaces().list_frame_paths(&target).await.unwrap();
        assert_eq!(frames.len(), 5);
        assert_eq!(h.journal(), ["a:video:5", "a:release"]);
        assert_eq!(
            h.status.messages().last().map(String::as_str),
            Some("Processing to video failed!")
        );
    }

    #[tokio::test]
    async fn test_processor_failure_cleans_workspace() {
        let h = Harness::new(FakeMedia::new(5));
        let (source, target) = h.video_fixture().await;

        let report = h.pipeline.run(h.request(&source, &target, &["fail"])).await;

        assert!(matches!(report.error(), Some(Error::Processor { .. })));
        assert!(!h.workspace(&target).exists());
        assert!(!h.path("out").join("result.mp4").exists());
    }

    #[tokio::test]
    async fn test_dropped_frame_fails_validation() {
        let h = Harness::new(FakeMedia::new(3));
        let (source, target) = h.video_fixture().await;

        let report = h.pipeline.run(h.request(&source, &target, &["drop_frame"])).await;

        assert_eq!(report.error().map(Error::kind), Some(ErrorKind::Validation));
        assert!(h.media.last_encode().is_none());
    }

    #[tokio::test]
    async fn test_zero_frames_is_extraction_error() {
        let h = Harness::new(FakeMedia::new(0));
        let (source, target) = h.video_fixture().await;

        let report = h.pipeline.run(h.request(&source, &target, &[])).await;

        assert_eq!(report.error().map(Error::kind), Some(ErrorKind::Extraction));
        assert!(!h.workspace(&target).exists());
    }

    #[tokio::test]
    async fn test_rerun_after_kept_frames_reuses_workspace() {
        let h = Harness::new(FakeMedia::new(3));
        let (source, target) = h.video_fixture().await;
        let keep = |o: &mut PipelineOptions| o.keep_frames = Some(true);

        let first = h.pipeline.run(with_options(h.request(&source, &target, &[]), keep)).await;
        let second = h.pipeline.run(with_options(h.request(&source, &target, &[]), keep)).await;

        assert!(first.succeeded() && second.succeeded());
        let frames = h.pipeline.workspaces().list_frame_paths(&target).await.unwrap();
        assert_eq!(frames.len(), 3);
    }

    #[tokio::test]
    async fn test_kept_frames_from_longer_video_are_discarded() {
        let h = Harness::new(FakeMedia::new(8));
        let (source, target) = h.video_fixture().await;
        let keep = |o: &mut PipelineOptions| o.keep_frames = Some(true);
        let first = h.pipeline.run(with_options(h.request(&source, &target, &["a"]), keep)).await;
        assert!(first.succeeded());

        let shorter = Pipeline::new(Arc::new(FakeMedia::new(3)), PipelineDefaults::default())
            .with_status(StatusReporter::silent());
        let second = shorter
            .run(h.request(&source, &target, &["noop"]).with_output(h.path("short.mp4")))
            .await;

        assert!(second.succeeded(), "{:?}", second.error());
        let bytes = tokio::fs::read(h.path("short.mp4")).await.unwrap();
        let body = String::from_utf8_lossy(&bytes[MP4_MAGIC.len()..]);
        assert!(body.starts_with("frame1;frame2;frame3;"));
        assert!(!body.contains("a;"));
        assert!(!h.workspace(&target).exists());
    }

    #[tokio::test]
    async fn test_distinct_targets_run_concurrently() {
        let h = Harness::new(FakeMedia::new(3));
        let (source, target) = h.video_fixture().await;
        let other = h.path("other.mp4");
        tokio::fs::copy(&target, &other).await.unwrap();

        let (a, b) = tokio::join!(
            h.pipeline
                .run(h.request(&source, &target, &["a"]).with_output(h.path("one.mp4"))),
            h.pipeline
                .run(h.request(&source, &other, &["b"]).with_output(h.path("two.mp4"))),
        );

        assert!(a.succeeded(), "{:?}", a.error());
        assert!(b.succeeded(), "{:?}", b.error());
    }
}

mod ffmpeg_tests {
    use super::*;
    use reface::FfmpegTool;

    async fn ffmpeg(args: &[&str]) {
        let status = tokio::process::Command::new("ffmpeg")
            .args(args)
            .status()
            .await
            .unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe on PATH"]
    async fn test_real_video_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("face.png");
        let target = dir.path().join("clip.mp4");
        let output = dir.path().join("out.mp4");
        ffmpeg(&[
            "-v", "error", "-f", "lavfi", "-i", "testsrc=size=64x64:duration=1:rate=1",
            "-frames:v", "1", "-y", source.to_str().unwrap(),
        ])
        .await;
        ffmpeg(&[
            "-v", "error", "-f", "lavfi", "-i", "testsrc=size=64x64:duration=0.4:rate=25",
            "-f", "lavfi", "-i", "sine=duration=0.4", "-shortest", "-y",
            target.to_str().unwrap(),
        ])
        .await;

        let media = Arc::new(FfmpegTool::new());
        let pipeline = Pipeline::new(media.clone(), PipelineDefaults::default());
        let request = PipelineRequest::new(&source, &target)
            .with_output(&output)
            .with_options(PipelineOptions {
                frame_processors: Some(vec!["noop".into()]),
                keep_fps: Some(true),
                ..Default::default()
            });

        let report = pipeline.run(request).await;

        assert!(report.succeeded(), "{:?}", report.error());
        let fps = media.detect_fps(&output).await.unwrap();
        assert!((fps - 25.0).abs() < 0.01);
        assert!(!dir.path().join("temp").exists());
    }
}
