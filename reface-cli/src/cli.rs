use clap::{Parser, Subcommand};
use reface::{PipelineOptions, VideoEncoder};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "reface",
    version,
    about = "Transfer a face from a source image onto a target image or video"
)]
pub struct Args {
    /// Configuration file (defaults to <config dir>/reface/config.toml)
    #[arg(short, long, global = true, env = "REFACE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process one source/target pair
    Run(RunArgs),

    /// List the available frame processors
    Processors {
        /// Print the list as a JSON array
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Image containing the face to transfer
    #[arg(short, long)]
    pub source: PathBuf,

    /// Image or video to transfer the face onto
    #[arg(short, long)]
    pub target: PathBuf,

    /// Output file or directory (defaults to the target's directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Frame processor to run; repeat to build a chain, order matters
    #[arg(short, long = "processor", value_name = "NAME")]
    pub processors: Vec<String>,

    /// Keep the target's frame rate
    #[arg(long)]
    pub keep_fps: bool,

    /// Drop the target's audio track
    #[arg(long)]
    pub no_audio: bool,

    /// Keep extracted frames after the run
    #[arg(long)]
    pub keep_frames: bool,

    /// Process every face instead of the most prominent one
    #[arg(long)]
    pub many_faces: bool,

    /// Screen the target with the configured content filter
    #[arg(long)]
    pub content_filter: bool,

    /// Encoder used to reassemble videos
    #[arg(long, value_name = "ENCODER", value_parser = parse_encoder)]
    pub video_encoder: Option<VideoEncoder>,

    /// Encoder quality, 0 (best) to 51
    #[arg(long, value_name = "Q", value_parser = clap::value_parser!(u8).range(0..=51))]
    pub video_quality: Option<u8>,

    /// Memory budget in bytes handed to processors
    #[arg(long, value_name = "BYTES")]
    pub max_memory: Option<u64>,

    /// Worker count for per-frame processing
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..=1024))]
    pub execution_threads: Option<u64>,

    /// Print status events and the result as JSON lines on stdout
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Options set on the command line. Unset flags stay `None` so config
    /// and environment defaults apply.
    pub fn options(&self) -> PipelineOptions {
        PipelineOptions {
            frame_processors: (!self.processors.is_empty()).then(|| self.processors.clone()),
            keep_fps: self.keep_fps.then_some(true),
            keep_audio: self.no_audio.then_some(false),
            keep_frames: self.keep_frames.then_some(true),
            many_faces: self.many_faces.then_some(true),
            content_filter: self.content_filter.then_some(true),
            video_encoder: self.video_encoder,
            video_quality: self.video_quality,
            max_memory: self.max_memory,
            execution_threads: self.execution_threads.map(|n| n as usize),
        }
    }
}

fn parse_encoder(value: &str) -> Result<VideoEncoder, String> {
    value.parse().map_err(|_| {
        format!("unknown encoder '{value}' (expected libx264, libx265, libvpx-vp9, h264_nvenc or hevc_nvenc)")
    })
}
