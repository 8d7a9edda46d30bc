use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use ffmpeg_es::{
    CaptureSource, Codec, EncodeTask, EncoderConfig, FrameSource, PipelineController, TestPattern,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// Synthetic solid-colour frames.
    Test,
    /// A capture device or media file opened through libavformat.
    Capture,
}

#[derive(Parser, Debug)]
#[command(name = "camcode", version, about = "Encode camera frames into an elementary video stream")]
struct Args {
    /// Encoder settings as JSON. Missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short, long, default_value = "test.mpg")]
    output: PathBuf,

    /// Number of frames to encode.
    #[arg(short = 'n', long, default_value_t = 250)]
    frames: u64,

    #[arg(long, value_enum, default_value_t = SourceKind::Test)]
    source: SourceKind,

    /// Capture device or file, e.g. /dev/video0.
    #[arg(long, default_value = "/dev/video0")]
    device: String,

    /// Input format for the capture source, e.g. v4l2.
    #[arg(long)]
    format: Option<String>,

    /// Codec override (mpeg1video, h264, or any encoder name).
    #[arg(long)]
    codec: Option<Codec>,

    /// Test pattern width; defaults to the encoder width.
    #[arg(long)]
    width: Option<u32>,

    /// Test pattern height; defaults to the encoder height.
    #[arg(long)]
    height: Option<u32>,
}

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("ffmpeg_next", log::LevelFilter::Warn)
        .filter_module("ffmpeg_es", log::LevelFilter::Info)
        .filter_module("camcode", log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<EncoderConfig> {
    let mut config = match &args.config {
        Some(path) => EncoderConfig::from_json_file(path)
            .with_context(|| format!("loading encoder config {}", path.display()))?,
        None => EncoderConfig::default(),
    };
    if let Some(codec) = &args.codec {
        config = config.with_codec(codec.clone());
    }
    config.validate().context("encoder config")?;
    Ok(config)
}

fn open_source(
    kind: SourceKind,
    device: String,
    format: Option<String>,
    width: u32,
    height: u32,
) -> ffmpeg_es::Result<Box<dyn FrameSource>> {
    match kind {
        SourceKind::Test => Ok(Box::new(TestPattern::new(width, height))),
        SourceKind::Capture => {
            let source = CaptureSource::open(&device, format.as_deref(), None)?;
            Ok(Box::new(source))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    ffmpeg_es::init().context("ffmpeg init")?;

    let controller = PipelineController::new(load_config(&args)?, args.frames);
    let config = controller.config();
    log::info!(
        "encoding {} frames of {}x{} {} at {} bit/s into {}",
        controller.frame_count(),
        config.width,
        config.height,
        config.codec,
        config.bitrate,
        args.output.display()
    );

    let (kind, device, format) = (args.source, args.device.clone(), args.format.clone());
    let width = args.width.unwrap_or(config.width);
    let height = args.height.unwrap_or(config.height);

    let task = EncodeTask::new();
    let cancel = task.get_cancel();
    let mut handle = task.start(
        controller,
        move || open_source(kind, device, format, width, height),
        args.output.clone(),
    );

    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = tokio::signal::ctrl_c() => {
            log::info!("interrupt received, finishing stream");
            cancel.cancel();
            handle.await
        }
    };
    let summary = joined
        .context("encode worker panicked")?
        .with_context(|| format!("encoding into {}", args.output.display()))?;

    println!(
        "{}: {} frames, {} packets, {} bytes{}",
        args.output.display(),
        summary.frames_encoded,
        summary.packets_written,
        summary.bytes_written,
        if summary.cancelled { " (interrupted)" } else { "" }
    );
    Ok(())
}
