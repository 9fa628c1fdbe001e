//! RTSP capture consumer
//!
//! Opens a stream, pulls frame pairs off the capture queue and optionally
//! dumps them as PNG snapshots.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use rtsp_capture::capture::synthetic::{self, SyntheticBackend};
use rtsp_capture::capture::{CaptureEvent, MediaBackend};
use rtsp_capture::utils::redact_locator;
use rtsp_capture::{CaptureConfig, CaptureError, Config, FramePair, RtspCapture};

#[derive(Debug, Parser)]
#[command(version, about = "Capture frames from an RTSP stream")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stream locator, overrides `capture.url`
    url: Option<String>,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    frames: Option<u64>,

    /// Wait for each frame announcement before taking the frame
    #[arg(long)]
    step: bool,

    /// Write dequeued frames as PNG files into this directory
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Dump only every Nth frame
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    dump_every: u64,
}

#[derive(Debug, Clone)]
struct ConsumerOptions {
    frames: Option<u64>,
    step: bool,
    dump_dir: Option<PathBuf>,
    dump_every: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(url) = args.url {
        config.capture.url = url;
    }
    init_logging(&config.logging.filter);

    config.capture.validate()?;
    info!("rtsp-capture {} launching", env!("CARGO_PKG_VERSION"));
    info!("source: {}", redact_locator(&config.capture.url));

    if let Some(dir) = &args.dump_dir {
        std::fs::create_dir_all(dir)
            .wrap_err_with(|| format!("failed to create {}", dir.display()))?;
    }

    let options = ConsumerOptions {
        frames: args.frames,
        step: args.step,
        dump_dir: args.dump_dir,
        dump_every: args.dump_every,
    };

    if config.capture.url.starts_with(synthetic::SCHEME) {
        run::<SyntheticBackend>(config.capture, options).await
    } else {
        run_network(config.capture, options).await
    }
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer().with_timer(tracing_subscriber::fmt::time::uptime()),
    );

    #[cfg(feature = "profiling")]
    let registry = registry.with(tracing_tracy::TracyLayer::default());

    registry.init();
}

#[cfg(feature = "ffmpeg")]
async fn run_network(config: CaptureConfig, options: ConsumerOptions) -> Result<()> {
    run::<rtsp_capture::capture::FfmpegBackend>(config, options).await
}

#[cfg(not(feature = "ffmpeg"))]
async fn run_network(config: CaptureConfig, _options: ConsumerOptions) -> Result<()> {
    Err(color_eyre::eyre::eyre!(
        "{} needs a build with the `ffmpeg` feature",
        redact_locator(&config.url)
    ))
}

async fn run<B: MediaBackend>(config: CaptureConfig, options: ConsumerOptions) -> Result<()> {
    let mut capture = RtspCapture::<B>::new(config)?;
    let shutdown = capture.shutdown_handle();

    let mut consumer = tokio::task::spawn_blocking(move || consume(&mut capture, &options));

    let received = tokio::select! {
        result = &mut consumer => result??,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            shutdown.shutdown();
            consumer.await??
        }
    };

    info!("received {} frames", received);
    Ok(())
}

fn consume<B: MediaBackend>(
    capture: &mut RtspCapture<B>,
    options: &ConsumerOptions,
) -> Result<u64> {
    capture.initialize()?;
    let events = capture.events();
    capture.start_capture()?;

    let mut received = 0u64;
    while options.frames.map_or(true, |limit| received < limit) {
        if options.step {
            match capture.next_frame() {
                Ok(()) => {}
                Err(CaptureError::Closed) => break,
                Err(e) => return Err(e.into()),
            }
        }

        let pair = match capture.get_frame() {
            Ok(pair) => pair,
            Err(CaptureError::Closed) => break,
            Err(e) => return Err(e.into()),
        };

        for event in events.try_iter() {
            match event {
                CaptureEvent::NewFrame(notice) => debug!(timestamp = notice.timestamp, "new frame"),
                CaptureEvent::Statistics(stats) => debug!("statistics: {:?}", stats.values()),
            }
        }

        if let Some(dir) = &options.dump_dir {
            if received % options.dump_every == 0 {
                dump(dir, received, &pair)?;
            }
        }
        received += 1;
    }

    capture.stop_capture();
    Ok(received)
}

fn dump(dir: &std::path::Path, index: u64, pair: &FramePair) -> Result<()> {
    let Some(image) = pair.left.rgb.to_image() else {
        warn!(index, "frame buffer does not match its size, not dumped");
        return Ok(());
    };
    let path = dir.join(format!("frame_{index:06}_{}.png", pair.left_timestamp));
    image
        .save(&path)
        .wrap_err_with(|| format!("failed to write {}", path.display()))?;
    debug!(path = %path.display(), "frame dumped");
    Ok(())
}
