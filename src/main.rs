//! posepipe - Pose landmark capture and skeleton retargeting
//!
//! Main entry point for the CLI application.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use posepipe::{
    capture::{run_capture, CaptureStats, FrameRecorder},
    config::{CapturePreset, Config},
    output::CsvExporter,
    retarget::{retarget_session, RetargetMode},
    tracking::{landmark::HAND_LANDMARKS, DatagramSender, DetectionSource, ExtractorProcess},
    SessionDocument,
};

/// posepipe - Pose landmark capture and skeleton retargeting
#[derive(Parser, Debug)]
#[command(name = "posepipe", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record landmarks from a camera or video file into a session JSON
    Capture {
        /// Camera index or video file path
        #[arg(short, long, default_value = "0")]
        source: String,

        /// Session JSON output path
        #[arg(short, long)]
        output: PathBuf,

        /// Also stream body landmarks over UDP
        #[arg(long)]
        stream: bool,

        /// Drop low-visibility points and sparse frames (filtered preset)
        #[arg(long)]
        filtered: bool,

        /// Sender address (overrides config)
        #[arg(long)]
        address: Option<String>,

        /// Sender port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Extra arguments passed to the extractor
        #[arg(last = true)]
        extractor_args: Vec<String>,
    },

    /// Retarget a session onto the rig as a keyframe clip
    Retarget {
        /// Session JSON input path
        #[arg(short, long)]
        input: PathBuf,

        /// Clip JSON output path
        #[arg(short, long)]
        output: PathBuf,

        /// Key marker locations instead of bone rotations
        #[arg(long)]
        markers: bool,

        /// Use the subject's pose in this session frame as the rest armature
        #[arg(long, value_name = "FRAME")]
        rest_frame: Option<u32>,
    },

    /// Export a session as a flat CSV table
    ExportCsv {
        /// Session JSON input path
        #[arg(short, long)]
        input: PathBuf,

        /// CSV output path
        #[arg(short, long)]
        output: PathBuf,

        /// Add a <part>_Valid column per part
        #[arg(long)]
        presence: bool,
    },

    /// Print a session summary
    Inspect {
        /// Session JSON input path
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", posepipe::NAME, posepipe::VERSION);

    let mut config = if let Some(ref path) = args.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    match args.command {
        Command::Capture {
            source,
            output,
            stream,
            filtered,
            address,
            port,
            extractor_args,
        } => {
            if stream {
                config.sender.enabled = true;
            }
            if filtered {
                config.capture.preset = CapturePreset::Filtered;
            }
            if let Some(address) = address {
                config.sender.address = address;
            }
            if let Some(port) = port {
                config.sender.port = port;
            }
            config.capture.extractor.args.extend(extractor_args);
            config.validate()?;

            run_capture_command(config, source, output)
        }
        Command::Retarget {
            input,
            output,
            markers,
            rest_frame,
        } => {
            if rest_frame.is_some() {
                config.retarget.armature_from_frame = rest_frame;
            }
            config.validate()?;
            let doc = SessionDocument::load(&input)?;
            let mode = if markers {
                RetargetMode::Markers
            } else {
                RetargetMode::Rotations
            };
            let clip = retarget_session(&doc, &config.retarget, mode)?;
            clip.save(&output)?;
            info!(
                "Wrote {} keys (frames {}..={}) to {}",
                clip.key_count(),
                clip.frame_start,
                clip.frame_end,
                output.display()
            );
            Ok(())
        }
        Command::ExportCsv {
            input,
            output,
            presence,
        } => {
            if presence {
                config.export.include_presence = true;
            }
            config.validate()?;
            let doc = SessionDocument::load(&input)?;
            CsvExporter::new(&config.export)?.save(&doc, &output)?;
            Ok(())
        }
        Command::Inspect { input } => {
            let doc = SessionDocument::load(&input)?;
            print_summary(&doc);
            Ok(())
        }
    }
}

/// Run the extractor on a blocking task until the source ends or Ctrl+C.
fn run_capture_command(config: Config, source: String, output: PathBuf) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let stop = Arc::new(AtomicBool::new(false));

    let signal_stop = Arc::clone(&stop);
    runtime.spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal_stop.store(true, Ordering::Relaxed);
            }
            Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
        }
    });

    let capture_stop = Arc::clone(&stop);
    let (doc, stats) = runtime.block_on(async move {
        tokio::task::spawn_blocking(move || capture_session(&config, &source, &capture_stop))
            .await
            .context("Capture task panicked")?
    })?;

    doc.save(&output)?;
    if let Some(reason) = stats.source_error {
        anyhow::bail!(
            "extractor failed mid-stream, kept {} frames in {}: {}",
            doc.frames.len(),
            output.display(),
            reason
        );
    }
    info!("posepipe capture stopped");
    Ok(())
}

fn capture_session(
    config: &Config,
    source: &str,
    stop: &AtomicBool,
) -> anyhow::Result<(SessionDocument, CaptureStats)> {
    let mut extractor = ExtractorProcess::spawn(&config.capture.extractor, source)?;

    let info = extractor.source_info().clone();
    if info.fps <= 0.0 {
        warn!("Source reported no frame rate, using default");
    }
    info!(
        "Source opened: {}x{} @ {:.2} fps",
        info.width, info.height, info.fps
    );

    let mut recorder = FrameRecorder::new(
        &config.capture.body_landmarks(),
        &HAND_LANDMARKS.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        config.capture.policy(),
        info,
    )?;

    let mut sender = if config.sender.enabled {
        Some(DatagramSender::new(&config.sender)?)
    } else {
        None
    };

    let stats = run_capture(
        &mut extractor,
        &mut recorder,
        sender.as_mut(),
        stop,
        config.capture.progress_interval,
    );

    if let Some(sender) = &sender {
        info!(
            "Sent {} datagrams to {} ({} failed)",
            sender.sent(),
            sender.target(),
            sender.failures()
        );
    }
    if stats.interrupted || stats.source_error.is_some() {
        info!("Saving partial session");
    }

    extractor.stop();
    Ok((recorder.finish(), stats))
}

fn print_summary(doc: &SessionDocument) {
    let meta = &doc.metadata;
    println!("Session summary:\n");
    println!("  fps:              {}", meta.fps);
    println!("  resolution:       {}x{}", meta.width, meta.height);
    println!(
        "  frames:           {} retained of {} processed",
        meta.total_frames, meta.processed_frames
    );
    println!("  duration:         {:.2}s", meta.duration);
    println!("  timestamp origin: {:?}", meta.timestamp_origin);
    if let Some((first, last)) = doc.frame_range() {
        println!("  frame range:      {}..={}", first, last);
    }
    println!("  body landmarks:   {}", meta.body_landmarks.join(", "));
    println!("  hand landmarks:   {} per hand", meta.hand_count_per_hand);

    println!("\nBody landmark coverage:\n");
    for name in &meta.body_landmarks {
        let present = doc
            .frames
            .iter()
            .filter(|f| f.body.get(name).is_some())
            .count();
        println!("  {:<16} {:>6} / {}", name, present, doc.frames.len());
    }

    let left = doc.frames.iter().filter(|f| f.left_hand.present_count() > 0).count();
    let right = doc.frames.iter().filter(|f| f.right_hand.present_count() > 0).count();
    println!("\n  left hand frames:  {}", left);
    println!("  right hand frames: {}", right);
}
