//! fusiond - motion-fusion detection loop
//!
//! This daemon:
//! 1. Resolves configuration (file, environment, command line)
//! 2. Opens the capture source and loads the detector backend
//! 3. Runs capture -> motion -> detect -> composite -> present, one frame at a time
//! 4. Reads `q` (quit) and `s` (snapshot) from stdin; Ctrl-C also quits

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use motion_fusion::{CaptureSource, ConsoleDisplay, FusionConfig, Pipeline};

#[derive(Parser, Debug)]
#[command(author, version, about = "Motion-aware object detection loop")]
struct Args {
    /// TOML config file.
    #[arg(long, env = "FUSION_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Capture source: stub://static, stub://moving, an image directory, or a device node.
    #[arg(long)]
    source: Option<String>,

    /// Detector model path, or "stub".
    #[arg(long)]
    model: Option<String>,

    /// Stop after this many frames.
    #[arg(long, value_name = "N")]
    max_frames: Option<u64>,

    /// Directory for `s` snapshots.
    #[arg(long, value_name = "DIR")]
    snapshot_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = FusionConfig::load_from(args.config.as_deref())?;
    if let Some(source) = args.source {
        cfg.capture.source = source;
    }
    if let Some(model) = args.model {
        cfg.model = model;
    }
    if let Some(dir) = args.snapshot_dir {
        cfg.snapshot_dir = dir;
    }
    cfg.validate()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_handler.store(true, Ordering::SeqCst);
    })
    .context("install Ctrl-C handler")?;

    let mut pipeline = Pipeline::from_config(&cfg)?;
    let mut source = CaptureSource::open(&cfg.capture_config())?;
    let mut display = ConsoleDisplay::with_stdin(cfg.preview_path.clone())?;
    if let Some(path) = &cfg.preview_path {
        log::info!("preview frames written to {}", path.display());
    }

    log::info!(
        "fusiond running: model={} snapshots={} (q = quit, s = snapshot)",
        cfg.model,
        cfg.snapshot_dir.display()
    );
    let summary = pipeline.run(&mut source, &mut display, &shutdown, args.max_frames);
    for path in &summary.snapshots {
        log::info!("snapshot: {}", path.display());
    }
    log::info!("fusiond exiting");
    Ok(())
}
