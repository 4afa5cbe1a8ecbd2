//! status_api - standalone run-flag service
//!
//! Serves `GET /`, `POST /start`, `POST /stop` and `GET /status` until Ctrl-C.
//! The flag is not connected to a running `fusiond`.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use motion_fusion::{FusionConfig, RunState, StatusConfig, StatusServer};

#[derive(Parser, Debug)]
#[command(author, version, about = "Detection status toggle service")]
struct Args {
    /// TOML config file.
    #[arg(long, env = "FUSION_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Listen address, overrides `[status].addr`.
    #[arg(long, value_name = "HOST:PORT")]
    addr: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = FusionConfig::load_from(args.config.as_deref())?;
    let status_config = StatusConfig {
        addr: args.addr.unwrap_or(cfg.status_addr),
    };
    let handle = StatusServer::new(status_config, RunState::default()).spawn()?;
    log::info!("status api listening on {}", handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    rx.recv()
        .map_err(|_| anyhow!("failed to wait for shutdown signal"))?;
    log::info!("status api shutting down");
    handle.stop()?;
    Ok(())
}
