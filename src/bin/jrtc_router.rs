// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Thin process wrapper around `RouterHandle`, standing in for the REST
// control-plane's one in-scope surface: process-level start/stop. Does not
// parse or watch `--config` itself — that loader is an external
// collaborator — it only demonstrates the init/start/stop wiring around a
// config path argument.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use jrtc_router::config::Config;
use jrtc_router::io::DefaultIo;
use jrtc_router::RouterHandle;

#[derive(Parser)]
#[command(name = "jrtc_router", about = "In-process stream router smoke-test harness")]
struct Args {
    /// Path to a router config file. Not parsed here; the loader that
    /// produces a `Config` from this path is out of scope for this crate.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Some(path) = &args.config {
        log::info!("config path {} given; this binary does not parse it, using defaults", path.display());
    }
    let cfg = Config::default();

    let io: Arc<dyn jrtc_router::io::Io> = Arc::new(DefaultIo::new(1024));
    let mut router = RouterHandle::init(io);

    if let Err(e) = router.start(&cfg.router) {
        log::error!("failed to start router: {e}");
        std::process::exit(1);
    }
    log::info!("router started, press Enter to stop");

    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);

    log::info!("stopping router");
    if let Err(e) = router.stop() {
        log::error!("router did not stop cleanly: {e}");
        std::process::exit(1);
    }
}
