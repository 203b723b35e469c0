//! cellsync - headless runner for the multi-view client engine.
//!
//! Usage: `cellsync [nickname]`. Connects every view that has a server in
//! `cellsync.toml`, spawns with `nickname` when one is given, and logs one
//! status line per view every second until Ctrl-C.

use std::time::Duration;

use client::{ClientHandle, Config, Runtime, ViewId};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("cellsync v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load("cellsync.toml")?;
    info!("Loaded configuration");
    info!("  Merge strategy: {:?}", config.sync.strategy);
    info!("  Camera policy: {:?}", config.camera.policy);
    let views: Vec<ViewId> = ViewId::ALL
        .into_iter()
        .filter(|&view| config.servers.url(view).is_some())
        .collect();
    for &view in &views {
        info!("  {}: {}", view, config.servers.url(view).unwrap_or_default());
    }

    let (runtime, handle) = Runtime::new(config);
    let runtime = tokio::spawn(runtime.run());

    for &view in &views {
        handle.create_view(view)?;
        handle.connect(view)?;
    }
    if let Some(name) = std::env::args().nth(1) {
        for &view in &views {
            handle.spawn(view, name.as_str())?;
        }
    }

    let mut status = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = status.tick() => log_status(&handle),
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    handle.shutdown()?;
    if let Err(e) = runtime.await? {
        warn!("runtime stopped with error: {}", e);
    }
    Ok(())
}

fn log_status(handle: &ClientHandle) {
    let frame = handle.frame();
    for view in &frame.views {
        let latency = view
            .latency
            .map(|rtt| format!("{}ms", rtt.as_millis()))
            .unwrap_or_else(|| "?".to_string());
        let leader = view
            .leaderboard
            .first()
            .map(|entry| entry.name.as_str())
            .unwrap_or("-");
        info!(
            "{} [{}] cells={} score={} latency={} camera=({:.0}, {:.0}) x{:.2} merging={:?} leader={}",
            view.id,
            view.connection,
            view.owned.len(),
            view.score,
            latency,
            view.camera.pos.x,
            view.camera.pos.y,
            view.camera.scale,
            view.camera.merging,
            leader,
        );
    }
    info!("{} cells on screen", frame.cells.len());
}
