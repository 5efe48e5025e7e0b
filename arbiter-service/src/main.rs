// SPDX-License-Identifier: GPL-3.0-only

//! diskarbiterd - mount arbitration daemon
//!
//! Tracks the host's disks, serves mount/unmount/eject/attach requests over
//! a peer-to-peer D-Bus socket and optionally intercepts every system-wide
//! mount to block it or force it read-only.

use std::sync::Arc;

use anyhow::{Context, Result};
use arbiter_contracts::ArbitrationPlatform;
use arbiter_sys::Hdiutil;
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::{EnvFilter, fmt};

mod adapters;
mod bridge;
mod config;
mod error;
mod events;
mod frontend;
mod handlers;
mod policies;
mod registry;
mod server;
mod service;
mod state;
#[cfg(test)]
mod testing;

use config::Config;
use events::EventAdapter;
use frontend::ArbiterFrontend;
use policies::ArbitrationEngine;
use server::Server;
use state::SharedState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting diskarbiterd v{}", env!("CARGO_PKG_VERSION"));

    if unsafe { libc::geteuid() } != 0 {
        tracing::error!("diskarbiterd must run as root");
        anyhow::bail!("Service must run with root privileges");
    }

    let platform = adapters::default_platform()?;
    let state = SharedState::new();
    let engine = ArbitrationEngine::new(state.clone(), platform.clone());
    let frontend = Arc::new(ArbiterFrontend::new(
        state.clone(),
        platform.clone(),
        engine,
        Arc::new(Hdiutil::new(config.hdiutil.clone())),
    ));

    platform
        .start(Arc::new(EventAdapter::new(state)))
        .context("Failed to start disk arbitration")?;
    tracing::info!("Disk event monitoring enabled");

    let server = match Server::bind(&config.socket, frontend.clone()) {
        Ok(server) => server,
        Err(e) => {
            stop_platform(platform).await;
            return Err(e);
        }
    };

    tracing::info!("Service ready, waiting for requests...");
    let served = server.run(shutdown_signal()).await;

    let teardown = frontend.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || teardown.shutdown()).await {
        tracing::error!("Arbitration shutdown failed: {e}");
    }
    stop_platform(platform).await;

    tracing::info!("diskarbiterd shutting down");
    served
}

async fn stop_platform(platform: Arc<dyn ArbitrationPlatform>) {
    if let Err(e) = tokio::task::spawn_blocking(move || platform.stop()).await {
        tracing::error!("Failed to stop disk arbitration: {e}");
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            tracing::warn!("Unable to listen for SIGTERM: {e}");
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received shutdown signal");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
    tracing::info!("Received shutdown signal");
}
