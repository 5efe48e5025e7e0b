// SPDX-License-Identifier: GPL-3.0-only

//! Peer-to-peer D-Bus server on a Unix socket
//!
//! Each accepted client gets its own server connection exporting the same
//! interfaces, all backed by one shared front end.

use std::future::Future;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arbiter_contracts::protocol::names::{ARBITRATION_PATH, DISKS_PATH, IMAGE_PATH, ROOT_PATH};
use futures_util::StreamExt;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zbus::connection::Builder as ConnectionBuilder;
use zbus::{Connection, Guid, MessageStream};

use crate::frontend::ArbiterFrontend;
use crate::handlers::{ArbitrationHandler, DisksHandler, ImageHandler};
use crate::service::ArbiterService;

pub struct Server {
    listener: UnixListener,
    socket: PathBuf,
    frontend: Arc<ArbiterFrontend>,
}

impl Server {
    /// Bind the listening socket, creating its directory and replacing a
    /// stale socket file left by a previous run.
    pub fn bind(socket: &Path, frontend: Arc<ArbiterFrontend>) -> Result<Self> {
        if let Some(dir) = socket.parent() {
            std::fs::DirBuilder::new()
                .recursive(true)
                .mode(0o755)
                .create(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        remove_socket(socket)?;

        let listener = UnixListener::bind(socket)
            .with_context(|| format!("Failed to bind {}", socket.display()))?;
        info!("Listening on {}", socket.display());

        Ok(Self {
            listener,
            socket: socket.to_path_buf(),
            frontend,
        })
    }

    /// Accept clients until `shutdown` resolves, then remove the socket file.
    ///
    /// Connections already established keep being served by their own tasks.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        tokio::spawn(handle_client(stream, self.frontend.clone()));
                    }
                    Err(e) => warn!("Failed to accept connection: {e}"),
                },
            }
        }

        info!("No longer accepting connections");
        remove_socket(&self.socket)
    }
}

fn remove_socket(socket: &Path) -> Result<()> {
    match std::fs::remove_file(socket) {
        Ok(()) => {
            debug!("Removed socket file {}", socket.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", socket.display())),
    }
}

/// Build the server side of a peer connection exporting every interface.
pub async fn serve_connection(
    stream: UnixStream,
    frontend: Arc<ArbiterFrontend>,
) -> zbus::Result<Connection> {
    ConnectionBuilder::unix_stream(stream)
        .server(Guid::generate())?
        .p2p()
        .serve_at(ROOT_PATH, ArbiterService::new())?
        .serve_at(DISKS_PATH, DisksHandler::new(frontend.clone()))?
        .serve_at(IMAGE_PATH, ImageHandler::new(frontend.clone()))?
        .serve_at(ARBITRATION_PATH, ArbitrationHandler::new(frontend))?
        .build()
        .await
}

async fn handle_client(stream: UnixStream, frontend: Arc<ArbiterFrontend>) {
    let client = Uuid::new_v4();

    let connection = match serve_connection(stream, frontend).await {
        Ok(connection) => connection,
        Err(e) => {
            warn!("Handshake with client {client} failed: {e}");
            return;
        }
    };
    info!("Client {client} connected");

    // The object server dispatches calls; this only waits for the peer to go
    let mut messages = MessageStream::from(&connection);
    while messages.next().await.is_some() {}

    info!("Client {client} disconnected");
}
