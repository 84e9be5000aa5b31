//! Server front end: accept loop and shutdown sequence
//!
//! Owns the listening socket. Each accepted connection gets a fresh
//! [`Usid`] and its own handler task; the [`ChatServer`] actor owns all
//! shared state.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::{handle_connection, ConnectionSettings};
use crate::server::{ChatServer, ServerCommand};
use crate::types::Usid;

/// Address the server binds to
const BIND_ADDRESS: &str = "0.0.0.0";

/// Channel buffer size for server commands
const CHANNEL_BUFFER_SIZE: usize = 256;

/// The chat server
pub struct Server {
    config: ServerConfig,
    running: Arc<AtomicBool>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True while the accept loop is live
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Shared handle to the running flag, for observers on other tasks
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Bind `0.0.0.0:<port>` and serve until Ctrl-C
    pub async fn start(&self) -> Result<(), AppError> {
        let addr: SocketAddr = format!("{}:{}", BIND_ADDRESS, self.config.port)
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let listener = TcpListener::bind(addr).await?;
        info!("Chat server listening on {}", addr);

        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Ctrl-C received");
        })
        .await
    }

    /// Accept connections on `listener` until `shutdown` resolves
    ///
    /// On shutdown every session is sent "Server closed", connections get
    /// `shutdown_grace` to flush, then the rest are stopped.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), AppError> {
        // Create ChatServer actor channel and start
        let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let actor = tokio::spawn(ChatServer::new(cmd_rx, self.config.backlog_capacity).run());
        let (stop_tx, stop_rx) = watch::channel(false);

        let settings = ConnectionSettings {
            codec: self.config.codec.build(),
            outbound_capacity: self.config.outbound_capacity,
            max_frame_len: self.config.max_frame_len,
        };
        let mut connections = JoinSet::new();

        self.running.store(true, Ordering::SeqCst);
        info!("Listening for connections ({:?} codec)", self.config.codec);

        tokio::pin!(shutdown);

        // Connection accept loop
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let usid = Usid::new();
                        info!("Incoming connection from {} as {}", addr, usid);
                        let settings = settings.clone();
                        let cmd_tx = cmd_tx.clone();
                        let stop_rx = stop_rx.clone();

                        // Spawn handler task for each connection
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, usid, settings, cmd_tx, stop_rx).await {
                                error!("Connection handler error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
                // reap finished handlers so the set does not grow
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        self.running.store(false, Ordering::SeqCst);
        drop(listener);
        info!("Shutting down, notifying sessions");

        let (done_tx, done_rx) = oneshot::channel();
        if cmd_tx
            .send(ServerCommand::Shutdown { done: done_tx })
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }

        let grace = self.config.shutdown_grace;
        let drained = tokio::time::timeout(grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("{} connections still open after {:?}, stopping them", connections.len(), grace);
            let _ = stop_tx.send(true);
            while connections.join_next().await.is_some() {}
        }

        drop(cmd_tx);
        if let Err(e) = actor.await {
            error!("ChatServer task failed: {}", e);
        }
        debug!("Server stopped");
        Ok(())
    }
}
