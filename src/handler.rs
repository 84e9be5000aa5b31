//! TCP connection handler
//!
//! Handles one accepted socket: registers a session with the ChatServer,
//! runs the framed channel, forwards decoded messages to the actor in
//! arrival order, and reports the disconnect exactly once.

use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::channel::{outbound_queue, FramedChannel, InboundHandler};
use crate::codec::SharedCodec;
use crate::error::AppError;
use crate::message::Message;
use crate::server::ServerCommand;
use crate::types::Usid;

/// Per-connection settings shared by every handler
#[derive(Clone)]
pub struct ConnectionSettings {
    pub codec: SharedCodec,
    pub outbound_capacity: usize,
    pub max_frame_len: usize,
}

/// Forwards inbound messages to the ChatServer actor
struct ForwardToServer {
    usid: Usid,
    cmd_tx: mpsc::Sender<ServerCommand>,
}

impl InboundHandler for ForwardToServer {
    async fn deliver(&mut self, message: Message) -> bool {
        debug!("Session {} sent {}", self.usid, message.message_type());
        self.cmd_tx
            .send(ServerCommand::Inbound {
                usid: self.usid,
                message,
            })
            .await
            .is_ok()
    }
}

/// Handle a new TCP connection
///
/// Registers the session, drives the framed channel until it ends,
/// then removes the session.
pub async fn handle_connection(
    stream: TcpStream,
    usid: Usid,
    settings: ConnectionSettings,
    cmd_tx: mpsc::Sender<ServerCommand>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    // Create the outbound queue; the session in the registry owns the producer
    let (outbound, outbound_rx) = outbound_queue(settings.outbound_capacity);

    // Register with ChatServer
    if cmd_tx
        .send(ServerCommand::Connect { usid, outbound })
        .await
        .is_err()
    {
        warn!("Failed to register session {} - server closed", usid);
        return Err(AppError::ChannelSend);
    }
    info!("Session {} connected from {}", usid, peer_addr);

    let channel = FramedChannel::new(
        stream,
        settings.codec,
        outbound_rx,
        settings.max_frame_len,
    );
    let mut forward = ForwardToServer {
        usid,
        cmd_tx: cmd_tx.clone(),
    };

    match channel.run(&mut forward, shutdown).await {
        Ok(reason) => debug!("Session {} channel closed: {:?}", usid, reason),
        Err(e) => info!("Session {} connection corrupted: {}", usid, e),
    }

    // Send disconnect command
    let _ = cmd_tx.send(ServerCommand::Disconnect { usid }).await;

    info!("Session {} disconnected", usid);

    Ok(())
}
