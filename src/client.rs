//! Client session facade
//!
//! One connection to a chat server. Requests (`login`, `send_message`,
//! `request_user_list`, `logout`) are plain synchronous calls that may be
//! made from any thread, e.g. a UI thread; they enqueue onto the
//! connection's outbound queue and return. Every inbound message is handed
//! to the registered message listener on the connection task; the consumer
//! moves it to its own thread if it needs to.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{outbound_queue, FramedChannel, InboundHandler, Outbound};
use crate::codec::SharedCodec;
use crate::config::ClientConfig;
use crate::error::SendError;
use crate::message::{Login, Message};
use crate::types::Usid;

/// Observer for inbound messages
pub type MessageListener = Arc<dyn Fn(&Message) + Send + Sync>;

/// Observer for the end of a connection
pub type CloseListener = Arc<dyn Fn() + Send + Sync>;

/// State shared between the facade and its connection task
#[derive(Default)]
struct Shared {
    usid: Mutex<Option<Usid>>,
    message_listener: Mutex<Option<MessageListener>>,
    close_listener: Mutex<Option<CloseListener>>,
}

impl Shared {
    fn usid(&self) -> Option<Usid> {
        *self.usid.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn message_listener(&self) -> Option<MessageListener> {
        self.message_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn close_listener(&self) -> Option<CloseListener> {
        self.close_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Inbound side: bookkeeping, then the external listener
struct ClientInbound {
    shared: Arc<Shared>,
}

impl InboundHandler for ClientInbound {
    async fn deliver(&mut self, message: Message) -> bool {
        if message.message_type().is_request() {
            warn!("Server sent a client request {}, ignoring it", message.message_type());
            return true;
        }
        if let Message::ServerLoginSuccess { usid } = &message {
            debug!("Logged in as session {}", usid);
            *self.shared.usid.lock().unwrap_or_else(PoisonError::into_inner) = Some(*usid);
        }
        if let Some(listener) = self.shared.message_listener() {
            listener(&message);
        }
        true
    }
}

/// A live connection
struct Connection {
    outbound: Outbound,
    stop_tx: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

/// Chat client: one server connection plus the request API
pub struct ChatClient {
    config: ClientConfig,
    codec: SharedCodec,
    shared: Arc<Shared>,
    connection: Mutex<Option<Connection>>,
}

impl ChatClient {
    pub fn new(config: ClientConfig) -> Self {
        let codec = config.codec.build();
        Self {
            config,
            codec,
            shared: Arc::new(Shared::default()),
            connection: Mutex::new(None),
        }
    }

    /// Register the inbound message listener, replacing any previous one
    pub fn set_message_listener(&self, listener: impl Fn(&Message) + Send + Sync + 'static) {
        let listener: MessageListener = Arc::new(listener);
        *self
            .shared
            .message_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    /// Register the connection-closed listener, replacing any previous one
    pub fn set_close_listener(&self, listener: impl Fn() + Send + Sync + 'static) {
        let listener: CloseListener = Arc::new(listener);
        *self
            .shared
            .close_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    /// Connect to `address:port` and start the connection task.
    ///
    /// Does nothing if already connected.
    pub async fn start(&self, address: &str, port: u16) -> std::io::Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let stream = TcpStream::connect((address, port)).await?;
        info!("Connected to {}:{}", address, port);

        let (outbound, outbound_rx) = outbound_queue(self.config.outbound_capacity);
        let (stop_tx, stop_rx) = watch::channel(false);
        let channel = FramedChannel::new(
            stream,
            self.codec.clone(),
            outbound_rx,
            self.config.max_frame_len,
        );

        *self.shared.usid.lock().unwrap_or_else(PoisonError::into_inner) = None;
        let shared = self.shared.clone();
        let worker = tokio::spawn(async move {
            let mut inbound = ClientInbound {
                shared: shared.clone(),
            };
            match channel.run(&mut inbound, stop_rx).await {
                Ok(reason) => debug!("Connection closed: {:?}", reason),
                Err(e) => warn!("Connection failed: {}", e),
            }
            if let Some(listener) = shared.close_listener() {
                listener();
            }
        });

        let previous = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Connection {
                outbound,
                stop_tx,
                worker,
            });
        if previous.is_some() {
            // the old task is finishing on its own and still owes its close listener
            debug!("Replacing a closed connection");
        }
        Ok(())
    }

    /// True while the connection task is running
    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|connection| !connection.worker.is_finished() && !connection.outbound.is_closed())
    }

    /// Session ID from the last SERVER_LOGIN_SUCCESS on this connection
    pub fn usid(&self) -> Option<Usid> {
        self.shared.usid()
    }

    /// Request login under `name`
    pub fn login(&self, name: &str) {
        self.enqueue(Message::ClientLogin(Login::new(
            name,
            self.config.client_tag.clone(),
        )));
    }

    /// Request the roster of logged-in users
    pub fn request_user_list(&self) {
        let usid = self.current_usid();
        self.enqueue(Message::ClientListRequest { usid });
    }

    /// Broadcast a chat line
    pub fn send_message(&self, text: &str) {
        let usid = self.current_usid();
        self.enqueue(Message::ClientMessage {
            text: text.to_string(),
            usid,
        });
    }

    /// Request logout
    pub fn logout(&self) {
        let usid = self.current_usid();
        self.enqueue(Message::ClientLogout { usid });
    }

    /// Log out best-effort, flush, and tear the connection down.
    ///
    /// The close listener fires once the connection task has ended.
    pub async fn close(&self) {
        self.logout();

        let connection = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(Connection {
            outbound,
            stop_tx,
            mut worker,
        }) = connection
        else {
            return;
        };

        // last producer gone: the channel flushes and closes
        drop(outbound);
        if tokio::time::timeout(self.config.close_grace, &mut worker)
            .await
            .is_err()
        {
            debug!("Connection did not close in {:?}, stopping it", self.config.close_grace);
            let _ = stop_tx.send(true);
            let _ = worker.await;
        }
    }

    fn current_usid(&self) -> Usid {
        self.shared.usid().unwrap_or_else(Usid::nil)
    }

    /// No-op unless connected
    fn enqueue(&self, message: Message) {
        let guard = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(connection) = guard.as_ref() else {
            debug!("Not connected, dropping {}", message.message_type());
            return;
        };
        match connection.outbound.send(message) {
            Ok(()) => {}
            Err(SendError::ChannelClosed) => debug!("Connection closed, request dropped"),
            Err(e) => warn!("Request dropped: {}", e),
        }
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        if let Some(connection) = self
            .connection
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = connection.stop_tx.send(true);
        }
    }
}
