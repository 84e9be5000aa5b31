//! ChatServer Actor implementation
//!
//! The central actor that owns all shared state: the session registry and
//! the chat backlog. Connection tasks talk to it through `ServerCommand`s
//! on an mpsc channel, so every read-modify-write on that state runs
//! sequentially in this one task.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::backlog::Backlog;
use crate::channel::Outbound;
use crate::error::RequestError;
use crate::message::{ChatLine, Login, Message};
use crate::registry::SessionRegistry;
use crate::session::Session;
use crate::types::Usid;

/// Commands sent from connection tasks to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New connection accepted
    Connect { usid: Usid, outbound: Outbound },
    /// Decoded message from a connection
    Inbound { usid: Usid, message: Message },
    /// Connection ended (disconnect, transport or codec error)
    Disconnect { usid: Usid },
    /// Tell everyone the server is closing and drop all sessions
    Shutdown { done: oneshot::Sender<()> },
}

/// The main ChatServer actor
///
/// Holds the session registry and backlog and processes commands from
/// connection tasks.
pub struct ChatServer {
    /// All live sessions: Usid -> Session
    registry: SessionRegistry,
    /// Recent chat lines replayed on login
    backlog: Backlog,
    /// Set once shutdown has been processed
    closing: bool,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>, backlog_capacity: usize) -> Self {
        Self {
            registry: SessionRegistry::new(),
            backlog: Backlog::new(backlog_capacity),
            closing: false,
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    pub fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect { usid, outbound } => self.handle_connect(usid, outbound),
            ServerCommand::Inbound { usid, message } => self.handle_inbound(usid, message),
            ServerCommand::Disconnect { usid } => self.remove_session(usid),
            ServerCommand::Shutdown { done } => {
                self.handle_shutdown();
                let _ = done.send(());
            }
        }
    }

    /// Handle new connection
    fn handle_connect(&mut self, usid: Usid, outbound: Outbound) {
        if self.closing {
            // dropping `outbound` closes the connection
            debug!("Session {} refused, server closing", usid);
            return;
        }
        info!("Session {} connected", usid);
        self.registry.insert(Session::new(usid, outbound));
        debug!("Total sessions: {}", self.registry.len());
    }

    /// Route one inbound message by type
    fn handle_inbound(&mut self, usid: Usid, message: Message) {
        if self.registry.get(&usid).is_none() {
            debug!("Session {} gone, dropping {}", usid, message.message_type());
            return;
        }

        let result = match message {
            Message::ClientLogin(login) => self.handle_login(usid, login),
            Message::ClientListRequest { .. } => self.handle_list(usid),
            Message::ClientMessage { text, .. } => self.handle_chat(usid, text),
            Message::ClientLogout { .. } => self.handle_logout(usid),
            other => {
                info!("Session {} sent server-side {}", usid, other.message_type());
                Err(RequestError::NotImplemented)
            }
        };

        if let Err(e) = result {
            info!("Session {} request rejected: {:?}", usid, e);
            self.reply(usid, e.into());
        }
    }

    /// Handle CLIENT_LOGIN
    fn handle_login(&mut self, usid: Usid, login: Login) -> Result<(), RequestError> {
        info!("Session {} login attempt with name '{}'", usid, login.name);

        let name = self
            .registry
            .authorize(&usid, login)?
            .name()
            .unwrap_or_default()
            .to_string();
        info!("Session {} authorized as '{}'", usid, name);

        self.reply(usid, Message::ServerLoginSuccess { usid });
        debug!("Session {} replaying {} backlog lines", usid, self.backlog.len());
        for line in self.backlog.iter() {
            self.reply(usid, Message::ServerMessage(line.clone()));
        }

        self.registry.broadcast(&Message::ServerUserLogin { name });
        Ok(())
    }

    /// Handle CLIENT_LIST_REQUEST
    fn handle_list(&mut self, usid: Usid) -> Result<(), RequestError> {
        self.registry.authorized(&usid)?;
        let users = self.registry.authorized_logins();
        debug!("Session {} listing {} users", usid, users.len());
        self.reply(usid, Message::ServerListResponse { users });
        Ok(())
    }

    /// Handle CLIENT_MESSAGE
    fn handle_chat(&mut self, usid: Usid, text: String) -> Result<(), RequestError> {
        let name = self
            .registry
            .authorized(&usid)?
            .name()
            .unwrap_or_default()
            .to_string();
        debug!("Session {} message from '{}'", usid, name);

        self.record_and_broadcast(ChatLine { text, name });
        self.reply(usid, Message::ServerEmptySuccess);
        Ok(())
    }

    /// Handle CLIENT_LOGOUT
    fn handle_logout(&mut self, usid: Usid) -> Result<(), RequestError> {
        self.registry.authorized(&usid)?;
        info!("Session {} logout", usid);
        self.reply(usid, Message::ServerEmptySuccess);
        self.remove_session(usid);
        Ok(())
    }

    /// Handle server shutdown
    fn handle_shutdown(&mut self) {
        info!("Closing {} sessions", self.registry.len());
        self.closing = true;
        self.registry.broadcast(&RequestError::ServerClosed.into());
        self.registry.clear();
    }

    /// Append to the backlog, then send the line to everyone
    fn record_and_broadcast(&mut self, line: ChatLine) {
        self.backlog.record(line.clone());
        self.registry.broadcast(&Message::ServerMessage(line));
    }

    /// Remove a session; an authorized one is announced as logged out.
    ///
    /// Dropping the session drops its outbound producer, so the connection
    /// flushes what is queued and closes.
    fn remove_session(&mut self, usid: Usid) {
        let Some(session) = self.registry.remove(&usid) else {
            return;
        };
        info!("Session {} removed", usid);

        if let Some(login) = session.login {
            self.registry
                .broadcast(&Message::ServerUserLogout { name: login.name });
        }
        debug!("Total sessions: {}", self.registry.len());
    }

    /// Helper: queue a message for one session
    fn reply(&self, usid: Usid, msg: Message) {
        if let Some(session) = self.registry.get(&usid) {
            if let Err(e) = session.send(msg) {
                warn!("Reply to {} dropped: {}", usid, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::DEFAULT_BACKLOG_CAPACITY;
    use crate::channel::outbound_queue;

    struct Harness {
        server: ChatServer,
        _cmd_tx: mpsc::Sender<ServerCommand>,
    }

    impl Harness {
        fn new() -> Self {
            let (cmd_tx, cmd_rx) = mpsc::channel(8);
            Self {
                server: ChatServer::new(cmd_rx, DEFAULT_BACKLOG_CAPACITY),
                _cmd_tx: cmd_tx,
            }
        }

        fn connect(&mut self) -> (Usid, mpsc::Receiver<Message>) {
            let (outbound, rx) = outbound_queue(64);
            let usid = Usid::new();
            self.server
                .handle_command(ServerCommand::Connect { usid, outbound });
            (usid, rx)
        }

        fn send(&mut self, usid: Usid, message: Message) {
            self.server
                .handle_command(ServerCommand::Inbound { usid, message });
        }

        fn login(&mut self, usid: Usid, name: &str) {
            self.send(usid, Message::ClientLogin(Login::new(name, "test")));
        }
    }

    fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn chat_line(text: &str, name: &str) -> Message {
        Message::ServerMessage(ChatLine {
            text: text.to_string(),
            name: name.to_string(),
        })
    }

    #[test]
    fn test_login_success_then_user_login_broadcast() {
        let mut h = Harness::new();
        let (alice, mut alice_rx) = h.connect();
        let (_other, mut other_rx) = h.connect();

        h.login(alice, "alice");

        assert_eq!(
            drain(&mut alice_rx),
            vec![
                Message::ServerLoginSuccess { usid: alice },
                Message::ServerUserLogin {
                    name: "alice".to_string()
                },
            ]
        );
        // unauthorized sessions still receive broadcasts
        assert_eq!(
            drain(&mut other_rx),
            vec![Message::ServerUserLogin {
                name: "alice".to_string()
            }]
        );
    }

    #[test]
    fn test_login_with_full_queue_still_authorizes() {
        let mut h = Harness::new();
        let (outbound, mut full_rx) = outbound_queue(1);
        let full = Usid::new();
        outbound.send(Message::ServerEmptySuccess).unwrap();
        h.server.handle_command(ServerCommand::Connect {
            usid: full,
            outbound,
        });

        h.login(full, "alice");
        assert!(h.server.registry.is_name_taken("alice"));
        // the success reply was dropped, not queued behind the backlog
        assert_eq!(drain(&mut full_rx), vec![Message::ServerEmptySuccess]);

        let (b, mut b_rx) = h.connect();
        h.login(b, "alice");
        assert_eq!(
            drain(&mut b_rx),
            vec![Message::error("this username already exists")]
        );
    }

    #[test]
    fn test_duplicate_login_rejected() {
        let mut h = Harness::new();
        let (a, mut a_rx) = h.connect();
        let (b, mut b_rx) = h.connect();

        h.login(a, "alice");
        drain(&mut a_rx);
        drain(&mut b_rx);

        h.login(b, "alice");
        assert_eq!(
            drain(&mut b_rx),
            vec![Message::error("this username already exists")]
        );
        assert!(drain(&mut a_rx).is_empty());
        assert!(!h.server.registry.get(&b).unwrap().is_authorized());
    }

    #[test]
    fn test_second_login_on_same_session_rejected() {
        let mut h = Harness::new();
        let (a, mut a_rx) = h.connect();
        h.login(a, "alice");
        drain(&mut a_rx);

        h.login(a, "alicia");
        assert_eq!(
            drain(&mut a_rx),
            vec![Message::error("You are already logged in")]
        );
        assert_eq!(h.server.registry.get(&a).unwrap().name(), Some("alice"));
    }

    #[test]
    fn test_unauthorized_requests_gated() {
        let mut h = Harness::new();
        let (a, mut a_rx) = h.connect();
        let (_b, mut b_rx) = h.connect();

        h.send(a, Message::ClientListRequest { usid: a });
        h.send(
            a,
            Message::ClientMessage {
                text: "hi".to_string(),
                usid: a,
            },
        );
        h.send(a, Message::ClientLogout { usid: a });

        let denied = Message::error("You are not authorized");
        assert_eq!(drain(&mut a_rx), vec![denied.clone(), denied.clone(), denied]);
        assert!(drain(&mut b_rx).is_empty());
        assert!(h.server.backlog.is_empty());
        assert_eq!(h.server.registry.len(), 2);
    }

    #[test]
    fn test_chat_broadcast_then_ack() {
        let mut h = Harness::new();
        let (a, mut a_rx) = h.connect();
        let (b, mut b_rx) = h.connect();
        h.login(a, "alice");
        h.login(b, "bob");
        drain(&mut a_rx);
        drain(&mut b_rx);

        h.send(
            a,
            Message::ClientMessage {
                text: "hi".to_string(),
                usid: a,
            },
        );

        assert_eq!(
            drain(&mut a_rx),
            vec![chat_line("hi", "alice"), Message::ServerEmptySuccess]
        );
        assert_eq!(drain(&mut b_rx), vec![chat_line("hi", "alice")]);
    }

    #[test]
    fn test_backlog_replay_last_ten() {
        let mut h = Harness::new();
        let (a, mut a_rx) = h.connect();
        h.login(a, "alice");
        for n in 0..15 {
            h.send(
                a,
                Message::ClientMessage {
                    text: format!("m{}", n),
                    usid: a,
                },
            );
        }
        drain(&mut a_rx);

        let (b, mut b_rx) = h.connect();
        h.login(b, "bob");

        let received = drain(&mut b_rx);
        assert_eq!(received[0], Message::ServerLoginSuccess { usid: b });
        let replayed: Vec<Message> = received[1..11].to_vec();
        let expected: Vec<Message> = (5..15)
            .map(|n| chat_line(&format!("m{}", n), "alice"))
            .collect();
        assert_eq!(replayed, expected);
        assert_eq!(
            received[11..],
            [Message::ServerUserLogin {
                name: "bob".to_string()
            }]
        );
    }

    #[test]
    fn test_list_contains_authorized_only() {
        let mut h = Harness::new();
        let (a, mut a_rx) = h.connect();
        let (b, _b_rx) = h.connect();
        let (_c, _c_rx) = h.connect();
        h.login(a, "alice");
        h.login(b, "bob");
        drain(&mut a_rx);

        h.send(a, Message::ClientListRequest { usid: a });

        let msgs = drain(&mut a_rx);
        let [Message::ServerListResponse { users }] = msgs.as_slice() else {
            panic!("unexpected reply {:?}", msgs);
        };
        let mut names: Vec<_> = users.iter().map(|u| u.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[test]
    fn test_logout_acks_and_broadcasts() {
        let mut h = Harness::new();
        let (a, mut a_rx) = h.connect();
        let (b, mut b_rx) = h.connect();
        h.login(a, "alice");
        h.login(b, "bob");
        drain(&mut a_rx);
        drain(&mut b_rx);

        h.send(a, Message::ClientLogout { usid: a });

        assert_eq!(drain(&mut a_rx), vec![Message::ServerEmptySuccess]);
        assert_eq!(
            drain(&mut b_rx),
            vec![Message::ServerUserLogout {
                name: "alice".to_string()
            }]
        );
        assert!(h.server.registry.get(&a).is_none());
        // session dropped: alice's queue is closed once drained
        assert!(matches!(
            a_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_disconnect_of_unauthorized_is_silent() {
        let mut h = Harness::new();
        let (a, _a_rx) = h.connect();
        let (_b, mut b_rx) = h.connect();

        h.server.handle_command(ServerCommand::Disconnect { usid: a });

        assert!(drain(&mut b_rx).is_empty());
        assert_eq!(h.server.registry.len(), 1);
    }

    #[test]
    fn test_disconnect_of_authorized_broadcasts_logout() {
        let mut h = Harness::new();
        let (a, _a_rx) = h.connect();
        let (_b, mut b_rx) = h.connect();
        h.login(a, "alice");
        drain(&mut b_rx);

        h.server.handle_command(ServerCommand::Disconnect { usid: a });

        assert_eq!(
            drain(&mut b_rx),
            vec![Message::ServerUserLogout {
                name: "alice".to_string()
            }]
        );
    }

    #[test]
    fn test_server_side_types_not_implemented() {
        let mut h = Harness::new();
        let (a, mut a_rx) = h.connect();

        h.send(a, Message::ServerEmptySuccess);
        assert_eq!(
            drain(&mut a_rx),
            vec![Message::error("not implemented message type")]
        );
    }

    #[test]
    fn test_shutdown_broadcasts_and_drops_sessions() {
        let mut h = Harness::new();
        let (_a, mut a_rx) = h.connect();
        let (done_tx, mut done_rx) = oneshot::channel();

        h.server
            .handle_command(ServerCommand::Shutdown { done: done_tx });

        assert_eq!(drain(&mut a_rx), vec![Message::error("Server closed")]);
        assert!(h.server.registry.is_empty());
        assert!(done_rx.try_recv().is_ok());

        // late connections are refused
        let (_late, mut late_rx) = h.connect();
        assert!(h.server.registry.is_empty());
        assert!(matches!(
            late_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
