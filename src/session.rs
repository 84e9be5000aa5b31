//! Session struct definition
//!
//! Represents one accepted connection on the server side: its session ID,
//! login identity once authorized, and the producer end of its outbound
//! queue.

use crate::channel::Outbound;
use crate::error::SendError;
use crate::message::{Login, Message};
use crate::types::Usid;

/// Server-side state of one connection
///
/// Created unauthorized when the socket is accepted. `login` is set
/// exactly once, on a successful CLIENT_LOGIN.
#[derive(Debug)]
pub struct Session {
    /// Session ID assigned on accept
    pub usid: Usid,
    /// Login identity (None before authorization)
    pub login: Option<Login>,
    /// Server -> connection message queue
    outbound: Outbound,
}

impl Session {
    /// Create a new unauthorized session
    pub fn new(usid: Usid, outbound: Outbound) -> Self {
        Self {
            usid,
            login: None,
            outbound,
        }
    }

    /// Queue a message for this session's connection
    ///
    /// Returns an error if the queue is full or the connection is gone.
    pub fn send(&self, msg: Message) -> Result<(), SendError> {
        self.outbound.send(msg)
    }

    /// Check if this session has completed login
    pub fn is_authorized(&self) -> bool {
        self.login.is_some()
    }

    /// Display name, if authorized
    pub fn name(&self) -> Option<&str> {
        self.login.as_ref().map(|login| login.name.as_str())
    }
}
