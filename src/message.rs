//! Message protocol definitions
//!
//! A closed sum type over every message that crosses the wire. The variant
//! is the type tag and carries exactly the payload shape tied to that tag,
//! so a mismatched tag/payload pair cannot be built.

use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::types::Usid;

/// Login identity of a user: display name plus the client program tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Login {
    pub name: String,
    pub client_tag: String,
}

impl Login {
    pub fn new(name: impl Into<String>, client_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client_tag: client_tag.into(),
        }
    }
}

/// One broadcast chat line: its text and the author's display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLine {
    pub text: String,
    pub name: String,
}

/// A message on the wire
///
/// `Client*` variants are requests, `Server*` variants are responses
/// and events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Authenticate with a display name
    ClientLogin(Login),
    /// Ask for the roster of authorized users
    ClientListRequest { usid: Usid },
    /// Broadcast a chat line
    ClientMessage { text: String, usid: Usid },
    /// End the session
    ClientLogout { usid: Usid },
    /// Login accepted, carries the session ID
    ServerLoginSuccess { usid: Usid },
    /// Roster of authorized users
    ServerListResponse { users: Vec<Login> },
    /// Plain acknowledgement
    ServerEmptySuccess,
    /// Request rejected
    ServerError { text: String },
    /// Chat line from some user
    ServerMessage(ChatLine),
    /// A user logged in
    ServerUserLogin { name: String },
    /// A user logged out or disconnected
    ServerUserLogout { name: String },
}

/// Type tag of a [`Message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    ClientLogin,
    ClientListRequest,
    ClientMessage,
    ClientLogout,
    ServerLoginSuccess,
    ServerListResponse,
    ServerEmptySuccess,
    ServerError,
    ServerMessage,
    ServerUserLogin,
    ServerUserLogout,
}

impl Message {
    /// The type tag of this message
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::ClientLogin(_) => MessageType::ClientLogin,
            Message::ClientListRequest { .. } => MessageType::ClientListRequest,
            Message::ClientMessage { .. } => MessageType::ClientMessage,
            Message::ClientLogout { .. } => MessageType::ClientLogout,
            Message::ServerLoginSuccess { .. } => MessageType::ServerLoginSuccess,
            Message::ServerListResponse { .. } => MessageType::ServerListResponse,
            Message::ServerEmptySuccess => MessageType::ServerEmptySuccess,
            Message::ServerError { .. } => MessageType::ServerError,
            Message::ServerMessage(_) => MessageType::ServerMessage,
            Message::ServerUserLogin { .. } => MessageType::ServerUserLogin,
            Message::ServerUserLogout { .. } => MessageType::ServerUserLogout,
        }
    }

    /// Build a `ServerError` with the given text
    pub fn error(text: impl Into<String>) -> Self {
        Message::ServerError { text: text.into() }
    }
}

impl MessageType {
    /// True for the four client request tags
    pub fn is_request(self) -> bool {
        matches!(
            self,
            MessageType::ClientLogin
                | MessageType::ClientListRequest
                | MessageType::ClientMessage
                | MessageType::ClientLogout
        )
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            MessageType::ClientLogin => "CLIENT_LOGIN",
            MessageType::ClientListRequest => "CLIENT_LIST_REQUEST",
            MessageType::ClientMessage => "CLIENT_MESSAGE",
            MessageType::ClientLogout => "CLIENT_LOGOUT",
            MessageType::ServerLoginSuccess => "SERVER_LOGIN_SUCCESS",
            MessageType::ServerListResponse => "SERVER_LIST_RESPONSE",
            MessageType::ServerEmptySuccess => "SERVER_EMPTY_SUCCESS",
            MessageType::ServerError => "SERVER_ERROR",
            MessageType::ServerMessage => "SERVER_MESSAGE",
            MessageType::ServerUserLogin => "SERVER_USER_LOGIN",
            MessageType::ServerUserLogout => "SERVER_USER_LOGOUT",
        };
        f.write_str(tag)
    }
}

/// Convert a RequestError to a ServerError message for client notification
impl From<RequestError> for Message {
    fn from(err: RequestError) -> Self {
        Message::error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_tags() {
        let msg = Message::ClientLogin(Login::new("alice", "cli"));
        assert_eq!(msg.message_type(), MessageType::ClientLogin);
        assert!(msg.message_type().is_request());
        assert_eq!(msg.message_type().to_string(), "CLIENT_LOGIN");

        let msg = Message::ServerEmptySuccess;
        assert_eq!(msg.message_type(), MessageType::ServerEmptySuccess);
        assert!(!msg.message_type().is_request());
    }

    #[test]
    fn test_request_error_into_message() {
        let msg: Message = RequestError::NotAuthorized.into();
        assert_eq!(msg, Message::error("You are not authorized"));
    }
}
