//! Error types for the chat service
//!
//! Defines codec, channel, protocol-level and application errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Wire codec errors
///
/// Any of these is fatal to the connection that produced the bytes:
/// a corrupt frame cannot be skipped safely.
#[derive(Debug, Error)]
pub enum ParsingError {
    /// The payload is not well-formed XML
    #[error("XML error: {0}")]
    Xml(String),

    /// The binary payload could not be (de)serialized
    #[error("binary codec error: {0}")]
    Binary(#[from] bincode::Error),

    /// Root element names no known category
    #[error("unknown root element <{0}>")]
    UnknownRoot(String),

    /// `name` attribute missing or not valid for this root
    #[error("unknown {root} subtype {name:?}")]
    UnknownSubtype { root: String, name: Option<String> },

    /// A required field element is absent
    #[error("missing field <{0}>")]
    MissingField(String),

    /// A field element that must occur once occurs again
    #[error("duplicated field <{0}>")]
    DuplicateField(String),

    /// A field element holds something other than a single text node
    #[error("field <{0}> must hold a single text node")]
    InvalidField(String),

    /// A session field does not hold a textual UUID
    #[error("malformed session id {0:?}")]
    InvalidUsid(String),

    /// Structure violates the schema (extra children, stray text, ...)
    #[error("unexpected content: {0}")]
    UnexpectedContent(String),
}

/// Framed channel errors (fatal to one connection)
#[derive(Debug, Error)]
pub enum ChannelError {
    /// IO error on the socket
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame payload failed to encode or decode
    #[error("codec error: {0}")]
    Parsing(#[from] ParsingError),

    /// Length prefix exceeds the configured limit
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },
}

/// Protocol-level rejections
///
/// Never fatal: each one is answered with a `ServerError` message
/// and the connection continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Request needs an authorized session
    #[error("You are not authorized")]
    NotAuthorized,

    /// Another authorized session holds this display name
    #[error("this username already exists")]
    NameTaken(String),

    /// Session is already authorized
    #[error("You are already logged in")]
    AlreadyLoggedIn,

    /// Message type is not a client request
    #[error("not implemented message type")]
    NotImplemented,

    /// Server is shutting down
    #[error("Server closed")]
    ServerClosed,
}

/// Outbound queue errors
///
/// Occurs when attempting to enqueue a message for a connection.
#[derive(Debug, Error)]
pub enum SendError {
    /// The connection has gone away
    #[error("Channel closed")]
    ChannelClosed,

    /// The connection is not draining its queue fast enough
    #[error("Outbound queue full")]
    QueueFull,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but cannot be read
    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// Syntax error, unknown key or mistyped value
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Application-level errors
///
/// Returned by the binaries and by `Server::start`.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_text() {
        assert_eq!(
            RequestError::NameTaken("alice".to_string()).to_string(),
            "this username already exists"
        );
        assert_eq!(RequestError::ServerClosed.to_string(), "Server closed");
    }

    #[test]
    fn test_channel_error_from_parsing() {
        let err: ChannelError = ParsingError::MissingField("name".to_string()).into();
        assert!(matches!(err, ChannelError::Parsing(_)));
        assert_eq!(err.to_string(), "codec error: missing field <name>");
    }
}
