//! Broadcast chat over length-prefixed TCP frames
//!
//! Clients connect over TCP, log in with a display name, broadcast chat
//! lines and ask for the roster of logged-in users.
//!
//! # Features
//! - Length-prefixed framing (4-byte big-endian length + payload)
//! - Two wire codecs: a structured XML schema and an opaque bincode format
//! - Unique display names, checked atomically on login
//! - Replay of the last 10 chat lines to each new login
//! - A client facade with a synchronous request API and listener callbacks
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the session registry and backlog
//! - Each connection has a `handler` task driving a `FramedChannel`
//! - No locks on shared server state - all access goes through message passing
//!
//! # Example
//! ```ignore
//! use tcp_chat::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Server::new(ServerConfig::default());
//!     server.start().await.unwrap();
//! }
//! ```

pub mod acceptor;
pub mod backlog;
pub mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod handler;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use acceptor::Server;
pub use channel::{CloseReason, FramedChannel, InboundHandler, Outbound};
pub use client::ChatClient;
pub use codec::{BinaryCodec, CodecKind, SharedCodec, WireCodec, XmlCodec};
pub use config::{ClientConfig, ServerConfig};
pub use error::{AppError, ChannelError, ConfigError, ParsingError, RequestError, SendError};
pub use handler::handle_connection;
pub use message::{ChatLine, Login, Message, MessageType};
pub use server::{ChatServer, ServerCommand};
pub use types::Usid;
