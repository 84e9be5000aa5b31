//! Wire codecs: convert a [`Message`] to a frame payload and back.
//!
//! The framing layer does not care how payloads are represented; it holds
//! a [`SharedCodec`] and calls [`WireCodec::encode`] / [`WireCodec::decode`].
//! Both peers must be configured with the same [`CodecKind`], there is no
//! negotiation on the wire.

mod binary;
mod xml;

use std::sync::Arc;

pub use binary::BinaryCodec;
pub use xml::XmlCodec;

use crate::error::ParsingError;
use crate::message::Message;

/// Converts messages to and from frame payload bytes.
///
/// Implementations are pure: the same input always gives the same output
/// and no state is kept between calls.
pub trait WireCodec: Send + Sync + 'static {
    /// Serializes a message into a frame payload.
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ParsingError>;

    /// Parses a frame payload.
    ///
    /// # Errors
    /// Returns a [`ParsingError`] for malformed or schema-violating input.
    fn decode(&self, payload: &[u8]) -> Result<Message, ParsingError>;
}

/// A codec shared by every connection of a process
pub type SharedCodec = Arc<dyn WireCodec>;

/// Codec selection, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecKind {
    /// Structured textual codec with an explicit schema
    #[default]
    Xml,
    /// Opaque serde/bincode codec
    Binary,
}

impl CodecKind {
    /// Builds the codec for this kind
    pub fn build(self) -> SharedCodec {
        match self {
            CodecKind::Xml => Arc::new(XmlCodec),
            CodecKind::Binary => Arc::new(BinaryCodec),
        }
    }

    /// Maps the `XML` configuration flag: `true` is XML, `false` binary
    pub fn from_xml_flag(xml: bool) -> Self {
        if xml {
            CodecKind::Xml
        } else {
            CodecKind::Binary
        }
    }
}
