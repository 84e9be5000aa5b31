//! Opaque binary codec backed by serde + bincode.
//!
//! The byte layout is whatever bincode produces for the derived
//! `Serialize` impl of [`Message`]; it is only meant to be read back by
//! this same crate.

use crate::codec::WireCodec;
use crate::error::ParsingError;
use crate::message::Message;

/// [`WireCodec`] using bincode
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl WireCodec for BinaryCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ParsingError> {
        Ok(bincode::serialize(message)?)
    }

    fn decode(&self, payload: &[u8]) -> Result<Message, ParsingError> {
        Ok(bincode::deserialize(payload)?)
    }
}
