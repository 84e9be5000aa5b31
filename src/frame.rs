//! Length-prefixed framing
//!
//! Each frame is a 4-byte big-endian length `L` followed by exactly `L`
//! payload bytes. [`FrameDecoder`] is the read-side state machine: it is
//! fed whatever a socket read returned, however small, and emits whole
//! payloads once their last byte has arrived.

use std::collections::VecDeque;

use crate::error::ChannelError;

/// Size of the length prefix
pub const LENGTH_PREFIX: usize = 4;

/// Default upper bound on a single frame payload (16 MiB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Prefix a payload with its big-endian length
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, ChannelError> {
    let len = u32::try_from(payload.len()).map_err(|_| ChannelError::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

#[derive(Debug)]
enum ReadState {
    /// Accumulating the 4-byte prefix
    ReadingLength {
        buf: [u8; LENGTH_PREFIX],
        filled: usize,
    },
    /// Accumulating `buf.len()` payload bytes
    ReadingBody { buf: Vec<u8>, filled: usize },
}

impl ReadState {
    fn length() -> Self {
        ReadState::ReadingLength {
            buf: [0; LENGTH_PREFIX],
            filled: 0,
        }
    }
}

/// Read-side framing state machine
#[derive(Debug)]
pub struct FrameDecoder {
    state: ReadState,
    max_frame_len: usize,
}

impl FrameDecoder {
    /// Create a decoder rejecting frames longer than `max_frame_len`
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            state: ReadState::length(),
            max_frame_len,
        }
    }

    /// Feed freshly read bytes.
    ///
    /// Every payload completed by `data` is pushed onto `frames` in wire
    /// order. Incomplete trailing bytes are kept for the next call.
    ///
    /// # Errors
    /// Returns [`ChannelError::FrameTooLarge`] when a length prefix exceeds
    /// the limit. The decoder is unusable afterwards.
    pub fn feed(
        &mut self,
        mut data: &[u8],
        frames: &mut VecDeque<Vec<u8>>,
    ) -> Result<(), ChannelError> {
        while !data.is_empty() {
            match &mut self.state {
                ReadState::ReadingLength { buf, filled } => {
                    let take = (LENGTH_PREFIX - *filled).min(data.len());
                    buf[*filled..*filled + take].copy_from_slice(&data[..take]);
                    *filled += take;
                    data = &data[take..];

                    if *filled == LENGTH_PREFIX {
                        let len = u32::from_be_bytes(*buf) as usize;
                        if len > self.max_frame_len {
                            return Err(ChannelError::FrameTooLarge {
                                len,
                                max: self.max_frame_len,
                            });
                        }
                        if len == 0 {
                            frames.push_back(Vec::new());
                            self.state = ReadState::length();
                        } else {
                            self.state = ReadState::ReadingBody {
                                buf: vec![0; len],
                                filled: 0,
                            };
                        }
                    }
                }
                ReadState::ReadingBody { buf, filled } => {
                    let take = (buf.len() - *filled).min(data.len());
                    buf[*filled..*filled + take].copy_from_slice(&data[..take]);
                    *filled += take;
                    data = &data[take..];

                    if *filled == buf.len() {
                        frames.push_back(std::mem::take(buf));
                        self.state = ReadState::length();
                    }
                }
            }
        }
        Ok(())
    }

    /// True when no partial frame is buffered
    pub fn is_idle(&self) -> bool {
        matches!(self.state, ReadState::ReadingLength { filled: 0, .. })
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

/// A framed buffer being written, possibly across several writes
#[derive(Debug)]
pub struct PendingWrite {
    buf: Vec<u8>,
    written: usize,
}

impl PendingWrite {
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf, written: 0 }
    }

    /// Bytes not yet written
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.written..]
    }

    /// Record `n` more bytes written; returns true once fully drained
    pub fn advance(&mut self, n: usize) -> bool {
        self.written = (self.written + n).min(self.buf.len());
        self.written == self.buf.len()
    }
}
