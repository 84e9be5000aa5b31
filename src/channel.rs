//! Framed channel: one TCP connection turned into a stream of messages
//!
//! A single task drives the connection through `tokio::select!` over:
//! - read readiness: bytes go through the [`FrameDecoder`], payloads are
//!   decoded into the inbound queue and handed to an [`InboundHandler`]
//!   in arrival order,
//! - write readiness, awaited only while a framed buffer is pending,
//! - the outbound queue, polled only when nothing is pending,
//! - the shutdown signal.
//!
//! The outbound queue is a bounded `mpsc` channel: any thread may enqueue
//! and doing so wakes the connection task.

use std::collections::VecDeque;
use std::future::Future;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use crate::codec::SharedCodec;
use crate::error::{ChannelError, SendError};
use crate::frame::{encode_frame, FrameDecoder, PendingWrite};
use crate::message::Message;

/// Socket read chunk size
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Receives each decoded inbound message, in arrival order.
pub trait InboundHandler: Send {
    /// Handle one message. Returning `false` stops the channel.
    fn deliver(&mut self, message: Message) -> impl Future<Output = bool> + Send;
}

/// Why a channel stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed its side (read returned EOF)
    PeerClosed,
    /// All outbound producers were dropped and the queue was flushed
    LocalClose,
    /// The shutdown signal fired
    Shutdown,
    /// The inbound handler asked to stop
    HandlerStopped,
}

/// Producer side of a connection's outbound queue
#[derive(Debug, Clone)]
pub struct Outbound {
    sender: mpsc::Sender<Message>,
}

impl Outbound {
    /// Enqueue a message without waiting.
    ///
    /// # Errors
    /// [`SendError::QueueFull`] when the queue is at capacity,
    /// [`SendError::ChannelClosed`] when the connection is gone.
    pub fn send(&self, message: Message) -> Result<(), SendError> {
        self.sender.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// True once the connection task has ended
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Create a bounded outbound queue
pub fn outbound_queue(capacity: usize) -> (Outbound, mpsc::Receiver<Message>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (Outbound { sender }, receiver)
}

/// Per-connection framing state machine
pub struct FramedChannel {
    stream: TcpStream,
    codec: SharedCodec,
    decoder: FrameDecoder,
    outbound: mpsc::Receiver<Message>,
}

impl FramedChannel {
    /// Wrap a connected socket
    pub fn new(
        stream: TcpStream,
        codec: SharedCodec,
        outbound: mpsc::Receiver<Message>,
        max_frame_len: usize,
    ) -> Self {
        Self {
            stream,
            codec,
            decoder: FrameDecoder::new(max_frame_len),
            outbound,
        }
    }

    /// Drive the connection until it ends.
    ///
    /// The socket is closed when this returns, whatever the outcome.
    ///
    /// # Errors
    /// IO failures, codec failures and oversize frames end the channel
    /// with a [`ChannelError`].
    pub async fn run<H: InboundHandler>(
        self,
        handler: &mut H,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<CloseReason, ChannelError> {
        let FramedChannel {
            mut stream,
            codec,
            mut decoder,
            mut outbound,
        } = self;
        let (mut reader, mut writer) = stream.split();

        let mut read_buf = vec![0u8; READ_BUFFER_SIZE];
        let mut frames: VecDeque<Vec<u8>> = VecDeque::new();
        let mut inbound: VecDeque<Message> = VecDeque::new();
        let mut pending: Option<PendingWrite> = None;
        let mut outbound_open = true;
        let mut shutdown_live = true;
        let mut failure: Option<ChannelError> = None;

        loop {
            if *shutdown.borrow() {
                return Ok(CloseReason::Shutdown);
            }

            tokio::select! {
                changed = shutdown.changed(), if shutdown_live => {
                    // sender dropped: nobody can signal anymore, keep serving
                    shutdown_live = changed.is_ok();
                    continue;
                }
                read = reader.read(&mut read_buf) => {
                    let n = read?;
                    if n == 0 {
                        if !decoder.is_idle() {
                            debug!("peer closed mid-frame");
                        }
                        return Ok(CloseReason::PeerClosed);
                    }
                    trace!("read {} bytes", n);
                    // frames completed before a bad one are still delivered
                    if let Err(e) = decoder.feed(&read_buf[..n], &mut frames) {
                        failure = Some(e);
                    }
                    while let Some(payload) = frames.pop_front() {
                        match codec.decode(&payload) {
                            Ok(message) => inbound.push_back(message),
                            Err(e) => {
                                failure = Some(e.into());
                                frames.clear();
                            }
                        }
                    }
                }
                written = writer.write(remaining(&pending)), if pending.is_some() => {
                    let n = written?;
                    if n == 0 {
                        return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into());
                    }
                    if pending.as_mut().is_some_and(|p| p.advance(n)) {
                        pending = None;
                    }
                }
                next = outbound.recv(), if pending.is_none() && outbound_open => {
                    match next {
                        Some(message) => {
                            let frame = encode_frame(&codec.encode(&message)?)?;
                            pending = Some(PendingWrite::new(frame));
                        }
                        None => outbound_open = false,
                    }
                }
            }

            while let Some(message) = inbound.pop_front() {
                if !handler.deliver(message).await {
                    return Ok(CloseReason::HandlerStopped);
                }
            }
            if let Some(e) = failure.take() {
                return Err(e);
            }

            if !outbound_open && pending.is_none() {
                debug!("outbound queue closed and flushed");
                writer.shutdown().await?;
                return Ok(CloseReason::LocalClose);
            }
        }
    }
}

fn remaining(pending: &Option<PendingWrite>) -> &[u8] {
    pending.as_ref().map(PendingWrite::remaining).unwrap_or(&[])
}
