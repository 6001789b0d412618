//! Client frame codec.
//!
//! [`FrameCodec::frame`] turns one outbound payload into one complete,
//! masked wire frame. [`FrameCodec::start`] runs the decode loop over the
//! input half of an upgraded stream, reassembling fragmented messages and
//! handing each event to a [`FrameSink`].

// ============================================================================
// Imports
// ============================================================================

use tokio::io::AsyncRead;
use tracing::trace;

use crate::error::{Error, Result};

use super::frame::{CloseFrame, Frame, MAX_CONTROL_PAYLOAD, OpCode};

// ============================================================================
// Constants
// ============================================================================

/// Default upper bound for one reassembled inbound message (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = 64 * 1024 * 1024;

// ============================================================================
// Payload
// ============================================================================

/// An outbound application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 text message.
    Text(String),
    /// Binary message.
    Binary(Vec<u8>),
}

impl Payload {
    /// Returns the frame opcode for this payload.
    #[inline]
    #[must_use]
    pub const fn opcode(&self) -> OpCode {
        match self {
            Self::Text(_) => OpCode::Text,
            Self::Binary(_) => OpCode::Binary,
        }
    }

    /// Returns the payload bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data)
    }
}

impl From<&[u8]> for Payload {
    fn from(data: &[u8]) -> Self {
        Self::Binary(data.to_vec())
    }
}

// ============================================================================
// FrameSink
// ============================================================================

/// Receives events from the decode loop.
pub trait FrameSink {
    /// A complete text message arrived.
    fn text(&mut self, text: String);

    /// A complete binary message arrived.
    fn binary(&mut self, data: Vec<u8>);

    /// A ping arrived; the sink owns the pong reply.
    fn ping(&mut self, payload: Vec<u8>);

    /// The peer sent a close frame. The decode loop ends after this call.
    fn close(&mut self, frame: CloseFrame);
}

// ============================================================================
// FrameCodec
// ============================================================================

/// Encoder and decode loop for client-side frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    /// Upper bound for one inbound message, across all its fragments.
    max_message_size: u64,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl FrameCodec {
    /// Creates a codec with the given inbound message size limit.
    #[inline]
    #[must_use]
    pub const fn new(max_message_size: u64) -> Self {
        Self { max_message_size }
    }

    /// Returns the inbound message size limit.
    #[inline]
    #[must_use]
    pub const fn max_message_size(&self) -> u64 {
        self.max_message_size
    }

    /// Encodes one payload as a single final, masked data frame.
    #[must_use]
    pub fn frame(&self, payload: &Payload) -> Vec<u8> {
        Frame::new(payload.opcode(), payload.as_bytes().to_vec()).encode(rand::random())
    }

    /// Encodes a masked control frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `opcode` is not a control
    /// opcode or the payload exceeds 125 bytes.
    pub fn control(&self, opcode: OpCode, payload: Vec<u8>) -> Result<Vec<u8>> {
        if !opcode.is_control() {
            return Err(Error::invalid_argument(format!(
                "{opcode:?} is not a control opcode"
            )));
        }
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(Error::invalid_argument(format!(
                "control payload of {} bytes exceeds {MAX_CONTROL_PAYLOAD}",
                payload.len()
            )));
        }
        Ok(Frame::new(opcode, payload).encode(rand::random()))
    }

    /// Encodes a close frame.
    #[must_use]
    pub fn close(&self, frame: &CloseFrame) -> Vec<u8> {
        Frame::new(OpCode::Close, frame.to_payload()).encode(rand::random())
    }

    /// Runs the decode loop until the peer closes or decoding fails.
    ///
    /// The reader must be positioned at the first frame byte.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] with `UnexpectedEof`, or another IO error, when the
    ///   stream fails
    /// - [`Error::Protocol`] for any framing violation
    pub async fn start<R, S>(&self, reader: &mut R, sink: &mut S) -> Result<()>
    where
        R: AsyncRead + Unpin,
        S: FrameSink + ?Sized,
    {
        let mut message: Option<(OpCode, Vec<u8>)> = None;

        loop {
            let frame = Frame::read(reader, self.max_message_size).await?;
            trace!(
                opcode = ?frame.opcode,
                fin = frame.fin,
                len = frame.payload.len(),
                "Frame received"
            );

            match frame.opcode {
                OpCode::Text | OpCode::Binary => {
                    if message.is_some() {
                        return Err(Error::protocol(
                            "new data frame while a fragmented message is in progress",
                        ));
                    }
                    if frame.fin {
                        Self::emit(sink, frame.opcode, frame.payload)?;
                    } else {
                        message = Some((frame.opcode, frame.payload));
                    }
                }

                OpCode::Continuation => {
                    let Some((opcode, mut buffer)) = message.take() else {
                        return Err(Error::protocol(
                            "continuation frame without a started message",
                        ));
                    };

                    let total = (buffer.len() + frame.payload.len()) as u64;
                    if total > self.max_message_size {
                        return Err(Error::protocol(format!(
                            "message length {total} exceeds maximum {}",
                            self.max_message_size
                        )));
                    }
                    buffer.extend_from_slice(&frame.payload);

                    if frame.fin {
                        Self::emit(sink, opcode, buffer)?;
                    } else {
                        message = Some((opcode, buffer));
                    }
                }

                OpCode::Ping => sink.ping(frame.payload),

                OpCode::Pong => trace!("Pong received"),

                OpCode::Close => {
                    sink.close(CloseFrame::parse(&frame.payload)?);
                    return Ok(());
                }
            }
        }
    }

    /// Delivers one complete data message.
    fn emit<S>(sink: &mut S, opcode: OpCode, data: Vec<u8>) -> Result<()>
    where
        S: FrameSink + ?Sized,
    {
        if opcode == OpCode::Text {
            let text = String::from_utf8(data)
                .map_err(|e| Error::protocol(format!("invalid UTF-8 in text message: {e}")))?;
            sink.text(text);
        } else {
            sink.binary(data);
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
