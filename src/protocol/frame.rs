//! WebSocket frame primitives (RFC 6455 Section 5.2-5.3).
//!
//! Client frames are always masked; server frames are expected unmasked but
//! are unmasked leniently when the MASK bit is set.
//!
//! - [`Frame::read`]: Parse a single frame from an async byte stream
//! - [`Frame::encode`]: Serialize a masked client frame
//! - [`apply_mask`]: Symmetric XOR masking

// ============================================================================
// Imports
// ============================================================================

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

// ============================================================================
// OpCode
// ============================================================================

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Continuation of a fragmented message.
    Continuation = 0x0,
    /// UTF-8 text data.
    Text = 0x1,
    /// Binary data.
    Binary = 0x2,
    /// Connection close.
    Close = 0x8,
    /// Ping.
    Ping = 0x9,
    /// Pong.
    Pong = 0xA,
}

impl OpCode {
    /// Parses the low 4 bits of the first header byte.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for reserved opcodes.
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            _ => Err(Error::protocol(format!("unknown opcode: 0x{byte:X}"))),
        }
    }

    /// Returns `true` for close, ping and pong.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

// ============================================================================
// Frame
// ============================================================================

/// A single decoded or to-be-encoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment of a message.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Unmasked payload.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a final (unfragmented) frame.
    #[inline]
    #[must_use]
    pub fn new(opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin: true,
            opcode,
            payload,
        }
    }

    /// Serializes the frame with the given masking key.
    #[must_use]
    pub fn encode(&self, mask: [u8; 4]) -> Vec<u8> {
        let len = self.payload.len();
        let mut out = Vec::with_capacity(len + 14);

        let fin = if self.fin { 0x80 } else { 0x00 };
        out.push(fin | self.opcode as u8);

        if len <= 125 {
            out.push(0x80 | len as u8);
        } else if len <= usize::from(u16::MAX) {
            out.push(0x80 | 126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            out.push(0x80 | 127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }

        out.extend_from_slice(&mask);
        let start = out.len();
        out.extend_from_slice(&self.payload);
        apply_mask(&mut out[start..], &mask);
        out
    }

    /// Reads one frame from the stream.
    ///
    /// Reads exactly the bytes of one frame and nothing more.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] with `UnexpectedEof` if the stream ends mid-frame
    /// - [`Error::Protocol`] for RSV bits, reserved opcodes, malformed
    ///   control frames or payloads over `max_payload`
    pub async fn read<R>(reader: &mut R, max_payload: u64) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; 2];
        reader.read_exact(&mut header).await?;

        let fin = header[0] & 0x80 != 0;
        if header[0] & 0x70 != 0 {
            return Err(Error::protocol(
                "non-zero RSV bits without negotiated extensions",
            ));
        }
        let opcode = OpCode::from_u8(header[0] & 0x0F)?;

        let masked = header[1] & 0x80 != 0;
        let payload_len = match header[1] & 0x7F {
            126 => u64::from(reader.read_u16().await?),
            127 => {
                let len = reader.read_u64().await?;
                if len >> 63 != 0 {
                    return Err(Error::protocol("MSB of 64-bit length must be 0"));
                }
                len
            }
            len => u64::from(len),
        };

        if opcode.is_control() {
            if !fin {
                return Err(Error::protocol("fragmented control frame"));
            }
            if payload_len > MAX_CONTROL_PAYLOAD as u64 {
                return Err(Error::protocol(format!(
                    "control frame payload of {payload_len} bytes"
                )));
            }
        }
        if payload_len > max_payload {
            return Err(Error::protocol(format!(
                "payload length {payload_len} exceeds maximum {max_payload}"
            )));
        }

        let mask = if masked {
            let mut key = [0u8; 4];
            reader.read_exact(&mut key).await?;
            Some(key)
        } else {
            None
        };

        let mut payload = vec![0u8; payload_len as usize];
        reader.read_exact(&mut payload).await?;

        if let Some(key) = mask {
            apply_mask(&mut payload, &key);
        }

        Ok(Self {
            fin,
            opcode,
            payload,
        })
    }
}

// ============================================================================
// CloseFrame
// ============================================================================

/// Status code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloseFrame {
    /// Close status code, `0` when the peer sent none.
    pub code: u16,
    /// Close reason, empty when the peer sent none.
    pub reason: String,
}

impl CloseFrame {
    /// Creates a close frame body.
    #[inline]
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Decodes a close payload.
    ///
    /// A one-byte payload is malformed; the reason is decoded lossily.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        match payload {
            [] => Ok(Self::default()),
            [_] => Err(Error::protocol("close frame payload of 1 byte")),
            [hi, lo, reason @ ..] => Ok(Self {
                code: u16::from_be_bytes([*hi, *lo]),
                reason: String::from_utf8_lossy(reason).into_owned(),
            }),
        }
    }

    /// Encodes the close payload, empty when `code` is `0`.
    ///
    /// The reason is cut at a character boundary so the payload fits a
    /// control frame.
    #[must_use]
    pub fn to_payload(&self) -> Vec<u8> {
        if self.code == 0 {
            return Vec::new();
        }

        let mut reason_len = self.reason.len().min(MAX_CONTROL_PAYLOAD - 2);
        while !self.reason.is_char_boundary(reason_len) {
            reason_len -= 1;
        }

        let mut payload = Vec::with_capacity(2 + reason_len);
        payload.extend_from_slice(&self.code.to_be_bytes());
        payload.extend_from_slice(&self.reason.as_bytes()[..reason_len]);
        payload
    }
}

// ============================================================================
// Masking
// ============================================================================

/// Applies or removes the 4-byte XOR mask in place.
pub fn apply_mask(payload: &mut [u8], mask: &[u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

// ============================================================================
// Tests
// ============================================================================
