//! Frame type and wire encoding.
//!
//! One frame is a 4-byte header (2-byte big-endian message id, 2-byte
//! big-endian body length) followed by exactly `body length` bytes of opaque
//! body — typically UTF-8 JSON produced by the business-logic layer.

use bytes::{BufMut, Bytes, BytesMut};

use crate::shared::ProtocolError;

/// Maximum allowed frame body length in bytes.
pub const MAX_BODY_LENGTH: usize = 2048;

/// Wire header size: message id (2) + body length (2).
pub const HEADER_LENGTH: usize = 4;

/// Per-session read buffer size.
pub const READ_BUFFER_SIZE: usize = 2048;

/// A complete protocol message.
///
/// The body is `bytes::Bytes` so completed frames can be handed to the
/// dispatcher without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    message_id: u16,
    body: Bytes,
}

impl Frame {
    /// Create a frame, rejecting bodies over [`MAX_BODY_LENGTH`].
    pub fn new(message_id: u16, body: Bytes) -> Result<Self, ProtocolError> {
        if body.len() > MAX_BODY_LENGTH {
            return Err(ProtocolError::BodyTooLarge {
                length: body.len(),
                max: MAX_BODY_LENGTH,
            });
        }
        Ok(Self { message_id, body })
    }

    pub fn message_id(&self) -> u16 {
        self.message_id
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get the body as `Bytes` (cheap, zero-copy).
    pub fn body_bytes(&self) -> Bytes {
        self.body.clone()
    }

    /// Encode header + body into a single contiguous buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LENGTH + self.body.len());
        buf.put_u16(self.message_id);
        buf.put_u16(self.body.len() as u16);
        buf.put_slice(&self.body);
        buf.freeze()
    }
}
