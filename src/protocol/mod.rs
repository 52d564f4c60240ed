//! Chat Wire Protocol
//!
//! Length-prefixed binary framing for the client↔chat-server link: a 4-byte
//! header (message id + body length, both big-endian) followed by the body.

mod codec;
mod frame;

pub use codec::FrameDecoder;
pub use frame::{Frame, HEADER_LENGTH, MAX_BODY_LENGTH, READ_BUFFER_SIZE};
