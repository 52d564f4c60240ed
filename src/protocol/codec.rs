//! Incremental frame decoder.
//!
//! A single socket read can carry a partial header, a partial body, one exact
//! frame, or several frames back-to-back, so `feed` loops until the chunk is
//! exhausted and returns every frame it completed along the way.

use bytes::{Bytes, BytesMut};

use super::frame::{Frame, HEADER_LENGTH, MAX_BODY_LENGTH};
use crate::shared::ProtocolError;

/// Decoder state between reads.
#[derive(Debug)]
enum ParseState {
    /// Accumulating the 4-byte header.
    Header { buf: [u8; HEADER_LENGTH], filled: usize },
    /// Header complete; accumulating `body_length` body bytes.
    Body {
        message_id: u16,
        body_length: usize,
        body: BytesMut,
    },
}

impl ParseState {
    fn new() -> Self {
        ParseState::Header {
            buf: [0; HEADER_LENGTH],
            filled: 0,
        }
    }
}

/// Incremental decoder for the length-prefixed chat protocol.
///
/// One decoder per connection; it carries partial-frame state across reads.
/// After a [`ProtocolError`] the decoder must be discarded along with the
/// connection — there is no valid state to continue from.
#[derive(Debug)]
pub struct FrameDecoder {
    state: ParseState,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: ParseState::new(),
        }
    }

    /// Consume one chunk of bytes, returning every frame completed by it.
    ///
    /// A declared body length over [`MAX_BODY_LENGTH`] is a protocol
    /// violation, not a frame; the caller must close the connection.
    pub fn feed(&mut self, mut chunk: &[u8]) -> Result<Vec<Frame>, ProtocolError> {
        let mut frames = Vec::new();

        while !chunk.is_empty() {
            match &mut self.state {
                ParseState::Header { buf, filled } => {
                    let take = (HEADER_LENGTH - *filled).min(chunk.len());
                    buf[*filled..*filled + take].copy_from_slice(&chunk[..take]);
                    *filled += take;
                    chunk = &chunk[take..];

                    if *filled == HEADER_LENGTH {
                        let message_id = u16::from_be_bytes([buf[0], buf[1]]);
                        let body_length = u16::from_be_bytes([buf[2], buf[3]]) as usize;

                        if body_length > MAX_BODY_LENGTH {
                            return Err(ProtocolError::BodyTooLarge {
                                length: body_length,
                                max: MAX_BODY_LENGTH,
                            });
                        }

                        self.state = ParseState::Body {
                            message_id,
                            body_length,
                            body: BytesMut::with_capacity(body_length),
                        };
                    }
                }
                ParseState::Body {
                    message_id,
                    body_length,
                    body,
                } => {
                    let take = (*body_length - body.len()).min(chunk.len());
                    body.extend_from_slice(&chunk[..take]);
                    chunk = &chunk[take..];

                    if body.len() == *body_length {
                        let frame = Frame::new(*message_id, body.split().freeze())
                            .expect("decoded body length already validated");
                        frames.push(frame);
                        self.state = ParseState::new();
                    }
                }
            }
        }

        Ok(frames)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn frame(id: u16, body: &[u8]) -> Frame {
        Frame::new(id, Bytes::copy_from_slice(body)).unwrap()
    }

    #[test]
    fn whole_frame_in_one_chunk() {
        let mut decoder = FrameDecoder::new();
        let sent = frame(1005, b"{\"uid\":\"u1\"}");
        let got = decoder.feed(&sent.encode()).unwrap();
        assert_eq!(got, vec![sent]);
    }

    #[test_case(1; "byte at a time")]
    #[test_case(2; "two bytes")]
    #[test_case(3; "straddles header and body")]
    #[test_case(5; "five bytes")]
    fn split_chunks_reassemble(step: usize) {
        let mut decoder = FrameDecoder::new();
        let sent = frame(42, b"hello world");
        let wire = sent.encode();

        let mut got = Vec::new();
        for piece in wire.chunks(step) {
            got.extend(decoder.feed(piece).unwrap());
        }
        assert_eq!(got, vec![sent]);
    }

    #[test]
    fn two_frames_back_to_back() {
        let mut decoder = FrameDecoder::new();
        let a = frame(1, b"first");
        let b = frame(2, b"second");

        let mut wire = a.encode().to_vec();
        wire.extend_from_slice(&b.encode());

        let got = decoder.feed(&wire).unwrap();
        assert_eq!(got, vec![a, b]);
    }

    #[test]
    fn frame_followed_by_partial_header() {
        let mut decoder = FrameDecoder::new();
        let a = frame(9, b"done");
        let b = frame(10, b"pending");

        let mut wire = a.encode().to_vec();
        let b_wire = b.encode();
        wire.extend_from_slice(&b_wire[..3]);

        let got = decoder.feed(&wire).unwrap();
        assert_eq!(got, vec![a]);

        let got = decoder.feed(&b_wire[3..]).unwrap();
        assert_eq!(got, vec![b]);
    }

    #[test]
    fn empty_body_frame_decodes() {
        let mut decoder = FrameDecoder::new();
        let sent = frame(300, b"");
        let got = decoder.feed(&sent.encode()).unwrap();
        assert_eq!(got, vec![sent]);
    }

    #[test]
    fn oversized_declared_length_is_a_violation() {
        let mut decoder = FrameDecoder::new();
        let length = (MAX_BODY_LENGTH + 1) as u16;
        let mut header = Vec::new();
        header.extend_from_slice(&1u16.to_be_bytes());
        header.extend_from_slice(&length.to_be_bytes());

        let err = decoder.feed(&header).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::BodyTooLarge {
                length: MAX_BODY_LENGTH + 1,
                max: MAX_BODY_LENGTH,
            }
        );
    }

    #[test]
    fn violation_detected_even_when_header_split() {
        let mut decoder = FrameDecoder::new();
        let length = u16::MAX;
        let mut header = Vec::new();
        header.extend_from_slice(&1u16.to_be_bytes());
        header.extend_from_slice(&length.to_be_bytes());

        assert!(decoder.feed(&header[..3]).unwrap().is_empty());
        assert!(decoder.feed(&header[3..]).is_err());
    }
}
