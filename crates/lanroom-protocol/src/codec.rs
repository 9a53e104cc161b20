//! Frame codec: `[version:1][type:1][length:4 BE][payload]`.
//!
//! The payload is the bincode encoding of the whole [`Message`]; the type
//! byte exists so a router can dispatch without deserializing, and decode
//! verifies the two agree. A malformed frame yields a [`DecodeError`] and
//! nothing else; the surrounding stream stays usable.

use lanroom_transport::{FRAME_HEADER_LEN, FRAME_LEN_OFFSET, MAX_FRAME_PAYLOAD};

use crate::error::{DecodeError, EncodeError};
use crate::message::Message;

/// The framing version written into every frame header.
pub const WIRE_VERSION: u8 = 1;

/// A parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub kind: u8,
    pub len: u32,
}

impl FrameHeader {
    /// Parses and validates the fixed header at the front of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < FRAME_HEADER_LEN {
            return Err(DecodeError::Truncated {
                needed: FRAME_HEADER_LEN,
                got: buf.len(),
            });
        }

        let version = buf[0];
        if version != WIRE_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let kind = buf[1];
        if !Message::is_known_kind(kind) {
            return Err(DecodeError::UnknownKind(kind));
        }

        let len = u32::from_be_bytes([
            buf[FRAME_LEN_OFFSET],
            buf[FRAME_LEN_OFFSET + 1],
            buf[FRAME_LEN_OFFSET + 2],
            buf[FRAME_LEN_OFFSET + 3],
        ]);
        if len as usize > MAX_FRAME_PAYLOAD {
            return Err(DecodeError::Oversize { len: len as usize });
        }

        Ok(Self { version, kind, len })
    }
}

/// Encodes a message into a complete wire frame.
pub fn encode(msg: &Message) -> Result<Vec<u8>, EncodeError> {
    let body = bincode::serialize(msg).map_err(EncodeError::Body)?;
    if body.len() > MAX_FRAME_PAYLOAD {
        return Err(EncodeError::Oversize { len: body.len() });
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.push(WIRE_VERSION);
    frame.push(msg.kind());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decodes a complete wire frame back into a message.
pub fn decode(frame: &[u8]) -> Result<Message, DecodeError> {
    let header = FrameHeader::parse(frame)?;

    let body = &frame[FRAME_HEADER_LEN..];
    if body.len() != header.len as usize {
        return Err(DecodeError::LengthMismatch {
            declared: header.len as usize,
            got: body.len(),
        });
    }

    let msg: Message = bincode::deserialize(body).map_err(DecodeError::Body)?;
    if msg.kind() != header.kind {
        return Err(DecodeError::KindMismatch {
            header: header.kind,
            body: msg.kind(),
        });
    }

    Ok(msg)
}

// =========================================================================
// Tests
// =========================================================================
