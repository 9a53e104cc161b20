//! Error types for the protocol layer.
//!
//! A [`DecodeError`] always costs exactly one frame. The transport keeps
//! delivering subsequent frames; it is the caller's policy how many bad
//! frames a peer gets before being disconnected.

/// Errors that can occur while encoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// Serializing the message body failed.
    #[error("encode failed: {0}")]
    Body(bincode::Error),

    /// The encoded body exceeds the frame payload limit.
    #[error("encoded body of {len} bytes exceeds the frame limit")]
    Oversize { len: usize },
}

/// Errors that can occur while decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The buffer is shorter than it claims to be.
    #[error("truncated frame: needed {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    /// The header declares a payload length that disagrees with the
    /// buffer actually presented.
    #[error("declared payload of {declared} bytes, buffer holds {got}")]
    LengthMismatch { declared: usize, got: usize },

    /// The frame carries a framing version this build does not speak.
    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u8),

    /// The frame type byte is not part of the protocol.
    #[error("unknown message kind 0x{0:02x}")]
    UnknownKind(u8),

    /// The declared payload exceeds the frame limit.
    #[error("declared payload of {len} bytes exceeds the frame limit")]
    Oversize { len: usize },

    /// Deserializing the message body failed.
    #[error("decode failed: {0}")]
    Body(bincode::Error),

    /// The type byte and the decoded body disagree.
    #[error("kind byte 0x{header:02x} does not match decoded body 0x{body:02x}")]
    KindMismatch { header: u8, body: u8 },
}
