//! Wire protocol for lanroom.
//!
//! This crate defines the language that room clients and the server speak:
//!
//! - **Types** ([`Message`], [`SessionAddr`], [`Role`], [`RejectReason`],
//!   etc.) are the structures that travel on the wire.
//! - **Codec** ([`encode`], [`decode`], [`FrameHeader`]) converts between
//!   those types and `[version:1][type:1][length:4][payload]` frames.
//! - **Errors** ([`EncodeError`], [`DecodeError`]) cover what can go wrong
//!   at this layer; a `DecodeError` costs the caller one frame, never the
//!   whole stream.
//!
//! The protocol layer sits between transport (raw frames) and the room
//! controller (membership and relay decisions). It does not know about
//! connections or members, only bytes and messages.

mod codec;
mod error;
mod message;
mod types;

pub use codec::{FrameHeader, WIRE_VERSION, decode, encode};
pub use error::{DecodeError, EncodeError};
pub use message::{Message, PROTOCOL_VERSION};
pub use types::{
    BanFacet, DestMode, DisconnectReason, FacetKind, GameInfo, MemberInfo, ModerationDenyReason,
    ModerationKind, RejectReason, Role, SessionAddr,
};
