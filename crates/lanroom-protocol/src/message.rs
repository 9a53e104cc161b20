//! The top-level [`Message`] enum: everything that can cross the wire.

use serde::{Deserialize, Serialize};

use crate::types::{
    DestMode, DisconnectReason, MemberInfo, ModerationDenyReason, ModerationKind, RejectReason,
    SessionAddr,
};

/// The room protocol version.
///
/// Carried in [`Message::JoinRequest`] and checked during admission; a
/// mismatch is answered with `JoinRejected { VersionMismatch }`, never
/// silently ignored. Independent of the frame-level [`crate::WIRE_VERSION`]
/// byte, which only changes when the framing itself does.
pub const PROTOCOL_VERSION: u32 = 1;

/// A room protocol message.
///
/// Each variant maps to a fixed frame type byte (see [`Message::kind`]);
/// the payload is the bincode encoding of the variant body. Exhaustive
/// matching over this enum is how both the codec and the room controller
/// dispatch, so adding a variant is a deliberate protocol change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Client to server: request admission to the room.
    JoinRequest {
        nickname: String,
        password: Option<String>,
        /// Unique console/hardware identifier, one of the three ban facets.
        hwid: String,
        client_version: u32,
    },

    /// Server to client: admission granted.
    JoinAccepted {
        /// The session address assigned to the new member.
        addr: SessionAddr,
        /// Snapshot of the full member list, new member included.
        members: Vec<MemberInfo>,
    },

    /// Server to client: admission refused, with the reason.
    JoinRejected { reason: RejectReason },

    /// Server to clients: the member list changed (join, leave, kick,
    /// ban, role change, ownership transfer).
    MemberListUpdate { members: Vec<MemberInfo> },

    /// A chat line. Clients send `sender: None`; the server fills in the
    /// origin before rebroadcasting.
    ChatMessage {
        sender: Option<SessionAddr>,
        text: String,
    },

    /// An opaque game payload to relay. Clients send `sender: None`; the
    /// server stamps the sender's address on the relayed copy. The
    /// `reliable` flag is carried verbatim for the clients' benefit and
    /// not interpreted by the relay.
    GamePacket {
        sender: Option<SessionAddr>,
        dest: DestMode,
        reliable: bool,
        payload: Vec<u8>,
    },

    /// Client to server: a moderation command.
    ModerationCommand { kind: ModerationKind },

    /// Server to client: the moderation command was refused.
    ModerationDenied { reason: ModerationDenyReason },

    /// Client to server: keep-alive probe.
    StatusPing { client_time: u64 },

    /// Server to client: keep-alive answer, echoing the client's clock.
    StatusPong { client_time: u64, server_time: u64 },

    /// Either direction: the connection is going away.
    Disconnect { reason: DisconnectReason },
}

impl Message {
    /// Returns the frame type byte for this message.
    pub fn kind(&self) -> u8 {
        match self {
            Self::JoinRequest { .. } => 0x01,
            Self::JoinAccepted { .. } => 0x02,
            Self::JoinRejected { .. } => 0x03,
            Self::MemberListUpdate { .. } => 0x04,
            Self::ChatMessage { .. } => 0x05,
            Self::GamePacket { .. } => 0x06,
            Self::ModerationCommand { .. } => 0x07,
            Self::ModerationDenied { .. } => 0x08,
            Self::StatusPing { .. } => 0x09,
            Self::StatusPong { .. } => 0x0a,
            Self::Disconnect { .. } => 0x0b,
        }
    }

    /// Returns `true` if `kind` is a known frame type byte.
    pub fn is_known_kind(kind: u8) -> bool {
        (0x01..=0x0b).contains(&kind)
    }
}
