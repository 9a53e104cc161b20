//! Core protocol types for lanroom's wire format.
//!
//! Everything here is serialized with bincode into frame payloads, so the
//! field order of these types is part of the wire contract.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A member's stable per-room logical address.
///
/// Issued by the room controller on admission and used as the target of
/// relayed packets. Addresses are never reused while the process lives, so
/// a packet aimed at a departed member can never alias a newcomer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionAddr(pub u32);

impl fmt::Display for SessionAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m-{}", self.0)
    }
}

/// A member's role within the room.
///
/// Exactly one member holds `Owner` while the room is non-empty; the role
/// moves by succession, never by a wire command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Role {
    Owner,
    Moderator,
    #[default]
    Participant,
}

impl Role {
    /// Returns `true` if this role may issue moderation commands.
    pub fn can_moderate(self) -> bool {
        matches!(self, Self::Owner | Self::Moderator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::Moderator => write!(f, "moderator"),
            Self::Participant => write!(f, "participant"),
        }
    }
}

/// Descriptor of the game hosted in the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GameInfo {
    pub title_id: u64,
    pub name: String,
    pub version: String,
}

/// One entry of a member list snapshot.
///
/// Deliberately omits the hardware id and network address; those identity
/// facets stay on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub addr: SessionAddr,
    pub nickname: String,
    pub role: Role,
}

// ---------------------------------------------------------------------------
// Ban facets
// ---------------------------------------------------------------------------

/// The identity attribute a ban entry matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FacetKind {
    Nickname,
    NetAddr,
    Hwid,
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nickname => write!(f, "nickname"),
            Self::NetAddr => write!(f, "net-addr"),
            Self::Hwid => write!(f, "hwid"),
        }
    }
}

/// A concrete banned identity facet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BanFacet {
    pub kind: FacetKind,
    pub value: String,
}

impl fmt::Display for BanFacet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

// ---------------------------------------------------------------------------
// Relay addressing
// ---------------------------------------------------------------------------

/// Where a relayed game packet should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestMode {
    /// Every member except the sender.
    Broadcast,
    /// The single member holding this session address, best-effort.
    Targeted(SessionAddr),
}

// ---------------------------------------------------------------------------
// Reasons
// ---------------------------------------------------------------------------

/// Why a join request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    RoomFull,
    BadPassword,
    Banned,
    /// Carries the server's protocol version so the client can report it.
    VersionMismatch { server: u32 },
    /// The nickname is already taken by a live member.
    NameCollision,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoomFull => write!(f, "room is full"),
            Self::BadPassword => write!(f, "wrong password"),
            Self::Banned => write!(f, "banned"),
            Self::VersionMismatch { server } => {
                write!(f, "server speaks protocol version {server}")
            }
            Self::NameCollision => write!(f, "nickname already taken"),
        }
    }
}

/// Why a member's connection is going away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// The peer asked to leave.
    Leaving,
    Kicked,
    Banned,
    ServerShutdown,
    /// The member's outbound queue overflowed.
    SlowConsumer,
    /// No `JoinRequest` arrived within the handshake window.
    HandshakeTimeout,
    /// The connection went silent past the idle limit.
    Idle,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaving => write!(f, "leaving"),
            Self::Kicked => write!(f, "kicked"),
            Self::Banned => write!(f, "banned"),
            Self::ServerShutdown => write!(f, "server shutdown"),
            Self::SlowConsumer => write!(f, "slow consumer"),
            Self::HandshakeTimeout => write!(f, "handshake timeout"),
            Self::Idle => write!(f, "idle"),
        }
    }
}

// ---------------------------------------------------------------------------
// Moderation
// ---------------------------------------------------------------------------

/// A moderation command issued by an owner or moderator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModerationKind {
    /// Remove a member from the room.
    Kick { target: SessionAddr },
    /// Write a ban entry for the chosen facet of a live member, then
    /// remove them.
    Ban { target: SessionAddr, facet: FacetKind },
    /// Delete a ban entry.
    Unban { facet: BanFacet },
    /// Assign `Moderator` or `Participant`. `Owner` is refused; ownership
    /// moves only by succession.
    ChangeRole { target: SessionAddr, role: Role },
}

/// Why a moderation command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModerationDenyReason {
    PermissionDenied,
    UnknownTarget,
    InvalidRole,
}

impl fmt::Display for ModerationDenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::UnknownTarget => write!(f, "no such member"),
            Self::InvalidRole => write!(f, "role cannot be assigned"),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
