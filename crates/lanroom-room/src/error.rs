//! Error types for the room layer.

use lanroom_protocol::{FacetKind, ModerationDenyReason, RejectReason, SessionAddr};

/// Why a join request was refused.
///
/// Mirrors the wire-level [`RejectReason`] with the server-side detail
/// (which facet matched, which versions collided) kept for logging.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// The room is at capacity.
    #[error("room is full")]
    RoomFull,

    /// The supplied password does not match the room's.
    #[error("wrong password")]
    BadPassword,

    /// One of the identity's facets matched a ban entry.
    #[error("identity is banned (matched {0})")]
    Banned(FacetKind),

    /// The client speaks a different protocol version.
    #[error("client protocol version {client} does not match server version {server}")]
    VersionMismatch { client: u32, server: u32 },

    /// A live member already uses this nickname.
    #[error("nickname {0:?} is already taken")]
    NameCollision(String),
}

impl AdmissionError {
    /// The reason sent back in `JoinRejected`.
    pub fn reject_reason(&self) -> RejectReason {
        match self {
            Self::RoomFull => RejectReason::RoomFull,
            Self::BadPassword => RejectReason::BadPassword,
            Self::Banned(_) => RejectReason::Banned,
            Self::VersionMismatch { server, .. } => {
                RejectReason::VersionMismatch { server: *server }
            }
            Self::NameCollision(_) => RejectReason::NameCollision,
        }
    }
}

/// Why a moderation command was refused. No state changes on refusal.
#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    /// The issuer is not an owner or moderator, or the target outranks
    /// them.
    #[error("permission denied")]
    PermissionDenied,

    /// No live member holds the target address.
    #[error("no member at {0}")]
    UnknownTarget(SessionAddr),

    /// The requested role cannot be assigned by command.
    #[error("the owner role is assigned by succession only")]
    InvalidRole,
}

impl ModerationError {
    /// The reason sent back in `ModerationDenied`.
    pub fn deny_reason(&self) -> ModerationDenyReason {
        match self {
            Self::PermissionDenied => ModerationDenyReason::PermissionDenied,
            Self::UnknownTarget(_) => ModerationDenyReason::UnknownTarget,
            Self::InvalidRole => ModerationDenyReason::InvalidRole,
        }
    }
}

/// Top-level error for operations through a [`crate::RoomHandle`].
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The join was refused.
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// The moderation command was refused.
    #[error(transparent)]
    Moderation(#[from] ModerationError),

    /// The room's command channel is closed; the controller has shut down.
    #[error("room is unavailable")]
    Unavailable,
}
