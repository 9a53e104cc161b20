//! Room configuration and lifecycle state machine.

use serde::{Deserialize, Serialize};

use lanroom_protocol::GameInfo;

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration for the room instance.
///
/// Assembled from the configuration store at startup and immutable from
/// then on; there is no hot reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Display name published to the directory.
    pub name: String,

    /// Password required to join, if any. Compared verbatim against the
    /// `JoinRequest`.
    pub password: Option<String>,

    /// The game hosted in this room.
    pub game: GameInfo,

    /// Maximum number of members.
    pub max_members: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            name: "lanroom".to_string(),
            password: None,
            game: GameInfo::default(),
            max_members: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// The lifecycle state of the room.
///
/// ```text
/// Empty ──(first join)──→ Active ──(last leave)──→ Empty
///   │                        │
///   └────────(shutdown)──────┴──→ Closing
/// ```
///
/// - **Empty**: no members. The directory listing, if any, is withdrawn.
/// - **Active**: at least one member; exactly one of them is the owner.
/// - **Closing**: shutdown in progress; every member has been sent
///   `Disconnect { ServerShutdown }` and no further joins are admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    Empty,
    Active,
    Closing,
}

impl RoomState {
    /// Returns `true` if the room is accepting new members.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Empty | Self::Active)
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Active => write!(f, "Active"),
            Self::Closing => write!(f, "Closing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_state_is_joinable() {
        assert!(RoomState::Empty.is_joinable());
        assert!(RoomState::Active.is_joinable());
        assert!(!RoomState::Closing.is_joinable());
    }

    #[test]
    fn test_room_state_display() {
        assert_eq!(RoomState::Empty.to_string(), "Empty");
        assert_eq!(RoomState::Closing.to_string(), "Closing");
    }

    #[test]
    fn test_room_config_default() {
        let config = RoomConfig::default();
        assert_eq!(config.max_members, 16);
        assert!(config.password.is_none());
    }
}
