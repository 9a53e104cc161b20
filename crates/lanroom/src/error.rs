//! Unified error type for the server binary.

use lanroom_announce::AnnounceError;
use lanroom_banlist::StorageError;
use lanroom_room::RoomError;
use lanroom_transport::TransportError;

use crate::config::ConfigError;

/// Top-level error that wraps the layer-specific errors.
///
/// Only the errors that can reach `main` live here: configuration, bind
/// and ban-registry initialization failures are process-fatal; everything
/// else is handled (and isolated per connection) long before this type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configuration file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A transport-level error (bind, accept).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Ban registry initialization failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A room-level error.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The directory announcer could not be constructed.
    #[error(transparent)]
    Announce(#[from] AnnounceError),
}
