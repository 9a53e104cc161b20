//! Room lifecycle, membership, and packet relay for lanroom.
//!
//! The room runs as an isolated tokio task (actor model) owning the
//! membership table and the ban registry; every mutation of room state
//! flows through its command channel one at a time. Game packets take a
//! faster path: the [`RelayEngine`] fans frames out to per-member queues
//! under a shared routing table, without queueing behind membership
//! commands.
//!
//! # Key types
//!
//! - [`spawn_room`] starts the controller task
//! - [`RoomHandle`] sends commands to the running room
//! - [`RelayEngine`] forwards opaque game frames between members
//! - [`RoomConfig`] / [`RoomState`] hold room settings and lifecycle
//! - [`RoomSnapshot`] is what the directory announcer sees

mod config;
mod controller;
mod error;
mod member;
mod relay;

pub use config::{RoomConfig, RoomState};
pub use controller::{JoinGrant, RoomHandle, RoomSnapshot, spawn_room};
pub use error::{AdmissionError, ModerationError, RoomError};
pub use member::{JoinIdentity, MemberSender};
pub use relay::RelayEngine;
