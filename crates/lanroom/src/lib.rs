//! # lanroom
//!
//! A standalone multiplayer room server for emulator netplay: players
//! join one shared room over framed TCP, the server relays their opaque
//! game traffic between them, enforces moderation and a durable ban list,
//! and periodically announces the room to a public directory.
//!
//! The layers live in their own crates (`lanroom-transport`,
//! `lanroom-protocol`, `lanroom-banlist`, `lanroom-room`,
//! `lanroom-announce`); this crate wires them together into a runnable
//! server.

mod config;
mod error;
mod handler;
mod server;

pub use config::{ConfigError, ServerConfig};
pub use error::ServerError;
pub use server::Server;
