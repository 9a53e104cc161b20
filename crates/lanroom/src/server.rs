//! The server: binds the transport, spawns the room controller and the
//! announcer, and accepts connections until told to stop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lanroom_announce::DirectoryAnnouncer;
use lanroom_banlist::BanRegistry;
use lanroom_room::{RoomHandle, spawn_room};
use lanroom_transport::{TcpTransport, Transport};

use crate::ServerError;
use crate::config::ServerConfig;
use crate::handler::handle_connection;

/// Shared state passed to each connection handler task.
pub(crate) struct ServerState {
    pub(crate) room: RoomHandle,
    pub(crate) handshake_timeout: Duration,
    pub(crate) idle_timeout: Duration,
    pub(crate) outbound_queue_depth: usize,
    /// Monotonic epoch for `StatusPong` server timestamps.
    pub(crate) started: Instant,
}

/// A bound, ready-to-run room server.
pub struct Server {
    transport: TcpTransport,
    state: Arc<ServerState>,
    announcer: Option<DirectoryAnnouncer>,
}

impl Server {
    /// Loads durable state, binds the listener, and spawns the room
    /// controller.
    ///
    /// Failing to bind or to read the ban file is fatal here, before any
    /// client is accepted; a half-working server that silently lost its
    /// ban list must not come up.
    pub async fn start(config: ServerConfig) -> Result<Self, ServerError> {
        let bans = BanRegistry::load(&config.limits.ban_file)?;
        let transport = TcpTransport::bind(&config.bind_addr).await?;

        let room = spawn_room(config.room_config(), bans);

        let announcer = match config.announce_config() {
            Some(announce) => Some(DirectoryAnnouncer::new(announce, room.watch())?),
            None => None,
        };

        let state = Arc::new(ServerState {
            room,
            handshake_timeout: Duration::from_secs(config.limits.handshake_timeout_secs),
            idle_timeout: Duration::from_secs(config.limits.idle_timeout_secs),
            outbound_queue_depth: config.limits.outbound_queue_depth,
            started: Instant::now(),
        });

        Ok(Self {
            transport,
            state,
            announcer,
        })
    }

    /// The address the listener actually bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle to the room, for shutdown and inspection.
    pub fn room(&self) -> RoomHandle {
        self.state.room.clone()
    }

    /// Runs the accept loop until a shutdown signal arrives.
    ///
    /// Each accepted connection gets its own handler task; a connection
    /// failing never affects the loop. On ctrl-c the room is shut down
    /// gracefully (every member is told `ServerShutdown`) and the loop
    /// returns `Ok` for a zero exit.
    pub async fn run(mut self) -> Result<(), ServerError> {
        if let Some(announcer) = self.announcer.take() {
            tokio::spawn(announcer.run());
        }

        tracing::info!("room server running");
        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(handle_connection(conn, state));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received");
                    let _ = self.state.room.shutdown().await;
                    break;
                }
            }
        }

        Ok(())
    }
}
