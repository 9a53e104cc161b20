//! Per-connection handler: handshake, then independent read and write
//! paths.
//!
//! Each accepted connection gets one task running [`handle_connection`].
//! The flow is:
//!   1. Wait (bounded) for `JoinRequest`, run admission through the room
//!      controller, answer `JoinAccepted` or `JoinRejected`.
//!   2. Spawn a writer task draining the member's bounded outbound queue.
//!   3. Loop on the read path: game packets go straight to the relay
//!      engine, everything else goes through the controller.
//!
//! A member's removal, however it happens (leave, kick, ban, slow
//! consumer, shutdown), closes the outbound queue; the writer drains the
//! final frames (the `Disconnect` notice among them) and closes the
//! socket, which in turn ends the read path.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::timeout;

use lanroom_protocol::{DisconnectReason, Message, SessionAddr, decode, encode};
use lanroom_room::{JoinIdentity, RoomError};
use lanroom_transport::{Connection, TcpConnection};

use crate::server::ServerState;

/// How many undecodable or out-of-place frames a connection may produce
/// before it is cut off. One bad frame is dropped and forgiven.
const MAX_PROTOCOL_STRIKES: u32 = 8;

pub(crate) async fn handle_connection(conn: TcpConnection, state: Arc<ServerState>) {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    let Some((addr, outbound_rx)) = perform_handshake(&conn, &state).await else {
        let _ = conn.close().await;
        return;
    };
    tracing::info!(%conn_id, %addr, "member connected");

    let writer = tokio::spawn(write_loop(Arc::clone(&conn), outbound_rx));

    tokio::select! {
        _ = read_loop(&conn, &state, addr) => {}
        // The writer finishing means the member was removed (queue
        // closed) or the socket died; stop reading on their behalf.
        _ = writer => {}
    }

    // Idempotent: the controller ignores addresses that are already gone.
    let _ = state.room.leave(addr, DisconnectReason::Leaving).await;
    let _ = conn.close().await;
    tracing::debug!(%conn_id, %addr, "connection finished");
}

/// Performs the join handshake. Returns the assigned address and the
/// receiving end of the member's outbound queue, or `None` if the
/// connection never became a member (rejection frames are already sent).
async fn perform_handshake(
    conn: &Arc<TcpConnection>,
    state: &Arc<ServerState>,
) -> Option<(SessionAddr, mpsc::Receiver<Vec<u8>>)> {
    let conn_id = conn.id();

    let frame = match timeout(state.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(frame))) => frame,
        Ok(Ok(None)) => {
            tracing::debug!(%conn_id, "closed before handshake");
            return None;
        }
        Ok(Err(e)) => {
            tracing::debug!(%conn_id, error = %e, "transport error during handshake");
            return None;
        }
        Err(_) => {
            tracing::info!(%conn_id, "handshake timed out");
            send_best_effort(
                conn,
                &Message::Disconnect {
                    reason: DisconnectReason::HandshakeTimeout,
                },
            )
            .await;
            return None;
        }
    };

    let msg = match decode(&frame) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(%conn_id, error = %e, "undecodable handshake frame");
            return None;
        }
    };
    let Message::JoinRequest {
        nickname,
        password,
        hwid,
        client_version,
    } = msg
    else {
        tracing::debug!(%conn_id, "first frame was not a JoinRequest");
        return None;
    };

    let identity = JoinIdentity {
        nickname,
        password,
        hwid,
        net_addr: conn.peer_addr().ip(),
        client_version,
    };
    let (outbound_tx, outbound_rx) = mpsc::channel(state.outbound_queue_depth);

    match state.room.join(identity, outbound_tx).await {
        Ok(grant) => {
            let accepted = Message::JoinAccepted {
                addr: grant.addr,
                members: grant.members,
            };
            let Ok(frame) = encode(&accepted) else {
                let _ = state.room.leave(grant.addr, DisconnectReason::Leaving).await;
                return None;
            };
            if conn.send(&frame).await.is_err() {
                let _ = state.room.leave(grant.addr, DisconnectReason::Leaving).await;
                return None;
            }
            Some((grant.addr, outbound_rx))
        }
        Err(RoomError::Admission(e)) => {
            tracing::info!(%conn_id, reason = %e, "join rejected");
            send_best_effort(
                conn,
                &Message::JoinRejected {
                    reason: e.reject_reason(),
                },
            )
            .await;
            None
        }
        Err(e) => {
            tracing::debug!(%conn_id, error = %e, "join failed");
            None
        }
    }
}

/// The read path: decodes frames and routes them until the connection or
/// the membership ends.
async fn read_loop(conn: &Arc<TcpConnection>, state: &Arc<ServerState>, addr: SessionAddr) {
    let mut strikes: u32 = 0;

    loop {
        let frame = match timeout(state.idle_timeout, conn.recv()).await {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => {
                tracing::debug!(%addr, "connection closed by peer");
                let _ = state.room.leave(addr, DisconnectReason::Leaving).await;
                return;
            }
            Ok(Err(e)) => {
                tracing::debug!(%addr, error = %e, "transport error");
                let _ = state.room.leave(addr, DisconnectReason::Leaving).await;
                return;
            }
            Err(_) => {
                tracing::info!(%addr, "idle timeout");
                let _ = state.room.leave(addr, DisconnectReason::Idle).await;
                return;
            }
        };

        let msg = match decode(&frame) {
            Ok(msg) => msg,
            Err(e) => {
                // One malformed frame costs the frame, not the stream.
                strikes += 1;
                tracing::debug!(%addr, error = %e, strikes, "dropping malformed frame");
                if strikes >= MAX_PROTOCOL_STRIKES {
                    tracing::warn!(%addr, "too many protocol errors, disconnecting");
                    let _ = state.room.leave(addr, DisconnectReason::Leaving).await;
                    return;
                }
                continue;
            }
        };

        let kind = msg.kind();
        match msg {
            Message::GamePacket {
                dest,
                reliable,
                payload,
                ..
            } => {
                // Stamp the true sender and fan out without touching the
                // controller's command queue.
                let relayed = Message::GamePacket {
                    sender: Some(addr),
                    dest,
                    reliable,
                    payload,
                };
                match encode(&relayed) {
                    Ok(frame) => {
                        let stalled = state.room.relay().relay(addr, dest, frame).await;
                        for victim in stalled {
                            tracing::warn!(
                                %victim,
                                "outbound queue overflow, disconnecting slow consumer"
                            );
                            let _ = state
                                .room
                                .leave(victim, DisconnectReason::SlowConsumer)
                                .await;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(%addr, error = %e, "failed to encode relayed packet");
                    }
                }
            }

            Message::ChatMessage { text, .. } => {
                let _ = state.room.chat(addr, text).await;
            }

            Message::ModerationCommand { kind } => {
                if let Err(RoomError::Moderation(e)) = state.room.moderation(addr, kind).await {
                    send_best_effort(
                        conn,
                        &Message::ModerationDenied {
                            reason: e.deny_reason(),
                        },
                    )
                    .await;
                }
            }

            Message::StatusPing { client_time } => {
                let pong = Message::StatusPong {
                    client_time,
                    server_time: state.started.elapsed().as_millis() as u64,
                };
                send_best_effort(conn, &pong).await;
            }

            Message::Disconnect { .. } => {
                tracing::debug!(%addr, "member leaving");
                let _ = state.room.leave(addr, DisconnectReason::Leaving).await;
                return;
            }

            // Server-to-client messages have no business arriving here.
            Message::JoinRequest { .. }
            | Message::JoinAccepted { .. }
            | Message::JoinRejected { .. }
            | Message::MemberListUpdate { .. }
            | Message::ModerationDenied { .. }
            | Message::StatusPong { .. } => {
                strikes += 1;
                tracing::debug!(%addr, kind, strikes, "unexpected message");
                if strikes >= MAX_PROTOCOL_STRIKES {
                    let _ = state.room.leave(addr, DisconnectReason::Leaving).await;
                    return;
                }
            }
        }
    }
}

/// The write path: drains the member's outbound queue onto the socket.
///
/// Ends when the controller drops the member's sender or the socket
/// fails, then closes the connection so the read path unblocks too.
async fn write_loop(conn: Arc<TcpConnection>, mut outbound: mpsc::Receiver<Vec<u8>>) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = conn.send(&frame).await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "send failed");
            break;
        }
    }
    let _ = conn.close().await;
}

/// Sends a frame, ignoring failures; used on paths where the connection
/// is already on its way out.
async fn send_best_effort(conn: &Arc<TcpConnection>, msg: &Message) {
    if let Ok(frame) = encode(msg) {
        let _ = conn.send(&frame).await;
    }
}
