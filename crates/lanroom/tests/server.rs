//! End-to-end tests: a real server on a real socket, driven by raw TCP
//! clients speaking the wire protocol.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use lanroom::{Server, ServerConfig};
use lanroom_protocol::{
    DestMode, DisconnectReason, FacetKind, MemberInfo, Message, ModerationDenyReason,
    ModerationKind, PROTOCOL_VERSION, RejectReason, Role, SessionAddr, decode, encode,
};
use lanroom_room::RoomHandle;

// =========================================================================
// Harness
// =========================================================================

struct TestServer {
    addr: SocketAddr,
    room: RoomHandle,
    // Holds the ban file until the test ends.
    _dir: tempfile::TempDir,
}

/// Starts a server on an ephemeral port with a throwaway ban file.
async fn start_server(configure: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServerConfig::default();
    config.bind_addr = "127.0.0.1:0".into();
    config.room.name = "Test".into();
    config.room.max_members = 4;
    config.limits.ban_file = dir.path().join("bans.json");
    configure(&mut config);

    let server = Server::start(config).await.expect("server should start");
    let addr = server.local_addr().unwrap();
    let room = server.room();
    tokio::spawn(server.run());

    TestServer {
        addr,
        room,
        _dir: dir,
    }
}

struct Client {
    stream: TcpStream,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        Self { stream }
    }

    async fn send(&mut self, msg: &Message) {
        let frame = encode(msg).expect("encode");
        self.stream.write_all(&frame).await.expect("write");
    }

    /// Reads the next message; `None` on EOF.
    async fn recv(&mut self) -> Option<Message> {
        let mut header = [0u8; 6];
        match tokio::time::timeout(Duration::from_secs(2), self.stream.read_exact(&mut header))
            .await
            .expect("timed out waiting for a frame")
        {
            Ok(_) => {}
            Err(_) => return None,
        }
        let len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
        let mut frame = vec![0u8; 6 + len];
        frame[..6].copy_from_slice(&header);
        self.stream
            .read_exact(&mut frame[6..])
            .await
            .expect("read body");
        Some(decode(&frame).expect("decode"))
    }

    /// Receives messages until one matches `pick`.
    async fn recv_until<T>(&mut self, mut pick: impl FnMut(Message) -> Option<T>) -> T {
        loop {
            let msg = self.recv().await.expect("connection closed while waiting");
            if let Some(value) = pick(msg) {
                return value;
            }
        }
    }

    /// Expects no frame to arrive within a short window.
    async fn expect_silence(&mut self) {
        let mut byte = [0u8; 1];
        let result =
            tokio::time::timeout(Duration::from_millis(200), self.stream.read_exact(&mut byte))
                .await;
        assert!(result.is_err(), "expected silence, got data");
    }

    /// Connects and joins, asserting acceptance.
    async fn join(addr: SocketAddr, nickname: &str, hwid: &str) -> (Self, SessionAddr, Vec<MemberInfo>) {
        Self::join_with(addr, nickname, hwid, None).await
    }

    async fn join_with(
        addr: SocketAddr,
        nickname: &str,
        hwid: &str,
        password: Option<&str>,
    ) -> (Self, SessionAddr, Vec<MemberInfo>) {
        let mut client = Self::connect(addr).await;
        client
            .send(&Message::JoinRequest {
                nickname: nickname.into(),
                password: password.map(Into::into),
                hwid: hwid.into(),
                client_version: PROTOCOL_VERSION,
            })
            .await;
        match client.recv().await.expect("join reply") {
            Message::JoinAccepted { addr, members } => (client, addr, members),
            other => panic!("expected JoinAccepted, got {other:?}"),
        }
    }
}

// =========================================================================
// Joining
// =========================================================================

#[tokio::test]
async fn test_first_join_becomes_owner() {
    let server = start_server(|_| {}).await;

    let (_client, addr, members) = Client::join(server.addr, "alice", "hw-a").await;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].addr, addr);
    assert_eq!(members[0].nickname, "alice");
    assert_eq!(members[0].role, Role::Owner);
}

#[tokio::test]
async fn test_second_join_updates_the_first() {
    let server = start_server(|_| {}).await;

    let (mut alice, _, _) = Client::join(server.addr, "alice", "hw-a").await;
    let (_bob, bob_addr, bob_members) = Client::join(server.addr, "bob", "hw-b").await;
    assert_eq!(bob_members.len(), 2);

    let members = alice
        .recv_until(|msg| match msg {
            Message::MemberListUpdate { members } => Some(members),
            _ => None,
        })
        .await;
    assert_eq!(members.len(), 2);
    assert!(members.iter().any(|m| m.addr == bob_addr));
}

#[tokio::test]
async fn test_version_mismatch_is_rejected_with_reason() {
    let server = start_server(|_| {}).await;

    let mut client = Client::connect(server.addr).await;
    client
        .send(&Message::JoinRequest {
            nickname: "oldtimer".into(),
            password: None,
            hwid: "hw-o".into(),
            client_version: PROTOCOL_VERSION + 7,
        })
        .await;

    match client.recv().await.expect("reply") {
        Message::JoinRejected {
            reason: RejectReason::VersionMismatch { server },
        } => assert_eq!(server, PROTOCOL_VERSION),
        other => panic!("expected a version mismatch rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let server = start_server(|config| {
        config.room.password = Some("sesame".into());
    })
    .await;

    let mut client = Client::connect(server.addr).await;
    client
        .send(&Message::JoinRequest {
            nickname: "alice".into(),
            password: Some("guess".into()),
            hwid: "hw-a".into(),
            client_version: PROTOCOL_VERSION,
        })
        .await;
    match client.recv().await.expect("reply") {
        Message::JoinRejected {
            reason: RejectReason::BadPassword,
        } => {}
        other => panic!("expected BadPassword, got {other:?}"),
    }

    // The listener stays open; the right password gets in.
    Client::join_with(server.addr, "alice", "hw-a", Some("sesame")).await;
}

#[tokio::test]
async fn test_handshake_timeout_disconnects() {
    let server = start_server(|config| {
        config.limits.handshake_timeout_secs = 1;
    })
    .await;

    let mut client = Client::connect(server.addr).await;
    // Say nothing.
    match client.recv().await {
        Some(Message::Disconnect {
            reason: DisconnectReason::HandshakeTimeout,
        }) => {}
        other => panic!("expected a handshake timeout notice, got {other:?}"),
    }
    assert!(client.recv().await.is_none(), "connection should be closed");
}

// =========================================================================
// Relay
// =========================================================================

#[tokio::test]
async fn test_broadcast_reaches_everyone_but_the_sender_in_order() {
    let server = start_server(|_| {}).await;
    let (mut alice, alice_addr, _) = Client::join(server.addr, "alice", "hw-a").await;
    let (mut bob, _, _) = Client::join(server.addr, "bob", "hw-b").await;
    let (mut carol, _, _) = Client::join(server.addr, "carol", "hw-c").await;

    for payload in [b"one".to_vec(), b"two".to_vec()] {
        alice
            .send(&Message::GamePacket {
                sender: None,
                dest: DestMode::Broadcast,
                reliable: true,
                payload,
            })
            .await;
    }

    for receiver in [&mut bob, &mut carol] {
        for expected in [b"one".to_vec(), b"two".to_vec()] {
            let (sender, payload) = receiver
                .recv_until(|msg| match msg {
                    Message::GamePacket {
                        sender, payload, ..
                    } => Some((sender, payload)),
                    _ => None,
                })
                .await;
            assert_eq!(sender, Some(alice_addr), "server stamps the origin");
            assert_eq!(payload, expected, "per-sender order is preserved");
        }
    }

    // Drain alice's join-time updates; after that her own broadcast must
    // not come back to her.
    let _ = alice
        .recv_until(|msg| match msg {
            Message::MemberListUpdate { members } if members.len() == 3 => Some(()),
            _ => None,
        })
        .await;
    alice.expect_silence().await;
}

#[tokio::test]
async fn test_targeted_packet_reaches_only_the_target() {
    let server = start_server(|_| {}).await;
    let (mut alice, _, _) = Client::join(server.addr, "alice", "hw-a").await;
    let (mut bob, _, _) = Client::join(server.addr, "bob", "hw-b").await;
    let (mut carol, carol_addr, _) = Client::join(server.addr, "carol", "hw-c").await;

    alice
        .send(&Message::GamePacket {
            sender: None,
            dest: DestMode::Targeted(carol_addr),
            reliable: false,
            payload: b"psst".to_vec(),
        })
        .await;

    let payload = carol
        .recv_until(|msg| match msg {
            Message::GamePacket { payload, .. } => Some(payload),
            _ => None,
        })
        .await;
    assert_eq!(payload, b"psst");

    // Drain bob's join-time updates, then expect nothing more.
    let _ = bob
        .recv_until(|msg| match msg {
            Message::MemberListUpdate { members } if members.len() == 3 => Some(()),
            _ => None,
        })
        .await;
    bob.expect_silence().await;
}

#[tokio::test]
async fn test_chat_is_stamped_with_the_sender() {
    let server = start_server(|_| {}).await;
    let (mut alice, _, _) = Client::join(server.addr, "alice", "hw-a").await;
    let (mut bob, bob_addr, _) = Client::join(server.addr, "bob", "hw-b").await;

    bob.send(&Message::ChatMessage {
        sender: None,
        text: "good game".into(),
    })
    .await;

    let (sender, text) = alice
        .recv_until(|msg| match msg {
            Message::ChatMessage { sender, text } => Some((sender, text)),
            _ => None,
        })
        .await;
    assert_eq!(sender, Some(bob_addr));
    assert_eq!(text, "good game");
}

#[tokio::test]
async fn test_status_ping_pong() {
    let server = start_server(|_| {}).await;
    let (mut alice, _, _) = Client::join(server.addr, "alice", "hw-a").await;

    alice.send(&Message::StatusPing { client_time: 424242 }).await;
    let echoed = alice
        .recv_until(|msg| match msg {
            Message::StatusPong { client_time, .. } => Some(client_time),
            _ => None,
        })
        .await;
    assert_eq!(echoed, 424242);
}

// =========================================================================
// Moderation
// =========================================================================

#[tokio::test]
async fn test_kick_scenario_end_to_end() {
    let server = start_server(|_| {}).await;
    let (mut owner, _, _) = Client::join(server.addr, "owner", "hw-o").await;
    let (mut member2, member2_addr, _) = Client::join(server.addr, "member2", "hw-2").await;

    // The owner learns member2's address from the update broadcast.
    let _ = owner
        .recv_until(|msg| match msg {
            Message::MemberListUpdate { members } if members.len() == 2 => Some(()),
            _ => None,
        })
        .await;

    owner
        .send(&Message::ModerationCommand {
            kind: ModerationKind::Kick {
                target: member2_addr,
            },
        })
        .await;

    // member2 receives the typed reason, then the socket closes.
    let reason = member2
        .recv_until(|msg| match msg {
            Message::Disconnect { reason } => Some(reason),
            _ => None,
        })
        .await;
    assert_eq!(reason, DisconnectReason::Kicked);
    assert!(member2.recv().await.is_none());

    // The owner sees the shrunken member list.
    let members = owner
        .recv_until(|msg| match msg {
            Message::MemberListUpdate { members } if members.len() == 1 => Some(members),
            _ => None,
        })
        .await;
    assert_eq!(members[0].nickname, "owner");

    // Kicked, not banned: the same hardware id may rejoin.
    Client::join(server.addr, "member2", "hw-2").await;
}

#[tokio::test]
async fn test_moderation_from_participant_is_denied() {
    let server = start_server(|_| {}).await;
    let (_owner, owner_addr, _) = Client::join(server.addr, "owner", "hw-o").await;
    let (mut peon, _, _) = Client::join(server.addr, "peon", "hw-p").await;

    peon.send(&Message::ModerationCommand {
        kind: ModerationKind::Kick { target: owner_addr },
    })
    .await;

    let reason = peon
        .recv_until(|msg| match msg {
            Message::ModerationDenied { reason } => Some(reason),
            _ => None,
        })
        .await;
    assert_eq!(reason, ModerationDenyReason::PermissionDenied);
}

#[tokio::test]
async fn test_ban_survives_a_server_restart() {
    let dir = tempfile::tempdir().unwrap();
    let ban_file = dir.path().join("bans.json");

    let make_config = |ban_file: std::path::PathBuf| {
        move |config: &mut ServerConfig| {
            config.limits.ban_file = ban_file.clone();
        }
    };

    // First life: the owner bans a member by hardware id.
    {
        let server = start_server(make_config(ban_file.clone())).await;
        let (mut owner, _, _) = Client::join(server.addr, "owner", "hw-o").await;
        let (mut cheater, cheater_addr, _) =
            Client::join(server.addr, "cheater", "hw-cheat").await;

        let _ = owner
            .recv_until(|msg| match msg {
                Message::MemberListUpdate { members } if members.len() == 2 => Some(()),
                _ => None,
            })
            .await;
        owner
            .send(&Message::ModerationCommand {
                kind: ModerationKind::Ban {
                    target: cheater_addr,
                    facet: FacetKind::Hwid,
                },
            })
            .await;
        let reason = cheater
            .recv_until(|msg| match msg {
                Message::Disconnect { reason } => Some(reason),
                _ => None,
            })
            .await;
        assert_eq!(reason, DisconnectReason::Banned);

        server.room.shutdown().await.unwrap();
    }

    // Second life: the ban was read back from disk.
    let server = start_server(make_config(ban_file)).await;
    let mut client = Client::connect(server.addr).await;
    client
        .send(&Message::JoinRequest {
            nickname: "innocent".into(),
            password: None,
            hwid: "hw-cheat".into(),
            client_version: PROTOCOL_VERSION,
        })
        .await;
    match client.recv().await.expect("reply") {
        Message::JoinRejected {
            reason: RejectReason::Banned,
        } => {}
        other => panic!("expected Banned, got {other:?}"),
    }
}

// =========================================================================
// Shutdown
// =========================================================================

#[tokio::test]
async fn test_shutdown_notifies_members_before_teardown() {
    let server = start_server(|_| {}).await;
    let (mut alice, _, _) = Client::join(server.addr, "alice", "hw-a").await;
    let (mut bob, _, _) = Client::join(server.addr, "bob", "hw-b").await;

    server.room.shutdown().await.unwrap();

    for client in [&mut alice, &mut bob] {
        let reason = client
            .recv_until(|msg| match msg {
                Message::Disconnect { reason } => Some(reason),
                _ => None,
            })
            .await;
        assert_eq!(reason, DisconnectReason::ServerShutdown);
        assert!(client.recv().await.is_none());
    }
}
