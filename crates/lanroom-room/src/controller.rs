//! Room controller: an isolated tokio task that owns all room state.
//!
//! The controller reads commands from an mpsc channel and applies them one
//! at a time, so a join racing a leave, or two moderation commands, always
//! observe a consistent linearized order. Nothing inside the loop performs
//! network I/O; outbound frames are pushed onto bounded per-member queues
//! and written by the connection tasks. The one mutation that does touch
//! disk is the ban flush, which must complete before the ban takes effect.

use tokio::sync::{mpsc, oneshot, watch};

use lanroom_banlist::{BanEntry, BanRegistry};
use lanroom_protocol::{
    BanFacet, DisconnectReason, FacetKind, GameInfo, MemberInfo, Message, ModerationKind,
    PROTOCOL_VERSION, Role, SessionAddr, encode,
};

use crate::config::{RoomConfig, RoomState};
use crate::error::{AdmissionError, ModerationError, RoomError};
use crate::member::{JoinIdentity, MemberSender, MembershipTable};
use crate::relay::RelayEngine;

/// Depth of the controller's command channel.
const COMMAND_QUEUE_DEPTH: usize = 64;

/// What a successful join hands back to the connection handler.
#[derive(Debug)]
pub struct JoinGrant {
    /// The session address assigned to the new member.
    pub addr: SessionAddr,
    /// Member list snapshot including the new member, for `JoinAccepted`.
    pub members: Vec<MemberInfo>,
}

/// Point-in-time view of the room, published on every membership change.
///
/// This is what the directory announcer reads on its timer; it never has
/// to ask the controller and wait.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub name: String,
    pub game: GameInfo,
    pub state: RoomState,
    pub members: usize,
    pub max_members: usize,
    pub has_password: bool,
    /// `false` once a ban flush has failed; bans still apply in memory.
    pub bans_durable: bool,
}

/// Commands sent to the controller through its channel.
///
/// Variants carrying a `oneshot::Sender` are request/response: the caller
/// awaits the reply channel. The rest are fire-and-forget.
enum RoomCommand {
    Join {
        identity: JoinIdentity,
        sender: MemberSender,
        reply: oneshot::Sender<Result<JoinGrant, AdmissionError>>,
    },
    Leave {
        addr: SessionAddr,
        reason: DisconnectReason,
    },
    Chat {
        from: SessionAddr,
        text: String,
    },
    Moderation {
        from: SessionAddr,
        kind: ModerationKind,
        reply: oneshot::Sender<Result<(), ModerationError>>,
    },
    Shutdown,
}

/// Handle to the running room controller. Cheap to clone.
#[derive(Clone)]
pub struct RoomHandle {
    sender: mpsc::Sender<RoomCommand>,
    relay: RelayEngine,
    snapshot_rx: watch::Receiver<RoomSnapshot>,
}

impl RoomHandle {
    /// Requests admission for an identity, handing over the bounded
    /// sender its outbound frames should be queued on.
    pub async fn join(
        &self,
        identity: JoinIdentity,
        sender: MemberSender,
    ) -> Result<JoinGrant, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Join {
                identity,
                sender,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::Unavailable)?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable)?
            .map_err(RoomError::Admission)
    }

    /// Removes a member. Safe to call for an address that is already gone
    /// (a voluntary leave racing a kick); the controller ignores unknown
    /// addresses.
    pub async fn leave(
        &self,
        addr: SessionAddr,
        reason: DisconnectReason,
    ) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Leave { addr, reason })
            .await
            .map_err(|_| RoomError::Unavailable)
    }

    /// Relays a chat line to the other members.
    pub async fn chat(&self, from: SessionAddr, text: String) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Chat { from, text })
            .await
            .map_err(|_| RoomError::Unavailable)
    }

    /// Applies a moderation command on behalf of `from`.
    pub async fn moderation(
        &self,
        from: SessionAddr,
        kind: ModerationKind,
    ) -> Result<(), RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Moderation {
                from,
                kind,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::Unavailable)?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable)?
            .map_err(RoomError::Moderation)
    }

    /// Tells the room to shut down: every member is sent
    /// `Disconnect { ServerShutdown }` and the controller task exits.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable)
    }

    /// The relay engine serving this room.
    pub fn relay(&self) -> &RelayEngine {
        &self.relay
    }

    /// A watch receiver yielding the latest [`RoomSnapshot`].
    pub fn watch(&self) -> watch::Receiver<RoomSnapshot> {
        self.snapshot_rx.clone()
    }

    /// The latest snapshot, without waiting.
    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshot_rx.borrow().clone()
    }
}

/// The controller state. Runs inside a tokio task.
struct RoomController {
    config: RoomConfig,
    state: RoomState,
    members: MembershipTable,
    bans: BanRegistry,
    bans_durable: bool,
    relay: RelayEngine,
    snapshot_tx: watch::Sender<RoomSnapshot>,
    receiver: mpsc::Receiver<RoomCommand>,
}

/// Spawns the room controller task and returns a handle to it.
///
/// The registry moves into the controller; from here on every ban
/// mutation is serialized with membership mutations.
pub fn spawn_room(config: RoomConfig, bans: BanRegistry) -> RoomHandle {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let relay = RelayEngine::new();

    let initial = RoomSnapshot {
        name: config.name.clone(),
        game: config.game.clone(),
        state: RoomState::Empty,
        members: 0,
        max_members: config.max_members,
        has_password: config.password.is_some(),
        bans_durable: true,
    };
    let (snapshot_tx, snapshot_rx) = watch::channel(initial);

    let controller = RoomController {
        config,
        state: RoomState::Empty,
        members: MembershipTable::new(),
        bans,
        bans_durable: true,
        relay: relay.clone(),
        snapshot_tx,
        receiver: rx,
    };

    tokio::spawn(controller.run());

    RoomHandle {
        sender: tx,
        relay,
        snapshot_rx,
    }
}

impl RoomController {
    async fn run(mut self) {
        tracing::info!(room = %self.config.name, "room controller started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join {
                    identity,
                    sender,
                    reply,
                } => {
                    let result = self.handle_join(identity, sender).await;
                    let _ = reply.send(result);
                }
                RoomCommand::Leave { addr, reason } => {
                    self.handle_leave(addr, reason).await;
                }
                RoomCommand::Chat { from, text } => {
                    self.handle_chat(from, text).await;
                }
                RoomCommand::Moderation { from, kind, reply } => {
                    let result = self.handle_moderation(from, kind).await;
                    let _ = reply.send(result);
                }
                RoomCommand::Shutdown => {
                    self.handle_shutdown().await;
                    break;
                }
            }
        }

        tracing::info!(room = %self.config.name, "room controller stopped");
    }

    /// Admission. Order matters: version first (an incompatible client
    /// cannot be assumed to parse anything newer), then the ban check,
    /// which deliberately precedes the capacity check so a banned
    /// identity hears `Banned` even when the room is full.
    async fn handle_join(
        &mut self,
        identity: JoinIdentity,
        sender: MemberSender,
    ) -> Result<JoinGrant, AdmissionError> {
        if identity.client_version != PROTOCOL_VERSION {
            return Err(AdmissionError::VersionMismatch {
                client: identity.client_version,
                server: PROTOCOL_VERSION,
            });
        }

        if let Some(facet) =
            self.bans
                .matched_facet(&identity.nickname, identity.net_addr, &identity.hwid)
        {
            tracing::info!(
                nickname = %identity.nickname,
                %facet,
                "banned identity refused"
            );
            return Err(AdmissionError::Banned(facet));
        }

        if self.members.contains_nickname(&identity.nickname) {
            return Err(AdmissionError::NameCollision(identity.nickname));
        }

        if let Some(expected) = &self.config.password {
            if identity.password.as_deref() != Some(expected.as_str()) {
                return Err(AdmissionError::BadPassword);
            }
        }

        if self.members.len() >= self.config.max_members {
            return Err(AdmissionError::RoomFull);
        }

        let role = if self.members.is_empty() {
            Role::Owner
        } else {
            Role::Participant
        };
        let addr = self.members.insert(&identity, role, sender.clone());
        self.relay.insert(addr, sender).await;
        self.state = RoomState::Active;

        tracing::info!(
            %addr,
            nickname = %identity.nickname,
            %role,
            members = self.members.len(),
            "member joined"
        );

        let members = self.members.snapshot();
        // Existing members learn about the newcomer; the newcomer gets
        // the same list inside JoinAccepted.
        self.broadcast_member_list(Some(addr)).await;
        self.publish_snapshot();

        Ok(JoinGrant { addr, members })
    }

    async fn handle_leave(&mut self, addr: SessionAddr, reason: DisconnectReason) {
        if self.drop_member(addr, reason).await {
            self.broadcast_member_list(None).await;
            self.publish_snapshot();
        }
    }

    async fn handle_chat(&mut self, from: SessionAddr, text: String) {
        let Some(member) = self.members.get(from) else {
            tracing::warn!(%from, "chat from non-member, ignoring");
            return;
        };
        tracing::debug!(%from, nickname = %member.nickname, "chat");

        let msg = Message::ChatMessage {
            sender: Some(from),
            text,
        };
        let Ok(frame) = log_encode(&msg) else { return };
        let stalled = self.send_to_all(&frame, Some(from));
        self.drop_stalled(stalled).await;
    }

    async fn handle_moderation(
        &mut self,
        from: SessionAddr,
        kind: ModerationKind,
    ) -> Result<(), ModerationError> {
        let issuer = self
            .members
            .get(from)
            .ok_or(ModerationError::PermissionDenied)?;
        if !issuer.role.can_moderate() {
            tracing::info!(
                %from,
                nickname = %issuer.nickname,
                "moderation command from non-privileged member refused"
            );
            return Err(ModerationError::PermissionDenied);
        }
        let issuer_nickname = issuer.nickname.clone();

        match kind {
            ModerationKind::Kick { target } => {
                self.check_moderation_target(target)?;
                tracing::info!(%target, by = %issuer_nickname, "member kicked");
                self.drop_member(target, DisconnectReason::Kicked).await;
                self.broadcast_member_list(None).await;
                self.publish_snapshot();
            }

            ModerationKind::Ban { target, facet } => {
                let member = self.check_moderation_target(target)?;
                let value = match facet {
                    FacetKind::Nickname => member.nickname.clone(),
                    FacetKind::NetAddr => member.net_addr.to_string(),
                    FacetKind::Hwid => member.hwid.clone(),
                };
                let entry = BanEntry::new(
                    BanFacet { kind: facet, value },
                    format!("banned by {issuer_nickname}"),
                );
                // The ban entry is written before the target is removed;
                // losing the flush must not mean losing the ban.
                self.record_ban(entry);
                tracing::info!(%target, %facet, by = %issuer_nickname, "member banned");
                self.drop_member(target, DisconnectReason::Banned).await;
                self.broadcast_member_list(None).await;
                self.publish_snapshot();
            }

            ModerationKind::Unban { facet } => {
                match self.bans.remove(&facet) {
                    Ok(true) => {
                        tracing::info!(%facet, by = %issuer_nickname, "ban lifted");
                    }
                    Ok(false) => {
                        tracing::debug!(%facet, "unban for facet with no entry");
                    }
                    Err(e) => self.mark_bans_not_durable(&e),
                }
            }

            ModerationKind::ChangeRole { target, role } => {
                if role == Role::Owner {
                    return Err(ModerationError::InvalidRole);
                }
                let member = self
                    .members
                    .get_mut(target)
                    .ok_or(ModerationError::UnknownTarget(target))?;
                if member.role == Role::Owner {
                    // The owner cannot be demoted by command.
                    return Err(ModerationError::InvalidRole);
                }
                member.role = role;
                tracing::info!(%target, %role, by = %issuer_nickname, "role changed");
                self.broadcast_member_list(None).await;
                self.publish_snapshot();
            }
        }

        Ok(())
    }

    async fn handle_shutdown(&mut self) {
        tracing::info!(room = %self.config.name, members = self.members.len(), "room shutting down");
        self.state = RoomState::Closing;

        if let Ok(frame) = log_encode(&Message::Disconnect {
            reason: DisconnectReason::ServerShutdown,
        }) {
            self.send_to_all(&frame, None);
        }

        self.relay.clear().await;
        // Dropping the senders lets each connection's writer drain its
        // queue (shutdown notice included) and close.
        self.members.clear();
        self.publish_snapshot();
    }

    /// Validates a kick/ban target: it must exist and must not outrank
    /// the issuer's reach. The owner can only leave on their own.
    fn check_moderation_target(
        &self,
        target: SessionAddr,
    ) -> Result<&crate::member::Member, ModerationError> {
        let member = self
            .members
            .get(target)
            .ok_or(ModerationError::UnknownTarget(target))?;
        if member.role == Role::Owner {
            return Err(ModerationError::PermissionDenied);
        }
        Ok(member)
    }

    /// Removes a member from the table and routes, queues their
    /// `Disconnect` notice, and repairs the owner invariant. Returns
    /// `false` if the address was not live. Callers broadcast the new
    /// member list afterwards.
    async fn drop_member(&mut self, addr: SessionAddr, reason: DisconnectReason) -> bool {
        let Some(member) = self.members.remove(addr) else {
            return false;
        };
        self.relay.remove(addr).await;

        if let Ok(frame) = log_encode(&Message::Disconnect { reason }) {
            let _ = member.sender.try_send(frame);
        }

        tracing::info!(
            %addr,
            nickname = %member.nickname,
            %reason,
            session = ?member.joined_at.elapsed(),
            members = self.members.len(),
            "member removed"
        );

        if member.role == Role::Owner {
            if let Some(new_owner) = self.members.promote_earliest() {
                tracing::info!(%new_owner, "ownership transferred to earliest joined member");
            }
        }

        if self.members.is_empty() && self.state == RoomState::Active {
            self.state = RoomState::Empty;
            tracing::info!(room = %self.config.name, "room is empty");
        }

        true
    }

    /// Sends the current member list to everyone except `skip`. Members
    /// whose queues overflow are removed as slow consumers and the
    /// shrunken list is re-sent until it goes through.
    async fn broadcast_member_list(&mut self, skip: Option<SessionAddr>) {
        loop {
            let msg = Message::MemberListUpdate {
                members: self.members.snapshot(),
            };
            let Ok(frame) = log_encode(&msg) else { return };
            let stalled = self.send_to_all(&frame, skip);
            if stalled.is_empty() {
                return;
            }
            for addr in stalled {
                self.drop_member(addr, DisconnectReason::SlowConsumer).await;
            }
        }
    }

    async fn drop_stalled(&mut self, stalled: Vec<SessionAddr>) {
        if stalled.is_empty() {
            return;
        }
        for addr in stalled {
            tracing::warn!(%addr, "outbound queue overflow, disconnecting slow consumer");
            self.drop_member(addr, DisconnectReason::SlowConsumer).await;
        }
        self.broadcast_member_list(None).await;
        self.publish_snapshot();
    }

    /// Queues a frame for every member except `skip`; returns the
    /// addresses whose queues were full.
    fn send_to_all(&self, frame: &[u8], skip: Option<SessionAddr>) -> Vec<SessionAddr> {
        use tokio::sync::mpsc::error::TrySendError;

        let mut stalled = Vec::new();
        for member in self.members.iter() {
            if Some(member.addr) == skip {
                continue;
            }
            match member.sender.try_send(frame.to_vec()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => stalled.push(member.addr),
                Err(TrySendError::Closed(_)) => {}
            }
        }
        stalled
    }

    fn record_ban(&mut self, entry: BanEntry) {
        match self.bans.add(entry) {
            Ok(true) => {}
            Ok(false) => tracing::debug!("facet already banned"),
            Err(e) => self.mark_bans_not_durable(&e),
        }
    }

    fn mark_bans_not_durable(&mut self, error: &lanroom_banlist::StorageError) {
        tracing::error!(
            %error,
            "ban persistence failed; registry continues in memory only"
        );
        self.bans_durable = false;
    }

    fn publish_snapshot(&self) {
        let _ = self.snapshot_tx.send(RoomSnapshot {
            name: self.config.name.clone(),
            game: self.config.game.clone(),
            state: self.state,
            members: self.members.len(),
            max_members: self.config.max_members,
            has_password: self.config.password.is_some(),
            bans_durable: self.bans_durable,
        });
    }
}

/// Encodes a server-originated message, logging the (should-be-impossible)
/// failure instead of propagating it into the control flow.
fn log_encode(msg: &Message) -> Result<Vec<u8>, ()> {
    encode(msg).map_err(|e| {
        tracing::error!(error = %e, "failed to encode server message");
    })
}
