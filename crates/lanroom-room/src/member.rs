//! The membership table: who is in the room, in join order.

use std::net::IpAddr;
use std::time::Instant;

use tokio::sync::mpsc;

use lanroom_protocol::{MemberInfo, Role, SessionAddr};

/// Channel sender for a member's outbound frames.
///
/// Bounded: a member that stops draining its queue is a slow consumer and
/// gets disconnected rather than stalling everyone else.
pub type MemberSender = mpsc::Sender<Vec<u8>>;

/// The identity a connection presents in its `JoinRequest`, plus what the
/// transport knows about it.
#[derive(Debug, Clone)]
pub struct JoinIdentity {
    pub nickname: String,
    pub password: Option<String>,
    pub hwid: String,
    pub net_addr: IpAddr,
    pub client_version: u32,
}

/// One connected member.
#[derive(Debug)]
pub(crate) struct Member {
    pub(crate) nickname: String,
    pub(crate) hwid: String,
    pub(crate) net_addr: IpAddr,
    pub(crate) addr: SessionAddr,
    pub(crate) role: Role,
    pub(crate) joined_at: Instant,
    pub(crate) sender: MemberSender,
}

/// Members in join order.
///
/// Join order doubles as the owner succession order, so the table is a
/// `Vec` rather than a map; rooms are small and every lookup is a short
/// scan.
pub(crate) struct MembershipTable {
    members: Vec<Member>,
    next_addr: u32,
}

impl MembershipTable {
    pub(crate) fn new() -> Self {
        Self {
            members: Vec::new(),
            next_addr: 1,
        }
    }

    /// Admits an identity and assigns it the next session address.
    ///
    /// Addresses are monotonic and never recycled while the process
    /// lives, so no two live members can ever share one.
    pub(crate) fn insert(
        &mut self,
        identity: &JoinIdentity,
        role: Role,
        sender: MemberSender,
    ) -> SessionAddr {
        let addr = SessionAddr(self.next_addr);
        self.next_addr += 1;
        self.members.push(Member {
            nickname: identity.nickname.clone(),
            hwid: identity.hwid.clone(),
            net_addr: identity.net_addr,
            addr,
            role,
            joined_at: Instant::now(),
            sender,
        });
        addr
    }

    pub(crate) fn remove(&mut self, addr: SessionAddr) -> Option<Member> {
        let index = self.members.iter().position(|m| m.addr == addr)?;
        Some(self.members.remove(index))
    }

    pub(crate) fn get(&self, addr: SessionAddr) -> Option<&Member> {
        self.members.iter().find(|m| m.addr == addr)
    }

    pub(crate) fn get_mut(&mut self, addr: SessionAddr) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.addr == addr)
    }

    pub(crate) fn contains_nickname(&self, nickname: &str) -> bool {
        self.members.iter().any(|m| m.nickname == nickname)
    }

    /// Promotes the earliest-joined member to owner, if anyone is left.
    ///
    /// The `Vec` is in join order, so "earliest joined" is the front.
    pub(crate) fn promote_earliest(&mut self) -> Option<SessionAddr> {
        let first = self.members.first_mut()?;
        first.role = Role::Owner;
        Some(first.addr)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.members.clear();
    }

    /// The member list as sent on the wire.
    pub(crate) fn snapshot(&self) -> Vec<MemberInfo> {
        self.members
            .iter()
            .map(|m| MemberInfo {
                addr: m.addr,
                nickname: m.nickname.clone(),
                role: m.role,
            })
            .collect()
    }
}
