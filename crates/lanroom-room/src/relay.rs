//! Relay engine: fans opaque game frames out to member queues.
//!
//! Relaying deliberately bypasses the controller's command channel. The
//! routing table is shared behind an `RwLock`; per-connection receive
//! tasks take read locks to deliver, the controller takes the write lock
//! only when membership changes. A packet may therefore reach a member
//! that departs microseconds later, which is fine; admission and
//! moderation are the operations that need strict ordering, delivery is
//! not.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::sync::mpsc::error::TrySendError;

use lanroom_protocol::{DestMode, SessionAddr};

use crate::member::MemberSender;

/// Routes encoded frames to the members currently holding each address.
///
/// Cheap to clone; all clones share one routing table.
#[derive(Clone)]
pub struct RelayEngine {
    routes: Arc<RwLock<HashMap<SessionAddr, MemberSender>>>,
}

impl RelayEngine {
    pub fn new() -> Self {
        Self {
            routes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Delivers one encoded frame according to the addressing mode.
    ///
    /// Never blocks on a slow recipient: queues are bounded and pushed
    /// with `try_send`. Returns the addresses whose queues overflowed so
    /// the caller can have them disconnected as slow consumers. A
    /// `Targeted` frame whose address no longer routes anywhere is
    /// silently dropped; targeted delivery is best-effort.
    pub async fn relay(
        &self,
        sender: SessionAddr,
        dest: DestMode,
        frame: Vec<u8>,
    ) -> Vec<SessionAddr> {
        let routes = self.routes.read().await;
        let mut stalled = Vec::new();

        match dest {
            DestMode::Targeted(target) => {
                if let Some(queue) = routes.get(&target) {
                    match queue.try_send(frame) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => stalled.push(target),
                        // Receiver mid-teardown; same as a vanished address.
                        Err(TrySendError::Closed(_)) => {}
                    }
                }
            }
            DestMode::Broadcast => {
                for (addr, queue) in routes.iter() {
                    if *addr == sender {
                        continue;
                    }
                    match queue.try_send(frame.clone()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => stalled.push(*addr),
                        Err(TrySendError::Closed(_)) => {}
                    }
                }
            }
        }

        stalled
    }

    /// Registers a member's outbound queue. Controller only.
    pub(crate) async fn insert(&self, addr: SessionAddr, sender: MemberSender) {
        self.routes.write().await.insert(addr, sender);
    }

    /// Unregisters a departed member. Controller only.
    pub(crate) async fn remove(&self, addr: SessionAddr) {
        self.routes.write().await.remove(&addr);
    }

    /// Drops every route. Controller only, at shutdown.
    pub(crate) async fn clear(&self) {
        self.routes.write().await.clear();
    }
}

impl Default for RelayEngine {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let relay = RelayEngine::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        relay.insert(SessionAddr(1), tx1).await;
        relay.insert(SessionAddr(2), tx2).await;

        let stalled = relay
            .relay(SessionAddr(1), DestMode::Broadcast, b"hello".to_vec())
            .await;

        assert!(stalled.is_empty());
        assert_eq!(rx2.try_recv().unwrap(), b"hello");
        assert!(rx1.try_recv().is_err(), "sender must not hear itself");
    }

    #[tokio::test]
    async fn test_broadcast_preserves_per_sender_order() {
        let relay = RelayEngine::new();
        let (tx, mut rx) = mpsc::channel(8);
        relay.insert(SessionAddr(2), tx).await;

        relay
            .relay(SessionAddr(1), DestMode::Broadcast, b"A".to_vec())
            .await;
        relay
            .relay(SessionAddr(1), DestMode::Broadcast, b"B".to_vec())
            .await;

        assert_eq!(rx.recv().await.unwrap(), b"A");
        assert_eq!(rx.recv().await.unwrap(), b"B");
    }

    #[tokio::test]
    async fn test_targeted_hits_only_the_target() {
        let relay = RelayEngine::new();
        let (tx2, mut rx2) = mpsc::channel(8);
        let (tx3, mut rx3) = mpsc::channel(8);
        relay.insert(SessionAddr(2), tx2).await;
        relay.insert(SessionAddr(3), tx3).await;

        relay
            .relay(
                SessionAddr(1),
                DestMode::Targeted(SessionAddr(3)),
                b"psst".to_vec(),
            )
            .await;

        assert_eq!(rx3.try_recv().unwrap(), b"psst");
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_targeted_to_departed_address_is_dropped_silently() {
        let relay = RelayEngine::new();
        let (tx, _rx) = mpsc::channel(8);
        relay.insert(SessionAddr(2), tx).await;
        relay.remove(SessionAddr(2)).await;

        let stalled = relay
            .relay(
                SessionAddr(1),
                DestMode::Targeted(SessionAddr(2)),
                b"late".to_vec(),
            )
            .await;

        assert!(stalled.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_reports_slow_consumer() {
        let relay = RelayEngine::new();
        let (tx, mut rx) = mpsc::channel(1);
        relay.insert(SessionAddr(2), tx).await;

        let first = relay
            .relay(SessionAddr(1), DestMode::Broadcast, b"1".to_vec())
            .await;
        assert!(first.is_empty());

        // Queue depth is 1 and nothing drains it, so the second frame
        // overflows.
        let second = relay
            .relay(SessionAddr(1), DestMode::Broadcast, b"2".to_vec())
            .await;
        assert_eq!(second, vec![SessionAddr(2)]);

        // The first frame is still intact; overflow loses the new frame,
        // not the queue.
        assert_eq!(rx.try_recv().unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_closed_queue_is_not_reported_as_stalled() {
        let relay = RelayEngine::new();
        let (tx, rx) = mpsc::channel(1);
        relay.insert(SessionAddr(2), tx).await;
        drop(rx);

        let stalled = relay
            .relay(SessionAddr(1), DestMode::Broadcast, b"x".to_vec())
            .await;
        assert!(stalled.is_empty());
    }
}
