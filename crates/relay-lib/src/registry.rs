// ============================
// relay-lib/src/registry.rs
// ============================
//! Room registry: the process-wide map from room key to connected sessions.
//!
//! This is the only structure shared across connection tasks. Rooms are
//! created lazily on first join and removed once emptied. All membership
//! mutation and the member snapshot used by a broadcast go through the
//! room's map entry, so a recipient set is never computed from a partially
//! updated room: a concurrent `leave_all` either runs before a broadcast
//! (session excluded) or after it (session already served), never in between.
//!
//! Delivery is best-effort fire-and-forget. Each recipient's copy goes
//! through a bounded channel via `try_send`, which never awaits, so one slow
//! or broken recipient cannot block the rest of the room; its copy is
//! dropped and logged instead.

use bugtrail_common::Frame;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Process-local session identifier, unique for the connection lifetime.
pub type SessionId = Uuid;

/// Outcome of one room broadcast.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Recipients whose channel accepted the frame
    pub delivered: usize,
    /// Recipients whose channel was full or closed
    pub failed: usize,
}

/// Room membership registry.
///
/// Construct once at process start and hand to every session; there is no
/// global instance.
#[derive(Default)]
pub struct RoomRegistry {
    /// Room key -> member sessions and their outbound channels
    rooms: DashMap<String, HashMap<SessionId, mpsc::Sender<Frame>>>,
    /// Reverse index: session -> rooms it joined, for `leave_all`
    memberships: DashMap<SessionId, HashSet<String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session to a room, creating the room if absent. Idempotent;
    /// re-joining refreshes the stored outbound channel.
    pub fn join(&self, room: &str, session: SessionId, outbound: mpsc::Sender<Frame>) {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(session, outbound);
        self.memberships
            .entry(session)
            .or_default()
            .insert(room.to_string());
    }

    /// Remove a session from a room. Idempotent; absent rooms and
    /// non-members are a no-op.
    pub fn leave(&self, room: &str, session: SessionId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&session);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());

        if let Some(mut joined) = self.memberships.get_mut(&session) {
            joined.remove(room);
        }
        self.memberships
            .remove_if(&session, |_, joined| joined.is_empty());
    }

    /// Remove a session from every room it joined. Used at disconnect; after
    /// this returns, no broadcast can deliver to the session.
    pub fn leave_all(&self, session: SessionId) {
        let Some((_, joined)) = self.memberships.remove(&session) else {
            return;
        };

        for room in joined {
            if let Some(mut members) = self.rooms.get_mut(&room) {
                members.remove(&session);
            }
            self.rooms.remove_if(&room, |_, members| members.is_empty());
        }
    }

    /// Deliver a frame to every current member of a room except the sender.
    ///
    /// Per-recipient failures are logged and counted but never abort the
    /// fan-out or surface to the sender.
    pub fn broadcast(&self, room: &str, excluding: SessionId, frame: &Frame) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();

        let Some(members) = self.rooms.get(room) else {
            return outcome;
        };

        for (session, outbound) in members.iter() {
            if *session == excluding {
                continue;
            }
            match outbound.try_send(frame.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(err) => {
                    outcome.failed += 1;
                    tracing::warn!(%session, room, "failed to deliver event: {err}");
                },
            }
        }

        outcome
    }

    /// Number of sessions currently in a room (0 when absent).
    pub fn room_size(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, |members| members.len())
    }

    /// Rooms a session is currently a member of.
    pub fn rooms_of(&self, session: SessionId) -> Vec<String> {
        self.memberships
            .get(&session)
            .map(|joined| joined.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bugtrail_common::Frame;
    use serde_json::json;
    use std::sync::Arc;

    fn frame() -> Frame {
        Frame::new("bug:updated", json!({"projectId": "1"}))
    }

    fn member(registry: &RoomRegistry, room: &str) -> (SessionId, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(8);
        let session = Uuid::new_v4();
        registry.join(room, session, tx);
        (session, rx)
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let session = Uuid::new_v4();

        registry.join("project:1", session, tx.clone());
        registry.join("project:1", session, tx.clone());
        registry.join("project:1", session, tx);

        assert_eq!(registry.room_size("project:1"), 1);
        assert_eq!(registry.rooms_of(session), vec!["project:1".to_string()]);
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let registry = RoomRegistry::new();
        let (session, _rx) = member(&registry, "project:1");

        registry.leave("project:1", session);
        registry.leave("project:1", session);
        // Leaving a room that never existed is fine too
        registry.leave("project:404", session);

        assert_eq!(registry.room_size("project:1"), 0);
        assert!(registry.rooms_of(session).is_empty());
    }

    #[tokio::test]
    async fn test_replayed_join_leave_sequence_matches_set_semantics() {
        let registry = RoomRegistry::new();
        let (tx_a, _rx_a) = mpsc::channel(8);
        let (tx_b, _rx_b) = mpsc::channel(8);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        registry.join("project:1", a, tx_a.clone());
        registry.join("project:1", b, tx_b);
        registry.leave("project:1", a);
        registry.join("project:1", a, tx_a);
        registry.leave("project:1", b);

        // Replay implies {a}
        assert_eq!(registry.room_size("project:1"), 1);
        assert_eq!(registry.rooms_of(a), vec!["project:1".to_string()]);
        assert!(registry.rooms_of(b).is_empty());
    }

    #[tokio::test]
    async fn test_leave_all_clears_every_room() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let session = Uuid::new_v4();
        let (peer, _peer_rx) = member(&registry, "project:2");

        registry.join("project:1", session, tx.clone());
        registry.join("project:2", session, tx.clone());
        registry.join("project:3", session, tx);

        registry.leave_all(session);

        assert!(registry.rooms_of(session).is_empty());
        assert_eq!(registry.room_size("project:1"), 0);
        assert_eq!(registry.room_size("project:2"), 1);
        assert_eq!(registry.rooms_of(peer), vec!["project:2".to_string()]);

        // Safe to call again after everything is gone
        registry.leave_all(session);
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let registry = RoomRegistry::new();
        let (sender, mut sender_rx) = member(&registry, "project:1");
        let (_peer1, mut peer1_rx) = member(&registry, "project:1");
        let (_peer2, mut peer2_rx) = member(&registry, "project:1");

        let outcome = registry.broadcast("project:1", sender, &frame());

        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.failed, 0);
        assert!(peer1_rx.try_recv().is_ok());
        assert!(peer2_rx.try_recv().is_ok());
        assert!(sender_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_to_absent_room_is_noop() {
        let registry = RoomRegistry::new();
        let outcome = registry.broadcast("project:404", Uuid::new_v4(), &frame());
        assert_eq!(outcome, BroadcastOutcome::default());
    }

    #[tokio::test]
    async fn test_broadcast_survives_broken_recipient() {
        let registry = RoomRegistry::new();
        let sender = Uuid::new_v4();
        let (sender_tx, _sender_rx) = mpsc::channel(8);
        registry.join("project:1", sender, sender_tx);

        // One member whose receiver is already gone
        let (dead_tx, dead_rx) = mpsc::channel(8);
        drop(dead_rx);
        registry.join("project:1", Uuid::new_v4(), dead_tx);

        let (_alive, mut alive_rx) = member(&registry, "project:1");

        let outcome = registry.broadcast("project:1", sender, &frame());

        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.failed, 1);
        assert!(alive_rx.try_recv().is_ok());
    }

    /// Race a broadcast against a concurrent disconnect: delivery count is
    /// either N-1 (departing session still present) or N-2 (already gone),
    /// and once `leave_all` has returned no delivery can reach the departed
    /// session.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_broadcast_races_with_leave_all() {
        for _ in 0..50 {
            let registry = Arc::new(RoomRegistry::new());
            let (sender, _sender_rx) = member(&registry, "project:1");
            let (departing, mut departing_rx) = member(&registry, "project:1");
            let (_stay1, mut stay1_rx) = member(&registry, "project:1");
            let (_stay2, mut stay2_rx) = member(&registry, "project:1");

            let broadcaster = {
                let registry = registry.clone();
                tokio::spawn(async move { registry.broadcast("project:1", sender, &frame()) })
            };
            let leaver = {
                let registry = registry.clone();
                tokio::spawn(async move { registry.leave_all(departing) })
            };

            let outcome = broadcaster.await.unwrap();
            leaver.await.unwrap();

            assert!(
                outcome.delivered == 3 || outcome.delivered == 2,
                "unexpected delivery count {}",
                outcome.delivered
            );
            // Remaining members always receive exactly one copy
            assert!(stay1_rx.try_recv().is_ok());
            assert!(stay2_rx.try_recv().is_ok());
            // The departed session received the frame iff it was still in the
            // snapshot; afterwards nothing more can arrive.
            let departed_got = usize::from(departing_rx.try_recv().is_ok());
            assert_eq!(outcome.delivered, 2 + departed_got);

            let after = registry.broadcast("project:1", sender, &frame());
            assert_eq!(after.delivered, 2);
            assert!(departing_rx.try_recv().is_err());
        }
    }
}
