// ============================
// relay-lib/src/session.rs
// ============================
//! Per-connection session state.
//!
//! One `ConnectionSession` exists per live connection, owned exclusively by
//! that connection's task; only the room registry is shared. The lifecycle is
//! authenticate (done at the HTTP boundary, before the session exists) →
//! `join_initial_rooms` → `dispatch` per inbound frame → `terminate`.

use crate::auth::Identity;
use crate::membership::MembershipStore;
use crate::metrics::RelayMetrics;
use crate::registry::{RoomRegistry, SessionId};
use crate::router::EventRouter;
use bugtrail_common::{project_room, Frame};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

pub struct ConnectionSession {
    id: SessionId,
    identity: Identity,
    outbound: mpsc::Sender<Frame>,
    joined_rooms: HashSet<String>,
    registry: Arc<RoomRegistry>,
    router: Arc<EventRouter>,
    metrics: Arc<RelayMetrics>,
    /// Counted in the live-connection gauge
    live: bool,
    terminated: bool,
}

impl ConnectionSession {
    pub fn new(
        identity: Identity,
        outbound: mpsc::Sender<Frame>,
        registry: Arc<RoomRegistry>,
        router: Arc<EventRouter>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            outbound,
            joined_rooms: HashSet::new(),
            registry,
            router,
            metrics,
            live: false,
            terminated: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn joined_rooms(&self) -> &HashSet<String> {
        &self.joined_rooms
    }

    /// Resolve the subject's projects once and join one room per project.
    ///
    /// A failed lookup is logged and degrades to zero room joins; the session
    /// stays alive and the client can reconnect for a fresh view. Membership
    /// is not re-resolved during the connection's lifetime.
    pub async fn join_initial_rooms(&mut self, memberships: &dyn MembershipStore) {
        let projects = match memberships.projects_for(&self.identity.subject_id).await {
            Ok(projects) => projects,
            Err(err) => {
                tracing::error!(
                    subject = %self.identity.subject_id,
                    "error joining user to projects: {err}"
                );
                Vec::new()
            },
        };

        for project_id in &projects {
            let room = project_room(project_id);
            self.registry.join(&room, self.id, self.outbound.clone());
            tracing::info!(
                user = %self.identity.email,
                %room,
                "user joined project room"
            );
            self.joined_rooms.insert(room);
        }

        self.metrics.connection_opened();
        self.live = true;
    }

    /// Route one inbound frame. Unknown event kinds are ignored inside the
    /// router; nothing here can fail the connection.
    pub fn dispatch(&self, frame: Frame) {
        self.router.route(self.id, &self.identity, frame);
    }

    /// Tear the session down: leave every joined room and release the
    /// live-connection slot. Idempotent, and safe to call even if
    /// `join_initial_rooms` never ran or partially failed.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        self.registry.leave_all(self.id);
        self.joined_rooms.clear();

        if self.live {
            self.metrics.connection_closed();
            self.live = false;
        }

        tracing::info!(
            user = %self.identity.email,
            subject = %self.identity.subject_id,
            "user disconnected"
        );
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        // Backstop for abnormal unwinds; the connection loop calls
        // `terminate` explicitly on every normal path.
        self.terminate();
    }
}
