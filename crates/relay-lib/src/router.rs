// ============================
// relay-lib/src/router.rs
// ============================
//! Inbound event routing.
//!
//! One dispatch table maps each inbound event kind to its broadcast action.
//! Update-style events relay the payload enriched with sender attribution
//! and a timestamp; typing events relay sender identity and project only.
//! Unknown kinds are dropped after counting. No failure in here touches the
//! connection's liveness.

use crate::auth::Identity;
use crate::error::RelayError;
use crate::metrics::RelayMetrics;
use crate::registry::{RoomRegistry, SessionId};
use bugtrail_common::{events, project_room, Actor, Frame};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;

pub struct EventRouter {
    registry: Arc<RoomRegistry>,
    metrics: Arc<RelayMetrics>,
}

impl EventRouter {
    pub fn new(registry: Arc<RoomRegistry>, metrics: Arc<RelayMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Route one inbound frame from a session.
    ///
    /// Counts every frame, then matches the event kind: recognized frames are
    /// enriched and broadcast to the target project room excluding the
    /// sender, with processing latency recorded whether or not individual
    /// deliveries succeed. Unrecognized kinds are dropped with only the
    /// received count. Unroutable frames (no usable `projectId`) are dropped
    /// and logged; the connection survives.
    pub fn route(&self, sender_id: SessionId, sender: &Identity, frame: Frame) {
        let started = Instant::now();
        self.metrics.message_received();

        let result = match frame.event.as_str() {
            events::BUG_UPDATE => {
                tracing::info!(user = %sender.email, "bug update received");
                self.relay_update(sender_id, sender, events::BUG_UPDATED, "updatedBy", frame.data)
            },
            events::COMMENT_ADD => {
                tracing::info!(user = %sender.email, "comment added");
                self.relay_update(sender_id, sender, events::COMMENT_ADDED, "addedBy", frame.data)
            },
            events::PROJECT_UPDATE => {
                tracing::info!(user = %sender.email, "project update received");
                self.relay_update(
                    sender_id,
                    sender,
                    events::PROJECT_UPDATED,
                    "updatedBy",
                    frame.data,
                )
            },
            events::TYPING_START => {
                self.relay_typing(sender_id, sender, events::TYPING_STARTED, &frame.data)
            },
            events::TYPING_STOP => {
                self.relay_typing(sender_id, sender, events::TYPING_STOPPED, &frame.data)
            },
            other => {
                tracing::debug!(event = other, "ignoring unrecognized event kind");
                return;
            },
        };

        match result {
            Ok(()) => self.metrics.observe_latency(started.elapsed()),
            Err(err) => {
                tracing::warn!(event = %frame.event, user = %sender.email, "dropped frame: {err}");
            },
        }
    }

    /// Relay an update-style event: payload + sender attribution + timestamp.
    fn relay_update(
        &self,
        sender_id: SessionId,
        sender: &Identity,
        out_event: &str,
        attribution_key: &str,
        data: Value,
    ) -> Result<(), RelayError> {
        let project_id = project_id_of(&data)
            .ok_or_else(|| RelayError::Dispatch("payload has no projectId".to_string()))?;

        let mut body = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        body.insert(
            attribution_key.to_string(),
            serde_json::to_value(Actor {
                id: sender.subject_id.clone(),
                email: sender.email.clone(),
                name: sender.display_name.clone(),
            })?,
        );
        body.insert("timestamp".to_string(), Value::String(timestamp()));

        self.publish(&project_id, sender_id, sender, out_event, Value::Object(body));
        Ok(())
    }

    /// Relay a typing indicator: sender identity and project only, no
    /// payload merge.
    fn relay_typing(
        &self,
        sender_id: SessionId,
        sender: &Identity,
        out_event: &str,
        data: &Value,
    ) -> Result<(), RelayError> {
        let project_id = project_id_of(data)
            .ok_or_else(|| RelayError::Dispatch("payload has no projectId".to_string()))?;

        let body = json!({
            "userId": sender.subject_id,
            "userName": sender.display_name,
            "projectId": data["projectId"],
        });

        self.publish(&project_id, sender_id, sender, out_event, body);
        Ok(())
    }

    fn publish(
        &self,
        project_id: &str,
        sender_id: SessionId,
        sender: &Identity,
        out_event: &str,
        body: Value,
    ) {
        let room = project_room(project_id);
        let outcome = self
            .registry
            .broadcast(&room, sender_id, &Frame::new(out_event, body));

        if outcome.failed > 0 {
            tracing::warn!(
                %room,
                event = out_event,
                user = %sender.email,
                failed = outcome.failed,
                "some recipients did not receive the event"
            );
        }
        tracing::debug!(
            %room,
            event = out_event,
            delivered = outcome.delivered,
            "event broadcast"
        );
    }
}

/// Routing key from an inbound payload. The tracker's project ids are
/// numeric, but string ids are accepted too; both map onto the same
/// `project:<id>` room key.
fn project_id_of(data: &Value) -> Option<String> {
    match data.get("projectId")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// RFC 3339 with millisecond precision, matching the tracker's other
/// services.
fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
