// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! shared between the BugTrail realtime relay and its clients.
//! This module defines the WebSocket wire format and supporting types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Project identifier as carried on the wire and in room keys.
pub type ProjectId = String;

/// One discrete message on the realtime transport.
///
/// Both directions use the same envelope: an event name plus a JSON payload.
/// Inbound payloads carry `projectId` and arbitrary fields; outbound payloads
/// are enriched copies (sender attribution, timestamp).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Frame {
    /// Event name, e.g. `bug:update`
    pub event: String,
    /// Event payload
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Event names understood by the relay.
pub mod events {
    /// Inbound: a bug changed
    pub const BUG_UPDATE: &str = "bug:update";
    /// Outbound relay of [`BUG_UPDATE`]
    pub const BUG_UPDATED: &str = "bug:updated";
    /// Inbound: a comment was added
    pub const COMMENT_ADD: &str = "comment:add";
    /// Outbound relay of [`COMMENT_ADD`]
    pub const COMMENT_ADDED: &str = "comment:added";
    /// Inbound: a project changed
    pub const PROJECT_UPDATE: &str = "project:update";
    /// Outbound relay of [`PROJECT_UPDATE`]
    pub const PROJECT_UPDATED: &str = "project:updated";
    /// Inbound: a user started typing
    pub const TYPING_START: &str = "typing:start";
    /// Outbound relay of [`TYPING_START`]
    pub const TYPING_STARTED: &str = "typing:started";
    /// Inbound: a user stopped typing
    pub const TYPING_STOP: &str = "typing:stop";
    /// Outbound relay of [`TYPING_STOP`]
    pub const TYPING_STOPPED: &str = "typing:stopped";
}

/// Sender attribution attached to relayed update events
/// (`updatedBy` / `addedBy`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    /// Subject identifier of the sender
    pub id: String,
    /// Email of the sender
    pub email: String,
    /// Display name of the sender
    pub name: String,
}

/// Room key for a project's broadcast domain.
pub fn project_room(project_id: &str) -> String {
    format!("project:{project_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_round_trip() {
        let frame = Frame::new(events::BUG_UPDATE, json!({"projectId": 7, "title": "x"}));
        let text = serde_json::to_string(&frame).unwrap();

        let parsed: Frame = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.event, "bug:update");
        assert_eq!(parsed.data["projectId"], 7);
        assert_eq!(parsed.data["title"], "x");
    }

    #[test]
    fn test_frame_data_defaults_to_null() {
        // Typing frames may arrive without a payload at all
        let parsed: Frame = serde_json::from_str(r#"{"event":"typing:stop"}"#).unwrap();
        assert_eq!(parsed.event, events::TYPING_STOP);
        assert!(parsed.data.is_null());
    }

    #[test]
    fn test_actor_uses_camel_case_keys() {
        let actor = Actor {
            id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            name: "User One".to_string(),
        };

        let value = serde_json::to_value(&actor).unwrap();
        assert_eq!(value["id"], "u1");
        assert_eq!(value["email"], "u1@example.com");
        assert_eq!(value["name"], "User One");
    }

    #[test]
    fn test_project_room_key() {
        assert_eq!(project_room("42"), "project:42");
        assert_eq!(project_room("abc-def"), "project:abc-def");
    }
}
