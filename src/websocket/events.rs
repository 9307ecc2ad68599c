//! Channel event types.
//!
//! Every event serializes to a flat JSON object with a `type` discriminator
//! and a server `timestamp`, e.g.:
//!
//! ```json
//! {
//!     "type": "message:new",
//!     "timestamp": "2025-11-03T10:30:00Z",
//!     "conversation_id": "…",
//!     "message": { … }
//! }
//! ```
//!
//! The same enum is used on both ends: the server serializes it for
//! fan-out, the client SDK deserializes incoming frames back into it.

use axum::extract::ws::Message as WsMessage;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, MessagePreview};
use crate::websocket::ConnectionRegistry;

/// Server-to-client events, scoped to one conversation each.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelEvent {
    /// A message was appended; delivered to the other participants.
    #[serde(rename = "message:new")]
    MessageNew {
        conversation_id: Uuid,
        message: Message,
    },

    /// A participant observed messages; delivered to everyone else so
    /// sender-side delivered/seen indicators can update.
    #[serde(rename = "message:seen")]
    MessageSeen {
        conversation_id: Uuid,
        message_ids: Vec<Uuid>,
        seen_by: Uuid,
    },

    #[serde(rename = "typing:start")]
    TypingStart {
        conversation_id: Uuid,
        user_id: Uuid,
    },

    #[serde(rename = "typing:stop")]
    TypingStop {
        conversation_id: Uuid,
        user_id: Uuid,
    },

    /// The recipient's unread count or last message changed. The count is
    /// authoritative; clients overwrite, never add deltas.
    #[serde(rename = "conversation:updated")]
    ConversationUpdated {
        conversation_id: Uuid,
        unread_count: i64,
        last_message: Option<MessagePreview>,
    },
}

impl ChannelEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageNew { .. } => "message:new",
            Self::MessageSeen { .. } => "message:seen",
            Self::TypingStart { .. } => "typing:start",
            Self::TypingStop { .. } => "typing:stop",
            Self::ConversationUpdated { .. } => "conversation:updated",
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        match self {
            Self::MessageNew { conversation_id, .. }
            | Self::MessageSeen { conversation_id, .. }
            | Self::TypingStart { conversation_id, .. }
            | Self::TypingStop { conversation_id, .. }
            | Self::ConversationUpdated { conversation_id, .. } => *conversation_id,
        }
    }

    /// Serialize for broadcast, stamping the server time. This is the only
    /// place event payloads are built.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        value["timestamp"] = serde_json::Value::String(Utc::now().to_rfc3339());
        serde_json::to_string(&value)
    }
}

/// Client-to-server frames. Typing is the only client-originated state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundFrame {
    #[serde(rename = "typing:start")]
    TypingStart { conversation_id: Uuid },
    #[serde(rename = "typing:stop")]
    TypingStop { conversation_id: Uuid },
}

/// Deliver an event to every recipient's open connections, optionally
/// skipping the acting user. Serialization failures are logged and the
/// event dropped; delivery is best-effort by contract.
pub async fn fan_out(
    registry: &ConnectionRegistry,
    recipients: &[Uuid],
    skip: Option<Uuid>,
    event: &ChannelEvent,
) {
    let payload = match event.to_payload() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, event = event.event_type(), "failed to serialize channel event");
            return;
        }
    };
    for &user in recipients {
        if Some(user) == skip {
            continue;
        }
        registry.send_to(user, WsMessage::Text(payload.clone())).await;
    }
}

/// Deliver an event to a single user (all of their connections).
pub async fn send_to_user(registry: &ConnectionRegistry, user_id: Uuid, event: &ChannelEvent) {
    fan_out(registry, std::slice::from_ref(&user_id), None, event).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_wire_tag() {
        let event = ChannelEvent::TypingStart {
            conversation_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        };
        let payload = event.to_payload().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["type"], event.event_type());
        assert!(parsed["timestamp"].is_string());
    }

    #[test]
    fn payloads_round_trip_through_the_client_side() {
        let conversation_id = Uuid::new_v4();
        let seer = Uuid::new_v4();
        let event = ChannelEvent::MessageSeen {
            conversation_id,
            message_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            seen_by: seer,
        };

        let payload = event.to_payload().unwrap();
        // The timestamp added for broadcast must not break deserialization.
        let decoded: ChannelEvent = serde_json::from_str(&payload).unwrap();
        match decoded {
            ChannelEvent::MessageSeen {
                conversation_id: c,
                message_ids,
                seen_by,
            } => {
                assert_eq!(c, conversation_id);
                assert_eq!(message_ids.len(), 2);
                assert_eq!(seen_by, seer);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn inbound_typing_frames_parse() {
        let conversation_id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"typing:start","conversation_id":"{conversation_id}"}}"#);
        let frame: InboundFrame = serde_json::from_str(&raw).unwrap();
        assert!(matches!(
            frame,
            InboundFrame::TypingStart { conversation_id: c } if c == conversation_id
        ));
    }
}
