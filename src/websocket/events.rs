//! Outbound WebSocket event vocabulary.
//!
//! Every event serializes to one flat JSON object:
//!
//! ```json
//! {
//!     "type": "message.new",
//!     "timestamp": "2026-08-27T10:30:00Z",
//!     "user_id": "uuid",
//!     ...event fields
//! }
//! ```
//!
//! `user_id` is the identity the event originated from. Serialization is
//! centralized in `to_payload_value` so handlers never build JSON by hand.

use axum::extract::ws::Message;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::websocket::{ConnectionId, ConnectionRegistry, PresenceChange, Topic};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsEvent {
    /// New message delivered to the conversation room. `read` is always
    /// false at delivery time; the durable read transition happens on fetch.
    #[serde(rename = "message.new")]
    MessageNew {
        id: Uuid,
        conversation_id: Uuid,
        sender_id: Uuid,
        sender_name: Option<String>,
        sender_avatar_url: Option<String>,
        content: String,
        read: bool,
    },

    /// Live read signal relayed to the conversation room.
    #[serde(rename = "message.read")]
    MessageRead {
        conversation_id: Uuid,
        message_ids: Vec<Uuid>,
    },

    #[serde(rename = "typing.started")]
    TypingStarted { conversation_id: Uuid },

    #[serde(rename = "typing.stopped")]
    TypingStopped { conversation_id: Uuid },

    /// Presence transitions, broadcast to all connections.
    #[serde(rename = "user.online")]
    UserOnline { user_id: Uuid, socket_id: Uuid },

    #[serde(rename = "user.offline")]
    UserOffline { user_id: Uuid, socket_id: Uuid },

    /// Terminal failure for a client-initiated send, delivered only to the
    /// initiating connection.
    #[serde(rename = "error")]
    Error { code: u16, message: String },
}

impl WsEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageNew { .. } => "message.new",
            Self::MessageRead { .. } => "message.read",
            Self::TypingStarted { .. } => "typing.started",
            Self::TypingStopped { .. } => "typing.stopped",
            Self::UserOnline { .. } => "user.online",
            Self::UserOffline { .. } => "user.offline",
            Self::Error { .. } => "error",
        }
    }

    /// The flat broadcast payload. This is the only place event
    /// serialization happens.
    pub fn to_payload_value(&self, user_id: Uuid) -> Result<serde_json::Value, serde_json::Error> {
        let mut payload = serde_json::to_value(self)?;
        if let serde_json::Value::Object(map) = &mut payload {
            map.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));
            // MessageNew / presence events already carry their own user field
            map.entry("user_id").or_insert(json!(user_id));
        }
        Ok(payload)
    }

    fn to_ws_message(&self, user_id: Uuid) -> Result<Message, serde_json::Error> {
        let payload = self.to_payload_value(user_id)?;
        Ok(Message::Text(payload.to_string()))
    }
}

/// Publish an event to a topic. Best-effort: a disconnected subscriber never
/// receives it and no receipt exists.
pub async fn broadcast_event(registry: &ConnectionRegistry, topic: Topic, user_id: Uuid, event: WsEvent) {
    match event.to_ws_message(user_id) {
        Ok(msg) => registry.publish(topic, msg).await,
        Err(e) => tracing::error!(error = %e, event = event.event_type(), "failed to serialize event"),
    }
}

/// Publish to a topic excluding the originating connection (typing relay).
pub async fn broadcast_event_except(
    registry: &ConnectionRegistry,
    topic: Topic,
    except: ConnectionId,
    user_id: Uuid,
    event: WsEvent,
) {
    match event.to_ws_message(user_id) {
        Ok(msg) => registry.publish_except(topic, except, msg).await,
        Err(e) => tracing::error!(error = %e, event = event.event_type(), "failed to serialize event"),
    }
}

/// Global presence fan-out for a registry transition.
pub async fn broadcast_presence(
    registry: &ConnectionRegistry,
    change: PresenceChange,
    socket_id: ConnectionId,
) {
    let (user_id, event) = match change {
        PresenceChange::Online(user_id) => (user_id, WsEvent::UserOnline { user_id, socket_id }),
        PresenceChange::Offline(user_id) => (user_id, WsEvent::UserOffline { user_id, socket_id }),
    };
    match event.to_ws_message(user_id) {
        Ok(msg) => registry.broadcast_all(msg).await,
        Err(e) => tracing::error!(error = %e, "failed to serialize presence event"),
    }
}

/// Deliver a terminal error to the initiating connection only.
pub async fn send_error(
    registry: &ConnectionRegistry,
    connection_id: ConnectionId,
    user_id: Uuid,
    err: &crate::error::AppError,
) {
    let event = WsEvent::Error {
        code: err.status_code(),
        message: err.to_string(),
    };
    if let Ok(msg) = event.to_ws_message(user_id) {
        registry.send_to(connection_id, msg).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_naming() {
        let event = WsEvent::TypingStarted {
            conversation_id: Uuid::new_v4(),
        };
        assert_eq!(event.event_type(), "typing.started");
    }

    #[test]
    fn test_payload_is_flat() {
        let conversation_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let event = WsEvent::TypingStarted { conversation_id };

        let payload = event.to_payload_value(user_id).unwrap();
        assert_eq!(payload["type"], "typing.started");
        assert_eq!(payload["conversation_id"], conversation_id.to_string());
        assert_eq!(payload["user_id"], user_id.to_string());
        assert!(payload["timestamp"].is_string());
    }

    #[test]
    fn test_message_new_payload_carries_delivery_fields() {
        let sender = Uuid::new_v4();
        let event = WsEvent::MessageNew {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: sender,
            sender_name: Some("ada".into()),
            sender_avatar_url: None,
            content: "hi".into(),
            read: false,
        };

        let payload = event.to_payload_value(sender).unwrap();
        assert_eq!(payload["read"], false);
        assert_eq!(payload["content"], "hi");
        assert_eq!(payload["sender_name"], "ada");
    }

    #[test]
    fn test_all_event_types_are_unique() {
        let types = [
            WsEvent::MessageNew {
                id: Uuid::new_v4(),
                conversation_id: Uuid::new_v4(),
                sender_id: Uuid::new_v4(),
                sender_name: None,
                sender_avatar_url: None,
                content: String::new(),
                read: false,
            }
            .event_type(),
            WsEvent::MessageRead {
                conversation_id: Uuid::new_v4(),
                message_ids: vec![],
            }
            .event_type(),
            WsEvent::TypingStarted {
                conversation_id: Uuid::new_v4(),
            }
            .event_type(),
            WsEvent::TypingStopped {
                conversation_id: Uuid::new_v4(),
            }
            .event_type(),
            WsEvent::UserOnline {
                user_id: Uuid::new_v4(),
                socket_id: Uuid::new_v4(),
            }
            .event_type(),
            WsEvent::UserOffline {
                user_id: Uuid::new_v4(),
                socket_id: Uuid::new_v4(),
            }
            .event_type(),
        ];

        let unique: std::collections::HashSet<_> = types.iter().collect();
        assert_eq!(types.len(), unique.len(), "duplicate event type detected");
    }
}
