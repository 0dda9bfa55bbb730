use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client-to-server socket events.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsInboundEvent {
    /// Declare the connection's user identity. Must match the token subject.
    #[serde(rename = "user:register")]
    Register { user_id: Uuid },

    #[serde(rename = "conversation:join")]
    Join { conversation_id: Uuid },

    #[serde(rename = "conversation:leave")]
    Leave { conversation_id: Uuid },

    #[serde(rename = "typing:start")]
    TypingStart { conversation_id: Uuid },

    #[serde(rename = "typing:end")]
    TypingEnd { conversation_id: Uuid },

    #[serde(rename = "message:send")]
    MessageSend {
        conversation_id: Uuid,
        content: String,
    },

    #[serde(rename = "message:read")]
    MessageRead {
        conversation_id: Uuid,
        message_ids: Vec<Uuid>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_events_deserialize_by_tag() {
        let conversation_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type": "typing:start", "conversation_id": "{conversation_id}"}}"#
        );

        let evt: WsInboundEvent = serde_json::from_str(&raw).unwrap();
        match evt {
            WsInboundEvent::TypingStart { conversation_id: id } => {
                assert_eq!(id, conversation_id)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_message_send_requires_content_field() {
        let raw = format!(
            r#"{{"type": "message:send", "conversation_id": "{}"}}"#,
            Uuid::new_v4()
        );
        assert!(serde_json::from_str::<WsInboundEvent>(&raw).is_err());
    }
}
