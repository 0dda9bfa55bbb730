use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Null means unread; set exactly once when the recipient views the page
    /// containing this message.
    pub read_at: Option<DateTime<Utc>>,
    /// Exempts the message from retention deletion. Global to the message,
    /// not per-viewer.
    pub is_saved: bool,
    pub tags: Vec<String>,
}
