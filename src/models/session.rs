use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per (conversation, user) read/retention bookkeeping. Upserted on exit;
/// at most one row per pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub last_exited_at: DateTime<Utc>,
}

/// A timed record of one user's active participation interval in a
/// conversation. Opened on first send while no open session exists; closed
/// explicitly, computing the duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSessionLog {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
}
