use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One device's copy of one message, matching database schema.
///
/// `inbox_id` is a global BIGSERIAL and doubles as the pull cursor.
/// `conversation_id` and `server_seq` are denormalized from the message so
/// pull pages and gap checks never join back to `messages` for ordering.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceInboxEntry {
    pub inbox_id: i64,
    pub recipient_device_id: Uuid,
    pub message_uuid: Uuid,
    pub conversation_id: Uuid,
    pub server_seq: i64,
    pub status: String,
    pub retry_count: i32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
