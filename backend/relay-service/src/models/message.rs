use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message row matching database schema.
///
/// The payload is an opaque ciphertext blob; the relay never inspects it.
/// `server_seq` is assigned inside the ingestion transaction and is unique
/// and gapless-at-assignment per conversation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_device_id: Uuid,
    pub server_seq: i64,
    pub client_message_uuid: Uuid,
    pub encrypted_payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}
