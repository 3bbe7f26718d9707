//! Device mailbox reads: pull pages, change fingerprints, and the two sync
//! modes (cursor catch-up and bounded gap repair).
//!
//! Everything here is read-only. Delivery state only moves through the ack
//! path, so a crashed or replayed reader can re-run any of these queries
//! and see the same rows.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::delivery::watermark::RepairRange;
use crate::error::AppError;
use crate::metrics;
use crate::middleware::TrustedDevice;
use crate::models::{Message, Receipt};

/// One inbox row joined with its message, ready for the wire.
#[derive(Debug, Clone, Serialize)]
pub struct InboxMessage {
    pub inbox_id: i64,
    pub message_uuid: Uuid,
    pub conversation_id: Uuid,
    pub server_seq: i64,
    pub status: String,
    pub sender_id: Uuid,
    pub sender_device_id: Uuid,
    /// Ciphertext, base64
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Conversation-scoped message for sync and repair reads.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationMessage {
    pub message_uuid: Uuid,
    pub conversation_id: Uuid,
    pub server_seq: i64,
    pub sender_id: Uuid,
    pub sender_device_id: Uuid,
    /// Ciphertext, base64
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for ConversationMessage {
    fn from(m: Message) -> Self {
        Self {
            message_uuid: m.client_message_uuid,
            conversation_id: m.conversation_id,
            server_seq: m.server_seq,
            sender_id: m.sender_id,
            sender_device_id: m.sender_device_id,
            payload: STANDARD.encode(&m.encrypted_payload),
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct InboxJoinRow {
    inbox_id: i64,
    message_uuid: Uuid,
    conversation_id: Uuid,
    server_seq: i64,
    status: String,
    expires_at: DateTime<Utc>,
    sender_id: Uuid,
    sender_device_id: Uuid,
    encrypted_payload: Vec<u8>,
    created_at: DateTime<Utc>,
}

/// One pull page: new inbox rows plus receipts flowing back to this user's
/// sends, each under its own cursor.
#[derive(Debug, Clone, Serialize)]
pub struct PullPage {
    pub messages: Vec<InboxMessage>,
    pub receipts: Vec<Receipt>,
    pub next_inbox_cursor: i64,
    pub next_receipt_cursor: i64,
    pub has_more: bool,
}

pub struct MailboxService;

impl MailboxService {
    /// Page of inbox rows strictly after `since_inbox_id`, oldest first,
    /// plus receipts for this user's sent messages strictly after
    /// `since_receipt_id`. Expired rows are invisible.
    pub async fn pull(
        db: &PgPool,
        device: &TrustedDevice,
        since_inbox_id: i64,
        since_receipt_id: i64,
        limit: i64,
    ) -> Result<PullPage, AppError> {
        let rows: Vec<InboxJoinRow> = sqlx::query_as(
            r#"
            SELECT di.inbox_id,
                   di.message_uuid,
                   di.conversation_id,
                   di.server_seq,
                   di.status,
                   di.expires_at,
                   m.sender_id,
                   m.sender_device_id,
                   m.encrypted_payload,
                   m.created_at
            FROM device_inbox di
            JOIN messages m ON m.client_message_uuid = di.message_uuid
            WHERE di.recipient_device_id = $1
              AND di.inbox_id > $2
              AND di.expires_at > NOW()
            ORDER BY di.inbox_id ASC
            LIMIT $3
            "#,
        )
        .bind(device.device_id)
        .bind(since_inbox_id)
        .bind(limit)
        .fetch_all(db)
        .await?;

        let receipts: Vec<Receipt> = sqlx::query_as(
            r#"
            SELECT r.receipt_id,
                   r.message_uuid,
                   r.conversation_id,
                   r.user_id,
                   r.device_id,
                   r.receipt_type,
                   r.created_at
            FROM receipts r
            JOIN messages m ON m.client_message_uuid = r.message_uuid
            WHERE m.sender_id = $1
              AND r.receipt_id > $2
            ORDER BY r.receipt_id ASC
            LIMIT $3
            "#,
        )
        .bind(device.user_id)
        .bind(since_receipt_id)
        .bind(limit)
        .fetch_all(db)
        .await?;

        // A full page on either stream means there may be more behind it
        let has_more = rows.len() as i64 == limit || receipts.len() as i64 == limit;
        let next_inbox_cursor = rows.last().map(|r| r.inbox_id).unwrap_or(since_inbox_id);
        let next_receipt_cursor = receipts
            .last()
            .map(|r| r.receipt_id)
            .unwrap_or(since_receipt_id);

        let messages = rows
            .into_iter()
            .map(|r| InboxMessage {
                inbox_id: r.inbox_id,
                message_uuid: r.message_uuid,
                conversation_id: r.conversation_id,
                server_seq: r.server_seq,
                status: r.status,
                sender_id: r.sender_id,
                sender_device_id: r.sender_device_id,
                payload: STANDARD.encode(&r.encrypted_payload),
                created_at: r.created_at,
                expires_at: r.expires_at,
            })
            .collect();

        Ok(PullPage {
            messages,
            receipts,
            next_inbox_cursor,
            next_receipt_cursor,
            has_more,
        })
    }

    /// Cheap change fingerprint for If-None-Match. Folds the device's inbox
    /// high-water mark and the user's receipt high-water mark; any new row
    /// moves it.
    pub async fn fingerprint(db: &PgPool, device: &TrustedDevice) -> Result<String, AppError> {
        let (max_inbox, max_receipt): (Option<i64>, Option<i64>) = sqlx::query_as(
            r#"
            SELECT
                (SELECT MAX(inbox_id) FROM device_inbox WHERE recipient_device_id = $1),
                (SELECT MAX(r.receipt_id)
                 FROM receipts r
                 JOIN messages m ON m.client_message_uuid = r.message_uuid
                 WHERE m.sender_id = $2)
            "#,
        )
        .bind(device.device_id)
        .bind(device.user_id)
        .fetch_one(db)
        .await?;

        let mut hasher = Sha256::new();
        hasher.update(device.device_id.as_bytes());
        hasher.update(max_inbox.unwrap_or(0).to_be_bytes());
        hasher.update(max_receipt.unwrap_or(0).to_be_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Conversation catch-up: messages strictly after `after_seq`, ascending.
    pub async fn sync_cursor(
        db: &PgPool,
        conversation_id: Uuid,
        after_seq: i64,
        limit: i64,
    ) -> Result<(Vec<ConversationMessage>, bool), AppError> {
        let rows: Vec<Message> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, sender_id, sender_device_id, server_seq,
                   client_message_uuid, encrypted_payload, created_at, expires_at
            FROM messages
            WHERE conversation_id = $1 AND server_seq > $2
            ORDER BY server_seq ASC
            LIMIT $3
            "#,
        )
        .bind(conversation_id)
        .bind(after_seq)
        .bind(limit)
        .fetch_all(db)
        .await?;

        let has_more = rows.len() as i64 == limit;
        Ok((rows.into_iter().map(Into::into).collect(), has_more))
    }

    /// Bounded backfill read for a detected gap. Ascending, no side effects,
    /// so repairs can be retried freely. Sequence numbers with no surviving
    /// message are simply absent from the result.
    pub async fn repair_range(
        db: &PgPool,
        conversation_id: Uuid,
        range: RepairRange,
    ) -> Result<Vec<ConversationMessage>, AppError> {
        metrics::REPAIR_REQUESTS_TOTAL.inc();

        let rows: Vec<Message> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, sender_id, sender_device_id, server_seq,
                   client_message_uuid, encrypted_payload, created_at, expires_at
            FROM messages
            WHERE conversation_id = $1 AND server_seq BETWEEN $2 AND $3
            ORDER BY server_seq ASC
            "#,
        )
        .bind(conversation_id)
        .bind(range.from_seq)
        .bind(range.to_seq)
        .fetch_all(db)
        .await?;

        tracing::debug!(
            conversation_id = %conversation_id,
            from_seq = range.from_seq,
            to_seq = range.to_seq,
            returned = rows.len(),
            "repair read served"
        );

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
