//! Receipt batches: applying delivery transitions and rolling status up
//! for senders.
//!
//! Every row mutation binds the calling device's id in the WHERE clause;
//! a row the device does not own looks identical to a row that does not
//! exist, and neither stops the rest of the batch.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::delivery::state_machine::{
    bumps_retry_count, evaluate_transition, DeliveryStatus, TransitionOutcome,
};
use crate::error::AppError;
use crate::metrics;
use crate::middleware::TrustedDevice;
use crate::models::ReceiptType;

/// One requested transition against one owned inbox row.
#[derive(Debug, Clone, Deserialize)]
pub struct AckItem {
    pub inbox_id: i64,
    pub status: DeliveryStatus,
}

/// Per-item outcome reported back to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckDisposition {
    Applied,
    /// Already in the requested state; nothing written
    Noop,
    /// Transition not in the table for the row's current state
    InvalidTransition,
    /// Row missing or owned by another device; reported identically
    NotOwned,
}

#[derive(Debug, Clone, Serialize)]
pub struct AckResult {
    pub inbox_id: i64,
    pub disposition: AckDisposition,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub updated: u64,
    pub results: Vec<AckResult>,
}

/// Sender-facing rollup of one message's receipts.
#[derive(Debug, Clone, Serialize)]
pub struct MessageStatus {
    pub message_uuid: Uuid,
    pub server_seq: i64,
    pub status: &'static str,
    pub delivered_count: i64,
    pub read_count: i64,
}

pub struct ReceiptService;

impl ReceiptService {
    /// Apply a batch of transitions for the calling device. Inapplicable
    /// items are skipped and itemized; applicable ones commit together.
    pub async fn apply_batch(
        db: &PgPool,
        device: &TrustedDevice,
        items: &[AckItem],
    ) -> Result<BatchOutcome, AppError> {
        let mut results = Vec::with_capacity(items.len());
        let mut updated: u64 = 0;

        let mut tx = db.begin().await?;

        for item in items {
            let row: Option<(String, Uuid, i64, Uuid)> = sqlx::query_as(
                "SELECT status, conversation_id, server_seq, message_uuid
                 FROM device_inbox
                 WHERE inbox_id = $1 AND recipient_device_id = $2",
            )
            .bind(item.inbox_id)
            .bind(device.device_id)
            .fetch_optional(&mut *tx)
            .await?;

            let (status_db, conversation_id, server_seq, message_uuid) = match row {
                Some(r) => r,
                None => {
                    metrics::FOREIGN_ACK_ATTEMPTS_TOTAL.inc();
                    tracing::warn!(
                        inbox_id = item.inbox_id,
                        device_id = %device.device_id,
                        user_id = %device.user_id,
                        "ack for inbox row the device does not own"
                    );
                    results.push(AckResult {
                        inbox_id: item.inbox_id,
                        disposition: AckDisposition::NotOwned,
                    });
                    continue;
                }
            };

            let current = DeliveryStatus::from_db(&status_db).ok_or_else(|| {
                tracing::error!(
                    inbox_id = item.inbox_id,
                    status = %status_db,
                    "inbox row carries unknown status"
                );
                AppError::Internal
            })?;

            match evaluate_transition(current, item.status) {
                TransitionOutcome::NoOp => {
                    results.push(AckResult {
                        inbox_id: item.inbox_id,
                        disposition: AckDisposition::Noop,
                    });
                }
                TransitionOutcome::Reject => {
                    metrics::INVALID_TRANSITIONS_TOTAL.inc();
                    tracing::warn!(
                        inbox_id = item.inbox_id,
                        device_id = %device.device_id,
                        current = %current.to_db(),
                        requested = %item.status.to_db(),
                        "rejected delivery transition"
                    );
                    results.push(AckResult {
                        inbox_id: item.inbox_id,
                        disposition: AckDisposition::InvalidTransition,
                    });
                }
                TransitionOutcome::Apply => {
                    let bump: i32 = if bumps_retry_count(item.status) { 1 } else { 0 };
                    sqlx::query(
                        "UPDATE device_inbox
                         SET status = $1, retry_count = retry_count + $2, updated_at = NOW()
                         WHERE inbox_id = $3 AND recipient_device_id = $4",
                    )
                    .bind(item.status.to_db())
                    .bind(bump)
                    .bind(item.inbox_id)
                    .bind(device.device_id)
                    .execute(&mut *tx)
                    .await?;

                    if matches!(item.status, DeliveryStatus::Delivered | DeliveryStatus::Read) {
                        Self::append_receipt(
                            &mut tx,
                            message_uuid,
                            conversation_id,
                            device,
                            item.status,
                        )
                        .await?;
                    }

                    if item.status == DeliveryStatus::Read {
                        Self::advance_read_marker(&mut tx, conversation_id, device, server_seq)
                            .await?;
                    }

                    metrics::ACKS_APPLIED_TOTAL
                        .with_label_values(&[item.status.to_db()])
                        .inc();
                    updated += 1;
                    results.push(AckResult {
                        inbox_id: item.inbox_id,
                        disposition: AckDisposition::Applied,
                    });
                }
            }
        }

        tx.commit().await?;

        Ok(BatchOutcome { updated, results })
    }

    /// Receipts are append-only; replays hit the unique key and vanish.
    async fn append_receipt(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        message_uuid: Uuid,
        conversation_id: Uuid,
        device: &TrustedDevice,
        status: DeliveryStatus,
    ) -> Result<(), AppError> {
        let receipt_type = match status {
            DeliveryStatus::Delivered => ReceiptType::Delivered,
            DeliveryStatus::Read => ReceiptType::Read,
            _ => return Ok(()),
        };

        sqlx::query(
            "INSERT INTO receipts (message_uuid, conversation_id, user_id, device_id, receipt_type)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (message_uuid, device_id, receipt_type) DO NOTHING",
        )
        .bind(message_uuid)
        .bind(conversation_id)
        .bind(device.user_id)
        .bind(device.device_id)
        .bind(receipt_type.to_db())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Read markers only move forward; a late READ for an older seq is
    /// absorbed by GREATEST.
    async fn advance_read_marker(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        conversation_id: Uuid,
        device: &TrustedDevice,
        server_seq: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO read_markers (conversation_id, device_id, last_read_seq)
             VALUES ($1, $2, $3)
             ON CONFLICT (conversation_id, device_id)
             DO UPDATE SET
                 last_read_seq = GREATEST(read_markers.last_read_seq, EXCLUDED.last_read_seq),
                 updated_at = NOW()",
        )
        .bind(conversation_id)
        .bind(device.device_id)
        .bind(server_seq)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Roll one message's receipts up for its sender. Membership has been
    /// checked by the caller; an unknown message in a known conversation is
    /// reported without acknowledging whether it exists elsewhere.
    pub async fn message_status(
        db: &PgPool,
        conversation_id: Uuid,
        message_uuid: Uuid,
    ) -> Result<MessageStatus, AppError> {
        let server_seq: Option<i64> = sqlx::query_scalar(
            "SELECT server_seq FROM messages
             WHERE client_message_uuid = $1 AND conversation_id = $2",
        )
        .bind(message_uuid)
        .bind(conversation_id)
        .fetch_optional(db)
        .await?;

        let server_seq = server_seq.ok_or(AppError::NotFound)?;

        let counts: Vec<(String, i64)> = sqlx::query_as(
            "SELECT receipt_type, COUNT(*) FROM receipts
             WHERE message_uuid = $1
             GROUP BY receipt_type",
        )
        .bind(message_uuid)
        .fetch_all(db)
        .await?;

        let mut delivered_count = 0;
        let mut read_count = 0;
        for (receipt_type, count) in counts {
            match ReceiptType::from_db(&receipt_type) {
                Some(ReceiptType::Delivered) => delivered_count = count,
                Some(ReceiptType::Read) => read_count = count,
                None => {}
            }
        }

        Ok(MessageStatus {
            message_uuid,
            server_seq,
            status: Self::rollup(delivered_count, read_count),
            delivered_count,
            read_count,
        })
    }

    /// READ outranks DELIVERED outranks SENT; one reader is enough to
    /// surface READ even in a group.
    fn rollup(delivered_count: i64, read_count: i64) -> &'static str {
        if read_count > 0 {
            "READ"
        } else if delivered_count > 0 {
            "DELIVERED"
        } else {
            "SENT"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollup_precedence() {
        assert_eq!(ReceiptService::rollup(0, 0), "SENT");
        assert_eq!(ReceiptService::rollup(3, 0), "DELIVERED");
        assert_eq!(ReceiptService::rollup(3, 1), "READ");
        assert_eq!(ReceiptService::rollup(0, 2), "READ");
    }

    #[test]
    fn test_ack_item_wire_format() {
        let item: AckItem =
            serde_json::from_str(r#"{"inbox_id": 42, "status": "DELIVERED"}"#).unwrap();
        assert_eq!(item.inbox_id, 42);
        assert_eq!(item.status, DeliveryStatus::Delivered);
    }

    #[test]
    fn test_disposition_wire_format() {
        let json = serde_json::to_string(&AckDisposition::InvalidTransition).unwrap();
        assert_eq!(json, "\"invalid_transition\"");
    }
}
