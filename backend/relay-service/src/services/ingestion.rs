//! Message ingestion: dedupe, sequence, store, fan out.
//!
//! One transaction covers the whole unit. Either the message row, its
//! sequence claim, and every recipient inbox row commit together, or none
//! of them do; partial fanout is never observable.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::metrics;

/// Window for sender-requested inbox TTLs.
const MIN_TTL_SECONDS: i64 = 60;
const MAX_TTL_SECONDS: i64 = 30 * 24 * 3600;

/// Outcome of one send, fresh or replayed.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub message_id: Uuid,
    pub server_seq: i64,
    pub created_at: DateTime<Utc>,
    /// Message-level expiry, only set when the sender asked for one
    pub expires_at: Option<DateTime<Utc>>,
    pub duplicate: bool,
    /// Inbox rows written; zero when replaying a duplicate
    pub fanout_rows: u64,
}

pub struct IngestionService;

impl IngestionService {
    /// Accept one send. Duplicates (same `client_message_uuid`) replay the
    /// original outcome without writing anything. A unique-key race is
    /// retried once as a whole unit; if it recurs it surfaces as a 409.
    #[allow(clippy::too_many_arguments)]
    pub async fn submit(
        db: &PgPool,
        conversation_id: Uuid,
        sender_id: Uuid,
        sender_device_id: Uuid,
        client_message_uuid: Uuid,
        payload: &[u8],
        ttl_seconds: Option<i64>,
        default_ttl_days: i64,
    ) -> Result<IngestOutcome, AppError> {
        // Fast path: replay of an already-committed send
        if let Some(prior) = Self::find_existing(db, client_message_uuid).await? {
            metrics::DUPLICATE_SENDS_TOTAL.inc();
            return Ok(prior);
        }

        let inbox_expires_at = Self::inbox_expiry(ttl_seconds, default_ttl_days);
        let message_expires_at = ttl_seconds.map(|_| inbox_expires_at);

        let first_attempt = Self::ingest_once(
            db,
            conversation_id,
            sender_id,
            sender_device_id,
            client_message_uuid,
            payload,
            message_expires_at,
            inbox_expires_at,
        )
        .await;

        let conflict = match first_attempt {
            Ok(outcome) => return Ok(outcome),
            Err(AppError::Conflict(msg)) => msg,
            Err(e) => return Err(e),
        };

        metrics::INGEST_CONFLICTS_TOTAL.inc();
        tracing::warn!(
            conversation_id = %conversation_id,
            client_message_uuid = %client_message_uuid,
            reason = %conflict,
            "ingestion raced, retrying once"
        );

        // A racing duplicate of the same send may have won; replay it
        if let Some(prior) = Self::find_existing(db, client_message_uuid).await? {
            metrics::DUPLICATE_SENDS_TOTAL.inc();
            return Ok(prior);
        }

        match Self::ingest_once(
            db,
            conversation_id,
            sender_id,
            sender_device_id,
            client_message_uuid,
            payload,
            message_expires_at,
            inbox_expires_at,
        )
        .await
        {
            Ok(outcome) => Ok(outcome),
            Err(AppError::Conflict(msg)) => {
                metrics::INGEST_CONFLICTS_TOTAL.inc();
                if let Some(prior) = Self::find_existing(db, client_message_uuid).await? {
                    metrics::DUPLICATE_SENDS_TOTAL.inc();
                    return Ok(prior);
                }
                Err(AppError::Conflict(msg))
            }
            Err(e) => Err(e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn ingest_once(
        db: &PgPool,
        conversation_id: Uuid,
        sender_id: Uuid,
        sender_device_id: Uuid,
        client_message_uuid: Uuid,
        payload: &[u8],
        message_expires_at: Option<DateTime<Utc>>,
        inbox_expires_at: DateTime<Utc>,
    ) -> Result<IngestOutcome, AppError> {
        let id = Uuid::new_v4();
        let mut tx = db.begin().await?;

        // The counter upsert and the message insert ride one statement, so
        // the sequence cannot advance without the row that claims it and a
        // rollback never burns a number
        let (message_id, server_seq, created_at): (Uuid, i64, DateTime<Utc>) = sqlx::query_as(
            r#"
            WITH next AS (
                INSERT INTO conversation_sequences (conversation_id, last_seq)
                VALUES ($2, 1)
                ON CONFLICT (conversation_id)
                DO UPDATE SET last_seq = conversation_sequences.last_seq + 1
                RETURNING last_seq
            )
            INSERT INTO messages (
                id,
                conversation_id,
                sender_id,
                sender_device_id,
                server_seq,
                client_message_uuid,
                encrypted_payload,
                expires_at
            )
            SELECT $1, $2, $3, $4, next.last_seq, $5, $6, $7
            FROM next
            RETURNING id, server_seq, created_at
            "#,
        )
        .bind(id)
        .bind(conversation_id)
        .bind(sender_id)
        .bind(sender_device_id)
        .bind(client_message_uuid)
        .bind(payload)
        .bind(message_expires_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(Self::map_unique_violation)?;

        // One statement fans out to every TRUSTED device of every member
        // except the sender's own user (their devices learn of the send
        // through the duplicate-replay path, not the inbox)
        let fanout = sqlx::query(
            r#"
            INSERT INTO device_inbox (
                recipient_device_id,
                message_uuid,
                conversation_id,
                server_seq,
                status,
                expires_at
            )
            SELECT d.id, $1, $2, $3, 'PENDING', $4
            FROM conversation_members cm
            JOIN devices d ON d.user_id = cm.user_id
            WHERE cm.conversation_id = $2
              AND d.trust_state = 'TRUSTED'
              AND cm.user_id <> $5
            ON CONFLICT (recipient_device_id, message_uuid) DO NOTHING
            "#,
        )
        .bind(client_message_uuid)
        .bind(conversation_id)
        .bind(server_seq)
        .bind(inbox_expires_at)
        .bind(sender_id)
        .execute(&mut *tx)
        .await
        .map_err(Self::map_unique_violation)?;

        tx.commit().await?;

        let fanout_rows = fanout.rows_affected();
        metrics::MESSAGES_INGESTED_TOTAL.inc();
        metrics::FANOUT_ROWS_TOTAL.inc_by(fanout_rows);
        tracing::info!(
            conversation_id = %conversation_id,
            message_id = %message_id,
            server_seq = server_seq,
            fanout_rows = fanout_rows,
            "message ingested"
        );

        Ok(IngestOutcome {
            message_id,
            server_seq,
            created_at,
            expires_at: message_expires_at,
            duplicate: false,
            fanout_rows,
        })
    }

    /// Look up a committed send by its client uuid for duplicate replay.
    async fn find_existing(
        db: &PgPool,
        client_message_uuid: Uuid,
    ) -> Result<Option<IngestOutcome>, AppError> {
        let row: Option<(Uuid, i64, DateTime<Utc>, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT id, server_seq, created_at, expires_at
             FROM messages
             WHERE client_message_uuid = $1",
        )
        .bind(client_message_uuid)
        .fetch_optional(db)
        .await?;

        Ok(row.map(
            |(message_id, server_seq, created_at, expires_at)| IngestOutcome {
                message_id,
                server_seq,
                created_at,
                expires_at,
                duplicate: true,
                fanout_rows: 0,
            },
        ))
    }

    /// Inbox rows always expire; senders may tighten (or stretch, within the
    /// window) the configured default.
    fn inbox_expiry(ttl_seconds: Option<i64>, default_ttl_days: i64) -> DateTime<Utc> {
        let seconds = match ttl_seconds {
            Some(requested) => requested.clamp(MIN_TTL_SECONDS, MAX_TTL_SECONDS),
            None => default_ttl_days * 24 * 3600,
        };
        Utc::now() + Duration::seconds(seconds)
    }

    fn map_unique_violation(e: sqlx::Error) -> AppError {
        if let Some(db_err) = e.as_database_error() {
            if db_err.code().as_deref() == Some("23505") {
                return AppError::Conflict("concurrent send raced a unique key".into());
            }
        }
        AppError::Database(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_ttl_is_clamped_into_window() {
        let now = Utc::now();

        let floor = IngestionService::inbox_expiry(Some(1), 30);
        assert!(floor - now >= Duration::seconds(MIN_TTL_SECONDS - 1));
        assert!(floor - now <= Duration::seconds(MIN_TTL_SECONDS + 1));

        let ceiling = IngestionService::inbox_expiry(Some(i64::MAX), 30);
        assert!(ceiling - now <= Duration::seconds(MAX_TTL_SECONDS + 1));
    }

    #[test]
    fn test_default_ttl_uses_configured_days() {
        let now = Utc::now();
        let expiry = IngestionService::inbox_expiry(None, 7);
        let expected = Duration::days(7);
        assert!(expiry - now >= expected - Duration::seconds(1));
        assert!(expiry - now <= expected + Duration::seconds(1));
    }

    #[test]
    fn test_unique_violation_maps_to_conflict() {
        let err = IngestionService::map_unique_violation(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::Database(_)));
    }
}
