//! Conversation sync endpoint: cursor catch-up and bounded gap repair.

use crate::delivery::watermark::RepairRange;
use crate::error::AppError;
use crate::middleware::guards::{ConversationMember, TrustedDevice};
use crate::services::mailbox::{ConversationMessage, MailboxService};
use crate::state::AppState;
use actix_middleware::DeviceIdentity;
use actix_web::{get, web, HttpResponse};
use error_types::error_codes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    pub conversation_id: String,
    /// Cursor mode: return messages with server_seq strictly above this
    pub after_seq: Option<i64>,
    /// Repair mode: inclusive range start (requires to_seq)
    pub from_seq: Option<i64>,
    /// Repair mode: inclusive range end (requires from_seq)
    pub to_seq: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub mode: &'static str,
    pub messages: Vec<ConversationMessage>,
    pub has_more: bool,
}

/// GET /v1/messages/sync
/// Two read-only modes over one conversation's sequence stream. With
/// `from_seq`+`to_seq` it backfills a detected gap (span capped); with
/// `after_seq` it pages forward. Both return ascending server_seq.
#[get("/v1/messages/sync")]
pub async fn sync_conversation(
    state: web::Data<AppState>,
    identity: DeviceIdentity,
    query: web::Query<SyncQuery>,
) -> Result<HttpResponse, AppError> {
    let device = TrustedDevice::verify(&state.db, identity).await?;

    let conversation_id = Uuid::parse_str(query.conversation_id.trim()).map_err(|_| {
        AppError::bad_request(
            error_codes::INVALID_UUID,
            "conversation_id is not a valid UUID",
        )
    })?;

    ConversationMember::verify(&state.db, device.user_id, conversation_id).await?;

    match (query.from_seq, query.to_seq) {
        (Some(from_seq), Some(to_seq)) => {
            let range = RepairRange::validate(from_seq, to_seq, state.config.repair_max_span)?;
            let messages = MailboxService::repair_range(&state.db, conversation_id, range).await?;
            Ok(HttpResponse::Ok().json(SyncResponse {
                mode: "repair",
                messages,
                has_more: false,
            }))
        }
        (None, None) => {
            let after_seq = query.after_seq.unwrap_or(0).max(0);
            let limit = match query.limit {
                Some(l) if l > 0 => l.min(state.config.pull_max_limit),
                _ => state.config.sync_page_limit,
            };
            let (messages, has_more) =
                MailboxService::sync_cursor(&state.db, conversation_id, after_seq, limit).await?;
            Ok(HttpResponse::Ok().json(SyncResponse {
                mode: "cursor",
                messages,
                has_more,
            }))
        }
        _ => Err(AppError::bad_request(
            error_codes::INVALID_RANGE,
            "from_seq and to_seq must be provided together",
        )),
    }
}
