//! Per-message delivery status rollup.

use crate::error::AppError;
use crate::middleware::guards::{ConversationMember, TrustedDevice};
use crate::services::receipts::ReceiptService;
use crate::state::AppState;
use actix_middleware::DeviceIdentity;
use actix_web::{get, web, HttpResponse};
use error_types::error_codes;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub conversation_id: String,
    pub message_uuid: String,
}

/// GET /v1/messages/status
/// Aggregate receipt counts for one message into a single coarse state.
#[get("/v1/messages/status")]
pub async fn message_status(
    state: web::Data<AppState>,
    identity: DeviceIdentity,
    query: web::Query<StatusQuery>,
) -> Result<HttpResponse, AppError> {
    TrustedDevice::verify(&state.db, identity).await?;

    let conversation_id = Uuid::parse_str(&query.conversation_id).map_err(|_| {
        AppError::bad_request(error_codes::INVALID_UUID, "conversation_id must be a UUID")
    })?;
    let message_uuid = Uuid::parse_str(&query.message_uuid).map_err(|_| {
        AppError::bad_request(error_codes::INVALID_UUID, "message_uuid must be a UUID")
    })?;

    ConversationMember::verify(&state.db, identity.user_id, conversation_id).await?;

    let status = ReceiptService::message_status(&state.db, conversation_id, message_uuid).await?;
    Ok(HttpResponse::Ok().json(status))
}
