//! Message ingestion endpoint.
//!
//! Validation happens here, before any write: field presence, uuid shape,
//! payload encoding. Authorization (trusted device, conversation membership)
//! runs before the ingestion transaction starts.

use crate::error::AppError;
use crate::middleware::guards::{ConversationMember, TrustedDevice};
use crate::services::ingestion::IngestionService;
use crate::state::AppState;
use actix_middleware::DeviceIdentity;
use actix_web::{post, web, HttpResponse};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use error_types::error_codes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================
// Request/Response DTOs
// ============================================

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: String,
    /// Client-chosen idempotency key for this send
    pub client_message_uuid: String,
    /// Ciphertext, base64
    pub payload: String,
    /// Optional message lifetime in seconds
    pub ttl_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message_id: Uuid,
    pub server_seq: i64,
    pub created_at: DateTime<Utc>,
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

// ============================================
// Endpoints
// ============================================

/// POST /v1/messages/send
/// Ingest one message: sequence it, store it, fan it out. Replaying the
/// same `client_message_uuid` returns the original outcome with
/// `duplicate: true`.
#[post("/v1/messages/send")]
pub async fn send_message(
    state: web::Data<AppState>,
    identity: DeviceIdentity,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let device = TrustedDevice::verify(&state.db, identity).await?;

    if body.conversation_id.trim().is_empty()
        || body.client_message_uuid.trim().is_empty()
        || body.payload.is_empty()
    {
        return Err(AppError::bad_request(
            error_codes::MISSING_FIELDS,
            "conversation_id, client_message_uuid and payload are required",
        ));
    }

    let conversation_id = Uuid::parse_str(body.conversation_id.trim()).map_err(|_| {
        AppError::bad_request(
            error_codes::INVALID_UUID,
            "conversation_id is not a valid UUID",
        )
    })?;
    let client_message_uuid = Uuid::parse_str(body.client_message_uuid.trim()).map_err(|_| {
        AppError::bad_request(
            error_codes::INVALID_UUID,
            "client_message_uuid is not a valid UUID",
        )
    })?;

    let payload = STANDARD.decode(body.payload.as_bytes()).map_err(|_| {
        AppError::bad_request(error_codes::INVALID_PAYLOAD, "payload is not valid base64")
    })?;

    ConversationMember::verify(&state.db, device.user_id, conversation_id).await?;

    let outcome = IngestionService::submit(
        &state.db,
        conversation_id,
        device.user_id,
        device.device_id,
        client_message_uuid,
        &payload,
        body.ttl_seconds,
        state.config.inbox_ttl_days,
    )
    .await?;

    Ok(HttpResponse::Ok().json(SendMessageResponse {
        message_id: outcome.message_id,
        server_seq: outcome.server_seq,
        created_at: outcome.created_at,
        duplicate: outcome.duplicate,
        expires_at: outcome.expires_at,
    }))
}
