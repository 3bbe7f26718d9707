//! Delivery transition endpoint.

use crate::error::AppError;
use crate::middleware::guards::TrustedDevice;
use crate::services::receipts::{AckItem, ReceiptService};
use crate::state::AppState;
use actix_middleware::DeviceIdentity;
use actix_web::{post, web, HttpResponse};
use error_types::error_codes;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AckRequest {
    pub items: Vec<AckItem>,
}

/// POST /v1/messages/ack
/// Apply a batch of delivery transitions against the calling device's own
/// inbox rows. Partial success: inapplicable items are itemized in the
/// response, they never fail the batch.
#[post("/v1/messages/ack")]
pub async fn ack_messages(
    state: web::Data<AppState>,
    identity: DeviceIdentity,
    body: web::Json<AckRequest>,
) -> Result<HttpResponse, AppError> {
    let device = TrustedDevice::verify(&state.db, identity).await?;

    if body.items.is_empty() {
        return Err(AppError::bad_request(
            error_codes::MISSING_FIELDS,
            "items must not be empty",
        ));
    }

    let outcome = ReceiptService::apply_batch(&state.db, &device, &body.items).await?;
    Ok(HttpResponse::Ok().json(outcome))
}
