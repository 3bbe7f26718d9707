//! Device inbox pull endpoint.

use crate::error::AppError;
use crate::metrics;
use crate::middleware::guards::TrustedDevice;
use crate::services::mailbox::MailboxService;
use crate::state::AppState;
use actix_middleware::DeviceIdentity;
use actix_web::http::header;
use actix_web::{get, web, HttpRequest, HttpResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct PullQuery {
    /// Resume after this inbox row; 0 means from the beginning
    #[serde(default)]
    pub since_inbox_id: i64,
    /// Resume after this receipt; 0 means from the beginning
    #[serde(default)]
    pub since_receipt_id: i64,
    pub limit: Option<i64>,
}

/// GET /v1/messages/pull
/// Page of new inbox rows and receipts for the calling device, oldest
/// first. Sends an ETag over the device's high-water marks; a matching
/// If-None-Match short-circuits to 304 before any page is built.
#[get("/v1/messages/pull")]
pub async fn pull_messages(
    state: web::Data<AppState>,
    identity: DeviceIdentity,
    query: web::Query<PullQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let device = TrustedDevice::verify(&state.db, identity).await?;

    let fingerprint = MailboxService::fingerprint(&state.db, &device).await?;
    let etag = format!("\"{fingerprint}\"");

    if let Some(candidate) = req
        .headers()
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        if candidate == etag {
            metrics::PULL_NOT_MODIFIED_TOTAL.inc();
            return Ok(HttpResponse::NotModified()
                .insert_header((header::ETAG, etag))
                .finish());
        }
    }

    let limit = state.config.clamp_pull_limit(query.limit);
    let page = MailboxService::pull(
        &state.db,
        &device,
        query.since_inbox_id,
        query.since_receipt_id,
        limit,
    )
    .await?;

    Ok(HttpResponse::Ok()
        .insert_header((header::ETAG, etag))
        .json(page))
}
