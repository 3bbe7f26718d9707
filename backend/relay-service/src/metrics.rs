use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};
use sqlx::{Pool, Postgres};
use std::time::Duration;

fn register_counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help)
        .unwrap_or_else(|e| panic!("failed to create {name}: {e}"));
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .unwrap_or_else(|e| panic!("failed to register {name}: {e}"));
    counter
}

pub static MESSAGES_INGESTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "relay_messages_ingested_total",
        "Messages accepted and fanned out by the relay",
    )
});

pub static DUPLICATE_SENDS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "relay_duplicate_sends_total",
        "Sends answered from the dedupe table without a new write",
    )
});

pub static FANOUT_ROWS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "relay_fanout_rows_total",
        "Inbox rows created across all ingested messages",
    )
});

pub static INGEST_CONFLICTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "relay_ingest_conflicts_total",
        "Unique-key races hit during ingestion, including resolved ones",
    )
});

pub static ACKS_APPLIED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "relay_acks_applied_total",
            "Delivery state transitions applied, by target status",
        ),
        &["status"],
    )
    .expect("failed to create relay_acks_applied_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register relay_acks_applied_total");
    counter
});

pub static INVALID_TRANSITIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "relay_invalid_transitions_total",
        "Ack items rejected by the delivery state machine",
    )
});

pub static FOREIGN_ACK_ATTEMPTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "relay_foreign_ack_attempts_total",
        "Ack items naming inbox rows the calling device does not own",
    )
});

pub static REPAIR_REQUESTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "relay_repair_requests_total",
        "Range-mode sync reads serving gap backfill",
    )
});

pub static PULL_NOT_MODIFIED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "relay_pull_not_modified_total",
        "Pull requests answered 304 via inbox fingerprint",
    )
});

pub static PENDING_INBOX_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "relay_pending_inbox_depth",
        "Inbox rows currently in PENDING across all devices",
    )
    .expect("failed to create relay_pending_inbox_depth");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register relay_pending_inbox_depth");
    gauge
});

/// Refresh the pending-depth gauge every 30 seconds for the life of the
/// process.
pub fn spawn_metrics_updater(pool: Pool<Postgres>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            match sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM device_inbox WHERE status = 'PENDING'",
            )
            .fetch_one(&pool)
            .await
            {
                Ok(depth) => PENDING_INBOX_DEPTH.set(depth),
                Err(e) => tracing::warn!(error = %e, "pending inbox depth probe failed"),
            }
        }
    });
}

pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
