// Re-export route modules
pub mod ack;
pub mod health;
pub mod pull;
pub mod send;
pub mod status;
pub mod sync;

use actix_web::web;

/// Register every relay endpoint plus the unauthenticated introspection
/// routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(send::send_message)
        .service(pull::pull_messages)
        .service(sync::sync_conversation)
        .service(ack::ack_messages)
        .service(status::message_status)
        .service(health::health)
        .route(
            "/metrics",
            web::get().to(crate::metrics::metrics_handler),
        );
}
