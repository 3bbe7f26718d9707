/// OpenAPI documentation for Courier Relay Service
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Courier Relay Service API",
        version = "1.0.0",
        description = "Device-scoped message relay: sequencing, fanout, delivery receipts, and gap repair",
        contact(
            name = "Courier Team",
            email = "support@courier.app"
        ),
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8086", description = "Development server"),
        (url = "https://api.courier.app/relay", description = "Production server"),
    ),
    tags(
        (name = "Health", description = "Service health checks"),
        (name = "Messages", description = "Message submission and delivery state"),
        (name = "Sync", description = "Cursor pagination and gap repair"),
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    pub fn title() -> &'static str {
        "Courier Relay Service"
    }

    pub fn version() -> &'static str {
        "1.0.0"
    }

    pub fn openapi_json_path() -> &'static str {
        "/v1/openapi.json"
    }
}
