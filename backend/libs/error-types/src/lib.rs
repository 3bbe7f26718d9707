use serde::{Deserialize, Serialize};

/// Wire format for every error the relay returns.
///
/// All services in this workspace serialize failures into this envelope so
/// clients can route on `error_type`/`code` without parsing messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short error name (e.g. "Forbidden")
    pub error: String,

    /// Human-readable description
    pub message: String,

    /// HTTP status code
    pub status: u16,

    /// Coarse category for client-side routing, see [`error_types`]
    pub error_type: String,

    /// Stable machine code, see [`error_codes`]
    pub code: String,

    /// Extra context, only populated in development builds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// ISO 8601 timestamp of when the error was produced
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }
}

/// Stable machine codes returned in [`ErrorResponse::code`].
pub mod error_codes {
    // Ingestion
    pub const MISSING_FIELDS: &str = "MISSING_FIELDS";
    pub const INVALID_UUID: &str = "INVALID_UUID";
    pub const INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";
    pub const CONFLICT: &str = "CONFLICT";

    // Authorization
    pub const DEVICE_REVOKED: &str = "DEVICE_REVOKED";
    pub const NOT_A_MEMBER: &str = "NOT_A_MEMBER";
    pub const TOKEN_INVALID: &str = "TOKEN_INVALID";
    pub const TOKEN_MISSING: &str = "TOKEN_MISSING";

    // Delivery state machine
    pub const INVALID_TRANSITION: &str = "INVALID_TRANSITION";
    pub const INBOX_ROW_FORBIDDEN: &str = "INBOX_ROW_FORBIDDEN";

    // Repair / sync
    pub const RANGE_TOO_LARGE: &str = "RANGE_TOO_LARGE";
    pub const INVALID_RANGE: &str = "INVALID_RANGE";

    // Infrastructure
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

/// Coarse categories returned in [`ErrorResponse::error_type`].
pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const AUTHORIZATION_ERROR: &str = "authorization_error";
    pub const CONFLICT_ERROR: &str = "conflict_error";
    pub const SERVER_ERROR: &str = "server_error";
}
