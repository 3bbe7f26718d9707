use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use error_types::{error_codes, error_types as categories, ErrorResponse};
use thiserror::Error;

use crate::delivery::watermark::RangeError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("bad request: {message}")]
    BadRequest {
        code: &'static str,
        message: String,
    },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {message}")]
    Forbidden {
        code: &'static str,
        message: String,
    },

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("repair span {span} exceeds the {max} message cap")]
    RangeTooLarge { span: i64, max: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        Self::Forbidden {
            code,
            message: message.into(),
        }
    }

    /// Returns whether this error is retryable (e.g., database connection timeout)
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Database(e) => {
                matches!(
                    e,
                    sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
                )
            }
            AppError::Conflict(_) => true,
            AppError::Internal => true,
            _ => false,
        }
    }

    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest { .. } | AppError::RangeTooLarge { .. } => 400,
            AppError::Unauthorized(_) => 401,
            // Rows that do not exist are reported exactly like rows the
            // caller does not own, so probing cannot reveal existence
            AppError::Forbidden { .. } | AppError::NotFound => 403,
            AppError::Conflict(_) => 409,
            _ => 500,
        }
    }

    fn error_name(&self) -> &'static str {
        match self.status_code() {
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            409 => "Conflict",
            _ => "Internal Server Error",
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            AppError::BadRequest { .. } | AppError::RangeTooLarge { .. } => {
                categories::VALIDATION_ERROR
            }
            AppError::Unauthorized(_) => categories::AUTHENTICATION_ERROR,
            AppError::Forbidden { .. } | AppError::NotFound => categories::AUTHORIZATION_ERROR,
            AppError::Conflict(_) => categories::CONFLICT_ERROR,
            _ => categories::SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest { code, .. } | AppError::Forbidden { code, .. } => code,
            AppError::Unauthorized(_) => error_codes::TOKEN_INVALID,
            AppError::NotFound => error_codes::INBOX_ROW_FORBIDDEN,
            AppError::Conflict(_) => error_codes::CONFLICT,
            AppError::RangeTooLarge { .. } => error_codes::RANGE_TOO_LARGE,
            AppError::Database(_) => error_codes::DATABASE_ERROR,
            _ => error_codes::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Server-side failures are collapsed so SQL and
    /// config details never reach the wire.
    fn public_message(&self) -> String {
        match self {
            AppError::BadRequest { message, .. } | AppError::Forbidden { message, .. } => {
                message.clone()
            }
            AppError::Unauthorized(message) => message.clone(),
            AppError::NotFound => "row does not exist or does not belong to this device".into(),
            AppError::Conflict(message) => message.clone(),
            AppError::RangeTooLarge { .. } => self.to_string(),
            _ => "internal server error".into(),
        }
    }
}

impl From<RangeError> for AppError {
    fn from(e: RangeError) -> Self {
        match e {
            RangeError::Invalid => AppError::bad_request(error_codes::INVALID_RANGE, e.to_string()),
            RangeError::TooLarge { span, max } => AppError::RangeTooLarge { span, max },
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(AppError::status_code(self)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        let status = AppError::status_code(self);
        if status >= 500 {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorResponse::new(
            self.error_name(),
            &self.public_message(),
            status,
            self.error_type(),
            self.code(),
        );

        HttpResponse::build(ResponseError::status_code(self)).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::bad_request(error_codes::INVALID_UUID, "bad uuid").status_code(),
            400
        );
        assert_eq!(
            AppError::forbidden(error_codes::DEVICE_REVOKED, "revoked").status_code(),
            403
        );
        assert_eq!(AppError::Conflict("raced".into()).status_code(), 409);
        assert_eq!(AppError::Internal.status_code(), 500);
    }

    #[test]
    fn test_missing_rows_render_as_forbidden() {
        let err = AppError::NotFound;
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.code(), error_codes::INBOX_ROW_FORBIDDEN);
        assert_eq!(err.error_type(), categories::AUTHORIZATION_ERROR);
    }

    #[test]
    fn test_server_failures_do_not_leak_details() {
        let err = AppError::Config("DATABASE_URL=postgres://user:hunter2@db".into());
        assert_eq!(err.public_message(), "internal server error");
    }

    #[test]
    fn test_range_errors_map_to_codes() {
        let too_large: AppError = RangeError::TooLarge { span: 600, max: 500 }.into();
        assert_eq!(too_large.status_code(), 400);
        assert_eq!(too_large.code(), error_codes::RANGE_TOO_LARGE);

        let invalid: AppError = RangeError::Invalid.into();
        assert_eq!(invalid.code(), error_codes::INVALID_RANGE);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::Conflict("seq race".into()).is_retryable());
        assert!(!AppError::NotFound.is_retryable());
        assert!(!AppError::bad_request(error_codes::MISSING_FIELDS, "x").is_retryable());
    }
}
