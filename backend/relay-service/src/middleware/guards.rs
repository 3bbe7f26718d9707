//! Authorization guards that enforce permission checks at the type level
//! This prevents handlers from accidentally bypassing authorization

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::TrustState;
use actix_middleware::DeviceIdentity;
use error_types::error_codes;

/// A caller's device, verified against the registry.
///
/// Token validation only proves the caller once held a valid token; the
/// registry is the source of truth for revocation. Every handler goes
/// through this factory before touching inbox state.
#[derive(Debug, Clone, Copy)]
pub struct TrustedDevice {
    pub user_id: Uuid,
    pub device_id: Uuid,
}

impl TrustedDevice {
    /// Factory method: one query checks the device exists, belongs to the
    /// token's user, and is still TRUSTED.
    pub async fn verify(db: &PgPool, identity: DeviceIdentity) -> Result<Self, AppError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT trust_state FROM devices WHERE id = $1 AND user_id = $2")
                .bind(identity.device_id)
                .bind(identity.user_id)
                .fetch_optional(db)
                .await?;

        let trust_state = match row {
            Some((s,)) => s,
            None => {
                tracing::warn!(
                    device_id = %identity.device_id,
                    user_id = %identity.user_id,
                    "request from unregistered device"
                );
                return Err(AppError::forbidden(
                    error_codes::DEVICE_REVOKED,
                    "device is not trusted",
                ));
            }
        };

        match TrustState::from_db(&trust_state) {
            Some(state) if state.is_trusted() => Ok(Self {
                user_id: identity.user_id,
                device_id: identity.device_id,
            }),
            _ => {
                tracing::warn!(
                    device_id = %identity.device_id,
                    user_id = %identity.user_id,
                    trust_state = %trust_state,
                    "request from untrusted device"
                );
                Err(AppError::forbidden(
                    error_codes::DEVICE_REVOKED,
                    "device is not trusted",
                ))
            }
        }
    }
}

/// Verified membership of one user in one conversation.
#[derive(Debug, Clone, Copy)]
pub struct ConversationMember {
    pub user_id: Uuid,
    pub conversation_id: Uuid,
}

impl ConversationMember {
    /// Factory method to create and verify a conversation member
    pub async fn verify(
        db: &PgPool,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Self, AppError> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM conversation_members WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;

        // Unknown conversations get the same answer as real ones the caller
        // is outside of
        match row {
            Some(_) => Ok(Self {
                user_id,
                conversation_id,
            }),
            None => {
                tracing::warn!(
                    user_id = %user_id,
                    conversation_id = %conversation_id,
                    "membership check failed"
                );
                Err(AppError::forbidden(
                    error_codes::NOT_A_MEMBER,
                    "caller is not a member of this conversation",
                ))
            }
        }
    }
}
