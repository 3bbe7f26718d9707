use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Receipt kinds surfaced back to senders.
///
/// ACKED is a device-protocol state, not a receipt; only DELIVERED and READ
/// are appended to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiptType {
    Delivered,
    Read,
}

impl ReceiptType {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "DELIVERED" => Some(Self::Delivered),
            "READ" => Some(Self::Read),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Delivered => "DELIVERED",
            Self::Read => "READ",
        }
    }
}

impl fmt::Display for ReceiptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db())
    }
}

/// Receipt row matching database schema. Append-only; `receipt_id` is the
/// sync cursor for receipt streams.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Receipt {
    pub receipt_id: i64,
    pub message_uuid: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub device_id: Uuid,
    pub receipt_type: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_type_round_trip() {
        assert_eq!(ReceiptType::from_db("DELIVERED"), Some(ReceiptType::Delivered));
        assert_eq!(ReceiptType::from_db("READ"), Some(ReceiptType::Read));
        assert_eq!(ReceiptType::from_db("ACKED"), None);
        assert_eq!(ReceiptType::Delivered.to_db(), "DELIVERED");
    }
}
