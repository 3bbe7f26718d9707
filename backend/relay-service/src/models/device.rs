//! Device trust states.
//!
//! Fanout and authorization both key off trust: only TRUSTED devices get
//! inbox rows, and only TRUSTED devices may call the relay at all. The
//! registry itself is owned by the identity collaborator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trust lifecycle of a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustState {
    /// Registered but not yet verified; receives nothing
    Pending,
    /// Verified; full fanout and API access
    Trusted,
    /// Revoked; rejected on every request, excluded from fanout
    Revoked,
}

impl TrustState {
    /// Parse trust state from database string
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "TRUSTED" => Some(Self::Trusted),
            "REVOKED" => Some(Self::Revoked),
            _ => None,
        }
    }

    /// Convert trust state to database string
    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Trusted => "TRUSTED",
            Self::Revoked => "REVOKED",
        }
    }

    pub fn is_trusted(&self) -> bool {
        matches!(self, Self::Trusted)
    }
}

impl fmt::Display for TrustState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_state_round_trip() {
        for state in [TrustState::Pending, TrustState::Trusted, TrustState::Revoked] {
            assert_eq!(TrustState::from_db(state.to_db()), Some(state));
        }
        assert_eq!(TrustState::from_db("trusted"), None);
        assert_eq!(TrustState::from_db(""), None);
    }

    #[test]
    fn test_only_trusted_is_trusted() {
        assert!(TrustState::Trusted.is_trusted());
        assert!(!TrustState::Pending.is_trusted());
        assert!(!TrustState::Revoked.is_trusted());
    }
}
