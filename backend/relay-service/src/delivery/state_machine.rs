//! Per-(device, message) delivery state machine.
//!
//! The transition table lives here and nowhere else; services and routes ask
//! this module whether a transition is legal instead of re-encoding the rules
//! in SQL WHERE clauses.

use serde::{Deserialize, Serialize};

/// Delivery state of one inbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Acked,
    Read,
    Failed,
    Repaired,
}

impl DeliveryStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "DELIVERED" => Some(Self::Delivered),
            "ACKED" => Some(Self::Acked),
            "READ" => Some(Self::Read),
            "FAILED" => Some(Self::Failed),
            "REPAIRED" => Some(Self::Repaired),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Delivered => "DELIVERED",
            Self::Acked => "ACKED",
            Self::Read => "READ",
            Self::Failed => "FAILED",
            Self::Repaired => "REPAIRED",
        }
    }

    /// READ is the only terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Read)
    }

    /// States reachable from `self` in one step.
    pub fn allowed_targets(&self) -> &'static [DeliveryStatus] {
        match self {
            Self::Pending => &[Self::Delivered, Self::Failed],
            Self::Delivered => &[Self::Acked, Self::Read],
            Self::Acked => &[Self::Read],
            // FAILED -> FAILED is a real transition: each occurrence is a
            // counted retry, not a silent no-op
            Self::Failed => &[Self::Repaired, Self::Failed],
            Self::Repaired => &[Self::Delivered],
            Self::Read => &[],
        }
    }

    pub fn can_transition_to(&self, target: DeliveryStatus) -> bool {
        self.allowed_targets().contains(&target)
    }
}

/// What applying a requested transition should do to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Write the new status (and bump retry_count when entering FAILED)
    Apply,
    /// Same state, idempotent retry of an already-applied transition
    NoOp,
    /// Not in the table; reject and log
    Reject,
}

/// Evaluate a requested transition against the table.
///
/// Same-state requests are accepted as no-ops so clients can replay an ack
/// batch after a timeout without errors. The one exception is
/// FAILED -> FAILED, which stays an applied transition because the retry
/// counter must advance.
pub fn evaluate_transition(current: DeliveryStatus, target: DeliveryStatus) -> TransitionOutcome {
    if current == target {
        if current == DeliveryStatus::Failed {
            return TransitionOutcome::Apply;
        }
        return TransitionOutcome::NoOp;
    }
    if current.can_transition_to(target) {
        TransitionOutcome::Apply
    } else {
        TransitionOutcome::Reject
    }
}

/// True when the transition increments the row's retry counter.
pub fn bumps_retry_count(target: DeliveryStatus) -> bool {
    target == DeliveryStatus::Failed
}
