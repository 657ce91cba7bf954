//! Entitlement decision types.

use serde::{Deserialize, Serialize};

/// Why a feature use was denied. Denials are ordinary outcomes the caller
/// branches on (e.g. to prompt for an upgrade), not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    NoActiveSubscription,
    QuotaExceeded,
}

/// Quota left for a feature after (or without) a spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remaining {
    Unlimited,
    Count(i64),
}

/// Outcome of one authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allowed { remaining: Remaining },
    Denied { reason: DenialReason },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    pub fn denial_reason(&self) -> Option<DenialReason> {
        match self {
            Decision::Denied { reason } => Some(*reason),
            Decision::Allowed { .. } => None,
        }
    }
}
