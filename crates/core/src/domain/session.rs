use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::offer::Offer;
use crate::domain::party::Role;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(format!("neg_{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Open,
    Accepted,
    Rejected,
    Expired,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Open)
    }

    /// Terminal states have no outgoing transitions.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::Accepted) | (Self::Open, Self::Rejected) | (Self::Open, Self::Expired)
        )
    }
}

/// Why a session left `OPEN`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationReason {
    Agreement,
    RejectedByParty,
    StaleOffer,
    PolicyTimeout,
    PolicyContractViolation,
    ConstraintViolation,
    RoundLimit,
    Closed,
    IdleTimeout,
}

impl TerminationReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::Agreement => "AGREEMENT",
            Self::RejectedByParty => "REJECTED_BY_PARTY",
            Self::StaleOffer => "STALE_OFFER",
            Self::PolicyTimeout => "POLICY_TIMEOUT",
            Self::PolicyContractViolation => "POLICY_CONTRACT_VIOLATION",
            Self::ConstraintViolation => "CONSTRAINT_VIOLATION",
            Self::RoundLimit => "ROUND_LIMIT",
            Self::Closed => "CLOSED",
            Self::IdleTimeout => "IDLE_TIMEOUT",
        }
    }
}

/// An inadmissible proposal. Kept for diagnosis, never part of the transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedProposal {
    pub round_index: u32,
    pub actor_role: Role,
    pub offer: Offer,
    pub violation: String,
    pub recorded_at: DateTime<Utc>,
}
