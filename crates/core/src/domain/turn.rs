use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::offer::Offer;
use crate::domain::party::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Accept,
    Counter,
    Reject,
}

impl Intent {
    pub fn carries_offer(self) -> bool {
        matches!(self, Self::Accept | Self::Counter)
    }
}

/// One committed move. The transcript only ever grows by appending these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub round_index: u32,
    pub actor_role: Role,
    pub intent: Intent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<Offer>,
    pub rationale: String,
    pub created_at: DateTime<Utc>,
}
