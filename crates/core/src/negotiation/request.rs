use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::NegotiationConfig;
use crate::domain::constraints::{BudgetBand, Constraints};
use crate::domain::party::Party;
use crate::domain::schedule::CalendarAnchor;
use crate::negotiation::concession::ConcessionPolicy;
use crate::negotiation::driver::PolicyPair;
use crate::negotiation::policy::{Decision, DecisionPolicy, ScriptedPolicy};

/// Caller-facing description of a negotiation to open. Shared by the HTTP API and the
/// simulator's scenario files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub parties: Vec<Party>,
    pub constraints: ConstraintsInput,
    #[serde(default)]
    pub policies: PolicySpec,
}

/// Constraints with every tunable optional; gaps are filled from `[negotiation]` config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintsInput {
    pub latest_completion: DateTime<Utc>,
    pub budget: BudgetBand,
    pub calendar: CalendarAnchor,
    #[serde(default)]
    pub min_duration_minutes: Option<u32>,
    #[serde(default)]
    pub on_site_required: Option<bool>,
    #[serde(default)]
    pub max_visits: Option<u32>,
    #[serde(default)]
    pub max_rounds: Option<u32>,
    #[serde(default)]
    pub stall_epsilon_bps: Option<u32>,
    #[serde(default)]
    pub stall_window: Option<usize>,
}

impl ConstraintsInput {
    pub fn resolve(self, defaults: &NegotiationConfig) -> Constraints {
        let mut constraints = defaults.constraints(self.latest_completion, self.budget, self.calendar);
        if let Some(min_duration_minutes) = self.min_duration_minutes {
            constraints.min_duration_minutes = min_duration_minutes;
        }
        if let Some(on_site_required) = self.on_site_required {
            constraints.on_site_required = on_site_required;
        }
        if let Some(max_visits) = self.max_visits {
            constraints.max_visits = max_visits;
        }
        if let Some(max_rounds) = self.max_rounds {
            constraints.max_rounds = max_rounds;
        }
        if let Some(stall_epsilon_bps) = self.stall_epsilon_bps {
            constraints.stall_epsilon_bps = stall_epsilon_bps;
        }
        if let Some(stall_window) = self.stall_window {
            constraints.stall_window = stall_window;
        }
        constraints
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySpec {
    #[serde(default)]
    pub buyer: PolicyKind,
    #[serde(default)]
    pub provider: PolicyKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyKind {
    Concession {
        #[serde(default)]
        concession_cap_bps: Option<u32>,
    },
    /// Fixed decisions replayed in order; `repeat` keeps replaying the last one.
    Scripted {
        decisions: Vec<Decision>,
        #[serde(default)]
        repeat: bool,
    },
}

impl Default for PolicyKind {
    fn default() -> Self {
        Self::Concession { concession_cap_bps: None }
    }
}

impl PolicyKind {
    pub fn build(&self, name: &str, defaults: &NegotiationConfig) -> Arc<dyn DecisionPolicy> {
        match self {
            Self::Concession { concession_cap_bps } => Arc::new(
                ConcessionPolicy::new(name)
                    .with_concession_cap_bps(concession_cap_bps.unwrap_or(defaults.concession_cap_bps)),
            ),
            Self::Scripted { decisions, repeat } => {
                let policy = ScriptedPolicy::from_decisions(name, decisions.clone());
                Arc::new(if *repeat { policy.repeating() } else { policy })
            }
        }
    }
}

impl PolicySpec {
    pub fn build(&self, defaults: &NegotiationConfig) -> PolicyPair {
        PolicyPair::new(
            self.buyer.build("buyer-policy", defaults),
            self.provider.build("provider-policy", defaults),
        )
    }
}
