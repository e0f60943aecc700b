use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::constraints::Constraints;
use crate::domain::offer::Offer;
use crate::domain::party::Party;
use crate::domain::schedule::TimeSlot;
use crate::domain::session::SessionId;
use crate::domain::turn::{Intent, Turn};
use crate::errors::DomainError;
use crate::negotiation::validation::ConstraintViolation;

/// Everything a policy may see when choosing its next move.
///
/// The counterpart's reservation value is never included; only its calendar is shared.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationContext {
    pub session_id: SessionId,
    pub round_index: u32,
    pub party: Party,
    pub counterpart_availability: Vec<TimeSlot>,
    pub counterpart_offer: Option<Offer>,
    pub transcript: Vec<Turn>,
    pub constraints: Constraints,
    pub stall_detected: bool,
    /// Set on the single retry after an inadmissible proposal.
    pub retry_violation: Option<ConstraintViolation>,
}

impl NegotiationContext {
    pub fn is_final_round(&self) -> bool {
        self.round_index >= self.constraints.max_rounds
    }

    /// This party's most recent committed counter.
    pub fn own_last_offer(&self) -> Option<&Offer> {
        self.transcript
            .iter()
            .rev()
            .filter(|turn| turn.actor_role == self.party.role)
            .find_map(|turn| turn.offer.as_ref())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub intent: Intent,
    #[serde(default)]
    pub offer: Option<Offer>,
    #[serde(default)]
    pub rationale: String,
}

impl Decision {
    pub fn accept(offer: Offer, rationale: impl Into<String>) -> Self {
        Self { intent: Intent::Accept, offer: Some(offer), rationale: rationale.into() }
    }

    pub fn counter(offer: Offer, rationale: impl Into<String>) -> Self {
        Self { intent: Intent::Counter, offer: Some(offer), rationale: rationale.into() }
    }

    pub fn reject(rationale: impl Into<String>) -> Self {
        Self { intent: Intent::Reject, offer: None, rationale: rationale.into() }
    }

    /// Enforces the decision contract: ACCEPT and COUNTER carry a well-formed offer.
    /// A REJECT that carries an offer has it dropped.
    pub fn into_checked(self) -> Result<Decision, DomainError> {
        match (self.intent.carries_offer(), self.offer) {
            (true, None) => Err(DomainError::InvalidOffer(format!(
                "{:?} decision is missing its offer",
                self.intent
            ))),
            (true, Some(offer)) => {
                offer.check_well_formed()?;
                Ok(Decision { intent: self.intent, offer: Some(offer), rationale: self.rationale })
            }
            (false, _) => Ok(Decision { intent: self.intent, offer: None, rationale: self.rationale }),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("decision policy unavailable: {0}")]
    Unavailable(String),
    #[error("decision policy returned a malformed response: {0}")]
    MalformedResponse(String),
}

/// Pluggable source of negotiation moves: rule-based, model-backed or human.
///
/// Output is untrusted; the session validates every offer regardless of origin.
#[async_trait]
pub trait DecisionPolicy: Send + Sync {
    fn name(&self) -> &str;
    async fn decide(&self, context: &NegotiationContext) -> Result<Decision, PolicyError>;
}

#[derive(Clone, Debug)]
pub enum ScriptStep {
    Decide(Decision),
    Fail(PolicyError),
    /// Waits before deciding, for exercising decision deadlines.
    Delay(Duration, Decision),
}

/// Replays a fixed list of steps, then rejects.
pub struct ScriptedPolicy {
    name: String,
    steps: Mutex<VecDeque<ScriptStep>>,
    repeat_last: bool,
    seen: Mutex<Vec<NegotiationContext>>,
}

impl ScriptedPolicy {
    pub fn new(name: impl Into<String>, steps: Vec<ScriptStep>) -> Self {
        Self {
            name: name.into(),
            steps: Mutex::new(steps.into()),
            repeat_last: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn from_decisions(name: impl Into<String>, decisions: Vec<Decision>) -> Self {
        Self::new(name, decisions.into_iter().map(ScriptStep::Decide).collect())
    }

    /// Keeps replaying the final step instead of rejecting once the script runs out.
    pub fn repeating(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Contexts this policy was called with, oldest first.
    pub fn contexts(&self) -> Vec<NegotiationContext> {
        match self.seen.lock() {
            Ok(seen) => seen.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn next_step(&self) -> Option<ScriptStep> {
        let mut steps = match self.steps.lock() {
            Ok(steps) => steps,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.repeat_last && steps.len() == 1 {
            return steps.front().cloned();
        }
        steps.pop_front()
    }
}

#[async_trait]
impl DecisionPolicy for ScriptedPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn decide(&self, context: &NegotiationContext) -> Result<Decision, PolicyError> {
        match self.seen.lock() {
            Ok(mut seen) => seen.push(context.clone()),
            Err(poisoned) => poisoned.into_inner().push(context.clone()),
        }

        match self.next_step() {
            Some(ScriptStep::Decide(decision)) => Ok(decision),
            Some(ScriptStep::Fail(error)) => Err(error),
            Some(ScriptStep::Delay(delay, decision)) => {
                tokio::time::sleep(delay).await;
                Ok(decision)
            }
            None => Ok(Decision::reject("script exhausted")),
        }
    }
}
