use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::domain::party::Role;
use crate::domain::session::TerminationReason;
use crate::domain::turn::Turn;
use crate::errors::DomainError;
use crate::negotiation::policy::DecisionPolicy;
use crate::negotiation::session::{Applied, NegotiationSession};
use crate::transport::TransportAdapter;

pub const DEFAULT_DECISION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TurnSettings {
    pub decision_timeout: Duration,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self { decision_timeout: DEFAULT_DECISION_TIMEOUT }
    }
}

#[derive(Clone)]
pub struct PolicyPair {
    pub buyer: Arc<dyn DecisionPolicy>,
    pub provider: Arc<dyn DecisionPolicy>,
}

impl PolicyPair {
    pub fn new(buyer: Arc<dyn DecisionPolicy>, provider: Arc<dyn DecisionPolicy>) -> Self {
        Self { buyer, provider }
    }

    pub fn for_role(&self, role: Role) -> &Arc<dyn DecisionPolicy> {
        match role {
            Role::Buyer => &self.buyer,
            Role::Provider => &self.provider,
        }
    }
}

/// Plays exactly one turn for the active party and broadcasts the committed result.
///
/// The policy call is bounded by `settings.decision_timeout`. An inadmissible counter is
/// retried once with the violation in context; a second failure ends the session.
pub async fn advance(
    session: &mut NegotiationSession,
    policies: &PolicyPair,
    settings: &TurnSettings,
    transport: &dyn TransportAdapter,
) -> Result<Turn, DomainError> {
    let role = session.active_role();
    let policy = policies.for_role(role);
    let mut retry_violation = None;

    let turn = loop {
        let allow_retry = retry_violation.is_none();
        let context = session.context(retry_violation.take());
        let round_index = context.round_index;

        let decision = match timeout(settings.decision_timeout, policy.decide(&context)).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(error)) => {
                warn!(
                    event_name = "negotiation.policy.failed",
                    session_id = %session.id(),
                    round_index,
                    actor_role = %role,
                    policy = policy.name(),
                    error = %error,
                    "decision policy failed; treating as reject"
                );
                break session.reject_active(
                    TerminationReason::PolicyContractViolation,
                    format!("POLICY_CONTRACT_VIOLATION: {error}"),
                )?;
            }
            Err(_) => {
                warn!(
                    event_name = "negotiation.policy.timeout",
                    session_id = %session.id(),
                    round_index,
                    actor_role = %role,
                    policy = policy.name(),
                    timeout_ms = u64::try_from(settings.decision_timeout.as_millis()).unwrap_or(u64::MAX),
                    "decision policy missed its deadline"
                );
                break session.reject_active(TerminationReason::PolicyTimeout, "POLICY_TIMEOUT")?;
            }
        };

        match session.apply(decision, allow_retry)? {
            Applied::Committed(turn) => break turn,
            Applied::Inadmissible(violation) => {
                debug!(
                    event_name = "negotiation.policy.retry",
                    session_id = %session.id(),
                    round_index,
                    actor_role = %role,
                    violation = %violation,
                    "soliciting one corrected proposal"
                );
                retry_violation = Some(violation);
            }
        }
    };

    transport.broadcast(session.id(), &turn);
    Ok(turn)
}
