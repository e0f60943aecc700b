use std::sync::Arc;

use async_trait::async_trait;
use parley_core::domain::offer::Offer;
use parley_core::domain::turn::Intent;
use parley_core::negotiation::policy::{Decision, DecisionPolicy, NegotiationContext, PolicyError};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::llm::LlmClient;
use crate::prompt;

#[derive(Debug, Deserialize)]
struct RawDecision {
    decision: String,
    #[serde(default)]
    offer: Option<Offer>,
    #[serde(default, alias = "rationale")]
    reason: Option<String>,
}

/// Extracts the decision object from a model reply.
///
/// Accepts surrounding prose or code fences; the outermost `{...}` span is parsed.
pub fn parse_decision(raw: &str) -> Result<Decision, PolicyError> {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return Err(PolicyError::MalformedResponse("no JSON object in reply".to_string()));
    };
    if end < start {
        return Err(PolicyError::MalformedResponse("no JSON object in reply".to_string()));
    }

    let parsed: RawDecision = serde_json::from_str(&raw[start..=end])
        .map_err(|error| PolicyError::MalformedResponse(error.to_string()))?;
    let intent = match parsed.decision.trim().to_ascii_uppercase().as_str() {
        "ACCEPT" => Intent::Accept,
        "COUNTER" => Intent::Counter,
        "REJECT" => Intent::Reject,
        other => {
            return Err(PolicyError::MalformedResponse(format!("unknown decision `{other}`")));
        }
    };

    Ok(Decision { intent, offer: parsed.offer, rationale: parsed.reason.unwrap_or_default() })
}

pub struct LlmDecisionPolicy {
    name: String,
    client: Arc<dyn LlmClient>,
    guardrails: GuardrailPolicy,
}

impl LlmDecisionPolicy {
    pub fn new(name: impl Into<String>, client: Arc<dyn LlmClient>, guardrails: GuardrailPolicy) -> Self {
        Self { name: name.into(), client, guardrails }
    }
}

#[async_trait]
impl DecisionPolicy for LlmDecisionPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn decide(&self, context: &NegotiationContext) -> Result<Decision, PolicyError> {
        let prompt = prompt::render(context);
        let reply = self
            .client
            .complete(&prompt)
            .await
            .map_err(|error| PolicyError::Unavailable(error.to_string()))?;
        let decision = parse_decision(&reply)?;

        match self.guardrails.evaluate(context, &decision) {
            GuardrailDecision::Allow => Ok(decision),
            GuardrailDecision::Adjust { reason_code, decision } => {
                debug!(
                    event_name = "agent.guardrail.adjusted",
                    session_id = %context.session_id,
                    round_index = context.round_index,
                    policy = %self.name,
                    reason_code,
                    "model decision adjusted by guardrail"
                );
                Ok(decision)
            }
            GuardrailDecision::Deny { reason_code, user_message } => {
                warn!(
                    event_name = "agent.guardrail.denied",
                    session_id = %context.session_id,
                    round_index = context.round_index,
                    policy = %self.name,
                    reason_code,
                    "model decision denied by guardrail"
                );
                Ok(Decision::reject(format!("{reason_code}: {user_message}")))
            }
        }
    }
}
