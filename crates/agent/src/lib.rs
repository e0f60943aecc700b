//! Model-backed negotiation policy.
//!
//! Wraps any [`llm::LlmClient`] in the core `DecisionPolicy` contract:
//! 1. **Prompt** (`prompt`) - render the party's private view of the session
//! 2. **Parse** (`policy::parse_decision`) - pull the JSON decision out of free text
//! 3. **Guardrails** (`guardrails`) - keep the model inside its own reservation value
//!
//! # Safety Principle
//!
//! The model proposes; it never commits. Every offer it produces is validated again by the
//! session state machine before it can enter the transcript.

pub mod guardrails;
pub mod llm;
pub mod policy;
pub mod prompt;

pub use guardrails::{GuardrailDecision, GuardrailPolicy};
pub use llm::LlmClient;
pub use policy::{parse_decision, LlmDecisionPolicy};
