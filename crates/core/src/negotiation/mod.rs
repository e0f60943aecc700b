pub mod agreement;
pub mod concession;
pub mod driver;
pub mod policy;
pub mod registry;
pub mod request;
pub mod session;
pub mod stall;
pub mod validation;

#[cfg(test)]
pub(crate) mod fixtures;

pub use agreement::Agreement;
pub use concession::ConcessionPolicy;
pub use driver::{advance, PolicyPair, TurnSettings};
pub use policy::{Decision, DecisionPolicy, NegotiationContext, PolicyError, ScriptStep, ScriptedPolicy};
pub use registry::SessionRegistry;
pub use request::{ConstraintsInput, PolicyKind, PolicySpec, SessionRequest};
pub use session::{Applied, NegotiationSession, SessionSnapshot};
pub use validation::{validate, ConstraintViolation, ViolationKind};
