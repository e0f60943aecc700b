pub mod config;
pub mod domain;
pub mod errors;
pub mod negotiation;
pub mod transport;

pub use domain::constraints::{BudgetBand, Constraints};
pub use domain::money::Money;
pub use domain::offer::Offer;
pub use domain::party::{Party, PartyId, Role};
pub use domain::schedule::{CalendarAnchor, ClockTime, TimeSlot};
pub use domain::session::{SessionId, SessionStatus, TerminationReason};
pub use domain::turn::{Intent, Turn};
pub use errors::{ApplicationError, DomainError, InterfaceError, RegistryError};
pub use negotiation::{
    Agreement, ConcessionPolicy, Decision, DecisionPolicy, NegotiationContext, PolicyError,
    SessionRegistry, SessionRequest, SessionSnapshot,
};
pub use transport::{InMemoryTransport, NoopTransport, TracingTransport, TransportAdapter};
