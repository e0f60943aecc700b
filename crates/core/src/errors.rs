use thiserror::Error;

use crate::domain::party::Role;
use crate::domain::session::{SessionId, SessionStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid offer: {0}")]
    InvalidOffer(String),
    #[error("invalid constraints: {0}")]
    InvalidConstraints(String),
    #[error("invalid parties: {0}")]
    InvalidParties(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("negotiation session `{0}` was not found")]
    SessionNotFound(SessionId),
    #[error("both parties were declared with role {0}")]
    DuplicatePartyRole(Role),
    #[error("negotiation session `{0}` is already processing a turn")]
    SessionBusy(SessionId),
    #[error("negotiation session `{session_id}` is already terminal ({status:?})")]
    SessionAlreadyTerminal { session_id: SessionId, status: SessionStatus },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested negotiation does not exist or was closed.",
            Self::Conflict { .. } => {
                "The negotiation cannot take that action in its current state. Refresh and retry."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Registry(RegistryError::SessionNotFound(id)) => {
                Self::NotFound { message: format!("session `{id}`"), correlation_id: unassigned() }
            }
            ApplicationError::Registry(
                error @ (RegistryError::SessionBusy(_)
                | RegistryError::SessionAlreadyTerminal { .. }),
            ) => Self::Conflict { message: error.to_string(), correlation_id: unassigned() },
            ApplicationError::Registry(error @ RegistryError::DuplicatePartyRole(_)) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Registry(RegistryError::Domain(error))
            | ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}
