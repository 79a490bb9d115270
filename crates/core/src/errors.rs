use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::requisition::RequisitionId;
use crate::reservation::ReservationError;
use crate::validation::ValidationErrors;
use crate::workflow::TransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Reservation(#[from] ReservationError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Coarse classification callers branch on, e.g. to tell connectivity from business failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    Conflict,
    NotFound,
    Connectivity,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authorization => "authorization",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Connectivity => "connectivity",
            Self::Internal => "internal",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} {id} was not found")]
    NotFound { entity: String, id: String },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("an action on requisition {requisition_id} is already in flight")]
    ActionInFlight { requisition_id: RequisitionId },
    #[error("connectivity failure: {0}")]
    Connectivity(String),
    #[error("remote failure ({status}): {message}")]
    Remote { status: u16, message: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<TransitionError> for ApplicationError {
    fn from(value: TransitionError) -> Self {
        Self::Domain(DomainError::Transition(value))
    }
}

impl From<ValidationErrors> for ApplicationError {
    fn from(value: ValidationErrors) -> Self {
        Self::Domain(DomainError::Validation(value))
    }
}

impl From<ReservationError> for ApplicationError {
    fn from(value: ReservationError) -> Self {
        Self::Domain(DomainError::Reservation(value))
    }
}

impl ApplicationError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound { entity: entity.into(), id: id.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(DomainError::Transition(error)) if error.is_authorization() => {
                ErrorKind::Authorization
            }
            Self::Domain(DomainError::Transition(_)) => ErrorKind::Conflict,
            Self::Domain(DomainError::Validation(_)) => ErrorKind::Validation,
            Self::Domain(DomainError::Reservation(ReservationError::NotFound(_))) => {
                ErrorKind::NotFound
            }
            Self::Domain(DomainError::Reservation(_)) => ErrorKind::Validation,
            Self::Domain(DomainError::InvariantViolation(_)) => ErrorKind::Internal,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Authorization,
            Self::Conflict(_) | Self::ActionInFlight { .. } => ErrorKind::Conflict,
            Self::Connectivity(_) => ErrorKind::Connectivity,
            Self::Remote { .. } | Self::Persistence(_) | Self::Configuration(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Per-field issues when the failure is a validation failure.
    pub fn validation_issues(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Domain(DomainError::Validation(errors)) => Some(errors),
            _ => None,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action at this step.",
            Self::NotFound { .. } => "The requested record no longer exists.",
            Self::Conflict { .. } => {
                "The requisition changed or the quantity is no longer available. Refresh and retry."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        let message = value.to_string();
        match value.kind() {
            ErrorKind::Validation => Self::BadRequest { message, correlation_id },
            ErrorKind::Authorization => Self::Forbidden { message, correlation_id },
            ErrorKind::NotFound => Self::NotFound { message, correlation_id },
            ErrorKind::Conflict => Self::Conflict { message, correlation_id },
            ErrorKind::Connectivity => Self::ServiceUnavailable { message, correlation_id },
            ErrorKind::Internal => match value {
                ApplicationError::Remote { .. } | ApplicationError::Persistence(_) => {
                    Self::ServiceUnavailable { message, correlation_id }
                }
                _ => Self::Internal { message, correlation_id },
            },
        }
    }
}
