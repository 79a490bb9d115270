pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod reservation;
pub mod service;
pub mod stats;
pub mod store;
pub mod validation;
pub mod workflow;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::actor::{Actor, ProjectId, Role, UserId};
pub use domain::contract::{ContractItemId, ContractLineItem};
pub use domain::payload::{
    ApprovalPayload, ApprovalStage, BatchDeleteReport, Decision, ItemQuote, ListQuery,
    NewLineItem, NewRequisition, Page, QuotePayload,
};
pub use domain::requisition::{
    ItemType, LineItemId, Requisition, RequisitionId, RequisitionLineItem, RequisitionStatus,
    WorkflowStep,
};
pub use errors::{ApplicationError, DomainError, ErrorKind, InterfaceError};
pub use reservation::{Availability, QuantityFit, ReservationError, SpecificationChoice};
pub use service::RequisitionService;
pub use stats::ProjectStatistics;
pub use store::{InMemoryRequisitionStore, RequisitionStore};
pub use validation::{ValidationErrors, ValidationIssue};
pub use workflow::{
    RequisitionWorkflow, TransitionError, TransitionOutcome, WorkflowAction, WorkflowEngine,
    WorkflowLogEntry, WorkflowPosition,
};
