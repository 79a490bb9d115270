//! Checks that run before any network call.
//!
//! The backend stays authoritative; these only spare a round trip for requests that
//! are certain to be refused, and keep ineligible controls from being offered.

use rust_decimal::Decimal;

use reqflow_core::domain::actor::{Actor, Role};
use reqflow_core::domain::payload::{ApprovalPayload, ApprovalStage, NewRequisition, QuotePayload};
use reqflow_core::domain::requisition::{Requisition, RequisitionStatus};
use reqflow_core::errors::ApplicationError;
use reqflow_core::reservation::{Availability, QuantityFit};
use reqflow_core::validation::{
    validate_decision_notes, validate_new_requisition, validate_quote, validate_return_reason,
};
use reqflow_core::workflow::{
    available_actions, RequisitionWorkflow, TransitionOutcome, WorkflowAction, WorkflowEngine,
    WorkflowPosition,
};

#[derive(Debug, Default)]
pub struct Precheck {
    engine: WorkflowEngine<RequisitionWorkflow>,
}

impl Precheck {
    /// Actions the actor may be offered for this requisition right now.
    pub fn offered_actions(&self, actor: &Actor, requisition: &Requisition) -> Vec<WorkflowAction> {
        if !actor.can_access_project(requisition.project_id) {
            return Vec::new();
        }
        available_actions(requisition.status, actor.role)
    }

    pub fn action(
        &self,
        actor: &Actor,
        requisition: &Requisition,
        action: WorkflowAction,
    ) -> Result<TransitionOutcome, ApplicationError> {
        Ok(self.engine.apply(&WorkflowPosition::of(requisition), action, actor)?)
    }

    pub fn create(&self, actor: &Actor, new: &NewRequisition) -> Result<(), ApplicationError> {
        if actor.role != Role::ProjectManager {
            return Err(ApplicationError::Forbidden(format!(
                "only project managers raise requisitions (caller is {})",
                actor.role
            )));
        }
        if !actor.can_access_project(new.project_id) {
            return Err(ApplicationError::Forbidden(format!(
                "{} does not manage project {}",
                actor.label(),
                new.project_id
            )));
        }
        Ok(validate_new_requisition(new)?)
    }

    /// Drafts are editable by their requester or a project manager of the project.
    pub fn update(
        &self,
        actor: &Actor,
        requisition: &Requisition,
        new: &NewRequisition,
    ) -> Result<(), ApplicationError> {
        let permitted = requisition.requester_id == actor.user_id
            || (actor.role == Role::ProjectManager && actor.manages(requisition.project_id));
        if !permitted {
            return Err(ApplicationError::Forbidden(format!(
                "{} may not edit requisition {}",
                actor.label(),
                requisition.request_code
            )));
        }
        if requisition.status != RequisitionStatus::Draft {
            return Err(ApplicationError::Conflict(format!(
                "requisition {} is {} and only drafts can be edited",
                requisition.request_code, requisition.status
            )));
        }
        Ok(validate_new_requisition(new)?)
    }

    pub fn quote(
        &self,
        actor: &Actor,
        requisition: &Requisition,
        payload: &QuotePayload,
    ) -> Result<(), ApplicationError> {
        self.action(actor, requisition, WorkflowAction::Quote)?;
        Ok(validate_quote(&requisition.items, payload)?)
    }

    /// Returns the action a return resolves to from the current status, plus the trimmed reason.
    pub fn return_requisition(
        &self,
        actor: &Actor,
        requisition: &Requisition,
        reason: &str,
    ) -> Result<(WorkflowAction, String), ApplicationError> {
        let action = reqflow_core::service::return_action_for(requisition.status);
        self.action(actor, requisition, action)?;
        Ok((action, validate_return_reason(reason)?))
    }

    pub fn decide(
        &self,
        actor: &Actor,
        requisition: &Requisition,
        stage: ApprovalStage,
        payload: &ApprovalPayload,
    ) -> Result<ApprovalPayload, ApplicationError> {
        let action = WorkflowAction::from_decision(stage, payload.approval_status);
        self.action(actor, requisition, action)?;
        let notes = validate_decision_notes(action.is_rejection(), payload.approval_notes.as_deref())?;
        Ok(ApprovalPayload { approval_status: payload.approval_status, approval_notes: notes })
    }

    /// Edit-time quantity fitting against the last availability read.
    pub fn quantity(
        &self,
        availability: &Availability,
        requested: Decimal,
    ) -> Result<QuantityFit, ApplicationError> {
        Ok(availability.fit(requested)?)
    }
}
