use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::actor::{Actor, ProjectId, Role};
use crate::domain::requisition::{Requisition, RequisitionStatus, WorkflowStep};
use crate::workflow::table::{rule_for, step_for, WorkflowAction};

/// Where a requisition currently sits in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPosition {
    pub status: RequisitionStatus,
    pub current_step: Option<WorkflowStep>,
    pub project_id: ProjectId,
}

impl WorkflowPosition {
    pub fn of(requisition: &Requisition) -> Self {
        Self {
            status: requisition.status,
            current_step: requisition.current_step,
            project_id: requisition.project_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub action: WorkflowAction,
    pub from: RequisitionStatus,
    pub to: RequisitionStatus,
    pub from_step: Option<WorkflowStep>,
    pub to_step: Option<WorkflowStep>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("requisition is {status} and accepts no further actions")]
    Terminal { status: RequisitionStatus },
    #[error("action `{action}` is not valid while requisition is {status}")]
    InvalidTransition { status: RequisitionStatus, action: WorkflowAction },
    #[error("requisition is {status} but its current step is {actual:?} (expected {expected:?})")]
    StepMismatch {
        status: RequisitionStatus,
        expected: Option<WorkflowStep>,
        actual: Option<WorkflowStep>,
    },
    #[error("action `{action}` requires role {required}, caller has {actual}")]
    Unauthorized { action: WorkflowAction, required: Role, actual: Role },
    #[error("caller does not manage project {project_id}")]
    OutsideProject { project_id: ProjectId },
}

impl TransitionError {
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::OutsideProject { .. })
    }
}

pub trait WorkflowDefinition {
    fn initial_status(&self) -> RequisitionStatus;
    fn transition(
        &self,
        position: &WorkflowPosition,
        action: WorkflowAction,
        actor: &Actor,
    ) -> Result<TransitionOutcome, TransitionError>;
}

/// The table-driven purchase requisition lifecycle.
#[derive(Clone, Debug, Default)]
pub struct RequisitionWorkflow;

impl WorkflowDefinition for RequisitionWorkflow {
    fn initial_status(&self) -> RequisitionStatus {
        RequisitionStatus::Draft
    }

    fn transition(
        &self,
        position: &WorkflowPosition,
        action: WorkflowAction,
        actor: &Actor,
    ) -> Result<TransitionOutcome, TransitionError> {
        let status = position.status;
        if status.is_terminal() {
            return Err(TransitionError::Terminal { status });
        }

        let rule =
            rule_for(status, action).ok_or(TransitionError::InvalidTransition { status, action })?;

        let expected = step_for(status);
        if position.current_step != expected {
            return Err(TransitionError::StepMismatch {
                status,
                expected,
                actual: position.current_step,
            });
        }

        if actor.role != rule.role {
            return Err(TransitionError::Unauthorized {
                action,
                required: rule.role,
                actual: actor.role,
            });
        }

        if !actor.can_access_project(position.project_id) {
            return Err(TransitionError::OutsideProject { project_id: position.project_id });
        }

        Ok(TransitionOutcome {
            action,
            from: status,
            to: rule.to,
            from_step: position.current_step,
            to_step: step_for(rule.to),
        })
    }
}

#[derive(Debug)]
pub struct WorkflowEngine<W> {
    workflow: W,
}

impl<W> WorkflowEngine<W>
where
    W: WorkflowDefinition,
{
    pub fn new(workflow: W) -> Self {
        Self { workflow }
    }

    pub fn initial_status(&self) -> RequisitionStatus {
        self.workflow.initial_status()
    }

    pub fn initial_step(&self) -> Option<WorkflowStep> {
        step_for(self.initial_status())
    }

    pub fn apply(
        &self,
        position: &WorkflowPosition,
        action: WorkflowAction,
        actor: &Actor,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.workflow.transition(position, action, actor)
    }

    pub fn apply_with_audit<S>(
        &self,
        position: &WorkflowPosition,
        action: WorkflowAction,
        actor: &Actor,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, TransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(position, action, actor);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "workflow.transition_applied",
                        AuditCategory::Workflow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("action", outcome.action.as_str())
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("role", actor.role.as_str()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "workflow.transition_rejected",
                        AuditCategory::Workflow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("action", action.as_str())
                    .with_metadata("role", actor.role.as_str())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for WorkflowEngine<RequisitionWorkflow> {
    fn default() -> Self {
        Self::new(RequisitionWorkflow)
    }
}
