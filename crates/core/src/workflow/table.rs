use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::actor::Role;
use crate::domain::payload::{ApprovalStage, Decision};
use crate::domain::requisition::{RequisitionStatus, WorkflowStep};

use RequisitionStatus::{DeptApproved, Draft, FinalApproved, PriceQuoted, Rejected, Submitted};
use Role::{DeptManager, GeneralManager, ProjectManager, Purchaser};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Submit,
    Quote,
    Return,
    ReturnToPurchaser,
    DeptApprove,
    DeptReject,
    FinalApprove,
    FinalReject,
}

impl WorkflowAction {
    pub const ALL: [WorkflowAction; 8] = [
        Self::Submit,
        Self::Quote,
        Self::Return,
        Self::ReturnToPurchaser,
        Self::DeptApprove,
        Self::DeptReject,
        Self::FinalApprove,
        Self::FinalReject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Quote => "quote",
            Self::Return => "return",
            Self::ReturnToPurchaser => "return_to_purchaser",
            Self::DeptApprove => "dept_approve",
            Self::DeptReject => "dept_reject",
            Self::FinalApprove => "final_approve",
            Self::FinalReject => "final_reject",
        }
    }

    pub fn from_decision(stage: ApprovalStage, decision: Decision) -> Self {
        match (stage, decision) {
            (ApprovalStage::Dept, Decision::Approved) => Self::DeptApprove,
            (ApprovalStage::Dept, Decision::Rejected) => Self::DeptReject,
            (ApprovalStage::Final, Decision::Approved) => Self::FinalApprove,
            (ApprovalStage::Final, Decision::Rejected) => Self::FinalReject,
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Self::Return | Self::ReturnToPurchaser)
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::DeptReject | Self::FinalReject)
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown workflow action `{0}`")]
pub struct UnknownAction(pub String);

impl FromStr for WorkflowAction {
    type Err = UnknownAction;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or(UnknownAction(normalized))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: RequisitionStatus,
    pub action: WorkflowAction,
    pub role: Role,
    pub to: RequisitionStatus,
}

const fn rule(
    from: RequisitionStatus,
    action: WorkflowAction,
    role: Role,
    to: RequisitionStatus,
) -> TransitionRule {
    TransitionRule { from, action, role, to }
}

/// Every permitted edge of the requisition lifecycle.
pub const RULES: &[TransitionRule] = &[
    rule(Draft, WorkflowAction::Submit, ProjectManager, Submitted),
    rule(Submitted, WorkflowAction::Quote, Purchaser, PriceQuoted),
    rule(Submitted, WorkflowAction::Return, Purchaser, Draft),
    rule(PriceQuoted, WorkflowAction::DeptApprove, DeptManager, DeptApproved),
    rule(PriceQuoted, WorkflowAction::DeptReject, DeptManager, Rejected),
    rule(PriceQuoted, WorkflowAction::ReturnToPurchaser, ProjectManager, Submitted),
    rule(DeptApproved, WorkflowAction::FinalApprove, GeneralManager, FinalApproved),
    rule(DeptApproved, WorkflowAction::FinalReject, GeneralManager, Rejected),
];

/// The step that must act next for a given status. Pure function of status.
pub fn step_for(status: RequisitionStatus) -> Option<WorkflowStep> {
    match status {
        RequisitionStatus::Draft => Some(WorkflowStep::ProjectManager),
        RequisitionStatus::Submitted => Some(WorkflowStep::Purchaser),
        RequisitionStatus::PriceQuoted => Some(WorkflowStep::DeptManager),
        RequisitionStatus::DeptApproved => Some(WorkflowStep::GeneralManager),
        RequisitionStatus::FinalApproved | RequisitionStatus::Completed => {
            Some(WorkflowStep::Completed)
        }
        RequisitionStatus::Rejected | RequisitionStatus::Cancelled => None,
    }
}

pub fn rule_for(status: RequisitionStatus, action: WorkflowAction) -> Option<&'static TransitionRule> {
    RULES.iter().find(|rule| rule.from == status && rule.action == action)
}

pub fn available_actions(status: RequisitionStatus, role: Role) -> Vec<WorkflowAction> {
    RULES
        .iter()
        .filter(|rule| rule.from == status && rule.role == role)
        .map(|rule| rule.action)
        .collect()
}
