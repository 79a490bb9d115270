use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::actor::{Actor, Role, UserId};
use crate::domain::requisition::{RequisitionId, RequisitionStatus, WorkflowStep};
use crate::workflow::engine::TransitionOutcome;

/// One immutable record of an operation applied to a requisition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowLogEntry {
    #[serde(alias = "id")]
    pub sequence: u64,
    #[serde(default, alias = "request_id")]
    pub requisition_id: RequisitionId,
    pub operation: String,
    #[serde(default)]
    pub from_status: Option<RequisitionStatus>,
    #[serde(default)]
    pub to_status: Option<RequisitionStatus>,
    #[serde(default)]
    pub from_step: Option<WorkflowStep>,
    #[serde(default)]
    pub to_step: Option<WorkflowStep>,
    #[serde(alias = "operator_id")]
    pub actor_id: UserId,
    #[serde(default, alias = "operator_name")]
    pub actor_name: String,
    #[serde(alias = "operator_role")]
    pub actor_role: Role,
    #[serde(default, alias = "operation_notes")]
    pub notes: Option<String>,
    #[serde(default, alias = "operation_data")]
    pub payload: Value,
    #[serde(alias = "created_at")]
    pub occurred_at: DateTime<Utc>,
}

impl WorkflowLogEntry {
    pub fn creation(
        requisition_id: RequisitionId,
        status: RequisitionStatus,
        step: Option<WorkflowStep>,
        actor: &Actor,
        payload: Value,
    ) -> Self {
        Self {
            sequence: 0,
            requisition_id,
            operation: "create".to_string(),
            from_status: None,
            to_status: Some(status),
            from_step: None,
            to_step: step,
            actor_id: actor.user_id,
            actor_name: actor.name.clone(),
            actor_role: actor.role,
            notes: None,
            payload,
            occurred_at: Utc::now(),
        }
    }

    /// A draft edit: status and step stay where they were.
    pub fn revision(
        requisition_id: RequisitionId,
        status: RequisitionStatus,
        step: Option<WorkflowStep>,
        actor: &Actor,
        payload: Value,
    ) -> Self {
        Self {
            operation: "update".to_string(),
            from_status: Some(status),
            from_step: step,
            ..Self::creation(requisition_id, status, step, actor, payload)
        }
    }

    pub fn transition(
        requisition_id: RequisitionId,
        outcome: &TransitionOutcome,
        actor: &Actor,
        notes: Option<String>,
        payload: Value,
    ) -> Self {
        Self {
            sequence: 0,
            requisition_id,
            operation: outcome.action.as_str().to_string(),
            from_status: Some(outcome.from),
            to_status: Some(outcome.to),
            from_step: outcome.from_step,
            to_step: outcome.to_step,
            actor_id: actor.user_id,
            actor_name: actor.name.clone(),
            actor_role: actor.role,
            notes,
            payload,
            occurred_at: Utc::now(),
        }
    }
}

/// Append-only operation log for one requisition. Entries are never edited or removed.
#[derive(Clone, Debug, Default)]
pub struct WorkflowHistory {
    entries: Vec<WorkflowLogEntry>,
}

impl WorkflowHistory {
    /// Stamps the next sequence number onto `entry` and stores it.
    pub fn append(&mut self, mut entry: WorkflowLogEntry) -> WorkflowLogEntry {
        entry.sequence = self.entries.len() as u64 + 1;
        self.entries.push(entry.clone());
        entry
    }

    pub fn entries(&self) -> &[WorkflowLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
