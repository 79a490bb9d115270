use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::actor::ProjectId;
use crate::domain::contract::{ContractItemId, ContractLineItem};
use crate::domain::requisition::{LineItemId, Requisition, RequisitionId, RequisitionStatus};
use crate::errors::ApplicationError;
use crate::workflow::{WorkflowHistory, WorkflowLogEntry};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("requisition {0} does not exist")]
    Missing(RequisitionId),
    #[error("requisition {id} changed concurrently: expected {expected}, found {actual}")]
    StatusChanged { id: RequisitionId, expected: RequisitionStatus, actual: RequisitionStatus },
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Missing(id) => ApplicationError::not_found("requisition", id),
            StoreError::StatusChanged { .. } => ApplicationError::Conflict(value.to_string()),
        }
    }
}

/// Formats `PR{YYYYMMDD}{seq:04}`.
pub fn format_request_code(date: NaiveDate, sequence: u32) -> String {
    format!("PR{}{sequence:04}", date.format("%Y%m%d"))
}

#[async_trait]
pub trait RequisitionStore: Send + Sync {
    async fn contract_item(
        &self,
        id: ContractItemId,
    ) -> Result<Option<ContractLineItem>, StoreError>;

    async fn contract_items_for_material(
        &self,
        project_id: ProjectId,
        item_name: &str,
    ) -> Result<Vec<ContractLineItem>, StoreError>;

    async fn requisition(&self, id: RequisitionId) -> Result<Option<Requisition>, StoreError>;

    async fn requisitions(&self) -> Result<Vec<Requisition>, StoreError>;

    /// Assigns ids and the request code, stores the requisition and its creation log entry.
    async fn insert(
        &self,
        requisition: Requisition,
        entry: WorkflowLogEntry,
    ) -> Result<Requisition, StoreError>;

    /// Replaces a requisition only if its stored status still equals `expected`.
    async fn commit(
        &self,
        expected: RequisitionStatus,
        requisition: Requisition,
        entry: WorkflowLogEntry,
    ) -> Result<WorkflowLogEntry, StoreError>;

    /// Replaces a draft's header and line items. New lines get fresh ids.
    async fn revise(
        &self,
        requisition: Requisition,
        entry: WorkflowLogEntry,
    ) -> Result<Requisition, StoreError>;

    async fn remove(
        &self,
        id: RequisitionId,
        expected: RequisitionStatus,
    ) -> Result<Requisition, StoreError>;

    async fn history(&self, id: RequisitionId) -> Result<Vec<WorkflowLogEntry>, StoreError>;
}

#[derive(Default)]
struct MemoryState {
    requisitions: BTreeMap<RequisitionId, Requisition>,
    histories: HashMap<RequisitionId, WorkflowHistory>,
    daily_sequences: HashMap<NaiveDate, u32>,
    next_requisition_id: i64,
    next_line_item_id: i64,
}

#[derive(Default)]
pub struct InMemoryRequisitionStore {
    contracts: RwLock<BTreeMap<ContractItemId, ContractLineItem>>,
    state: RwLock<MemoryState>,
}

impl InMemoryRequisitionStore {
    pub fn with_contract_items(items: impl IntoIterator<Item = ContractLineItem>) -> Self {
        let contracts = items.into_iter().map(|item| (item.id, item)).collect();
        Self { contracts: RwLock::new(contracts), state: RwLock::new(MemoryState::default()) }
    }

    pub async fn put_contract_item(&self, item: ContractLineItem) {
        self.contracts.write().await.insert(item.id, item);
    }
}

#[async_trait]
impl RequisitionStore for InMemoryRequisitionStore {
    async fn contract_item(
        &self,
        id: ContractItemId,
    ) -> Result<Option<ContractLineItem>, StoreError> {
        Ok(self.contracts.read().await.get(&id).cloned())
    }

    async fn contract_items_for_material(
        &self,
        project_id: ProjectId,
        item_name: &str,
    ) -> Result<Vec<ContractLineItem>, StoreError> {
        let needle = item_name.trim();
        let contracts = self.contracts.read().await;
        Ok(contracts
            .values()
            .filter(|item| item.project_id == project_id && item.item_name == needle)
            .cloned()
            .collect())
    }

    async fn requisition(&self, id: RequisitionId) -> Result<Option<Requisition>, StoreError> {
        Ok(self.state.read().await.requisitions.get(&id).cloned())
    }

    async fn requisitions(&self) -> Result<Vec<Requisition>, StoreError> {
        Ok(self.state.read().await.requisitions.values().cloned().collect())
    }

    async fn insert(
        &self,
        mut requisition: Requisition,
        mut entry: WorkflowLogEntry,
    ) -> Result<Requisition, StoreError> {
        let mut state = self.state.write().await;

        state.next_requisition_id += 1;
        let id = RequisitionId(state.next_requisition_id);
        let sequence = state.daily_sequences.entry(requisition.request_date).or_insert(0);
        *sequence += 1;
        let code = format_request_code(requisition.request_date, *sequence);

        requisition.id = id;
        requisition.request_code = code;
        for item in &mut requisition.items {
            state.next_line_item_id += 1;
            item.id = LineItemId(state.next_line_item_id);
            item.request_id = id;
        }

        entry.requisition_id = id;
        state.histories.entry(id).or_default().append(entry);
        state.requisitions.insert(id, requisition.clone());
        Ok(requisition)
    }

    async fn commit(
        &self,
        expected: RequisitionStatus,
        requisition: Requisition,
        entry: WorkflowLogEntry,
    ) -> Result<WorkflowLogEntry, StoreError> {
        let mut state = self.state.write().await;
        let id = requisition.id;
        let actual = state.requisitions.get(&id).map(|stored| stored.status);
        match actual {
            None => return Err(StoreError::Missing(id)),
            Some(actual) if actual != expected => {
                return Err(StoreError::StatusChanged { id, expected, actual });
            }
            Some(_) => {}
        }

        state.requisitions.insert(id, requisition);
        Ok(state.histories.entry(id).or_default().append(entry))
    }

    async fn revise(
        &self,
        mut requisition: Requisition,
        entry: WorkflowLogEntry,
    ) -> Result<Requisition, StoreError> {
        let mut state = self.state.write().await;
        let id = requisition.id;
        match state.requisitions.get(&id).map(|stored| stored.status) {
            None => return Err(StoreError::Missing(id)),
            Some(actual) if actual != RequisitionStatus::Draft => {
                return Err(StoreError::StatusChanged {
                    id,
                    expected: RequisitionStatus::Draft,
                    actual,
                });
            }
            Some(_) => {}
        }

        for item in &mut requisition.items {
            state.next_line_item_id += 1;
            item.id = LineItemId(state.next_line_item_id);
            item.request_id = id;
        }
        state.histories.entry(id).or_default().append(entry);
        state.requisitions.insert(id, requisition.clone());
        Ok(requisition)
    }

    async fn remove(
        &self,
        id: RequisitionId,
        expected: RequisitionStatus,
    ) -> Result<Requisition, StoreError> {
        let mut state = self.state.write().await;
        let actual = state.requisitions.get(&id).map(|stored| stored.status);
        match actual {
            None => Err(StoreError::Missing(id)),
            Some(actual) if actual != expected => {
                Err(StoreError::StatusChanged { id, expected, actual })
            }
            Some(_) => {
                state.histories.remove(&id);
                state.requisitions.remove(&id).ok_or(StoreError::Missing(id))
            }
        }
    }

    async fn history(&self, id: RequisitionId) -> Result<Vec<WorkflowLogEntry>, StoreError> {
        let state = self.state.read().await;
        if !state.requisitions.contains_key(&id) {
            return Err(StoreError::Missing(id));
        }
        Ok(state.histories.get(&id).map(|history| history.entries().to_vec()).unwrap_or_default())
    }
}
