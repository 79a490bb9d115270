use std::sync::Arc;

use async_trait::async_trait;

use reqflow_core::domain::actor::{Actor, ProjectId};
use reqflow_core::domain::contract::ContractItemId;
use reqflow_core::domain::payload::{
    ApprovalPayload, ApprovalStage, BatchDeleteReport, ListQuery, NewRequisition, Page,
    QuotePayload,
};
use reqflow_core::domain::requisition::{Requisition, RequisitionId};
use reqflow_core::errors::ApplicationError;
use reqflow_core::reservation::Availability;
use reqflow_core::service::RequisitionService;
use reqflow_core::workflow::WorkflowLogEntry;

use crate::api::RequisitionApi;

/// Serves the API surface straight from an in-process service, acting as one fixed user.
#[derive(Clone)]
pub struct InProcessApi {
    service: Arc<RequisitionService>,
    actor: Actor,
}

impl InProcessApi {
    pub fn new(service: Arc<RequisitionService>, actor: Actor) -> Self {
        Self { service, actor }
    }

    /// The same backend seen by a different user.
    pub fn acting_as(&self, actor: Actor) -> Self {
        Self { service: Arc::clone(&self.service), actor }
    }

    pub fn service(&self) -> &RequisitionService {
        &self.service
    }
}

#[async_trait]
impl RequisitionApi for InProcessApi {
    async fn list(&self, query: &ListQuery) -> Result<Page<Requisition>, ApplicationError> {
        self.service.list(&self.actor, query).await
    }

    async fn get(&self, id: RequisitionId) -> Result<Requisition, ApplicationError> {
        self.service.get(&self.actor, id).await
    }

    async fn create(&self, new: &NewRequisition) -> Result<Requisition, ApplicationError> {
        self.service.create(&self.actor, new.clone()).await
    }

    async fn update(
        &self,
        id: RequisitionId,
        new: &NewRequisition,
    ) -> Result<Requisition, ApplicationError> {
        self.service.update(&self.actor, id, new.clone()).await
    }

    async fn submit(&self, id: RequisitionId) -> Result<Requisition, ApplicationError> {
        self.service.submit(&self.actor, id).await
    }

    async fn quote(
        &self,
        id: RequisitionId,
        payload: &QuotePayload,
    ) -> Result<Requisition, ApplicationError> {
        self.service.quote(&self.actor, id, payload.clone()).await
    }

    async fn return_requisition(
        &self,
        id: RequisitionId,
        reason: &str,
    ) -> Result<Requisition, ApplicationError> {
        self.service.return_requisition(&self.actor, id, reason).await
    }

    async fn decide(
        &self,
        id: RequisitionId,
        stage: ApprovalStage,
        payload: &ApprovalPayload,
    ) -> Result<Requisition, ApplicationError> {
        self.service.decide(&self.actor, id, stage, payload.clone()).await
    }

    async fn delete(&self, id: RequisitionId) -> Result<(), ApplicationError> {
        self.service.delete(&self.actor, id).await
    }

    async fn batch_delete(
        &self,
        ids: &[RequisitionId],
    ) -> Result<BatchDeleteReport, ApplicationError> {
        self.service.batch_delete(&self.actor, ids).await
    }

    async fn history(&self, id: RequisitionId) -> Result<Vec<WorkflowLogEntry>, ApplicationError> {
        self.service.history(&self.actor, id).await
    }

    async fn specifications(
        &self,
        project_id: ProjectId,
        item_name: &str,
    ) -> Result<Vec<Availability>, ApplicationError> {
        let choice = self.service.specifications(&self.actor, project_id, item_name).await?;
        Ok(choice.options().into_iter().cloned().collect())
    }

    async fn contract_item(&self, id: ContractItemId) -> Result<Availability, ApplicationError> {
        self.service.availability(&self.actor, id, None).await
    }

    async fn health(&self) -> Result<(), ApplicationError> {
        Ok(())
    }
}
