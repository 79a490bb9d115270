//! The list, detail, action, refetch loop a requisition screen runs on.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use reqflow_core::domain::actor::{Actor, ProjectId};
use reqflow_core::domain::contract::ContractItemId;
use reqflow_core::domain::payload::{
    ApprovalPayload, ApprovalStage, BatchDeleteReport, ListQuery, NewRequisition, Page,
    QuotePayload,
};
use reqflow_core::domain::requisition::{Requisition, RequisitionId, RequisitionStatus};
use reqflow_core::errors::ApplicationError;
use reqflow_core::reservation::{Availability, QuantityFit, SpecificationChoice};
use reqflow_core::validation::{validate_batch_ids, validate_list_query};
use reqflow_core::workflow::{WorkflowAction, WorkflowLogEntry};

use crate::api::RequisitionApi;
use crate::in_flight::InFlightActions;
use crate::precheck::Precheck;
use crate::schedule::LatestWins;

/// A requisition as shown to one actor: the aggregate, what they may do next, and its log.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RequisitionView {
    pub requisition: Requisition,
    pub available_actions: Vec<WorkflowAction>,
    pub history: Vec<WorkflowLogEntry>,
}

pub struct Workbench {
    api: Arc<dyn RequisitionApi>,
    actor: Actor,
    precheck: Precheck,
    in_flight: InFlightActions,
    listing: LatestWins<Page<Requisition>>,
}

impl Workbench {
    pub fn new(api: Arc<dyn RequisitionApi>, actor: Actor) -> Self {
        Self {
            api,
            actor,
            precheck: Precheck::default(),
            in_flight: InFlightActions::default(),
            listing: LatestWins::new(),
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn in_flight(&self) -> &InFlightActions {
        &self.in_flight
    }

    /// Fetches a page. Returns `None` when a newer refresh already landed first.
    pub async fn refresh_list(
        &self,
        query: &ListQuery,
    ) -> Result<Option<Page<Requisition>>, ApplicationError> {
        validate_list_query(query)?;
        let ticket = self.listing.issue();
        let page = self.api.list(query).await?;
        Ok(self.listing.offer(ticket, page.clone()).then_some(page))
    }

    pub fn current_list(&self) -> Option<Page<Requisition>> {
        self.listing.current()
    }

    pub async fn open(&self, id: RequisitionId) -> Result<RequisitionView, ApplicationError> {
        let requisition = self.api.get(id).await?;
        let history = self.api.history(id).await?;
        let available_actions = self.precheck.offered_actions(&self.actor, &requisition);
        Ok(RequisitionView { requisition, available_actions, history })
    }

    pub async fn create(&self, new: &NewRequisition) -> Result<RequisitionView, ApplicationError> {
        self.precheck.create(&self.actor, new)?;
        let created = self.api.create(new).await?;
        info!(
            event_name = "workbench.requisition_created",
            requisition_id = %created.id,
            request_code = %created.request_code,
            actor = %self.actor.label(),
            "requisition created"
        );
        self.open(created.id).await
    }

    /// Replaces a draft's lines. The backend re-checks quantities with this draft excluded.
    pub async fn update(
        &self,
        requisition: &Requisition,
        new: &NewRequisition,
    ) -> Result<RequisitionView, ApplicationError> {
        self.precheck.update(&self.actor, requisition, new)?;
        let _guard = self.in_flight.begin(requisition.id)?;
        let updated = self.api.update(requisition.id, new).await?;
        info!(
            event_name = "workbench.requisition_updated",
            requisition_id = %updated.id,
            item_count = updated.items.len(),
            actor = %self.actor.label(),
            "draft requisition updated"
        );
        self.open(updated.id).await
    }

    pub async fn submit(&self, requisition: &Requisition) -> Result<RequisitionView, ApplicationError> {
        self.precheck.action(&self.actor, requisition, WorkflowAction::Submit)?;
        self.perform(requisition.id, WorkflowAction::Submit, self.api.submit(requisition.id)).await
    }

    pub async fn quote(
        &self,
        requisition: &Requisition,
        payload: &QuotePayload,
    ) -> Result<RequisitionView, ApplicationError> {
        self.precheck.quote(&self.actor, requisition, payload)?;
        self.perform(requisition.id, WorkflowAction::Quote, self.api.quote(requisition.id, payload))
            .await
    }

    pub async fn return_requisition(
        &self,
        requisition: &Requisition,
        reason: &str,
    ) -> Result<RequisitionView, ApplicationError> {
        let (action, reason) = self.precheck.return_requisition(&self.actor, requisition, reason)?;
        self.perform(requisition.id, action, self.api.return_requisition(requisition.id, &reason))
            .await
    }

    pub async fn decide(
        &self,
        requisition: &Requisition,
        stage: ApprovalStage,
        payload: &ApprovalPayload,
    ) -> Result<RequisitionView, ApplicationError> {
        let payload = self.precheck.decide(&self.actor, requisition, stage, payload)?;
        let action = WorkflowAction::from_decision(stage, payload.approval_status);
        self.perform(requisition.id, action, self.api.decide(requisition.id, stage, &payload)).await
    }

    pub async fn delete(&self, requisition: &Requisition) -> Result<(), ApplicationError> {
        if requisition.status != RequisitionStatus::Draft {
            return Err(ApplicationError::Conflict(format!(
                "requisition {} is {} and only drafts can be deleted",
                requisition.request_code, requisition.status
            )));
        }
        let _guard = self.in_flight.begin(requisition.id)?;
        self.api.delete(requisition.id).await?;
        info!(
            event_name = "workbench.requisition_deleted",
            requisition_id = %requisition.id,
            actor = %self.actor.label(),
            "requisition deleted"
        );
        Ok(())
    }

    pub async fn batch_delete(
        &self,
        ids: &[RequisitionId],
    ) -> Result<BatchDeleteReport, ApplicationError> {
        validate_batch_ids(ids)?;
        self.api.batch_delete(ids).await
    }

    /// A point-in-time read. The backend re-validates at write time.
    pub async fn availability(
        &self,
        contract_item_id: ContractItemId,
    ) -> Result<Availability, ApplicationError> {
        self.api.contract_item(contract_item_id).await
    }

    /// Reads current availability and clamps the requested quantity to it.
    pub async fn fit_quantity(
        &self,
        contract_item_id: ContractItemId,
        requested: Decimal,
    ) -> Result<QuantityFit, ApplicationError> {
        let availability = self.availability(contract_item_id).await?;
        self.fit_within(&availability, requested)
    }

    pub fn fit_within(
        &self,
        availability: &Availability,
        requested: Decimal,
    ) -> Result<QuantityFit, ApplicationError> {
        let contract_item_id = availability.contract_item_id;
        let fit = self.precheck.quantity(availability, requested)?;
        if let QuantityFit::Adjusted { requested, quantity } = fit {
            info!(
                event_name = "workbench.quantity_adjusted",
                contract_item_id = %contract_item_id,
                requested = %requested,
                adjusted_to = %quantity,
                "requested quantity exceeds what remains on the contract line"
            );
        }
        Ok(fit)
    }

    pub async fn specifications(
        &self,
        project_id: ProjectId,
        item_name: &str,
    ) -> Result<SpecificationChoice, ApplicationError> {
        let options = self.api.specifications(project_id, item_name).await?;
        Ok(SpecificationChoice::from_options(options))
    }

    async fn perform<F>(
        &self,
        id: RequisitionId,
        action: WorkflowAction,
        call: F,
    ) -> Result<RequisitionView, ApplicationError>
    where
        F: Future<Output = Result<Requisition, ApplicationError>>,
    {
        let _guard = self.in_flight.begin(id)?;
        let correlation_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        if let Err(error) = call.await {
            warn!(
                event_name = "workbench.action_failed",
                correlation_id = %correlation_id,
                requisition_id = %id,
                action = %action,
                kind = error.kind().as_str(),
                error = %error,
                "workflow action failed"
            );
            return Err(error);
        }

        info!(
            event_name = "workbench.action_completed",
            correlation_id = %correlation_id,
            requisition_id = %id,
            action = %action,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "workflow action completed"
        );
        self.open(id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::Workbench;
    use crate::local::InProcessApi;
    use reqflow_core::domain::actor::{Actor, ProjectId, Role};
    use reqflow_core::domain::contract::{ContractItemId, ContractLineItem};
    use reqflow_core::domain::payload::{
        ApprovalPayload, ApprovalStage, ItemQuote, ListQuery, NewLineItem, NewRequisition,
        QuotePayload,
    };
    use reqflow_core::domain::requisition::{Requisition, RequisitionStatus, WorkflowStep};
    use reqflow_core::errors::ErrorKind;
    use reqflow_core::reservation::{Availability, QuantityFit, SpecificationChoice};
    use reqflow_core::service::RequisitionService;
    use reqflow_core::workflow::WorkflowAction;

    fn pm() -> Actor {
        Actor::new(7, "Li Wei", Role::ProjectManager).managing([3])
    }

    fn backend() -> InProcessApi {
        let service = RequisitionService::in_memory([
            ContractLineItem::new(101, 3, "Cat6 cable", Decimal::from(100))
                .with_specification("UTP")
                .with_unit("m"),
            ContractLineItem::new(102, 3, "Cat6 cable", Decimal::from(50)).with_specification("FTP"),
        ]);
        InProcessApi::new(Arc::new(service), pm())
    }

    fn bench(api: &InProcessApi, actor: Actor) -> Workbench {
        Workbench::new(Arc::new(api.acting_as(actor.clone())), actor)
    }

    fn new_requisition(quantity: i64) -> NewRequisition {
        NewRequisition {
            project_id: ProjectId(3),
            required_date: None,
            remarks: None,
            items: vec![NewLineItem::main(101, Decimal::from(quantity))],
        }
    }

    fn full_quote(requisition: &Requisition) -> QuotePayload {
        QuotePayload {
            items: requisition
                .items
                .iter()
                .map(|item| ItemQuote {
                    item_id: item.id,
                    unit_price: Decimal::new(350, 2),
                    supplier_name: Some("Huatong Cabling".to_string()),
                    supplier_contact_person: Some("Wang Jun".to_string()),
                    supplier_contact: Some("021-5555-0101".to_string()),
                    payment_method: Some("bank transfer".to_string()),
                    estimated_delivery: NaiveDate::from_ymd_opt(2026, 11, 2),
                })
                .collect(),
            quote_notes: None,
        }
    }

    #[tokio::test]
    async fn each_action_refetches_the_aggregate_and_its_history() {
        let api = backend();
        let pm_bench = bench(&api, pm());
        let purchaser_bench = bench(&api, Actor::new(8, "Zhao Min", Role::Purchaser));

        let created = pm_bench.create(&new_requisition(40)).await.expect("create");
        assert_eq!(created.available_actions, vec![WorkflowAction::Submit]);
        assert_eq!(created.history.len(), 1);

        let submitted = pm_bench.submit(&created.requisition).await.expect("submit");
        assert_eq!(submitted.requisition.status, RequisitionStatus::Submitted);
        assert_eq!(submitted.requisition.current_step, Some(WorkflowStep::Purchaser));
        assert!(submitted.available_actions.is_empty());
        assert_eq!(submitted.history.len(), 2);

        let error = pm_bench
            .quote(&submitted.requisition, &full_quote(&submitted.requisition))
            .await
            .expect_err("project managers cannot quote");
        assert_eq!(error.kind(), ErrorKind::Authorization);

        let for_purchaser = purchaser_bench.open(submitted.requisition.id).await.expect("open");
        assert_eq!(
            for_purchaser.available_actions,
            vec![WorkflowAction::Quote, WorkflowAction::Return]
        );
        let quoted = purchaser_bench
            .quote(&for_purchaser.requisition, &full_quote(&for_purchaser.requisition))
            .await
            .expect("quote");
        assert_eq!(quoted.requisition.total_amount, Some(Decimal::from(140)));

        let back = pm_bench
            .return_requisition(&quoted.requisition, "supplier lead time is too long")
            .await
            .expect("return to purchaser");
        assert_eq!(back.requisition.status, RequisitionStatus::Submitted);
        assert_eq!(back.requisition.total_amount, None, "prices stay hidden from project managers");
        let last = back.history.last().expect("history entry");
        assert_eq!(last.operation, "return_to_purchaser");
        assert_eq!(last.notes.as_deref(), Some("supplier lead time is too long"));
    }

    #[tokio::test]
    async fn action_already_in_flight_is_refused_without_a_request() {
        let api = backend();
        let workbench = bench(&api, pm());
        let created = workbench.create(&new_requisition(5)).await.expect("create");

        let guard = workbench.in_flight().begin(created.requisition.id).expect("guard");
        let error = workbench.submit(&created.requisition).await.expect_err("already pending");
        assert_eq!(error.kind(), ErrorKind::Conflict);
        drop(guard);

        let reopened = workbench.open(created.requisition.id).await.expect("open");
        assert_eq!(reopened.requisition.status, RequisitionStatus::Draft);
        assert_eq!(reopened.history.len(), 1);
        assert_eq!(workbench.in_flight().pending_count(), 0);
    }

    #[tokio::test]
    async fn quantity_fitting_and_specification_choice() {
        let api = backend();
        let workbench = bench(&api, pm());
        workbench.create(&new_requisition(40)).await.expect("create");

        let fit = workbench.fit_quantity(ContractItemId(101), Decimal::from(80)).await.expect("fit");
        assert_eq!(fit, QuantityFit::Adjusted { requested: Decimal::from(80), quantity: Decimal::from(60) });

        let choice =
            workbench.specifications(ProjectId(3), "Cat6 cable").await.expect("specifications");
        assert!(matches!(choice, SpecificationChoice::ChooseOne(ref options) if options.len() == 2));
        assert!(choice.selected(None).is_none());
        assert_eq!(
            choice.selected(Some(ContractItemId(101))).map(|option| option.remaining_quantity),
            Some(Decimal::from(60))
        );
    }

    #[tokio::test]
    async fn rejecting_requires_a_note_and_frees_the_reservation() {
        let api = backend();
        let pm_bench = bench(&api, pm());
        let purchaser = bench(&api, Actor::new(8, "Zhao Min", Role::Purchaser));
        let dept = bench(&api, Actor::new(9, "Sun Li", Role::DeptManager));

        let created = pm_bench.create(&new_requisition(90)).await.expect("create");
        pm_bench.submit(&created.requisition).await.expect("submit");
        let opened = purchaser.open(created.requisition.id).await.expect("open");
        let quoted =
            purchaser.quote(&opened.requisition, &full_quote(&opened.requisition)).await.expect("quote");

        let error = dept
            .decide(&quoted.requisition, ApprovalStage::Dept, &ApprovalPayload::reject(""))
            .await
            .expect_err("note required");
        assert_eq!(error.kind(), ErrorKind::Validation);

        let rejected = dept
            .decide(&quoted.requisition, ApprovalStage::Dept, &ApprovalPayload::reject("over budget"))
            .await
            .expect("reject");
        assert_eq!(rejected.requisition.status, RequisitionStatus::Rejected);
        assert!(rejected.available_actions.is_empty());

        let fit = pm_bench.fit_quantity(ContractItemId(101), Decimal::from(100)).await.expect("fit");
        assert_eq!(fit, QuantityFit::Accepted { quantity: Decimal::from(100) });
    }

    #[tokio::test]
    async fn list_refresh_keeps_latest_page_and_delete_is_draft_only() {
        let api = backend();
        let workbench = bench(&api, pm());
        let first = workbench.create(&new_requisition(1)).await.expect("create");
        let second = workbench.create(&new_requisition(2)).await.expect("create");
        workbench.submit(&second.requisition).await.expect("submit");

        let page = workbench
            .refresh_list(&ListQuery::default())
            .await
            .expect("list")
            .expect("fresh page applies");
        assert_eq!(page.total, 2);
        assert_eq!(workbench.current_list().map(|page| page.items.len()), Some(2));

        let submitted = workbench.open(second.requisition.id).await.expect("open");
        let error = workbench.delete(&submitted.requisition).await.expect_err("not a draft");
        assert_eq!(error.kind(), ErrorKind::Conflict);
        workbench.delete(&first.requisition).await.expect("draft delete");

        let after = workbench.refresh_list(&ListQuery::default()).await.expect("list");
        assert_eq!(after.map(|page| page.total), Some(1));
    }

    #[tokio::test]
    async fn draft_edits_refetch_and_stop_once_submitted() {
        let api = backend();
        let workbench = bench(&api, pm());
        let created = workbench.create(&new_requisition(40)).await.expect("create");

        let edited = workbench
            .update(&created.requisition, &new_requisition(100))
            .await
            .expect("the draft's own 40 does not count against it");
        assert_eq!(edited.requisition.items[0].quantity, Decimal::from(100));
        assert_eq!(edited.history.last().map(|entry| entry.operation.as_str()), Some("update"));

        let error = workbench
            .update(&edited.requisition, &new_requisition(101))
            .await
            .expect_err("more than the contract holds");
        assert_eq!(error.kind(), ErrorKind::Validation);

        let submitted = workbench.submit(&edited.requisition).await.expect("submit");
        let error = workbench
            .update(&submitted.requisition, &new_requisition(10))
            .await
            .expect_err("only drafts are editable");
        assert_eq!(error.kind(), ErrorKind::Conflict);
    }
}
