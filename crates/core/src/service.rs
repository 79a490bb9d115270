//! In-process requisition service.
//!
//! Enforces every workflow rule authoritatively: role gating, project scoping,
//! payload validation and contract reservations. Mutations are serialized through
//! a write gate so reservation checks and the write that depends on them cannot interleave.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink,
};
use crate::domain::actor::{Actor, ProjectId, Role};
use crate::domain::contract::{ContractItemId, ContractLineItem};
use crate::domain::payload::{
    ApprovalPayload, ApprovalStage, BatchDeleteFailure, BatchDeleteReport, ListQuery,
    NewRequisition, Page, QuotePayload,
};
use crate::domain::requisition::{
    ItemType, LineItemId, Requisition, RequisitionId, RequisitionLineItem, RequisitionStatus,
};
use crate::errors::{ApplicationError, DomainError};
use crate::reservation::{
    Availability, CumulativeReservation, QuantityFit, ReservationError, SpecificationChoice,
};
use crate::stats::ProjectStatistics;
use crate::store::{InMemoryRequisitionStore, RequisitionStore};
use crate::validation::{
    validate_batch_ids, validate_decision_notes, validate_list_query, validate_new_requisition,
    validate_quote, validate_return_reason, ValidationErrors,
};
use crate::workflow::{
    available_actions, step_for, RequisitionWorkflow, WorkflowAction, WorkflowEngine,
    WorkflowLogEntry, WorkflowPosition,
};

pub struct RequisitionService {
    store: Arc<dyn RequisitionStore>,
    engine: WorkflowEngine<RequisitionWorkflow>,
    audit: Arc<dyn AuditSink>,
    write_gate: Mutex<()>,
}

impl RequisitionService {
    pub fn new(store: Arc<dyn RequisitionStore>) -> Self {
        Self {
            store,
            engine: WorkflowEngine::default(),
            audit: Arc::new(NoopAuditSink),
            write_gate: Mutex::new(()),
        }
    }

    pub fn in_memory(contract_items: impl IntoIterator<Item = ContractLineItem>) -> Self {
        Self::new(Arc::new(InMemoryRequisitionStore::with_contract_items(contract_items)))
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub async fn create(
        &self,
        actor: &Actor,
        new: NewRequisition,
    ) -> Result<Requisition, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        if actor.role != Role::ProjectManager {
            return Err(ApplicationError::Forbidden(format!(
                "only project managers raise requisitions (caller is {})",
                actor.role
            )));
        }
        ensure_project_access(actor, new.project_id)?;
        let mut errors = ValidationErrors::default();
        if let Err(structural) = validate_new_requisition(&new) {
            errors.extend(structural);
        }

        let _gate = self.write_gate.lock().await;
        let existing = self.store.requisitions().await?;
        let lines = self.build_lines(&new, &existing, None, &mut errors).await?;
        self.reject_invalid(errors, &lines.over_committed, None, &correlation_id, actor)?;
        let items = lines.items;

        let status = self.engine.initial_status();
        let now = Utc::now();
        let draft = Requisition {
            id: RequisitionId(0),
            request_code: String::new(),
            project_id: new.project_id,
            requester_id: actor.user_id,
            status,
            current_step: step_for(status),
            total_amount: None,
            request_date: now.date_naive(),
            required_date: new.required_date,
            remarks: new.remarks,
            approval_notes: None,
            items,
            created_at: now,
            updated_at: None,
        };
        let entry = WorkflowLogEntry::creation(
            draft.id,
            status,
            draft.current_step,
            actor,
            json!({ "item_count": draft.items.len() }),
        );
        let stored = self.store.insert(draft, entry).await?;

        info!(
            event_name = "requisition.created",
            correlation_id = %correlation_id,
            requisition_id = %stored.id,
            request_code = %stored.request_code,
            item_count = stored.items.len(),
            "requisition created"
        );
        Ok(stored.redacted_for(actor.role))
    }

    /// Replaces the header fields and line items of a draft. Reservations are checked
    /// with the draft's own lines excluded.
    pub async fn update(
        &self,
        actor: &Actor,
        id: RequisitionId,
        new: NewRequisition,
    ) -> Result<Requisition, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        let _gate = self.write_gate.lock().await;
        let current = self.load(id).await?;

        let permitted = current.requester_id == actor.user_id
            || (actor.role == Role::ProjectManager && actor.manages(current.project_id));
        if !permitted {
            return Err(ApplicationError::Forbidden(format!(
                "{} may not edit requisition {}",
                actor.label(),
                current.request_code
            )));
        }
        if current.status != RequisitionStatus::Draft {
            return Err(ApplicationError::Conflict(format!(
                "requisition {} is {} and only drafts can be edited",
                current.request_code, current.status
            )));
        }

        let mut errors = ValidationErrors::default();
        if new.project_id != current.project_id {
            errors.push("project_id", "a requisition cannot move to another project");
        }
        if let Err(structural) = validate_new_requisition(&new) {
            errors.extend(structural);
        }
        let existing = self.store.requisitions().await?;
        let lines = self.build_lines(&new, &existing, Some(id), &mut errors).await?;
        self.reject_invalid(errors, &lines.over_committed, Some(id), &correlation_id, actor)?;
        let items = lines.items;

        let item_count = items.len();
        let mut revised = current;
        revised.items = items;
        revised.required_date = new.required_date;
        revised.remarks = new.remarks;
        revised.recompute_total();
        revised.updated_at = Some(Utc::now());

        let entry = WorkflowLogEntry::revision(
            id,
            revised.status,
            revised.current_step,
            actor,
            json!({ "item_count": item_count }),
        );
        let stored = self.store.revise(revised, entry).await?;

        info!(
            event_name = "requisition.updated",
            correlation_id = %correlation_id,
            requisition_id = %id,
            request_code = %stored.request_code,
            item_count,
            "draft requisition updated"
        );
        Ok(stored.redacted_for(actor.role))
    }

    pub async fn get(
        &self,
        actor: &Actor,
        id: RequisitionId,
    ) -> Result<Requisition, ApplicationError> {
        let requisition = self.load(id).await?;
        ensure_project_access(actor, requisition.project_id)?;
        Ok(requisition.redacted_for(actor.role))
    }

    pub async fn list(
        &self,
        actor: &Actor,
        query: &ListQuery,
    ) -> Result<Page<Requisition>, ApplicationError> {
        validate_list_query(query)?;
        let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let search = search.map(str::to_lowercase);

        let mut matching: Vec<Requisition> = self
            .store
            .requisitions()
            .await?
            .into_iter()
            .filter(|req| actor.can_access_project(req.project_id))
            .filter(|req| query.project_id.map_or(true, |project| req.project_id == project))
            .filter(|req| query.status.map_or(true, |status| req.status == status))
            .filter(|req| query.requester_id.map_or(true, |user| req.requester_id == user))
            .filter(|req| search.as_deref().map_or(true, |needle| matches_search(req, needle)))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let offset = (query.page as usize - 1) * query.size as usize;
        let items = matching
            .into_iter()
            .skip(offset)
            .take(query.size as usize)
            .map(|req| req.redacted_for(actor.role))
            .collect();
        Ok(Page::new(items, total, query.page, query.size))
    }

    pub async fn history(
        &self,
        actor: &Actor,
        id: RequisitionId,
    ) -> Result<Vec<WorkflowLogEntry>, ApplicationError> {
        let requisition = self.load(id).await?;
        ensure_project_access(actor, requisition.project_id)?;
        Ok(self.store.history(id).await?)
    }

    pub fn available_actions(&self, actor: &Actor, requisition: &Requisition) -> Vec<WorkflowAction> {
        if !actor.can_access_project(requisition.project_id) {
            return Vec::new();
        }
        available_actions(requisition.status, actor.role)
    }

    pub async fn submit(
        &self,
        actor: &Actor,
        id: RequisitionId,
    ) -> Result<Requisition, ApplicationError> {
        self.transition(actor, id, WorkflowAction::Submit, None, Value::Null, |_| Ok(())).await
    }

    pub async fn quote(
        &self,
        actor: &Actor,
        id: RequisitionId,
        payload: QuotePayload,
    ) -> Result<Requisition, ApplicationError> {
        let notes = payload.quote_notes.clone().filter(|notes| !notes.trim().is_empty());
        let logged = serde_json::to_value(&payload).map_err(|error| {
            DomainError::InvariantViolation(format!("quote payload is not loggable: {error}"))
        })?;
        self.transition(actor, id, WorkflowAction::Quote, notes, logged, move |requisition| {
            validate_quote(&requisition.items, &payload)?;
            for quote in payload.items {
                if let Some(item) = requisition.items.iter_mut().find(|item| item.id == quote.item_id) {
                    item.unit_price = Some(quote.unit_price);
                    item.total_price = Some(item.quantity * quote.unit_price);
                    item.supplier_name = quote.supplier_name;
                    item.supplier_contact_person = quote.supplier_contact_person;
                    item.supplier_contact = quote.supplier_contact;
                    item.payment_method = quote.payment_method;
                    item.estimated_delivery = quote.estimated_delivery;
                }
            }
            requisition.recompute_total();
            Ok(())
        })
        .await
    }

    /// Sends a requisition back one step. The action follows from the current status:
    /// purchasers return submitted requisitions to the requester, project managers
    /// return quoted requisitions to purchasing.
    pub async fn return_requisition(
        &self,
        actor: &Actor,
        id: RequisitionId,
        reason: &str,
    ) -> Result<Requisition, ApplicationError> {
        let current = self.load(id).await?;
        let action = return_action_for(current.status);
        self.engine.apply(&WorkflowPosition::of(&current), action, actor)?;
        let reason = validate_return_reason(reason)?;
        let payload = json!({ "return_reason": reason, "returned_to": returned_to(action) });
        self.transition(actor, id, action, Some(reason), payload, |_| Ok(())).await
    }

    pub async fn decide(
        &self,
        actor: &Actor,
        id: RequisitionId,
        stage: ApprovalStage,
        payload: ApprovalPayload,
    ) -> Result<Requisition, ApplicationError> {
        let action = WorkflowAction::from_decision(stage, payload.approval_status);
        let current = self.load(id).await?;
        self.engine.apply(&WorkflowPosition::of(&current), action, actor)?;
        let notes = validate_decision_notes(action.is_rejection(), payload.approval_notes.as_deref())?;
        let logged = json!({ "stage": stage.as_str(), "approval_status": payload.approval_status });
        self.transition(actor, id, action, notes, logged, |_| Ok(())).await
    }

    pub async fn delete(&self, actor: &Actor, id: RequisitionId) -> Result<(), ApplicationError> {
        let _gate = self.write_gate.lock().await;
        self.delete_locked(actor, id).await.map(|_| ())
    }

    pub async fn batch_delete(
        &self,
        actor: &Actor,
        ids: &[RequisitionId],
    ) -> Result<BatchDeleteReport, ApplicationError> {
        validate_batch_ids(ids)?;
        let _gate = self.write_gate.lock().await;
        let mut report = BatchDeleteReport { total_requested: ids.len(), ..BatchDeleteReport::default() };

        for &id in ids {
            match self.delete_locked(actor, id).await {
                Ok(_) => report.deleted_count += 1,
                Err(error) => {
                    let request_code = self
                        .store
                        .requisition(id)
                        .await
                        .ok()
                        .flatten()
                        .map(|req| req.request_code);
                    report.failed.push(BatchDeleteFailure { id, request_code, reason: error.to_string() });
                }
            }
        }

        info!(
            event_name = "requisition.batch_deleted",
            deleted = report.deleted_count,
            requested = report.total_requested,
            "batch delete finished"
        );
        Ok(report)
    }

    pub async fn availability(
        &self,
        actor: &Actor,
        contract_item_id: ContractItemId,
        exclude: Option<RequisitionId>,
    ) -> Result<Availability, ApplicationError> {
        let contract = self
            .store
            .contract_item(contract_item_id)
            .await?
            .ok_or(ReservationError::NotFound(contract_item_id))?;
        ensure_project_access(actor, contract.project_id)?;
        let requisitions = self.store.requisitions().await?;
        Ok(Availability::compute(&contract, &requisitions, exclude))
    }

    /// Edit-time quantity fitting: over-requests are clamped to what remains.
    pub async fn fit_quantity(
        &self,
        actor: &Actor,
        contract_item_id: ContractItemId,
        requested: Decimal,
        exclude: Option<RequisitionId>,
    ) -> Result<QuantityFit, ApplicationError> {
        let availability = self.availability(actor, contract_item_id, exclude).await?;
        Ok(availability.fit(requested)?)
    }

    pub async fn specifications(
        &self,
        actor: &Actor,
        project_id: ProjectId,
        item_name: &str,
    ) -> Result<SpecificationChoice, ApplicationError> {
        ensure_project_access(actor, project_id)?;
        let contracts = self.store.contract_items_for_material(project_id, item_name).await?;
        let requisitions = self.store.requisitions().await?;
        let options = contracts
            .iter()
            .map(|contract| Availability::compute(contract, &requisitions, None))
            .collect();
        Ok(SpecificationChoice::from_options(options))
    }

    pub async fn project_statistics(
        &self,
        actor: &Actor,
        project_id: ProjectId,
    ) -> Result<ProjectStatistics, ApplicationError> {
        ensure_project_access(actor, project_id)?;
        let requisitions = self.store.requisitions().await?;
        Ok(ProjectStatistics::compute(project_id, &requisitions))
    }

    async fn load(&self, id: RequisitionId) -> Result<Requisition, ApplicationError> {
        self.store.requisition(id).await?.ok_or_else(|| ApplicationError::not_found("requisition", id))
    }

    async fn delete_locked(
        &self,
        actor: &Actor,
        id: RequisitionId,
    ) -> Result<Requisition, ApplicationError> {
        let requisition = self.load(id).await?;
        let permitted = requisition.requester_id == actor.user_id
            || (actor.role == Role::ProjectManager && actor.manages(requisition.project_id))
            || actor.role == Role::Purchaser;
        if !permitted {
            return Err(ApplicationError::Forbidden(format!(
                "{} may not delete requisition {}",
                actor.label(),
                requisition.request_code
            )));
        }
        if requisition.status != RequisitionStatus::Draft {
            return Err(ApplicationError::Conflict(format!(
                "requisition {} is {} and only drafts can be deleted",
                requisition.request_code, requisition.status
            )));
        }

        let removed = self.store.remove(id, RequisitionStatus::Draft).await?;
        info!(
            event_name = "requisition.deleted",
            requisition_id = %id,
            request_code = %removed.request_code,
            actor = %actor.label(),
            "requisition deleted"
        );
        Ok(removed)
    }

    async fn transition<F>(
        &self,
        actor: &Actor,
        id: RequisitionId,
        action: WorkflowAction,
        notes: Option<String>,
        payload: Value,
        apply: F,
    ) -> Result<Requisition, ApplicationError>
    where
        F: FnOnce(&mut Requisition) -> Result<(), ValidationErrors> + Send,
    {
        let correlation_id = Uuid::new_v4().to_string();
        let _gate = self.write_gate.lock().await;
        let current = self.load(id).await?;
        let audit = AuditContext::new(Some(id), correlation_id.clone(), actor.label());

        let outcome = self
            .engine
            .apply_with_audit(
                &WorkflowPosition::of(&current),
                action,
                actor,
                self.audit.as_ref(),
                &audit,
            )
            .map_err(|error| {
                warn!(
                    event_name = "requisition.transition_rejected",
                    correlation_id = %correlation_id,
                    requisition_id = %id,
                    action = %action,
                    error = %error,
                    "workflow transition rejected"
                );
                ApplicationError::from(error)
            })?;

        if action == WorkflowAction::Submit {
            self.revalidate_reservations(&current).await?;
        }

        let mut updated = current;
        apply(&mut updated)?;
        updated.status = outcome.to;
        updated.current_step = outcome.to_step;
        if notes.is_some() {
            updated.approval_notes = notes.clone();
        }
        updated.updated_at = Some(Utc::now());

        let entry = WorkflowLogEntry::transition(id, &outcome, actor, notes, payload);
        let entry = self.store.commit(outcome.from, updated.clone(), entry).await?;

        info!(
            event_name = "requisition.transition_applied",
            correlation_id = %correlation_id,
            requisition_id = %id,
            action = %action,
            from = %outcome.from,
            to = %outcome.to,
            sequence = entry.sequence,
            "workflow transition applied"
        );
        Ok(updated.redacted_for(actor.role))
    }

    /// Turns payload lines into stored lines, filling main items from their contract line and
    /// claiming reservations cumulatively. Lines that already failed structural checks are
    /// carried along but not reserved.
    async fn build_lines(
        &self,
        new: &NewRequisition,
        existing: &[Requisition],
        exclude: Option<RequisitionId>,
        errors: &mut ValidationErrors,
    ) -> Result<DraftLines, ApplicationError> {
        let mut tally = CumulativeReservation::default();
        let mut items = Vec::with_capacity(new.items.len());
        let mut over_committed = Vec::new();

        for (index, item) in new.items.iter().enumerate() {
            let mut line = RequisitionLineItem {
                id: LineItemId(0),
                request_id: exclude.unwrap_or(RequisitionId(0)),
                contract_item_id: item.contract_item_id,
                item_type: item.item_type,
                item_name: item.item_name.trim().to_string(),
                specification: item.specification.clone(),
                brand_model: item.brand_model.clone(),
                unit: item.unit.clone(),
                quantity: item.quantity,
                unit_price: None,
                total_price: None,
                supplier_name: None,
                supplier_contact_person: None,
                supplier_contact: None,
                payment_method: None,
                estimated_delivery: None,
                received_quantity: Decimal::ZERO,
                remarks: item.remarks.clone(),
            };

            let reservable = line.quantity > Decimal::ZERO;
            if let (ItemType::Main, Some(contract_id)) = (line.item_type, line.contract_item_id) {
                match self.store.contract_item(contract_id).await? {
                    None => errors.push(
                        format!("items[{index}].contract_item_id"),
                        format!("contract item {contract_id} was not found"),
                    ),
                    Some(contract) if contract.project_id != new.project_id => errors.push(
                        format!("items[{index}].contract_item_id"),
                        format!("contract item {contract_id} belongs to another project"),
                    ),
                    Some(contract) => {
                        if reservable {
                            let availability = Availability::compute(&contract, existing, exclude);
                            if let Err(error) = tally.claim(&availability, line.quantity) {
                                let field = format!("items[{index}].quantity");
                                errors.push(field.clone(), error.to_string());
                                over_committed.push(field);
                            }
                        }
                        fill_from_contract(&mut line, &contract);
                    }
                }
            }
            items.push(line);
        }
        Ok(DraftLines { items, over_committed })
    }

    /// Fails with every collected issue. Quantity issues are also reported to the audit sink.
    fn reject_invalid(
        &self,
        errors: ValidationErrors,
        over_committed: &[String],
        requisition_id: Option<RequisitionId>,
        correlation_id: &str,
        actor: &Actor,
    ) -> Result<(), ApplicationError> {
        if !over_committed.is_empty() {
            warn!(
                event_name = "reservation.over_commit_rejected",
                correlation_id = %correlation_id,
                fields = %over_committed.join(","),
                "requested quantity exceeds what the contract has left"
            );
            let context = AuditContext::new(requisition_id, correlation_id, actor.label());
            self.audit.emit(
                AuditEvent::new(
                    &context,
                    "reservation.over_commit_rejected",
                    AuditCategory::Reservation,
                    AuditOutcome::Rejected,
                )
                .with_metadata("fields", over_committed.join(",")),
            );
        }
        Ok(errors.into_result()?)
    }

    /// Reservations may have moved since the draft was saved; check them again on submit.
    async fn revalidate_reservations(
        &self,
        requisition: &Requisition,
    ) -> Result<(), ApplicationError> {
        let existing = self.store.requisitions().await?;
        let mut errors = ValidationErrors::default();
        let mut tally = CumulativeReservation::default();

        for (index, item) in requisition.items.iter().enumerate() {
            let Some(contract_id) = item.contract_item_id.filter(|_| item.is_main()) else {
                continue;
            };
            match self.store.contract_item(contract_id).await? {
                None => errors.push(
                    format!("items[{index}].contract_item_id"),
                    format!("contract item {contract_id} was not found"),
                ),
                Some(contract) => {
                    let availability =
                        Availability::compute(&contract, &existing, Some(requisition.id));
                    if let Err(error) = tally.claim(&availability, item.quantity) {
                        errors.push(format!("items[{index}].quantity"), error.to_string());
                    }
                }
            }
        }

        Ok(errors.into_result()?)
    }
}

struct DraftLines {
    items: Vec<RequisitionLineItem>,
    over_committed: Vec<String>,
}

fn ensure_project_access(actor: &Actor, project_id: ProjectId) -> Result<(), ApplicationError> {
    if actor.can_access_project(project_id) {
        Ok(())
    } else {
        Err(ApplicationError::Forbidden(format!(
            "{} does not manage project {project_id}",
            actor.label()
        )))
    }
}

fn fill_from_contract(line: &mut RequisitionLineItem, contract: &ContractLineItem) {
    if line.item_name.is_empty() {
        line.item_name = contract.item_name.clone();
    }
    if line.specification.is_none() {
        line.specification = contract.specification.clone();
    }
    if line.brand_model.is_none() {
        line.brand_model = contract.brand_model.clone();
    }
    if line.unit.is_none() {
        line.unit = contract.unit.clone();
    }
}

fn matches_search(requisition: &Requisition, needle: &str) -> bool {
    requisition.request_code.to_lowercase().contains(needle)
        || requisition
            .approval_notes
            .as_deref()
            .is_some_and(|notes| notes.to_lowercase().contains(needle))
}

pub fn return_action_for(status: RequisitionStatus) -> WorkflowAction {
    match status {
        RequisitionStatus::PriceQuoted => WorkflowAction::ReturnToPurchaser,
        _ => WorkflowAction::Return,
    }
}

fn returned_to(action: WorkflowAction) -> &'static str {
    match action {
        WorkflowAction::ReturnToPurchaser => "purchaser",
        _ => "project_manager",
    }
}
