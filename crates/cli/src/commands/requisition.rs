//! Requisition operations against the configured backend, one request flow per invocation.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;

use reqflow_client::{ApiClient, RequisitionView, Workbench};
use reqflow_core::config::{AppConfig, LoadOptions};
use reqflow_core::domain::actor::ProjectId;
use reqflow_core::domain::contract::ContractItemId;
use reqflow_core::domain::payload::{
    ApprovalPayload, ApprovalStage, BatchDeleteReport, Decision, ListQuery, NewRequisition, Page,
    QuotePayload,
};
use reqflow_core::domain::requisition::RequisitionId;
use reqflow_core::errors::ApplicationError;
use reqflow_core::reservation::{Availability, QuantityFit};

use crate::commands::{block_on, CommandResult, EXIT_CONFIG, EXIT_VALIDATION};

#[derive(Clone, Debug)]
pub enum RequisitionCommand {
    List(ListQuery),
    Show(RequisitionId),
    History(RequisitionId),
    Create(NewRequisition),
    Edit { id: RequisitionId, payload: NewRequisition },
    Submit(RequisitionId),
    Quote { id: RequisitionId, payload: QuotePayload },
    Return { id: RequisitionId, reason: String },
    Decide { id: RequisitionId, stage: ApprovalStage, payload: ApprovalPayload },
    Delete(Vec<RequisitionId>),
    Availability { contract_item_id: ContractItemId, quantity: Option<Decimal> },
    Specifications { project_id: ProjectId, item_name: String },
}

impl RequisitionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::List(_) => "list",
            Self::Show(_) => "show",
            Self::History(_) => "history",
            Self::Create(_) => "create",
            Self::Edit { .. } => "edit",
            Self::Submit(_) => "submit",
            Self::Quote { .. } => "quote",
            Self::Return { .. } => "return",
            Self::Decide { payload, .. } => match payload.approval_status {
                Decision::Approved => "approve",
                Decision::Rejected => "reject",
            },
            Self::Delete(_) => "delete",
            Self::Availability { .. } => "availability",
            Self::Specifications { .. } => "specs",
        }
    }
}

/// Loads config, connects to the backend as the configured identity and runs one command.
pub fn run(options: &LoadOptions, command: RequisitionCommand) -> CommandResult {
    let name = command.name();
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(name, "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };
    let actor = match config.actor() {
        Ok(actor) => actor,
        Err(error) => {
            return CommandResult::failure(name, "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };
    let client = match ApiClient::new(&config) {
        Ok(client) => client,
        Err(error) => return CommandResult::from_error(name, &error),
    };
    let workbench = Workbench::new(Arc::new(client), actor);

    block_on(name, execute(&workbench, command)).unwrap_or_else(|failure| failure)
}

/// Runs one command on an already connected workbench.
pub async fn execute(workbench: &Workbench, command: RequisitionCommand) -> CommandResult {
    let name = command.name();
    dispatch(workbench, command)
        .await
        .unwrap_or_else(|error| CommandResult::from_error(name, &error))
}

#[derive(Debug, Serialize)]
struct AvailabilityOutput {
    availability: Availability,
    fit: Option<QuantityFit>,
}

async fn dispatch(
    workbench: &Workbench,
    command: RequisitionCommand,
) -> Result<CommandResult, ApplicationError> {
    let name = command.name();
    let result = match command {
        RequisitionCommand::List(query) => {
            let page = workbench
                .refresh_list(&query)
                .await?
                .or_else(|| workbench.current_list())
                .unwrap_or_else(|| Page::new(Vec::new(), 0, query.page, query.size));
            let message =
                format!("page {} of {} ({} requisitions)", page.page, page.pages, page.total);
            CommandResult::data(name, message, &page)
        }
        RequisitionCommand::Show(id) => {
            let view = workbench.open(id).await?;
            let message =
                format!("{} is {}", view.requisition.request_code, view.requisition.status);
            CommandResult::data(name, message, &view)
        }
        RequisitionCommand::History(id) => {
            let view = workbench.open(id).await?;
            let message = format!("{} workflow log entries", view.history.len());
            CommandResult::data(name, message, &view.history)
        }
        RequisitionCommand::Create(new) => {
            let view = workbench.create(&new).await?;
            CommandResult::data(name, format!("created {}", view.requisition.request_code), &view)
        }
        RequisitionCommand::Edit { id, payload } => {
            let current = workbench.open(id).await?.requisition;
            let view = workbench.update(&current, &payload).await?;
            let message = format!(
                "updated {} ({} line items)",
                view.requisition.request_code,
                view.requisition.items.len()
            );
            CommandResult::data(name, message, &view)
        }
        RequisitionCommand::Submit(id) => {
            let current = workbench.open(id).await?.requisition;
            let view = workbench.submit(&current).await?;
            CommandResult::data(name, transition_message(&view), &view)
        }
        RequisitionCommand::Quote { id, payload } => {
            let current = workbench.open(id).await?.requisition;
            let view = workbench.quote(&current, &payload).await?;
            CommandResult::data(name, transition_message(&view), &view)
        }
        RequisitionCommand::Return { id, reason } => {
            let current = workbench.open(id).await?.requisition;
            let view = workbench.return_requisition(&current, &reason).await?;
            CommandResult::data(name, transition_message(&view), &view)
        }
        RequisitionCommand::Decide { id, stage, payload } => {
            let current = workbench.open(id).await?.requisition;
            let view = workbench.decide(&current, stage, &payload).await?;
            CommandResult::data(name, transition_message(&view), &view)
        }
        RequisitionCommand::Delete(ids) => match ids.as_slice() {
            [id] => {
                let current = workbench.open(*id).await?.requisition;
                workbench.delete(&current).await?;
                let report =
                    BatchDeleteReport { deleted_count: 1, total_requested: 1, failed: Vec::new() };
                CommandResult::data(name, format!("deleted {}", current.request_code), &report)
            }
            _ => {
                let report = workbench.batch_delete(&ids).await?;
                let message =
                    format!("deleted {} of {}", report.deleted_count, report.total_requested);
                CommandResult::data(name, message, &report)
            }
        },
        RequisitionCommand::Availability { contract_item_id, quantity } => {
            let availability = workbench.availability(contract_item_id).await?;
            let fit = quantity
                .map(|requested| workbench.fit_within(&availability, requested))
                .transpose()?;
            let message = format!(
                "{} of {} remaining on contract item {}",
                availability.remaining_quantity, availability.total_quantity, contract_item_id
            );
            CommandResult::data(name, message, &AvailabilityOutput { availability, fit })
        }
        RequisitionCommand::Specifications { project_id, item_name } => {
            let choice = workbench.specifications(project_id, &item_name).await?;
            let message = format!("{} specification option(s)", choice.options().len());
            CommandResult::data(name, message, &choice)
        }
    };
    Ok(result)
}

/// Reads a JSON payload file for `create`, `edit` and `quote`.
pub fn read_payload<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read payload file `{}`", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("payload file `{}` is not valid", path.display()))
}

/// Wraps a payload file error the way every other input failure is reported.
pub fn invalid_input(command: &str, error: &anyhow::Error) -> CommandResult {
    CommandResult::failure(command, "invalid_input", format!("{error:#}"), EXIT_VALIDATION)
}

fn transition_message(view: &RequisitionView) -> String {
    format!("{} is now {}", view.requisition.request_code, view.requisition.status)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use reqflow_core::domain::payload::NewRequisition;

    use super::read_payload;

    #[test]
    fn create_payload_file_is_parsed() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"project_id": 3, "items": [
                {{"item_type": "main", "contract_item_id": 101, "quantity": "12.5"}},
                {{"item_type": "auxiliary", "item_name": "cable ties", "unit": "bag", "quantity": 4}}
            ]}}"#
        )
        .expect("write payload");

        let new: NewRequisition = read_payload(file.path()).expect("payload should parse");
        assert_eq!(new.project_id.0, 3);
        assert_eq!(new.items.len(), 2);
        assert_eq!(new.items[1].item_name, "cable ties");
    }

    #[test]
    fn unreadable_payload_names_the_file() {
        let error = read_payload::<NewRequisition>(std::path::Path::new("/nonexistent/create.json"))
            .expect_err("missing file should fail");
        assert!(format!("{error:#}").contains("/nonexistent/create.json"));
    }
}
