use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Days, Utc};
use reqflow_client::{InProcessApi, RequisitionView, Workbench};
use reqflow_core::config::{AppConfig, LoadOptions};
use reqflow_core::domain::actor::{Actor, ProjectId, Role};
use reqflow_core::domain::contract::{ContractItemId, ContractLineItem};
use reqflow_core::domain::payload::{
    ApprovalPayload, ApprovalStage, ItemQuote, NewLineItem, NewRequisition, QuotePayload,
};
use reqflow_core::domain::requisition::{Requisition, RequisitionStatus};
use reqflow_core::errors::ErrorKind;
use reqflow_core::service::RequisitionService;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::commands::{CommandResult, EXIT_SMOKE_FAILED};

const PROJECT: i64 = 1;
const CABLE: i64 = 101;
const CABLE_TOTAL: i64 = 100;

const SCENARIO_STEPS: [&str; 11] = [
    "create_requisition",
    "reservation_committed",
    "over_commit_rejected",
    "submit",
    "purchaser_quote",
    "price_visibility",
    "dept_approve",
    "final_approve",
    "history_recorded",
    "rejection_releases_quantity",
    "project_statistics",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

/// Every role's view of one in-memory backend.
struct Desk {
    service: Arc<RequisitionService>,
    auditor: Actor,
    project_manager: Workbench,
    purchaser: Workbench,
    dept_manager: Workbench,
    general_manager: Workbench,
}

impl Desk {
    fn open() -> Self {
        let contracts = [
            ContractLineItem::new(CABLE, PROJECT, "Copper cable", Decimal::from(CABLE_TOTAL))
                .with_specification("YJV 3x95")
                .with_unit("m")
                .with_unit_price(Decimal::new(8650, 2)),
            ContractLineItem::new(102, PROJECT, "Cable tray", Decimal::from(40))
                .with_specification("300x100")
                .with_unit("m"),
        ];
        let service = Arc::new(RequisitionService::in_memory(contracts));
        let project_manager =
            Actor::new(7, "smoke-pm", Role::ProjectManager).managing([PROJECT]);
        let backend = InProcessApi::new(Arc::clone(&service), project_manager.clone());
        let bench =
            |actor: Actor| Workbench::new(Arc::new(backend.acting_as(actor.clone())), actor);

        let general_manager = Actor::new(10, "smoke-gm", Role::GeneralManager);
        Self {
            auditor: general_manager.clone(),
            purchaser: bench(Actor::new(8, "smoke-purchaser", Role::Purchaser)),
            dept_manager: bench(Actor::new(9, "smoke-dept", Role::DeptManager)),
            general_manager: bench(general_manager),
            project_manager: bench(project_manager),
            service,
        }
    }
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    match timed_check(|| AppConfig::load(options.clone())) {
        Ok((elapsed_ms, _config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.extend(SCENARIO_STEPS.into_iter().map(skipped));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "runtime",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.extend(SCENARIO_STEPS.into_iter().map(skipped));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    runtime.block_on(run_scenario(&mut checks));
    for name in SCENARIO_STEPS {
        if !checks.iter().any(|check| check.name == name) {
            checks.push(skipped(name));
        }
    }

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

async fn run_scenario(checks: &mut Vec<SmokeCheck>) {
    let desk = Desk::open();

    let Some(created) = timed_step(checks, "create_requisition", async {
        let view = desk.project_manager.create(&cable_request(60)).await.map_err(describe)?;
        let message = format!("created {} for 60 m of cable", view.requisition.request_code);
        Ok((view.requisition, message))
    })
    .await
    else {
        return;
    };

    let reserved = timed_step(checks, "reservation_committed", async {
        expect_remaining(&desk, 40).await.map(|message| ((), message))
    })
    .await;
    if reserved.is_none() {
        return;
    }

    let rejected = timed_step(checks, "over_commit_rejected", async {
        match desk.project_manager.create(&cable_request(50)).await {
            Err(error) if error.kind() == ErrorKind::Validation => {
                Ok(((), format!("over-commit refused: {error}")))
            }
            Err(error) => Err(format!("expected a validation failure, got {error}")),
            Ok(view) => Err(format!(
                "{} was accepted beyond the remaining quantity",
                view.requisition.request_code
            )),
        }
    })
    .await;
    if rejected.is_none() {
        return;
    }

    let Some(submitted) = timed_step(checks, "submit", async {
        let view = desk.project_manager.submit(&created).await.map_err(describe)?;
        expect_status(view, RequisitionStatus::Submitted)
    })
    .await
    else {
        return;
    };

    let Some(quoted) = timed_step(checks, "purchaser_quote", async {
        let current = desk.purchaser.open(submitted.id).await.map_err(describe)?.requisition;
        let view =
            desk.purchaser.quote(&current, &quote_for(&current)).await.map_err(describe)?;
        let total = view
            .requisition
            .total_amount
            .ok_or_else(|| "quoted requisition carries no total amount".to_string())?;
        let (requisition, _) = expect_status(view, RequisitionStatus::PriceQuoted)?;
        Ok((requisition, format!("priced at {total}")))
    })
    .await
    else {
        return;
    };

    let hidden = timed_step(checks, "price_visibility", async {
        let seen = desk.project_manager.open(quoted.id).await.map_err(describe)?.requisition;
        let leaked = seen.total_amount.is_some()
            || seen
                .items
                .iter()
                .any(|item| item.unit_price.is_some() || item.total_price.is_some());
        if leaked {
            Err("project manager view exposes supplier pricing".to_string())
        } else {
            Ok(((), "prices withheld from the project manager".to_string()))
        }
    })
    .await;
    if hidden.is_none() {
        return;
    }

    let Some(dept_approved) = timed_step(checks, "dept_approve", async {
        let current = desk.dept_manager.open(quoted.id).await.map_err(describe)?.requisition;
        let payload = ApprovalPayload::approve(Some("within the phase budget".to_string()));
        let view = desk
            .dept_manager
            .decide(&current, ApprovalStage::Dept, &payload)
            .await
            .map_err(describe)?;
        expect_status(view, RequisitionStatus::DeptApproved)
    })
    .await
    else {
        return;
    };

    let Some(approved) = timed_step(checks, "final_approve", async {
        let current =
            desk.general_manager.open(dept_approved.id).await.map_err(describe)?.requisition;
        let view = desk
            .general_manager
            .decide(&current, ApprovalStage::Final, &ApprovalPayload::approve(None))
            .await
            .map_err(describe)?;
        expect_status(view, RequisitionStatus::FinalApproved)
    })
    .await
    else {
        return;
    };

    let recorded = timed_step(checks, "history_recorded", async {
        let history = desk.purchaser.open(approved.id).await.map_err(describe)?.history;
        let last = history.last().and_then(|entry| entry.to_status);
        if history.len() == 5 && last == Some(RequisitionStatus::FinalApproved) {
            Ok(((), "creation plus four transitions logged in order".to_string()))
        } else {
            Err(format!("expected 5 log entries ending at final_approved, found {}", history.len()))
        }
    })
    .await;
    if recorded.is_none() {
        return;
    }

    let released = timed_step(checks, "rejection_releases_quantity", async {
        let draft = desk.project_manager.create(&cable_request(40)).await.map_err(describe)?;
        expect_remaining(&desk, 0).await?;
        let submitted =
            desk.project_manager.submit(&draft.requisition).await.map_err(describe)?.requisition;
        let current = desk.purchaser.open(submitted.id).await.map_err(describe)?.requisition;
        let quoted =
            desk.purchaser.quote(&current, &quote_for(&current)).await.map_err(describe)?;
        let current = desk.dept_manager.open(quoted.requisition.id).await.map_err(describe)?;
        let payload = ApprovalPayload::reject("exceeds this phase's cable allowance");
        desk.dept_manager
            .decide(&current.requisition, ApprovalStage::Dept, &payload)
            .await
            .map_err(describe)?;
        expect_remaining(&desk, 40).await.map(|message| ((), message))
    })
    .await;
    if released.is_none() {
        return;
    }

    timed_step(checks, "project_statistics", async {
        let stats = desk
            .service
            .project_statistics(&desk.auditor, ProjectId(PROJECT))
            .await
            .map_err(describe)?;
        let main_amount = Decimal::new(8650, 2) * Decimal::from(60);
        let counted = (stats.total_requests, stats.pending_approval, stats.approved) == (2, 0, 1);
        let summed = stats.main_material_amount == main_amount
            && stats.total_amount == stats.main_material_amount + stats.auxiliary_material_amount;
        if counted && summed {
            let message = format!(
                "approved spend {} over {} requisitions",
                stats.total_amount, stats.total_requests
            );
            Ok(((), message))
        } else {
            Err(format!(
                "expected 2 requests with 1 approved at main amount {main_amount}, found {stats:?}"
            ))
        }
    })
    .await;
}

fn cable_request(quantity: i64) -> NewRequisition {
    NewRequisition {
        project_id: ProjectId(PROJECT),
        required_date: None,
        remarks: Some("smoke scenario".to_string()),
        items: vec![
            NewLineItem::main(CABLE, Decimal::from(quantity)),
            NewLineItem::auxiliary("Cable ties", "bag", Decimal::from(4)),
        ],
    }
}

fn quote_for(requisition: &Requisition) -> QuotePayload {
    let delivery = Utc::now().date_naive().checked_add_days(Days::new(14));
    QuotePayload {
        items: requisition
            .items
            .iter()
            .map(|item| ItemQuote {
                item_id: item.id,
                unit_price: if item.is_main() {
                    Decimal::new(8650, 2)
                } else {
                    Decimal::new(1200, 2)
                },
                supplier_name: Some("Smoke Supply Co".to_string()),
                supplier_contact_person: Some("Dana Lee".to_string()),
                supplier_contact: Some("+1-555-0100".to_string()),
                payment_method: Some("bank transfer".to_string()),
                estimated_delivery: delivery,
            })
            .collect(),
        quote_notes: None,
    }
}

async fn expect_remaining(desk: &Desk, expected: i64) -> Result<String, String> {
    let availability =
        desk.purchaser.availability(ContractItemId(CABLE)).await.map_err(describe)?;
    if availability.remaining_quantity == Decimal::from(expected) {
        Ok(format!("{} of {CABLE_TOTAL} m remaining", availability.remaining_quantity))
    } else {
        Err(format!(
            "expected {expected} m remaining, found {}",
            availability.remaining_quantity
        ))
    }
}

fn expect_status(
    view: RequisitionView,
    expected: RequisitionStatus,
) -> Result<(Requisition, String), String> {
    if view.requisition.status == expected {
        let message = format!("{} is {expected}", view.requisition.request_code);
        Ok((view.requisition, message))
    } else {
        Err(format!("expected {expected}, found {}", view.requisition.status))
    }
}

fn describe(error: reqflow_core::errors::ApplicationError) -> String {
    format!("{} failure: {error}", error.kind().as_str())
}

async fn timed_step<T>(
    checks: &mut Vec<SmokeCheck>,
    name: &'static str,
    step: impl Future<Output = Result<(T, String), String>>,
) -> Option<T> {
    let started = Instant::now();
    let outcome = step.await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok((value, message)) => {
            checks.push(SmokeCheck { name, status: SmokeStatus::Pass, elapsed_ms, message });
            Some(value)
        }
        Err(message) => {
            checks.push(SmokeCheck { name, status: SmokeStatus::Fail, elapsed_ms, message });
            None
        }
    }
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult {
        exit_code: if failed { EXIT_SMOKE_FAILED } else { 0 },
        output: format!("{human}\n{machine}"),
    }
}
