use std::env;
use std::io::Write;
use std::sync::{Arc, Mutex, OnceLock};

use reqflow_cli::commands::requisition::{self, RequisitionCommand};
use reqflow_cli::commands::{config, doctor, smoke};
use reqflow_client::{InProcessApi, Workbench};
use reqflow_core::config::LoadOptions;
use reqflow_core::domain::actor::{Actor, ProjectId, Role};
use reqflow_core::domain::contract::{ContractItemId, ContractLineItem};
use reqflow_core::domain::payload::{ListQuery, NewLineItem, NewRequisition};
use reqflow_core::domain::requisition::RequisitionId;
use reqflow_core::service::RequisitionService;
use rust_decimal::Decimal;
use serde_json::Value;

#[test]
fn smoke_returns_success_report_with_default_env() {
    with_env(&[], || {
        let result = smoke::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0, "expected successful smoke report: {}", result.output);

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "pass");
        let checks = payload["checks"].as_array().cloned().unwrap_or_default();
        assert_eq!(checks.len(), 12);
        assert_eq!(checks[11]["name"], "project_statistics");
        assert!(checks.iter().all(|check| check["status"] == "pass"));
    });
}

#[test]
fn smoke_returns_failure_when_config_invalid() {
    with_env(&[("REQFLOW_API_BASE_URL", "ftp://erp.example.test")], || {
        let result = smoke::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 6, "expected smoke failure code");

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
    });
}

#[test]
fn config_redacts_api_token() {
    with_env(&[("REQFLOW_API_TOKEN", "tok-very-secret")], || {
        let output = config::run(&LoadOptions::default());
        assert!(!output.contains("tok-very-secret"));
        assert!(output
            .contains("- api.token = <redacted> (source: env (REQFLOW_API_TOKEN))"));
        assert!(output.contains("- api.timeout_secs = 30 (source: default)"));
    });
}

#[test]
fn config_attributes_file_values_and_log_aliases() {
    let mut file = tempfile::NamedTempFile::new().expect("temp config file");
    write!(file, "[identity]\nuser_id = 8\nrole = \"purchaser\"\n").expect("write config");

    with_env(&[("REQFLOW_LOG_LEVEL", "debug")], || {
        let options =
            LoadOptions { config_path: Some(file.path().to_path_buf()), ..Default::default() };
        let output = config::run(&options);

        let expected_file = format!("(source: file ({}))", file.path().display());
        assert!(output.contains(&format!("- identity.role = purchaser {expected_file}")));
        assert!(output.contains(&format!("- identity.user_id = 8 {expected_file}")));
        assert!(output.contains("- logging.level = debug (source: env (REQFLOW_LOG_LEVEL))"));
        assert!(output.contains("- identity.managed_projects = <unset> (source: default)"));
    });
}

#[test]
fn doctor_reports_missing_identity_as_config_failure() {
    with_env(&[("REQFLOW_API_BASE_URL", "http://127.0.0.1:1/api/v1")], || {
        let result = doctor::run(true, &LoadOptions::default());
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["name"], "config_validation");
        assert_eq!(payload["checks"][0]["status"], "pass");
        assert_eq!(payload["checks"][1]["name"], "identity");
        assert_eq!(payload["checks"][1]["status"], "fail");
        assert_eq!(payload["checks"][2]["name"], "backend_connectivity");
        assert_eq!(payload["checks"][2]["status"], "fail");
    });
}

#[test]
fn doctor_reports_unreachable_backend_as_connectivity_failure() {
    with_env(
        &[
            ("REQFLOW_API_BASE_URL", "http://127.0.0.1:1/api/v1"),
            ("REQFLOW_IDENTITY_USER_ID", "8"),
            ("REQFLOW_IDENTITY_ROLE", "purchaser"),
        ],
        || {
            let result = doctor::run(false, &LoadOptions::default());
            assert_eq!(result.exit_code, 4);
            assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
            assert!(result.output.contains("- [ok] identity: acting as"));
            assert!(result.output.contains("- [fail] backend_connectivity: disconnected"));
        },
    );
}

#[test]
fn remote_command_without_identity_fails_before_any_request() {
    with_env(&[], || {
        let result =
            requisition::run(&LoadOptions::default(), RequisitionCommand::Show(RequisitionId(1)));
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "show");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[tokio::test]
async fn requisition_commands_run_the_workflow_and_classify_failures() {
    let service = Arc::new(RequisitionService::in_memory([ContractLineItem::new(
        101,
        3,
        "Copper cable",
        Decimal::from(100),
    )
    .with_unit("m")]));
    let pm = Actor::new(7, "pm", Role::ProjectManager).managing([3]);
    let backend = InProcessApi::new(Arc::clone(&service), pm.clone());
    let pm_bench = Workbench::new(Arc::new(backend.acting_as(pm.clone())), pm);
    let purchaser = Actor::new(8, "buyer", Role::Purchaser);
    let purchaser_bench =
        Workbench::new(Arc::new(backend.acting_as(purchaser.clone())), purchaser);

    let created = requisition::execute(
        &pm_bench,
        RequisitionCommand::Create(new_requisition(20)),
    )
    .await;
    assert_eq!(created.exit_code, 0, "{}", created.output);
    let created = parse_payload(&created.output);
    let id = created["data"]["requisition"]["id"].as_i64().unwrap_or_default();
    assert_eq!(created["data"]["available_actions"], serde_json::json!(["submit"]));

    let edited = requisition::execute(
        &pm_bench,
        RequisitionCommand::Edit { id: RequisitionId(id), payload: new_requisition(30) },
    )
    .await;
    assert_eq!(edited.exit_code, 0, "{}", edited.output);
    let edited = parse_payload(&edited.output);
    assert_eq!(edited["data"]["requisition"]["items"][0]["quantity"], "30");
    assert_eq!(edited["data"]["history"][1]["operation"], "update");

    let wrong_role =
        requisition::execute(&purchaser_bench, RequisitionCommand::Submit(RequisitionId(id)))
            .await;
    assert_eq!(wrong_role.exit_code, 7, "{}", wrong_role.output);
    assert_eq!(parse_payload(&wrong_role.output)["error_class"], "authorization");

    let submitted =
        requisition::execute(&pm_bench, RequisitionCommand::Submit(RequisitionId(id))).await;
    assert_eq!(submitted.exit_code, 0, "{}", submitted.output);
    assert_eq!(parse_payload(&submitted.output)["data"]["requisition"]["status"], "submitted");

    let not_draft =
        requisition::execute(&pm_bench, RequisitionCommand::Delete(vec![RequisitionId(id)])).await;
    assert_eq!(not_draft.exit_code, 8);
    assert_eq!(parse_payload(&not_draft.output)["error_class"], "conflict");

    let late_edit = requisition::execute(
        &pm_bench,
        RequisitionCommand::Edit { id: RequisitionId(id), payload: new_requisition(10) },
    )
    .await;
    assert_eq!(late_edit.exit_code, 8, "{}", late_edit.output);

    let availability = requisition::execute(
        &purchaser_bench,
        RequisitionCommand::Availability {
            contract_item_id: ContractItemId(101),
            quantity: Some(Decimal::from(90)),
        },
    )
    .await;
    let availability = parse_payload(&availability.output);
    assert_eq!(availability["data"]["fit"]["kind"], "adjusted");
    assert_eq!(availability["data"]["fit"]["quantity"], "70");

    let listed =
        requisition::execute(&purchaser_bench, RequisitionCommand::List(ListQuery::default()))
            .await;
    assert_eq!(parse_payload(&listed.output)["data"]["total"], 1);

    let missing =
        requisition::execute(&pm_bench, RequisitionCommand::Show(RequisitionId(9_999))).await;
    assert_eq!(missing.exit_code, 9);
}

fn new_requisition(quantity: i64) -> NewRequisition {
    NewRequisition {
        project_id: ProjectId(3),
        required_date: None,
        remarks: None,
        items: vec![NewLineItem::main(101, Decimal::from(quantity))],
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "REQFLOW_API_BASE_URL",
        "REQFLOW_API_TOKEN",
        "REQFLOW_API_TIMEOUT_SECS",
        "REQFLOW_CONNECTIVITY_HEALTH_PATH",
        "REQFLOW_CONNECTIVITY_INTERVAL_SECS",
        "REQFLOW_CONNECTIVITY_TIMEOUT_SECS",
        "REQFLOW_IDENTITY_USER_ID",
        "REQFLOW_IDENTITY_NAME",
        "REQFLOW_IDENTITY_ROLE",
        "REQFLOW_IDENTITY_MANAGED_PROJECTS",
        "REQFLOW_LOGGING_LEVEL",
        "REQFLOW_LOGGING_FORMAT",
        "REQFLOW_LOG_LEVEL",
        "REQFLOW_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
