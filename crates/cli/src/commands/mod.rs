pub mod config;
pub mod doctor;
pub mod requisition;
pub mod smoke;

use std::future::Future;

use reqflow_core::errors::{ApplicationError, ErrorKind};
use serde::Serialize;
use serde_json::Value;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_CONNECTIVITY: u8 = 4;
pub const EXIT_VALIDATION: u8 = 5;
pub const EXIT_SMOKE_FAILED: u8 = 6;
pub const EXIT_AUTHORIZATION: u8 = 7;
pub const EXIT_CONFLICT: u8 = 8;
pub const EXIT_NOT_FOUND: u8 = 9;
pub const EXIT_INTERNAL: u8 = 10;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::with_data(command, message, None)
    }

    pub fn data(command: &str, message: impl Into<String>, data: &impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self::with_data(command, message, Some(value)),
            Err(error) => Self::failure(
                command,
                "serialization",
                format!("could not encode command output: {error}"),
                EXIT_INTERNAL,
            ),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Failure classified by error kind. Validation failures carry their per-field issues.
    pub fn from_error(command: &str, error: &ApplicationError) -> Self {
        let kind = error.kind();
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(kind.as_str().to_string()),
            message: error.to_string(),
            data: error
                .validation_issues()
                .and_then(|errors| serde_json::to_value(&errors.issues).ok()),
        };
        Self { exit_code: exit_code_for(kind), output: serialize_payload(payload) }
    }

    fn with_data(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }
}

pub fn exit_code_for(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Validation => EXIT_VALIDATION,
        ErrorKind::Authorization => EXIT_AUTHORIZATION,
        ErrorKind::Conflict => EXIT_CONFLICT,
        ErrorKind::NotFound => EXIT_NOT_FOUND,
        ErrorKind::Connectivity => EXIT_CONNECTIVITY,
        ErrorKind::Internal => EXIT_INTERNAL,
    }
}

/// Drives one command's async work to completion on a dedicated current-thread runtime.
pub(crate) fn block_on<F: Future>(command: &str, future: F) -> Result<F::Output, CommandResult> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
        |error| {
            CommandResult::failure(
                command,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            )
        },
    )?;
    Ok(runtime.block_on(future))
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
