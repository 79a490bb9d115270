pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use reqflow_core::config::{AppConfig, LoadOptions, LogFormat};
use reqflow_core::domain::actor::{ProjectId, UserId};
use reqflow_core::domain::contract::ContractItemId;
use reqflow_core::domain::payload::{ApprovalPayload, ApprovalStage, ListQuery};
use reqflow_core::domain::requisition::{RequisitionId, RequisitionStatus};
use rust_decimal::Decimal;

use crate::commands::requisition::{self, RequisitionCommand};
use crate::commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "reqflow",
    about = "Reqflow purchase requisition CLI",
    long_about = "Raise, price and approve purchase requisitions against the project backend, \
                  inspect configuration and check readiness.",
    after_help = "Examples:\n  reqflow doctor --json\n  reqflow list --status submitted\n  \
                  reqflow quote 42 --file quote.json\n  reqflow approve 42 --stage dept"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file to load instead of reqflow.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StageArg {
    Dept,
    Final,
}

impl From<StageArg> for ApprovalStage {
    fn from(value: StageArg) -> Self {
        match value {
            StageArg::Dept => Self::Dept,
            StageArg::Final => Self::Final,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, identity and backend reachability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run the full requisition workflow in-process with per-check timing")]
    Smoke,
    #[command(about = "List requisitions visible to the configured identity")]
    List {
        #[arg(long)]
        project: Option<i64>,
        #[arg(long)]
        status: Option<RequisitionStatus>,
        #[arg(long)]
        requester: Option<i64>,
        #[arg(long, help = "Substring of the request code or approval notes")]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = ListQuery::DEFAULT_SIZE)]
        size: u32,
    },
    #[command(about = "Show one requisition with the actions available to you")]
    Show { id: i64 },
    #[command(about = "Show the workflow log of a requisition")]
    History { id: i64 },
    #[command(about = "Raise a requisition from a JSON payload file")]
    Create {
        #[arg(long)]
        file: PathBuf,
    },
    #[command(about = "Replace the lines of a draft from a JSON payload file")]
    Edit {
        id: i64,
        #[arg(long)]
        file: PathBuf,
    },
    #[command(about = "Submit a draft for pricing")]
    Submit { id: i64 },
    #[command(about = "Price a submitted requisition from a JSON quote file")]
    Quote {
        id: i64,
        #[arg(long)]
        file: PathBuf,
    },
    #[command(about = "Send a requisition back one step with a reason")]
    Return {
        id: i64,
        #[arg(long)]
        reason: String,
    },
    #[command(about = "Approve a priced requisition at the given stage")]
    Approve {
        id: i64,
        #[arg(long, value_enum)]
        stage: StageArg,
        #[arg(long)]
        notes: Option<String>,
    },
    #[command(about = "Reject a requisition at the given stage; a note is required")]
    Reject {
        id: i64,
        #[arg(long, value_enum)]
        stage: StageArg,
        #[arg(long)]
        notes: String,
    },
    #[command(about = "Delete one draft, or several requisitions in one batch")]
    Delete {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<i64>,
    },
    #[command(about = "Show remaining contract quantity, optionally fitting a requested amount")]
    Availability {
        contract_item_id: i64,
        #[arg(long)]
        quantity: Option<Decimal>,
    },
    #[command(about = "List contract specifications for a material under a project")]
    Specs {
        #[arg(long)]
        project: i64,
        #[arg(long)]
        item_name: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions { config_path: cli.config, ..LoadOptions::default() };
    init_logging(&options);

    let result = match cli.command {
        Command::Config => CommandResult { exit_code: 0, output: commands::config::run(&options) },
        Command::Doctor { json } => commands::doctor::run(json, &options),
        Command::Smoke => commands::smoke::run(&options),
        command => match requisition_command(command) {
            Ok(request) => requisition::run(&options, request),
            Err(result) => result,
        },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn requisition_command(command: Command) -> Result<RequisitionCommand, CommandResult> {
    let request = match command {
        Command::List { project, status, requester, search, page, size } => {
            RequisitionCommand::List(ListQuery {
                project_id: project.map(ProjectId),
                status,
                requester_id: requester.map(UserId),
                search,
                page,
                size,
            })
        }
        Command::Show { id } => RequisitionCommand::Show(RequisitionId(id)),
        Command::History { id } => RequisitionCommand::History(RequisitionId(id)),
        Command::Create { file } => RequisitionCommand::Create(
            requisition::read_payload(&file)
                .map_err(|error| requisition::invalid_input("create", &error))?,
        ),
        Command::Edit { id, file } => RequisitionCommand::Edit {
            id: RequisitionId(id),
            payload: requisition::read_payload(&file)
                .map_err(|error| requisition::invalid_input("edit", &error))?,
        },
        Command::Submit { id } => RequisitionCommand::Submit(RequisitionId(id)),
        Command::Quote { id, file } => RequisitionCommand::Quote {
            id: RequisitionId(id),
            payload: requisition::read_payload(&file)
                .map_err(|error| requisition::invalid_input("quote", &error))?,
        },
        Command::Return { id, reason } => {
            RequisitionCommand::Return { id: RequisitionId(id), reason }
        }
        Command::Approve { id, stage, notes } => RequisitionCommand::Decide {
            id: RequisitionId(id),
            stage: stage.into(),
            payload: ApprovalPayload::approve(notes),
        },
        Command::Reject { id, stage, notes } => RequisitionCommand::Decide {
            id: RequisitionId(id),
            stage: stage.into(),
            payload: ApprovalPayload::reject(notes),
        },
        Command::Delete { ids } => {
            RequisitionCommand::Delete(ids.into_iter().map(RequisitionId).collect())
        }
        Command::Availability { contract_item_id, quantity } => RequisitionCommand::Availability {
            contract_item_id: ContractItemId(contract_item_id),
            quantity,
        },
        Command::Specs { project, item_name } => {
            RequisitionCommand::Specifications { project_id: ProjectId(project), item_name }
        }
        Command::Config | Command::Doctor { .. } | Command::Smoke => {
            return Err(CommandResult::failure(
                "unknown",
                "usage",
                "not a requisition command",
                commands::EXIT_VALIDATION,
            ))
        }
    };
    Ok(request)
}

/// Logs go to stderr so command output on stdout stays parseable.
fn init_logging(options: &LoadOptions) {
    use tracing_subscriber::EnvFilter;

    let (level, format) = match AppConfig::load(options.clone()) {
        Ok(config) => (config.logging.level, config.logging.format),
        Err(_) => ("warn".to_string(), LogFormat::Compact),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
