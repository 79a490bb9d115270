pub mod engine;
pub mod history;
pub mod table;

pub use engine::{
    RequisitionWorkflow, TransitionError, TransitionOutcome, WorkflowDefinition, WorkflowEngine,
    WorkflowPosition,
};
pub use history::{WorkflowHistory, WorkflowLogEntry};
pub use table::{available_actions, rule_for, step_for, TransitionRule, WorkflowAction, RULES};
