//! # Error types used by the registries and the execution engine.
//!
//! Two main enums, split by when the failure can occur:
//!
//! - [`RegistryError`]: registration and validation failures, returned
//!   synchronously from registry CRUD.
//! - [`ExecError`]: failures raised while a task or plan executes; the owning
//!   entity is transitioned to `failed` and the cause returned to the caller.
//!
//! Both provide `as_label()` for logs and metrics. [`ControllerError`] is the
//! single error value controller drivers return; the engine wraps it.

use thiserror::Error;

use crate::model::Status;

/// Error value returned by controller drivers.
///
/// Drivers reduce their internal failures to a message; the engine carries it
/// as the cause of a `Controller` or `InvalidMetadata` failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ControllerError {
    pub message: String,
}

impl ControllerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Registration and validation failures.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No entity with the given id.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Entity family: "component", "monitoring", "task", "plan", "controller".
        entity: &'static str,
        id: String,
    },

    /// An entity with the given id already exists.
    #[error("{entity} '{id}' already registered")]
    AlreadyRegistered { entity: &'static str, id: String },

    /// The entity failed structural validation.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// No controller driver is registered for the entity's kind.
    #[error("no controller registered for type '{kind}'")]
    UnknownType { kind: String },

    /// The entity's metadata was rejected by its controller.
    #[error("metadata rejected by controller: {source}")]
    InvalidMetadata { source: ControllerError },

    /// A plan must contain at least one task.
    #[error("plan must contain at least one task")]
    EmptyPlan,

    /// A task depends on an id outside the plan's task set.
    #[error("dependency '{id}' not found")]
    UnknownDependency { id: String },

    /// The dependency graph contains a cycle.
    #[error("cycle detected in dependency graph '{graph}'")]
    CycleDetected { graph: String },

    /// A task could not be placed into any graph.
    #[error("some tasks are not connected to any graph")]
    Disconnected,
}

impl RegistryError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        RegistryError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        RegistryError::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::NotFound { .. } => "registry_not_found",
            RegistryError::AlreadyRegistered { .. } => "registry_already_registered",
            RegistryError::InvalidInput { .. } => "registry_invalid_input",
            RegistryError::UnknownType { .. } => "registry_unknown_type",
            RegistryError::InvalidMetadata { .. } => "registry_invalid_metadata",
            RegistryError::EmptyPlan => "registry_empty_plan",
            RegistryError::UnknownDependency { .. } => "registry_unknown_dependency",
            RegistryError::CycleDetected { .. } => "registry_cycle_detected",
            RegistryError::Disconnected => "registry_disconnected",
        }
    }
}

/// Failures raised while a task or plan executes.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ExecError {
    /// Lookup or validation failed mid-execution.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The plan is already running.
    #[error("plan '{id}' is already running")]
    AlreadyRunning { id: String },

    /// The plan already completed successfully.
    #[error("cannot run already completed plan '{id}'")]
    AlreadyCompleted { id: String },

    /// The requested status transition is not allowed from the current state.
    #[error("illegal state transition {from} -> {to}")]
    IllegalStateTransition { from: Status, to: Status },

    /// A strict dependency has not succeeded.
    #[error("strict dependency '{id}' is '{status}', not 'success'")]
    StrictUnsatisfied { id: String, status: Status },

    /// A blocking dependency did not reach `success` within the configured wait.
    #[error("timed out waiting for blocking dependency '{id}'")]
    BlockingTimeout { id: String },

    /// A blocking dependency reached a terminal status other than `success`.
    #[error("blocking dependency '{id}' ended as '{status}'")]
    BlockingDependencyFailed { id: String, status: Status },

    /// A controller driver reported a failure.
    #[error("controller failed: {source}")]
    Controller { source: ControllerError },

    /// A pre/post check failed.
    #[error("check '{id}' failed: {source}")]
    CheckFailed { id: String, source: ControllerError },

    /// A task graph failed during plan execution.
    #[error("graph '{graph}' failed: {source}")]
    GraphFailed {
        graph: String,
        #[source]
        source: Box<ExecError>,
    },

    /// Both the triggering execution and the subsequent rollback failed.
    #[error("execution failed: {run}; rollback failed: {rollback}")]
    RollbackFailed {
        run: Box<ExecError>,
        rollback: Box<ExecError>,
    },

    /// The plan was stopped before this task could start.
    #[error("plan execution stopped")]
    Stopped,

    /// Several graphs failed; individual causes are preserved in order.
    #[error("{}", fmt_composite(.0))]
    Composite(Vec<ExecError>),
}

impl ExecError {
    /// Short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExecError::Registry(e) => e.as_label(),
            ExecError::AlreadyRunning { .. } => "exec_already_running",
            ExecError::AlreadyCompleted { .. } => "exec_already_completed",
            ExecError::IllegalStateTransition { .. } => "exec_illegal_state_transition",
            ExecError::StrictUnsatisfied { .. } => "exec_strict_unsatisfied",
            ExecError::BlockingTimeout { .. } => "exec_blocking_timeout",
            ExecError::BlockingDependencyFailed { .. } => "exec_blocking_dependency_failed",
            ExecError::Controller { .. } => "exec_controller_failure",
            ExecError::CheckFailed { .. } => "exec_check_failed",
            ExecError::GraphFailed { .. } => "exec_graph_failed",
            ExecError::RollbackFailed { .. } => "exec_rollback_failed",
            ExecError::Stopped => "exec_stopped",
            ExecError::Composite(_) => "exec_composite",
        }
    }

    /// Folds per-graph errors into one value: a single error stays as-is,
    /// several become [`ExecError::Composite`].
    pub fn compose(mut errors: Vec<ExecError>) -> Option<ExecError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(ExecError::Composite(errors)),
        }
    }
}

fn fmt_composite(errors: &[ExecError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_keeps_single_error() {
        let e = ExecError::compose(vec![ExecError::Stopped]).unwrap();
        assert!(matches!(e, ExecError::Stopped));
    }

    #[test]
    fn compose_joins_messages() {
        let e = ExecError::compose(vec![
            ExecError::Stopped,
            ExecError::BlockingTimeout { id: "t1".into() },
        ])
        .unwrap();
        let msg = e.to_string();
        assert!(msg.contains("stopped"));
        assert!(msg.contains("t1"));
    }

    #[test]
    fn registry_errors_pass_through_labels() {
        let e = ExecError::from(RegistryError::EmptyPlan);
        assert_eq!(e.as_label(), "registry_empty_plan");
    }
}
