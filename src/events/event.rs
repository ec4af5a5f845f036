//! # Runtime events emitted by the registries.
//!
//! [`RuntimeEventKind`] classifies what happened; [`RuntimeEvent`] carries the
//! entity ids, the execution id, and an optional error message. Async variants
//! (`fork_async`, `run_async`, `roll_back_async`) surface their failures here
//! and in the entity event log; nothing else reads the bus.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically, so subscribers can re-order events delivered through async
//! channels.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use chrono::{DateTime, Utc};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEventKind {
    // === Task lifecycle ===
    /// A task entered its fork state machine.
    TaskStarting,
    /// A task reached `success`.
    TaskSucceeded,
    /// A task reached `failed`.
    TaskFailed,
    /// A task's rollback spec was applied.
    TaskRolledBack,

    // === Plan lifecycle ===
    /// A plan transitioned to `running`.
    PlanStarted,
    /// A plan completed with `success`.
    PlanSucceeded,
    /// A plan completed with `failed`.
    PlanFailed,
    /// A plan was stopped by the caller.
    PlanStopped,
    /// A plan was paused by the caller.
    PlanPaused,
    /// A graph rollback began after a task failure.
    RollbackStarted,
}

/// Runtime event with optional correlation metadata.
#[derive(Debug, Clone)]
pub struct RuntimeEvent {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: DateTime<Utc>,
    /// The kind of event.
    pub kind: RuntimeEventKind,
    /// Task id, if the event concerns a task.
    pub task: Option<String>,
    /// Plan id, if the event concerns a plan.
    pub plan: Option<String>,
    /// Execution id threading through one `fork`/`run` invocation.
    pub execution: Option<String>,
    /// Error message, if the event represents a failure.
    pub error: Option<String>,
}

impl RuntimeEvent {
    /// Creates a new event of the given kind with the next sequence number.
    pub fn now(kind: RuntimeEventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: Utc::now(),
            kind,
            task: None,
            plan: None,
            execution: None,
            error: None,
        }
    }

    /// Attaches a task id.
    pub fn with_task(mut self, id: impl Into<String>) -> Self {
        self.task = Some(id.into());
        self
    }

    /// Attaches a plan id.
    pub fn with_plan(mut self, id: impl Into<String>) -> Self {
        self.plan = Some(id.into());
        self
    }

    /// Attaches an execution id.
    pub fn with_execution(mut self, id: impl Into<String>) -> Self {
        self.execution = Some(id.into());
        self
    }

    /// Attaches an error message.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = RuntimeEvent::now(RuntimeEventKind::TaskStarting);
        let b = RuntimeEvent::now(RuntimeEventKind::TaskSucceeded);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builders_attach_metadata() {
        let ev = RuntimeEvent::now(RuntimeEventKind::PlanFailed)
            .with_plan("p1")
            .with_execution("e1")
            .with_error("boom");
        assert_eq!(ev.plan.as_deref(), Some("p1"));
        assert_eq!(ev.execution.as_deref(), Some("e1"));
        assert_eq!(ev.error.as_deref(), Some("boom"));
    }
}
