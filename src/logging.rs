//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints runtime events to stdout in a human-readable format.
//! Enabled via the `logging` feature; implement your own bus subscriber for
//! structured logging or metrics collection.
//!
//! ## Output format
//! ```text
//! [task-starting] task=t1 execution=e1
//! [task-failed] task=t1 err="controller failed: boom"
//! [plan-started] plan=p1 execution=e1
//! [rollback-started] plan=p1 task=t2
//! ```

use crate::events::{Bus, RuntimeEvent, RuntimeEventKind};

/// Stdout logging subscriber.
pub struct LogWriter;

impl LogWriter {
    /// Spawns a listener printing every bus event until the bus closes.
    pub fn attach(bus: &Bus) {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            while let Ok(ev) = rx.recv().await {
                Self::print(&ev);
            }
        });
    }

    fn print(e: &RuntimeEvent) {
        match e.kind {
            RuntimeEventKind::TaskStarting => {
                println!(
                    "[task-starting] task={:?} execution={:?}",
                    e.task, e.execution
                );
            }
            RuntimeEventKind::TaskSucceeded => {
                println!("[task-succeeded] task={:?}", e.task);
            }
            RuntimeEventKind::TaskFailed => {
                println!("[task-failed] task={:?} err={:?}", e.task, e.error);
            }
            RuntimeEventKind::TaskRolledBack => {
                println!("[task-rolled-back] task={:?}", e.task);
            }
            RuntimeEventKind::PlanStarted => {
                println!("[plan-started] plan={:?} execution={:?}", e.plan, e.execution);
            }
            RuntimeEventKind::PlanSucceeded => {
                println!("[plan-succeeded] plan={:?}", e.plan);
            }
            RuntimeEventKind::PlanFailed => {
                println!("[plan-failed] plan={:?} err={:?}", e.plan, e.error);
            }
            RuntimeEventKind::PlanStopped => {
                println!("[plan-stopped] plan={:?}", e.plan);
            }
            RuntimeEventKind::PlanPaused => {
                println!("[plan-paused] plan={:?}", e.plan);
            }
            RuntimeEventKind::RollbackStarted => {
                println!("[rollback-started] plan={:?} task={:?}", e.plan, e.task);
            }
        }
    }
}
