//! # Entity documents shared across the registries.
//!
//! Every entity follows the same shape: identity fields, a kind naming its
//! driver, a string map payload, and optional status/event histories stamped by
//! the owning registry. All types serialize to JSON with `type` as the wire
//! name of `kind`.

mod component;
mod event;
mod monitoring;
mod plan;
mod status;
mod task;

pub use component::Component;
pub use event::{EventLog, EventRecord};
pub use monitoring::{Check, Monitoring};
pub use plan::{ComponentState, Plan, RollbackCheckpoint, TaskGraph};
pub use status::{Status, StatusEntry, StatusHistory};
pub use task::{Depends, DependsKind, Rollback, RollbackKind, Task, TaskKind};
