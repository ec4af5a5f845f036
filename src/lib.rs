//! # planvisor
//!
//! **Planvisor** is a plan-and-task orchestration engine.
//!
//! Operators register controller drivers, components typed by those drivers,
//! tasks that apply updates/checks/rollbacks to components, and plans that
//! assemble tasks into dependency-constrained graphs. The engine compiles each
//! plan into disjoint DAGs, executes the graphs concurrently in topological
//! order, runs optional pre/post monitoring checks, and rolls back completed
//! predecessors from per-task checkpoints when a task fails.
//!
//! ## Features
//!
//! | Area               | Description                                                        | Key types / traits                          |
//! |--------------------|--------------------------------------------------------------------|---------------------------------------------|
//! | **Controllers**    | Pluggable drivers validating metadata and executing task actions.  | [`Controller`], [`MonitoringController`]    |
//! | **Registries**     | CRUD over components, monitorings, tasks, and plans.               | [`ComponentRegistry`], [`PlanRegistry`], …  |
//! | **Execution**      | Task state machine with dependency kinds and checks.               | [`TaskRegistry::fork`], [`PlanRegistry::run`] |
//! | **Rollback**       | Checkpoint stack and reverse-order graph rollback.                 | [`RollbackCheckpoint`]                      |
//! | **Histories**      | Snapshot-appending status history, append-only event log.          | [`StatusHistory`], [`EventLog`]             |
//! | **Events**         | Broadcast bus for runtime lifecycle events.                        | [`Bus`], [`RuntimeEvent`]                   |
//! | **Errors**         | Typed registration and execution errors.                           | [`RegistryError`], [`ExecError`]            |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use planvisor::{
//!     Component, Config, Controller, ControllerError, Engine, Metadata, Task, TaskKind,
//! };
//!
//! struct ClusterController;
//!
//! #[async_trait]
//! impl Controller for ClusterController {
//!     async fn validate_component(&self, _meta: &Metadata) -> Result<(), ControllerError> {
//!         Ok(())
//!     }
//!     async fn check_component(&self, _meta: &Metadata) -> Result<(), ControllerError> {
//!         Ok(())
//!     }
//!     async fn validate_task(&self, _meta: &Metadata) -> Result<(), ControllerError> {
//!         Ok(())
//!     }
//!     async fn run_task(
//!         &self,
//!         _task_meta: &Metadata,
//!         _component_meta: &Metadata,
//!     ) -> Result<(), ControllerError> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::new(Config::default());
//!     engine
//!         .controllers
//!         .register("cluster", Arc::new(ClusterController))
//!         .await?;
//!
//!     engine
//!         .components
//!         .register(Component::new("api", "api-server", "cluster", "1.0.0"))
//!         .await?;
//!
//!     let plan = engine
//!         .plans
//!         .register(vec![Task::new("deploy", TaskKind::Update, vec!["api".into()])])
//!         .await?;
//!
//!     engine.plans.run(&plan.id, None).await?;
//!     Ok(())
//! }
//! ```
//!
//! ---

mod config;
mod controller;
mod engine;
mod error;
mod events;
pub mod model;
pub mod registry;

#[cfg(feature = "logging")]
mod logging;

/// String-map payload attached to components, monitorings, checks, and tasks.
pub type Metadata = std::collections::HashMap<String, String>;

// ---- Public re-exports ----

pub use config::Config;
pub use controller::{Controller, ControllerRef, MonitoringController, MonitoringControllerRef};
pub use engine::{Engine, EngineBuilder};
pub use error::{ControllerError, ExecError, RegistryError};
pub use events::{Bus, RuntimeEvent, RuntimeEventKind};
pub use model::{
    Check, Component, ComponentState, Depends, DependsKind, EventLog, EventRecord, Monitoring,
    Plan, Rollback, RollbackCheckpoint, RollbackKind, Status, StatusEntry, StatusHistory, Task,
    TaskGraph, TaskKind,
};
pub use registry::{
    ComponentField, ComponentRegistry, ControllerRegistry, DriverRegistry, MonitoringControllerRegistry,
    MonitoringField, MonitoringRegistry, PlanRegistry, TaskRegistry,
};

// Optional: expose the simple stdout log subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use logging::LogWriter;
