//! # Task registry: CRUD plus the fork state machine.
//!
//! `fork` drives a task from `pending` through `running` to `success` or
//! `failed`, resolving dependencies, running pre/post checks, and invoking the
//! controller of every referenced component.
//!
//! ## Fork flow
//! ```text
//! fork(task_id, execution_id)
//!   ├─► pending, "Checking task!" / "Fork task!"
//!   ├─► track execution id (until exit)
//!   ├─► resolve depends_on:
//!   │     strict   → error unless dependency is already success
//!   │     ordered  → fork the dependency first
//!   │     blocking → wait on the dependency's status channel
//!   │     advisory → ignore
//!   ├─► running, "Running task!"
//!   ├─► pre-checks (monitoring controllers)
//!   ├─► run_task on each component's controller
//!   ├─► success, "Success task!"
//!   └─► post-checks
//! ```
//!
//! ## Rules
//! - Any failure transitions the task to `failed`, records the cause in its
//!   event log, and returns the error.
//! - `fork_async` surfaces failures through the event log and the bus only.
//! - Re-forking a completed task is allowed; semantic idempotence is the
//!   caller's concern.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::{ExecError, RegistryError};
use crate::events::{Bus, RuntimeEvent, RuntimeEventKind};
use crate::model::{
    Check, Depends, DependsKind, EventLog, Rollback, Status, StatusHistory, Task, TaskKind,
};
use crate::registry::{
    ComponentRegistry, ControllerRegistry, MonitoringControllerRegistry, MonitoringRegistry,
    lock, new_id, read, write,
};
use crate::Metadata;

/// Mutable payload of a task slot.
struct TaskData {
    name: String,
    kind: TaskKind,
    components: Vec<String>,
    roll_back: Option<Rollback>,
    depends_on: Vec<Depends>,
    pre_checks: Vec<Check>,
    post_checks: Vec<Check>,
    metadata: Metadata,
}

/// Registry slot: payload, histories, and the status channel used by
/// `blocking` dependency waits.
struct TaskSlot {
    id: String,
    data: StdRwLock<TaskData>,
    status: StdRwLock<StatusHistory>,
    status_tx: watch::Sender<Status>,
    events: EventLog,
}

impl TaskSlot {
    fn snapshot(&self) -> Task {
        let data = read(&self.data);
        Task {
            id: self.id.clone(),
            name: data.name.clone(),
            kind: data.kind,
            components: data.components.clone(),
            roll_back: data.roll_back.clone(),
            depends_on: data.depends_on.clone(),
            pre_checks: data.pre_checks.clone(),
            post_checks: data.post_checks.clone(),
            metadata: data.metadata.clone(),
            status_history: Some(read(&self.status).clone()),
            event_history: Some(self.events.clone()),
        }
    }

    fn current_status(&self) -> Status {
        read(&self.status).status()
    }
}

/// CRUD, validation, and execution of tasks.
pub struct TaskRegistry {
    tasks: tokio::sync::RwLock<HashMap<String, Arc<TaskSlot>>>,
    components: Arc<ComponentRegistry>,
    controllers: Arc<ControllerRegistry>,
    monitorings: Arc<MonitoringRegistry>,
    monitor_controllers: Arc<MonitoringControllerRegistry>,
    /// Live executions: execution id to task id.
    executions: StdMutex<HashMap<String, String>>,
    bus: Bus,
    config: Config,
}

impl TaskRegistry {
    pub fn new(
        components: Arc<ComponentRegistry>,
        controllers: Arc<ControllerRegistry>,
        monitorings: Arc<MonitoringRegistry>,
        monitor_controllers: Arc<MonitoringControllerRegistry>,
        bus: Bus,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            tasks: tokio::sync::RwLock::new(HashMap::new()),
            components,
            controllers,
            monitorings,
            monitor_controllers,
            executions: StdMutex::new(HashMap::new()),
            bus,
            config,
        })
    }

    /// Structural validation of a task against the other registries.
    ///
    /// # Errors
    /// - `InvalidInput` when `components` is empty or the rollback spec is
    ///   inconsistent
    /// - `NotFound` when a component, monitoring, or dependency id does not
    ///   resolve
    pub async fn validate(&self, task: &Task) -> Result<(), RegistryError> {
        self.validate_with(task, &[]).await
    }

    /// Validation where dependency ids may also come from `batch`: the ids of
    /// a plan's task set being registered together.
    async fn validate_with(&self, task: &Task, batch: &[String]) -> Result<(), RegistryError> {
        if task.components.is_empty() {
            return Err(RegistryError::invalid_input("components list is empty"));
        }

        if let Some(roll_back) = &task.roll_back {
            if roll_back.components.is_some() != roll_back.metadata.is_some() {
                return Err(RegistryError::invalid_input(
                    "rollback components and metadata must be either both set or both unset",
                ));
            }
        }

        for component_id in &task.components {
            self.components.get(component_id).await?;
        }

        for check in &task.pre_checks {
            self.monitorings.get(&check.monitoring_id).await?;
        }

        let tasks = self.tasks.read().await;
        for depends in &task.depends_on {
            if !tasks.contains_key(&depends.id) && !batch.contains(&depends.id) {
                return Err(RegistryError::not_found("task", &depends.id));
            }
        }
        Ok(())
    }

    /// Validates and stores a task, stamping status `created` and a
    /// `"Created task!"` event. Returns the stored value.
    pub async fn register(&self, mut task: Task) -> Result<Task, RegistryError> {
        if task.id.is_empty() {
            task.id = new_id();
        }
        debug!(id = %task.id, "registering task");

        if self.tasks.read().await.contains_key(&task.id) {
            return Err(RegistryError::AlreadyRegistered {
                entity: "task",
                id: task.id,
            });
        }
        self.validate(&task).await?;

        let (status_tx, _) = watch::channel(Status::Created);
        let slot = Arc::new(TaskSlot {
            id: task.id.clone(),
            data: StdRwLock::new(TaskData {
                name: task.name,
                kind: task.kind,
                components: task.components,
                roll_back: task.roll_back,
                depends_on: task.depends_on,
                pre_checks: task.pre_checks,
                post_checks: task.post_checks,
                metadata: task.metadata,
            }),
            status: StdRwLock::new(StatusHistory::new(Status::Created)),
            status_tx,
            events: EventLog::new(),
        });
        slot.events.record("Created task!");

        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&slot.id) {
            return Err(RegistryError::AlreadyRegistered {
                entity: "task",
                id: slot.id.clone(),
            });
        }
        let stored = slot.snapshot();
        tasks.insert(slot.id.clone(), slot);
        Ok(stored)
    }

    /// Registers a plan's task set together: dependency ids may reference
    /// other tasks of the same batch, which are not registered yet.
    ///
    /// Every task is validated before any is stored, so a rejected batch
    /// leaves the registry untouched.
    pub async fn register_batch(&self, mut tasks: Vec<Task>) -> Result<Vec<Task>, RegistryError> {
        for task in &mut tasks {
            if task.id.is_empty() {
                task.id = new_id();
            }
        }

        {
            let existing = self.tasks.read().await;
            let mut seen: Vec<&str> = Vec::with_capacity(tasks.len());
            for task in &tasks {
                if existing.contains_key(&task.id) || seen.contains(&task.id.as_str()) {
                    return Err(RegistryError::AlreadyRegistered {
                        entity: "task",
                        id: task.id.clone(),
                    });
                }
                seen.push(&task.id);
            }
        }

        let batch_ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        for task in &tasks {
            self.validate_with(task, &batch_ids).await?;
        }

        let mut slots = Vec::with_capacity(tasks.len());
        for task in tasks {
            let (status_tx, _) = watch::channel(Status::Created);
            let slot = Arc::new(TaskSlot {
                id: task.id.clone(),
                data: StdRwLock::new(TaskData {
                    name: task.name,
                    kind: task.kind,
                    components: task.components,
                    roll_back: task.roll_back,
                    depends_on: task.depends_on,
                    pre_checks: task.pre_checks,
                    post_checks: task.post_checks,
                    metadata: task.metadata,
                }),
                status: StdRwLock::new(StatusHistory::new(Status::Created)),
                status_tx,
                events: EventLog::new(),
            });
            slot.events.record("Created task!");
            slots.push(slot);
        }

        let mut map = self.tasks.write().await;
        for slot in &slots {
            if map.contains_key(&slot.id) {
                return Err(RegistryError::AlreadyRegistered {
                    entity: "task",
                    id: slot.id.clone(),
                });
            }
        }
        let stored = slots.iter().map(|slot| slot.snapshot()).collect();
        for slot in slots {
            map.insert(slot.id.clone(), slot);
        }
        Ok(stored)
    }

    /// Returns a snapshot of the task with `id`.
    pub async fn get(&self, id: &str) -> Result<Task, RegistryError> {
        self.slot(id).await.map(|s| s.snapshot())
    }

    /// Copies the non-empty fields of `updated` onto the existing task;
    /// status and event histories are preserved.
    pub async fn update(&self, id: &str, updated: Task) -> Result<(), RegistryError> {
        let slot = self.slot(id).await?;
        let mut data = write(&slot.data);
        if !updated.name.is_empty() {
            data.name = updated.name;
        }
        data.kind = updated.kind;
        if !updated.components.is_empty() {
            data.components = updated.components;
        }
        if !updated.metadata.is_empty() {
            data.metadata = updated.metadata;
        }
        if !updated.depends_on.is_empty() {
            data.depends_on = updated.depends_on;
        }
        if !updated.pre_checks.is_empty() {
            data.pre_checks = updated.pre_checks;
        }
        if !updated.post_checks.is_empty() {
            data.post_checks = updated.post_checks;
        }
        if updated.roll_back.is_some() {
            data.roll_back = updated.roll_back;
        }
        Ok(())
    }

    /// Removes the task with `id`.
    pub async fn delete(&self, id: &str) -> Result<(), RegistryError> {
        let mut tasks = self.tasks.write().await;
        tasks
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RegistryError::not_found("task", id))
    }

    /// Snapshot of all tasks, order unspecified.
    pub async fn list(&self) -> Vec<Task> {
        self.tasks
            .read()
            .await
            .values()
            .map(|slot| slot.snapshot())
            .collect()
    }

    /// Current status of the task with `id`.
    pub async fn status(&self, id: &str) -> Result<Status, RegistryError> {
        Ok(self.slot(id).await?.current_status())
    }

    /// Execution ids currently inside `fork`, with the task each one runs.
    pub fn executions(&self) -> HashMap<String, String> {
        lock(&self.executions).clone()
    }

    /// Runs the task state machine to completion. Returns the execution id.
    ///
    /// A fresh execution id is generated when `execution_id` is `None`.
    pub async fn fork(
        &self,
        task_id: &str,
        execution_id: Option<String>,
    ) -> Result<String, ExecError> {
        let execution = execution_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(new_id);
        self.fork_task(task_id.to_string(), execution.clone())
            .await?;
        Ok(execution)
    }

    /// Schedules `fork` on an independent worker and returns the execution id
    /// immediately. Failures surface through the task's event log and the bus.
    pub async fn fork_async(
        self: Arc<Self>,
        task_id: &str,
        execution_id: Option<String>,
    ) -> Result<String, RegistryError> {
        if !self.tasks.read().await.contains_key(task_id) {
            return Err(RegistryError::not_found("task", task_id));
        }
        let execution = execution_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(new_id);
        let exec = execution.clone();
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = self.fork_task(task_id.clone(), exec.clone()).await {
                error!(task = %task_id, execution = %exec, error = %e, "async fork failed");
            }
        });
        Ok(execution)
    }

    /// Applies the task's rollback spec to every component, transitioning the
    /// task to `rollback`.
    ///
    /// # Errors
    /// `InvalidInput` when the task carries no rollback spec; controller and
    /// lookup failures transition the task to `failed`.
    pub async fn roll_back(
        &self,
        task_id: &str,
        execution_id: Option<String>,
    ) -> Result<String, ExecError> {
        let execution = execution_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(new_id);
        debug!(task = %task_id, execution = %execution, "rolling back task");

        let slot = self.slot(task_id).await?;
        slot.events.record("Rolling back task...");

        let (components, roll_back) = {
            let data = read(&slot.data);
            (data.components.clone(), data.roll_back.clone())
        };
        let Some(roll_back) = roll_back else {
            return Err(ExecError::Registry(RegistryError::invalid_input(
                "task has no rollback spec",
            )));
        };
        let metadata = roll_back.metadata.unwrap_or_default();

        for component_id in &components {
            let component = match self.components.get(component_id).await {
                Ok(c) => c,
                Err(e) => {
                    self.fail(&slot, &e.to_string());
                    return Err(e.into());
                }
            };
            let controller = match self.controllers.get(&component.kind).await {
                Ok(c) => c,
                Err(_) => {
                    let e = RegistryError::UnknownType {
                        kind: component.kind,
                    };
                    self.fail(&slot, &e.to_string());
                    return Err(e.into());
                }
            };
            if let Err(source) = controller.run_task(&metadata, &component.metadata).await {
                self.fail(&slot, &source.to_string());
                return Err(ExecError::Controller { source });
            }
        }

        self.advance(&slot, Status::Rollback);
        slot.events.record("RollBack task!");
        self.bus.publish(
            RuntimeEvent::now(RuntimeEventKind::TaskRolledBack)
                .with_task(task_id)
                .with_execution(&execution),
        );
        Ok(execution)
    }

    /// Schedules `roll_back` on an independent worker and returns the
    /// execution id immediately.
    pub async fn roll_back_async(
        self: Arc<Self>,
        task_id: &str,
        execution_id: Option<String>,
    ) -> Result<String, RegistryError> {
        if !self.tasks.read().await.contains_key(task_id) {
            return Err(RegistryError::not_found("task", task_id));
        }
        let execution = execution_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(new_id);
        let exec = execution.clone();
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = self.roll_back(&task_id, Some(exec.clone())).await {
                error!(task = %task_id, execution = %exec, error = %e, "async rollback failed");
            }
        });
        Ok(execution)
    }

    /// Moves the task to `stopped` from any non-terminal status.
    pub async fn stop(&self, task_id: &str) -> Result<(), ExecError> {
        let slot = self.slot(task_id).await?;
        let current = slot.current_status();
        if current.is_terminal() {
            return Err(ExecError::IllegalStateTransition {
                from: current,
                to: Status::Stopped,
            });
        }
        self.advance(&slot, Status::Stopped);
        Ok(())
    }

    /// Moves the task from `running` to `paused`.
    pub async fn pause(&self, task_id: &str) -> Result<(), ExecError> {
        let slot = self.slot(task_id).await?;
        let current = slot.current_status();
        if current != Status::Running {
            return Err(ExecError::IllegalStateTransition {
                from: current,
                to: Status::Paused,
            });
        }
        self.advance(&slot, Status::Paused);
        Ok(())
    }

    // ---------------------------
    // Fork internals
    // ---------------------------

    /// Boxed so ordered dependencies can recurse.
    fn fork_task(&self, task_id: String, execution: String) -> BoxFuture<'_, Result<(), ExecError>> {
        Box::pin(async move {
            debug!(task = %task_id, execution = %execution, "fork");
            let slot = self.slot(&task_id).await?;

            self.advance(&slot, Status::Pending);
            slot.events.record("Checking task!");
            slot.events.record("Fork task!");
            self.bus.publish(
                RuntimeEvent::now(RuntimeEventKind::TaskStarting)
                    .with_task(&task_id)
                    .with_execution(&execution),
            );

            lock(&self.executions).insert(execution.clone(), task_id.clone());
            let result = self.run_fork(&slot, &execution).await;
            lock(&self.executions).remove(&execution);

            if let Err(e) = &result {
                self.bus.publish(
                    RuntimeEvent::now(RuntimeEventKind::TaskFailed)
                        .with_task(&task_id)
                        .with_execution(&execution)
                        .with_error(e.to_string()),
                );
            } else {
                self.bus.publish(
                    RuntimeEvent::now(RuntimeEventKind::TaskSucceeded)
                        .with_task(&task_id)
                        .with_execution(&execution),
                );
            }
            result
        })
    }

    async fn run_fork(&self, slot: &Arc<TaskSlot>, execution: &str) -> Result<(), ExecError> {
        let (depends_on, pre_checks, post_checks, components, metadata) = {
            let data = read(&slot.data);
            (
                data.depends_on.clone(),
                data.pre_checks.clone(),
                data.post_checks.clone(),
                data.components.clone(),
                data.metadata.clone(),
            )
        };

        if !depends_on.is_empty() {
            if let Err(e) = self.resolve_depends(&depends_on, execution).await {
                self.fail(slot, &e.to_string());
                return Err(e);
            }
        }

        self.advance(slot, Status::Running);
        slot.events.record("Running task!");

        if !pre_checks.is_empty() {
            if let Err(e) = self.run_checks(&pre_checks).await {
                self.fail(slot, &e.to_string());
                return Err(e);
            }
        }

        // Resolve every component and its controller before touching any of
        // them, so a partial run is not started against a broken reference.
        let mut pairs = Vec::with_capacity(components.len());
        for component_id in &components {
            let component = match self.components.get(component_id).await {
                Ok(c) => c,
                Err(e) => {
                    self.fail(slot, &e.to_string());
                    return Err(e.into());
                }
            };
            let controller = match self.controllers.get(&component.kind).await {
                Ok(c) => c,
                Err(_) => {
                    let e = RegistryError::UnknownType {
                        kind: component.kind,
                    };
                    self.fail(slot, &e.to_string());
                    return Err(e.into());
                }
            };
            pairs.push((component, controller));
        }

        for (component, controller) in &pairs {
            if let Err(source) = controller.run_task(&metadata, &component.metadata).await {
                self.fail(slot, &source.to_string());
                return Err(ExecError::Controller { source });
            }
        }

        self.advance(slot, Status::Success);
        slot.events.record("Success task!");

        if !post_checks.is_empty() {
            if let Err(e) = self.run_checks(&post_checks).await {
                self.fail(slot, &e.to_string());
                return Err(e);
            }
        }
        Ok(())
    }

    async fn resolve_depends(
        &self,
        depends_on: &[Depends],
        execution: &str,
    ) -> Result<(), ExecError> {
        for depends in depends_on {
            debug!(dependency = %depends.id, kind = ?depends.kind, "resolving dependency");
            let dep = self.slot(&depends.id).await?;
            let status = dep.current_status();

            match depends.kind {
                DependsKind::Strict => {
                    if status != Status::Success {
                        return Err(ExecError::StrictUnsatisfied {
                            id: depends.id.clone(),
                            status,
                        });
                    }
                }
                DependsKind::Ordered => {
                    if status != Status::Success {
                        dep.events.record("Triggered by DependsOn!");
                        self.fork_task(depends.id.clone(), execution.to_string())
                            .await?;
                    }
                }
                DependsKind::Blocking => {
                    if status != Status::Success {
                        self.wait_for_success(&dep).await?;
                    }
                }
                DependsKind::Advisory => {}
            }
        }
        Ok(())
    }

    /// Waits until the dependency's status channel reports `success`.
    ///
    /// A terminal non-success status ends the wait with
    /// `BlockingDependencyFailed`; `Config::blocking_timeout` bounds the wait.
    async fn wait_for_success(&self, dep: &Arc<TaskSlot>) -> Result<(), ExecError> {
        let mut rx = dep.status_tx.subscribe();
        let wait = async {
            loop {
                let current = *rx.borrow_and_update();
                if current == Status::Success {
                    return Ok(());
                }
                if current.is_terminal() {
                    return Err(ExecError::BlockingDependencyFailed {
                        id: dep.id.clone(),
                        status: current,
                    });
                }
                if rx.changed().await.is_err() {
                    // task was deleted while we waited
                    return Err(ExecError::Registry(RegistryError::not_found(
                        "task",
                        &dep.id,
                    )));
                }
            }
        };

        match self.config.blocking_timeout {
            Some(limit) => time::timeout(limit, wait)
                .await
                .map_err(|_| ExecError::BlockingTimeout { id: dep.id.clone() })?,
            None => wait.await,
        }
    }

    async fn run_checks(&self, checks: &[Check]) -> Result<(), ExecError> {
        for check in checks {
            let monitoring = self.monitorings.get(&check.monitoring_id).await?;
            let controller = self
                .monitor_controllers
                .get(&monitoring.kind)
                .await
                .map_err(|_| RegistryError::UnknownType {
                    kind: monitoring.kind.clone(),
                })?;
            controller
                .run_check(&check.metadata)
                .await
                .map_err(|source| ExecError::CheckFailed {
                    id: check.id.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Advances the slot's status history and mirrors it onto the watch channel.
    fn advance(&self, slot: &Arc<TaskSlot>, status: Status) {
        let mut history = write(&slot.status);
        *history = history.advance(status);
        drop(history);
        let _ = slot.status_tx.send(status);
    }

    fn fail(&self, slot: &Arc<TaskSlot>, cause: &str) {
        self.advance(slot, Status::Failed);
        slot.events.record(cause.to_string());
    }

    async fn slot(&self, id: &str) -> Result<Arc<TaskSlot>, RegistryError> {
        self.tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found("task", id))
    }
}
