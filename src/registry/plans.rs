//! # Plan registry: compiles task lists into DAGs and executes them.
//!
//! Registration registers every task, builds the dependency/dependent maps,
//! splits them into disjoint graphs, and cycle-checks each graph. Execution
//! fans out one worker per graph, walks each graph in topological order, and
//! rolls completed predecessors back when a task fails.
//!
//! ## Run flow
//! ```text
//! run(plan_id, execution_id)
//!   ├─► guard: already running / already completed
//!   ├─► running, "Running plan!"
//!   ├─► per graph: worker in JoinSet (optionally semaphore-bounded)
//!   │     └─► execute_graph:
//!   │           for task in topological order:
//!   │             ├─► stop token checked (no new forks after stop)
//!   │             ├─► checkpoint: component before-images
//!   │             ├─► tasks.fork(task, execution)
//!   │             │     ├─ ok  → push checkpoint onto rollback stack
//!   │             │     └─ err → rollback_graph (reverse order, completed
//!   │             │              predecessors only) → composite error
//!   ├─► join workers, compose errors
//!   └─► success, "Success plan!"  /  failed + failure event
//! ```
//!
//! ## Rules
//! - Tasks of one graph start strictly in topological order.
//! - Graphs of one plan run concurrently and unordered.
//! - Checkpoints are appended in task-completion order under the plan lock.
//! - `stop` cancels the run token: no new task invocation starts afterwards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{ExecError, RegistryError};
use crate::events::{Bus, RuntimeEvent, RuntimeEventKind};
use crate::model::{
    ComponentState, EventLog, Plan, RollbackCheckpoint, Status, StatusHistory, Task, TaskGraph,
};
use crate::registry::graph::{build_disjoint_graphs, execution_order};
use crate::registry::{lock, new_id, read, write, ComponentRegistry, TaskRegistry};

/// Registry slot: compiled graphs plus run-time state behind entity-local locks.
struct PlanSlot {
    id: String,
    graphs: Vec<TaskGraph>,
    status: StdRwLock<StatusHistory>,
    events: EventLog,
    rollback_stack: StdMutex<Vec<RollbackCheckpoint>>,
    /// Cancellation token of the in-flight run, if any.
    cancel: StdMutex<Option<CancellationToken>>,
}

impl PlanSlot {
    fn snapshot(&self) -> Plan {
        Plan {
            id: self.id.clone(),
            task_graphs: self.graphs.clone(),
            rollback_stack: lock(&self.rollback_stack).clone(),
            status_history: Some(read(&self.status).clone()),
            event_history: Some(self.events.clone()),
        }
    }

    fn current_status(&self) -> Status {
        read(&self.status).status()
    }

    fn advance(&self, status: Status) {
        let mut history = write(&self.status);
        *history = history.advance(status);
    }
}

/// Compiles task lists into disjoint DAGs and runs them.
pub struct PlanRegistry {
    plans: tokio::sync::RwLock<HashMap<String, Arc<PlanSlot>>>,
    components: Arc<ComponentRegistry>,
    tasks: Arc<TaskRegistry>,
    bus: Bus,
    config: Config,
}

impl PlanRegistry {
    pub fn new(
        components: Arc<ComponentRegistry>,
        tasks: Arc<TaskRegistry>,
        bus: Bus,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            plans: tokio::sync::RwLock::new(HashMap::new()),
            components,
            tasks,
            bus,
            config,
        })
    }

    /// Registers every task, compiles the dependency graphs, and stores the
    /// plan with status `created`.
    ///
    /// # Errors
    /// - `EmptyPlan` for an empty task list
    /// - any task-registration error, unchanged
    /// - `UnknownDependency` for an edge leaving the task set
    /// - `CycleDetected` / `Disconnected` from graph compilation
    pub async fn register(&self, tasks: Vec<Task>) -> Result<Plan, RegistryError> {
        if tasks.is_empty() {
            return Err(RegistryError::EmptyPlan);
        }

        let mut task_map: HashMap<String, Task> = HashMap::with_capacity(tasks.len());
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::with_capacity(tasks.len());
        let mut dependents: HashMap<String, Vec<String>> = HashMap::with_capacity(tasks.len());

        // The batch path lets tasks depend on each other regardless of their
        // position in the list.
        for registered in self.tasks.register_batch(tasks).await? {
            dependencies.insert(registered.id.clone(), Vec::new());
            dependents.insert(registered.id.clone(), Vec::new());
            task_map.insert(registered.id.clone(), registered);
        }

        for task in task_map.values() {
            for depends in &task.depends_on {
                if !task_map.contains_key(&depends.id) {
                    return Err(RegistryError::UnknownDependency {
                        id: depends.id.clone(),
                    });
                }
                if let Some(edges) = dependencies.get_mut(&task.id) {
                    edges.push(depends.id.clone());
                }
                if let Some(edges) = dependents.get_mut(&depends.id) {
                    edges.push(task.id.clone());
                }
            }
        }

        let graphs = build_disjoint_graphs(&task_map, &dependencies, &dependents)?;
        for graph in &graphs {
            if execution_order(&graph.dependencies).is_none() {
                return Err(RegistryError::CycleDetected {
                    graph: graph.root_task_id.clone(),
                });
            }
        }

        let slot = Arc::new(PlanSlot {
            id: new_id(),
            graphs,
            status: StdRwLock::new(StatusHistory::new(Status::Created)),
            events: EventLog::new(),
            rollback_stack: StdMutex::new(Vec::new()),
            cancel: StdMutex::new(None),
        });
        slot.events.record("Created plan!");

        info!(
            plan = %slot.id,
            graphs = slot.graphs.len(),
            "created plan with independent task graphs"
        );

        let stored = slot.snapshot();
        self.plans.write().await.insert(slot.id.clone(), slot);
        Ok(stored)
    }

    /// Returns a snapshot of the plan with `id`.
    pub async fn get(&self, id: &str) -> Result<Plan, RegistryError> {
        self.slot(id).await.map(|s| s.snapshot())
    }

    /// Applies a status transition carried by `updated`; compiled graphs are
    /// immutable.
    pub async fn update(&self, id: &str, updated: Plan) -> Result<(), RegistryError> {
        let slot = self.slot(id).await?;
        if let Some(history) = updated.status_history {
            slot.advance(history.status());
        }
        Ok(())
    }

    /// Removes the plan with `id`.
    pub async fn delete(&self, id: &str) -> Result<(), RegistryError> {
        let mut plans = self.plans.write().await;
        plans
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RegistryError::not_found("plan", id))
    }

    /// Snapshot of all plans, order unspecified.
    pub async fn list(&self) -> Vec<Plan> {
        self.plans
            .read()
            .await
            .values()
            .map(|slot| slot.snapshot())
            .collect()
    }

    /// Current status of the plan with `id`.
    pub async fn status(&self, id: &str) -> Result<Status, RegistryError> {
        Ok(self.slot(id).await?.current_status())
    }

    /// Executes the plan: one worker per graph, joined before the final status
    /// transition. Returns the execution id.
    pub async fn run(
        &self,
        plan_id: &str,
        execution_id: Option<String>,
    ) -> Result<String, ExecError> {
        let execution = execution_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(new_id);
        info!(plan = %plan_id, execution = %execution, "running plan");

        let slot = self.slot(plan_id).await?;
        match slot.current_status() {
            Status::Running => {
                return Err(ExecError::AlreadyRunning {
                    id: plan_id.to_string(),
                })
            }
            Status::Success => {
                return Err(ExecError::AlreadyCompleted {
                    id: plan_id.to_string(),
                })
            }
            _ => {}
        }

        slot.advance(Status::Running);
        slot.events.record("Running plan!");
        self.bus.publish(
            RuntimeEvent::now(RuntimeEventKind::PlanStarted)
                .with_plan(plan_id)
                .with_execution(&execution),
        );

        let token = CancellationToken::new();
        *lock(&slot.cancel) = Some(token.clone());

        let semaphore = self
            .config
            .graph_concurrency()
            .map(Semaphore::new)
            .map(Arc::new);

        let mut set: JoinSet<Result<(), ExecError>> = JoinSet::new();
        for graph in slot.graphs.clone() {
            let tasks = Arc::clone(&self.tasks);
            let components = Arc::clone(&self.components);
            let bus = self.bus.clone();
            let plan_slot = Arc::clone(&slot);
            let exec = execution.clone();
            let child = token.child_token();
            let sem = semaphore.clone();

            set.spawn(async move {
                let _permit = match &sem {
                    Some(s) => match Arc::clone(s).acquire_owned().await {
                        Ok(p) => Some(p),
                        Err(_closed) => return Err(ExecError::Stopped),
                    },
                    None => None,
                };
                let root = graph.root_task_id.clone();
                Self::execute_graph(&tasks, &components, &bus, &plan_slot, &graph, &exec, &child)
                    .await
                    .map_err(|source| ExecError::GraphFailed {
                        graph: root,
                        source: Box::new(source),
                    })
            });
        }

        let mut errors = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e),
                Err(join_err) => {
                    error!(plan = %plan_id, error = %join_err, "graph worker panicked");
                    errors.push(ExecError::Registry(RegistryError::invalid_input(format!(
                        "graph worker panicked: {join_err}"
                    ))));
                }
            }
        }

        *lock(&slot.cancel) = None;

        match ExecError::compose(errors) {
            Some(err) => {
                slot.events.record(format!("Plan failed: {err}"));
                // a stop that landed mid-run keeps its status
                if slot.current_status() != Status::Stopped {
                    slot.advance(Status::Failed);
                }
                error!(plan = %plan_id, execution = %execution, error = %err, "plan failed");
                self.bus.publish(
                    RuntimeEvent::now(RuntimeEventKind::PlanFailed)
                        .with_plan(plan_id)
                        .with_execution(&execution)
                        .with_error(err.to_string()),
                );
                Err(err)
            }
            None => {
                slot.advance(Status::Success);
                slot.events.record("Success plan!");
                info!(plan = %plan_id, execution = %execution, "plan executed successfully");
                self.bus.publish(
                    RuntimeEvent::now(RuntimeEventKind::PlanSucceeded)
                        .with_plan(plan_id)
                        .with_execution(&execution),
                );
                Ok(execution)
            }
        }
    }

    /// Starts `run` on an independent worker and returns the execution id
    /// immediately. Failures surface through the plan's event log and the bus.
    pub async fn run_async(
        self: Arc<Self>,
        plan_id: &str,
        execution_id: Option<String>,
    ) -> Result<String, RegistryError> {
        if !self.plans.read().await.contains_key(plan_id) {
            return Err(RegistryError::not_found("plan", plan_id));
        }
        let execution = execution_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(new_id);
        let exec = execution.clone();
        let plan_id = plan_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = self.run(&plan_id, Some(exec.clone())).await {
                error!(plan = %plan_id, execution = %exec, error = %e, "async run failed");
            }
        });
        Ok(execution)
    }

    /// Stops a `running` or `paused` plan; in-flight graphs start no further
    /// tasks once the run token is cancelled.
    pub async fn stop(&self, plan_id: &str) -> Result<(), ExecError> {
        let slot = self.slot(plan_id).await?;
        let current = slot.current_status();
        if current != Status::Running && current != Status::Paused {
            return Err(ExecError::IllegalStateTransition {
                from: current,
                to: Status::Stopped,
            });
        }
        if let Some(token) = lock(&slot.cancel).take() {
            token.cancel();
        }
        slot.advance(Status::Stopped);
        info!(plan = %plan_id, "plan stopped");
        self.bus
            .publish(RuntimeEvent::now(RuntimeEventKind::PlanStopped).with_plan(plan_id));
        Ok(())
    }

    /// Pauses a `running` plan. Propagation to running controllers is the
    /// controller layer's responsibility.
    pub async fn pause(&self, plan_id: &str) -> Result<(), ExecError> {
        let slot = self.slot(plan_id).await?;
        let current = slot.current_status();
        if current != Status::Running {
            return Err(ExecError::IllegalStateTransition {
                from: current,
                to: Status::Paused,
            });
        }
        slot.advance(Status::Paused);
        info!(plan = %plan_id, "plan paused");
        self.bus
            .publish(RuntimeEvent::now(RuntimeEventKind::PlanPaused).with_plan(plan_id));
        Ok(())
    }

    // ---------------------------
    // Graph execution
    // ---------------------------

    async fn execute_graph(
        tasks: &Arc<TaskRegistry>,
        components: &Arc<ComponentRegistry>,
        bus: &Bus,
        slot: &Arc<PlanSlot>,
        graph: &TaskGraph,
        execution: &str,
        token: &CancellationToken,
    ) -> Result<(), ExecError> {
        let order =
            execution_order(&graph.dependencies).ok_or_else(|| RegistryError::CycleDetected {
                graph: graph.root_task_id.clone(),
            })?;
        debug!(graph = %graph.root_task_id, ?order, "executing task graph");

        for task_id in &order {
            if token.is_cancelled() {
                return Err(ExecError::Stopped);
            }

            let checkpoint =
                Self::capture_checkpoint(components, graph, task_id).await;

            if let Err(run_err) = tasks.fork(task_id, Some(execution.to_string())).await {
                error!(graph = %graph.root_task_id, task = %task_id, error = %run_err, "task failed");
                bus.publish(
                    RuntimeEvent::now(RuntimeEventKind::RollbackStarted)
                        .with_plan(&slot.id)
                        .with_task(task_id)
                        .with_execution(execution),
                );
                return match Self::rollback_graph(tasks, components, slot, graph, task_id, execution)
                    .await
                {
                    Ok(()) => Err(run_err),
                    Err(rollback_err) => Err(ExecError::RollbackFailed {
                        run: Box::new(run_err),
                        rollback: Box::new(rollback_err),
                    }),
                };
            }

            lock(&slot.rollback_stack).push(checkpoint);
        }
        Ok(())
    }

    /// Records the before-image of the task's components. Components that no
    /// longer resolve are left out; the fork itself will surface the failure.
    async fn capture_checkpoint(
        components: &Arc<ComponentRegistry>,
        graph: &TaskGraph,
        task_id: &str,
    ) -> RollbackCheckpoint {
        let mut state = HashMap::new();
        if let Some(task) = graph.tasks.get(task_id) {
            for component_id in &task.components {
                if let Ok(component) = components.get(component_id).await {
                    state.insert(
                        component_id.clone(),
                        ComponentState {
                            version: component.version,
                            metadata: component.metadata,
                        },
                    );
                }
            }
        }
        RollbackCheckpoint {
            graph_id: graph.root_task_id.clone(),
            task_id: task_id.to_string(),
            state,
            at: Utc::now(),
        }
    }

    /// Walks the execution order in reverse, starting strictly after the
    /// failed task, restoring each completed predecessor from its checkpoint.
    async fn rollback_graph(
        tasks: &Arc<TaskRegistry>,
        components: &Arc<ComponentRegistry>,
        slot: &Arc<PlanSlot>,
        graph: &TaskGraph,
        failed_task_id: &str,
        execution: &str,
    ) -> Result<(), ExecError> {
        info!(
            graph = %graph.root_task_id,
            failed = %failed_task_id,
            "rolling back completed predecessors"
        );
        let order =
            execution_order(&graph.dependencies).ok_or_else(|| RegistryError::CycleDetected {
                graph: graph.root_task_id.clone(),
            })?;

        let mut past_failure = false;
        for task_id in order.iter().rev() {
            if task_id == failed_task_id {
                past_failure = true;
                continue;
            }
            if !past_failure {
                continue;
            }
            Self::restore_checkpoint(tasks, components, slot, graph, task_id, execution).await?;
        }
        Ok(())
    }

    /// Restores one task from its most recent checkpoint: verifies every
    /// checkpointed component still exists, then applies the task's rollback
    /// spec through its controller when one is defined.
    async fn restore_checkpoint(
        tasks: &Arc<TaskRegistry>,
        components: &Arc<ComponentRegistry>,
        slot: &Arc<PlanSlot>,
        graph: &TaskGraph,
        task_id: &str,
        execution: &str,
    ) -> Result<(), ExecError> {
        let checkpoint = {
            let stack = lock(&slot.rollback_stack);
            stack
                .iter()
                .rev()
                .find(|cp| cp.graph_id == graph.root_task_id && cp.task_id == task_id)
                .cloned()
        };
        let Some(checkpoint) = checkpoint else {
            return Err(ExecError::Registry(RegistryError::not_found(
                "checkpoint",
                task_id,
            )));
        };

        for component_id in checkpoint.state.keys() {
            components.get(component_id).await?;
        }

        let has_roll_back = graph
            .tasks
            .get(task_id)
            .is_some_and(|task| task.roll_back.is_some());
        if has_roll_back {
            tasks.roll_back(task_id, Some(execution.to_string())).await?;
        }
        Ok(())
    }

    async fn slot(&self, id: &str) -> Result<Arc<PlanSlot>, RegistryError> {
        self.plans
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found("plan", id))
    }
}
