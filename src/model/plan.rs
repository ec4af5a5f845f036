//! Plans: compiled, cycle-free collections of task graphs, plus the rollback
//! checkpoints recorded while they run.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EventLog, StatusHistory, Task};
use crate::Metadata;

/// A connected DAG within a plan, rooted at a task with no dependencies.
///
/// `dependencies` and `dependents` are inverses restricted to this graph's
/// node set; their union connects every task to `root_task_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    pub root_task_id: String,
    pub tasks: HashMap<String, Task>,
    pub dependencies: HashMap<String, Vec<String>>,
    pub dependents: HashMap<String, Vec<String>>,
}

impl TaskGraph {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.tasks.contains_key(task_id)
    }
}

/// Before-image of a single component, captured into a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentState {
    pub version: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// Snapshot recorded before a task runs, used to revert on downstream failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackCheckpoint {
    /// Root task id of the graph the checkpointed task belongs to.
    pub graph_id: String,
    pub task_id: String,
    /// Component id to its before-image.
    pub state: HashMap<String, ComponentState>,
    pub at: DateTime<Utc>,
}

/// A compiled plan: disjoint task graphs executed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub task_graphs: Vec<TaskGraph>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollback_stack: Vec<RollbackCheckpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_history: Option<StatusHistory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_history: Option<EventLog>,
}

impl Plan {
    /// Total number of tasks across all graphs.
    pub fn task_count(&self) -> usize {
        self.task_graphs.iter().map(TaskGraph::len).sum()
    }
}
