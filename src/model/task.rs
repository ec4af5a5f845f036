//! Tasks: atomic actions over components, with dependencies, checks, and an
//! optional rollback spec.

use serde::{Deserialize, Serialize};

use super::{Check, EventLog, StatusHistory};
use crate::Metadata;

/// What a task does to its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Update,
    Rollback,
    Check,
}

/// How a task waits on one of its dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependsKind {
    /// The dependency must already have succeeded; anything else is an error.
    Strict,
    /// The dependency is executed first if it has not succeeded yet.
    Ordered,
    /// A hint only; never enforced.
    Advisory,
    /// The task waits until the dependency reaches `success`.
    Blocking,
}

/// A dependency edge to another task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Depends {
    pub kind: DependsKind,
    pub id: String,
}

impl Depends {
    pub fn new(kind: DependsKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// How a rollback is initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackKind {
    Manual,
    Trigger,
}

/// Inverse-action spec attached to a task.
///
/// When set, `components` and `metadata` must be either both set or both
/// unset; the metadata is handed to the controller's `run_task` to apply the
/// inverse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollback {
    pub kind: RollbackKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// A single atomic action applied to one or more components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub components: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_back: Option<Rollback>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<Depends>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_checks: Vec<Check>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_checks: Vec<Check>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_history: Option<StatusHistory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_history: Option<EventLog>,
}

impl Task {
    pub fn new(id: impl Into<String>, kind: TaskKind, components: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            kind,
            components,
            roll_back: None,
            depends_on: Vec::new(),
            pre_checks: Vec::new(),
            post_checks: Vec::new(),
            metadata: Metadata::new(),
            status_history: None,
            event_history: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_depends(mut self, depends: Depends) -> Self {
        self.depends_on.push(depends);
        self
    }

    pub fn with_roll_back(mut self, roll_back: Rollback) -> Self {
        self.roll_back = Some(roll_back);
        self
    }

    pub fn with_pre_check(mut self, check: Check) -> Self {
        self.pre_checks.push(check);
        self
    }

    pub fn with_post_check(mut self, check: Check) -> Self {
        self.post_checks.push(check);
        self
    }
}
