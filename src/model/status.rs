//! # Status history: snapshot-appending status transitions.
//!
//! Every entity (component, monitoring, task, plan) carries a [`StatusHistory`].
//! Transitions never mutate in place: [`StatusHistory::advance`] returns a fresh
//! history whose `previous` list starts with the old `current`. Readers holding
//! an older snapshot keep seeing a consistent value.
//!
//! ## Rules
//! - `previous` is ordered most recent first.
//! - Timestamps are non-decreasing from the tail of `previous` to `current`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Created,
    Pending,
    Checking,
    Running,
    Success,
    Failed,
    Skipped,
    Stopped,
    Paused,
    Deferred,
    Retry,
    Disable,
    Rollback,
}

impl Status {
    /// True for statuses that end an execution and will not change on their own.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::Success | Status::Failed | Status::Stopped | Status::Skipped
        )
    }

    /// Short stable label for logs and metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            Status::Created => "created",
            Status::Pending => "pending",
            Status::Checking => "checking",
            Status::Running => "running",
            Status::Success => "success",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
            Status::Stopped => "stopped",
            Status::Paused => "paused",
            Status::Deferred => "deferred",
            Status::Retry => "retry",
            Status::Disable => "disable",
            Status::Rollback => "rollback",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// A single `(status, timestamp)` point in an entity's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: Status,
    pub at: DateTime<Utc>,
}

/// Current status plus the ordered list of prior entries, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistory {
    pub current: StatusEntry,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous: Vec<StatusEntry>,
}

impl StatusHistory {
    /// Creates a fresh history with `status` as current and no previous entries.
    pub fn new(status: Status) -> Self {
        Self {
            current: StatusEntry {
                status,
                at: Utc::now(),
            },
            previous: Vec::new(),
        }
    }

    /// Returns a new history whose current is `(status, now)` and whose
    /// previous list is the old current followed by the old previous entries.
    ///
    /// `self` is left untouched; callers replace their reference.
    pub fn advance(&self, status: Status) -> Self {
        let mut previous = Vec::with_capacity(self.previous.len() + 1);
        previous.push(self.current);
        previous.extend(self.previous.iter().copied());
        Self {
            current: StatusEntry {
                status,
                at: Utc::now(),
            },
            previous,
        }
    }

    /// The current status symbol.
    pub fn status(&self) -> Status {
        self.current.status
    }
}
