//! Per-entity event log: append-only timestamped messages.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One `(timestamp, message)` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Append-only event log attached to an entity.
///
/// Appends are serialized by an internal mutex so concurrent workers can record
/// against the same entity. Entries are never reordered or dropped. Cloning and
/// serialization operate on a snapshot of the entries.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: Mutex<Vec<EventRecord>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `(now, message)` to the log.
    pub fn record(&self, message: impl Into<String>) {
        let entry = EventRecord {
            at: Utc::now(),
            message: message.into(),
        };
        self.lock().push(entry);
    }

    /// Returns a copy of all entries in append order.
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<EventRecord>> {
        // A panicked appender cannot leave the Vec inconsistent; recover the data.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        Self {
            entries: Mutex::new(self.snapshot()),
        }
    }
}

impl PartialEq for EventLog {
    fn eq(&self, other: &Self) -> bool {
        self.snapshot() == other.snapshot()
    }
}

impl Serialize for EventLog {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EventLog {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<EventRecord>::deserialize(deserializer)?;
        Ok(Self {
            entries: Mutex::new(entries),
        })
    }
}
