//! Monitoring probes and the checks that reference them.

use serde::{Deserialize, Serialize};

use super::{EventLog, StatusHistory};
use crate::Metadata;

/// An external monitoring system (endpoint, agent, probe) typed by a
/// monitoring-controller kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitoring {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub config: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_history: Option<StatusHistory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_history: Option<EventLog>,
}

impl Monitoring {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            config: Metadata::new(),
            status_history: None,
            event_history: None,
        }
    }

    pub fn with_config(mut self, config: Metadata) -> Self {
        self.config = config;
        self
    }
}

/// A pre/post-task probe: resolved through its monitoring's controller at
/// execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub monitoring_id: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl Check {
    pub fn new(id: impl Into<String>, monitoring_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            monitoring_id: monitoring_id.into(),
            metadata: Metadata::new(),
        }
    }
}
