//! Managed components: units of infrastructure typed by a controller kind.

use serde::{Deserialize, Serialize};

use super::{EventLog, StatusHistory};
use crate::Metadata;

/// A managed unit of infrastructure (server, service, cluster).
///
/// `kind` names the controller driver responsible for validating the
/// component's metadata and executing task actions against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_history: Option<StatusHistory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_history: Option<EventLog>,
}

impl Component {
    /// Minimal constructor; histories are stamped by the registry on register.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            version: version.into(),
            metadata: Metadata::new(),
            status_history: None,
            event_history: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}
