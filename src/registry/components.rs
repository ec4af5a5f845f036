//! # Component registry: CRUD over managed components.
//!
//! Metadata validation is delegated to the controller registered for the
//! component's kind. Lookups return value snapshots; the registry map is never
//! exposed.
//!
//! ## Rules
//! - Registration assigns an id when empty, requires a non-empty version, and
//!   stamps status `pending` with a `"Created component!"` event.
//! - `update` preserves the existing id and histories and re-validates the
//!   incoming metadata against the incoming kind.
//! - `disable`/`enable` advance the status history (`disable`/`pending`).

use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::model::{Component, EventLog, Status, StatusHistory};
use crate::registry::{ControllerRegistry, new_id, read, write};
use crate::Metadata;

/// Closed set of indexed lookup fields for [`ComponentRegistry::get_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentField {
    Id,
    Name,
    Kind,
    Version,
}

/// Mutable payload of a component slot.
struct ComponentData {
    name: String,
    kind: String,
    version: String,
    metadata: Metadata,
}

/// Registry slot: payload and histories behind entity-local locks.
struct ComponentSlot {
    id: String,
    data: StdRwLock<ComponentData>,
    status: StdRwLock<StatusHistory>,
    events: EventLog,
}

impl ComponentSlot {
    fn snapshot(&self) -> Component {
        let data = read(&self.data);
        Component {
            id: self.id.clone(),
            name: data.name.clone(),
            kind: data.kind.clone(),
            version: data.version.clone(),
            metadata: data.metadata.clone(),
            status_history: Some(read(&self.status).clone()),
            event_history: Some(self.events.clone()),
        }
    }
}

/// CRUD over typed components, delegating metadata validation to controllers.
pub struct ComponentRegistry {
    components: RwLock<HashMap<String, Arc<ComponentSlot>>>,
    controllers: Arc<ControllerRegistry>,
}

impl ComponentRegistry {
    pub fn new(controllers: Arc<ControllerRegistry>) -> Arc<Self> {
        Arc::new(Self {
            components: RwLock::new(HashMap::new()),
            controllers,
        })
    }

    /// Registers a component and returns the stored value.
    ///
    /// # Errors
    /// - `InvalidInput` when `version` is empty
    /// - `AlreadyRegistered` when the id exists
    /// - `UnknownType` when no controller covers `kind`
    /// - `InvalidMetadata` when the controller rejects the metadata
    pub async fn register(&self, mut component: Component) -> Result<Component, RegistryError> {
        if component.id.is_empty() {
            component.id = new_id();
        }
        debug!(id = %component.id, kind = %component.kind, "registering component");

        if component.version.is_empty() {
            return Err(RegistryError::invalid_input("component version is empty"));
        }
        if self.components.read().await.contains_key(&component.id) {
            return Err(RegistryError::AlreadyRegistered {
                entity: "component",
                id: component.id,
            });
        }

        self.validate_metadata(&component.kind, &component.metadata)
            .await?;

        let slot = Arc::new(ComponentSlot {
            id: component.id.clone(),
            data: StdRwLock::new(ComponentData {
                name: component.name,
                kind: component.kind,
                version: component.version,
                metadata: component.metadata,
            }),
            status: StdRwLock::new(StatusHistory::new(Status::Pending)),
            events: EventLog::new(),
        });
        slot.events.record("Created component!");

        let mut components = self.components.write().await;
        if components.contains_key(&slot.id) {
            // lost the race to a concurrent register with the same id
            return Err(RegistryError::AlreadyRegistered {
                entity: "component",
                id: slot.id.clone(),
            });
        }
        let stored = slot.snapshot();
        components.insert(slot.id.clone(), slot);
        Ok(stored)
    }

    /// Returns a snapshot of the component with `id`.
    pub async fn get(&self, id: &str) -> Result<Component, RegistryError> {
        self.slot(id).await.map(|s| s.snapshot())
    }

    /// Returns all components whose `field` stringifies to `value`.
    ///
    /// # Errors
    /// `NotFound` when no component matches.
    pub async fn get_by(
        &self,
        field: ComponentField,
        value: &str,
    ) -> Result<Vec<Component>, RegistryError> {
        let matches = self
            .find(|c| match field {
                ComponentField::Id => c.id == value,
                ComponentField::Name => c.name == value,
                ComponentField::Kind => c.kind == value,
                ComponentField::Version => c.version == value,
            })
            .await;
        if matches.is_empty() {
            debug!(field = ?field, value = %value, "no components matched");
            return Err(RegistryError::not_found("component", value));
        }
        Ok(matches)
    }

    /// Linear scan with an arbitrary predicate; empty result is not an error.
    pub async fn find(&self, predicate: impl Fn(&Component) -> bool) -> Vec<Component> {
        self.components
            .read()
            .await
            .values()
            .map(|slot| slot.snapshot())
            .filter(|c| predicate(c))
            .collect()
    }

    /// Replaces the component's payload, preserving its id and histories.
    ///
    /// The incoming metadata is re-validated against the incoming kind.
    pub async fn update(&self, id: &str, updated: Component) -> Result<(), RegistryError> {
        let slot = self.slot(id).await?;
        self.validate_metadata(&updated.kind, &updated.metadata)
            .await?;

        let mut data = write(&slot.data);
        data.name = updated.name;
        data.kind = updated.kind;
        data.version = updated.version;
        data.metadata = updated.metadata;
        drop(data);

        info!(id = %id, "component updated");
        Ok(())
    }

    /// Removes the component with `id`.
    pub async fn delete(&self, id: &str) -> Result<(), RegistryError> {
        let mut components = self.components.write().await;
        components
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RegistryError::not_found("component", id))
    }

    /// Snapshot of all components, order unspecified.
    pub async fn list(&self) -> Vec<Component> {
        self.components
            .read()
            .await
            .values()
            .map(|slot| slot.snapshot())
            .collect()
    }

    /// Advances the component's status to `disable`.
    pub async fn disable(&self, id: &str) -> Result<(), RegistryError> {
        self.advance_status(id, Status::Disable).await
    }

    /// Advances the component's status back to `pending`.
    pub async fn enable(&self, id: &str) -> Result<(), RegistryError> {
        self.advance_status(id, Status::Pending).await
    }

    /// Current status of the component with `id`.
    pub async fn status(&self, id: &str) -> Result<Status, RegistryError> {
        let slot = self.slot(id).await?;
        let status = read(&slot.status).status();
        Ok(status)
    }

    async fn advance_status(&self, id: &str, status: Status) -> Result<(), RegistryError> {
        let slot = self.slot(id).await?;
        let mut history = write(&slot.status);
        *history = history.advance(status);
        Ok(())
    }

    async fn slot(&self, id: &str) -> Result<Arc<ComponentSlot>, RegistryError> {
        self.components
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found("component", id))
    }

    async fn validate_metadata(&self, kind: &str, metadata: &Metadata) -> Result<(), RegistryError> {
        let controller =
            self.controllers
                .get(kind)
                .await
                .map_err(|_| RegistryError::UnknownType {
                    kind: kind.to_string(),
                })?;
        controller
            .validate_component(metadata)
            .await
            .map_err(|source| RegistryError::InvalidMetadata { source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::controller::Controller;
    use crate::error::ControllerError;

    struct Mock;

    #[async_trait]
    impl Controller for Mock {
        async fn validate_component(&self, meta: &Metadata) -> Result<(), ControllerError> {
            if meta.get("reject").is_some() {
                return Err(ControllerError::new("rejected by mock"));
            }
            Ok(())
        }
        async fn check_component(&self, _meta: &Metadata) -> Result<(), ControllerError> {
            Ok(())
        }
        async fn validate_task(&self, _meta: &Metadata) -> Result<(), ControllerError> {
            Ok(())
        }
        async fn run_task(
            &self,
            _task_meta: &Metadata,
            _component_meta: &Metadata,
        ) -> Result<(), ControllerError> {
            Ok(())
        }
    }

    async fn registry() -> Arc<ComponentRegistry> {
        let controllers = Arc::new(ControllerRegistry::new());
        controllers.register("mock", Arc::new(Mock)).await.unwrap();
        ComponentRegistry::new(controllers)
    }

    #[tokio::test]
    async fn register_stamps_pending_and_event() {
        let reg = registry().await;
        let stored = reg
            .register(Component::new("A", "a", "mock", "1.0.0"))
            .await
            .unwrap();
        assert_eq!(stored.id, "A");
        assert_eq!(
            stored.status_history.as_ref().unwrap().status(),
            Status::Pending
        );
        let events = stored.event_history.as_ref().unwrap().snapshot();
        assert_eq!(events[0].message, "Created component!");
    }

    #[tokio::test]
    async fn register_assigns_id_when_empty() {
        let reg = registry().await;
        let stored = reg
            .register(Component::new("", "a", "mock", "1.0.0"))
            .await
            .unwrap();
        assert!(!stored.id.is_empty());
    }

    #[tokio::test]
    async fn register_requires_version() {
        let reg = registry().await;
        let err = reg
            .register(Component::new("A", "a", "mock", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn register_rejects_duplicate_and_unknown_kind() {
        let reg = registry().await;
        reg.register(Component::new("A", "a", "mock", "1.0.0"))
            .await
            .unwrap();
        let dup = reg
            .register(Component::new("A", "a", "mock", "1.0.0"))
            .await
            .unwrap_err();
        assert!(matches!(dup, RegistryError::AlreadyRegistered { .. }));

        let unknown = reg
            .register(Component::new("B", "b", "unknown", "1.0.0"))
            .await
            .unwrap_err();
        assert!(matches!(unknown, RegistryError::UnknownType { .. }));
    }

    #[tokio::test]
    async fn register_propagates_controller_rejection() {
        let reg = registry().await;
        let mut meta = Metadata::new();
        meta.insert("reject".into(), "yes".into());
        let err = reg
            .register(Component::new("A", "a", "mock", "1.0.0").with_metadata(meta))
            .await
            .unwrap_err();
        match err {
            RegistryError::InvalidMetadata { source } => {
                assert_eq!(source.message, "rejected by mock");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn delete_then_get_fails() {
        let reg = registry().await;
        reg.register(Component::new("A", "a", "mock", "1.0.0"))
            .await
            .unwrap();
        reg.delete("A").await.unwrap();
        assert!(matches!(
            reg.get("A").await.unwrap_err(),
            RegistryError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn update_preserves_id_and_history() {
        let reg = registry().await;
        reg.register(Component::new("A", "a", "mock", "1.0.0"))
            .await
            .unwrap();
        let mut updated = Component::new("ignored", "renamed", "mock", "2.0.0");
        updated.id = "Z".into();
        reg.update("A", updated).await.unwrap();

        let got = reg.get("A").await.unwrap();
        assert_eq!(got.id, "A");
        assert_eq!(got.name, "renamed");
        assert_eq!(got.version, "2.0.0");
        // creation event survives the update
        assert_eq!(got.event_history.unwrap().snapshot()[0].message, "Created component!");
    }

    #[tokio::test]
    async fn get_by_matches_closed_fields() {
        let reg = registry().await;
        reg.register(Component::new("A", "alpha", "mock", "1.0.0"))
            .await
            .unwrap();
        reg.register(Component::new("B", "beta", "mock", "1.0.0"))
            .await
            .unwrap();

        let by_kind = reg.get_by(ComponentField::Kind, "mock").await.unwrap();
        assert_eq!(by_kind.len(), 2);

        let by_name = reg.get_by(ComponentField::Name, "alpha").await.unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].id, "A");

        assert!(reg.get_by(ComponentField::Version, "9.9.9").await.is_err());
    }

    #[tokio::test]
    async fn disable_and_enable_advance_status() {
        let reg = registry().await;
        reg.register(Component::new("A", "a", "mock", "1.0.0"))
            .await
            .unwrap();
        reg.disable("A").await.unwrap();
        assert_eq!(reg.status("A").await.unwrap(), Status::Disable);
        reg.enable("A").await.unwrap();
        assert_eq!(reg.status("A").await.unwrap(), Status::Pending);

        let history = reg.get("A").await.unwrap().status_history.unwrap();
        assert_eq!(history.previous[0].status, Status::Disable);
        assert_eq!(history.previous[1].status, Status::Pending);
    }
}
