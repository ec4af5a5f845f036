//! # Monitoring registry: CRUD over monitoring probes.
//!
//! Structurally mirrors the component registry; config validation is delegated
//! to the monitoring controller registered for the probe's kind.

use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::RegistryError;
use crate::model::{EventLog, Monitoring, Status, StatusHistory};
use crate::registry::{MonitoringControllerRegistry, new_id, read, write};
use crate::Metadata;

/// Closed set of indexed lookup fields for [`MonitoringRegistry::get_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoringField {
    Id,
    Name,
    Kind,
}

struct MonitoringData {
    name: String,
    kind: String,
    config: Metadata,
}

struct MonitoringSlot {
    id: String,
    data: StdRwLock<MonitoringData>,
    status: StdRwLock<StatusHistory>,
    events: EventLog,
}

impl MonitoringSlot {
    fn snapshot(&self) -> Monitoring {
        let data = read(&self.data);
        Monitoring {
            id: self.id.clone(),
            name: data.name.clone(),
            kind: data.kind.clone(),
            config: data.config.clone(),
            status_history: Some(read(&self.status).clone()),
            event_history: Some(self.events.clone()),
        }
    }
}

/// CRUD over monitoring probes, delegating config validation to monitoring
/// controllers.
pub struct MonitoringRegistry {
    monitorings: RwLock<HashMap<String, Arc<MonitoringSlot>>>,
    controllers: Arc<MonitoringControllerRegistry>,
}

impl MonitoringRegistry {
    pub fn new(controllers: Arc<MonitoringControllerRegistry>) -> Arc<Self> {
        Arc::new(Self {
            monitorings: RwLock::new(HashMap::new()),
            controllers,
        })
    }

    /// Registers a monitoring probe and returns the stored value.
    ///
    /// # Errors
    /// - `AlreadyRegistered` when the id exists
    /// - `UnknownType` when no monitoring controller covers `kind`
    /// - `InvalidMetadata` when the controller rejects the config
    pub async fn register(&self, mut monitoring: Monitoring) -> Result<Monitoring, RegistryError> {
        if monitoring.id.is_empty() {
            monitoring.id = new_id();
        }
        debug!(id = %monitoring.id, kind = %monitoring.kind, "registering monitoring");

        if self.monitorings.read().await.contains_key(&monitoring.id) {
            return Err(RegistryError::AlreadyRegistered {
                entity: "monitoring",
                id: monitoring.id,
            });
        }

        self.validate_config(&monitoring.kind, &monitoring.config)
            .await?;

        let slot = Arc::new(MonitoringSlot {
            id: monitoring.id.clone(),
            data: StdRwLock::new(MonitoringData {
                name: monitoring.name,
                kind: monitoring.kind,
                config: monitoring.config,
            }),
            status: StdRwLock::new(StatusHistory::new(Status::Pending)),
            events: EventLog::new(),
        });
        slot.events.record("Created monitoring!");

        let mut monitorings = self.monitorings.write().await;
        if monitorings.contains_key(&slot.id) {
            return Err(RegistryError::AlreadyRegistered {
                entity: "monitoring",
                id: slot.id.clone(),
            });
        }
        let stored = slot.snapshot();
        monitorings.insert(slot.id.clone(), slot);
        Ok(stored)
    }

    /// Returns a snapshot of the monitoring with `id`.
    pub async fn get(&self, id: &str) -> Result<Monitoring, RegistryError> {
        self.slot(id).await.map(|s| s.snapshot())
    }

    /// Returns all monitorings whose `field` stringifies to `value`.
    ///
    /// # Errors
    /// `NotFound` when nothing matches.
    pub async fn get_by(
        &self,
        field: MonitoringField,
        value: &str,
    ) -> Result<Vec<Monitoring>, RegistryError> {
        let matches = self
            .find(|m| match field {
                MonitoringField::Id => m.id == value,
                MonitoringField::Name => m.name == value,
                MonitoringField::Kind => m.kind == value,
            })
            .await;
        if matches.is_empty() {
            return Err(RegistryError::not_found("monitoring", value));
        }
        Ok(matches)
    }

    /// Linear scan with an arbitrary predicate; empty result is not an error.
    pub async fn find(&self, predicate: impl Fn(&Monitoring) -> bool) -> Vec<Monitoring> {
        self.monitorings
            .read()
            .await
            .values()
            .map(|slot| slot.snapshot())
            .filter(|m| predicate(m))
            .collect()
    }

    /// Replaces the monitoring's payload, preserving its id and histories.
    pub async fn update(&self, id: &str, updated: Monitoring) -> Result<(), RegistryError> {
        let slot = self.slot(id).await?;
        self.validate_config(&updated.kind, &updated.config).await?;

        let mut data = write(&slot.data);
        data.name = updated.name;
        data.kind = updated.kind;
        data.config = updated.config;
        Ok(())
    }

    /// Removes the monitoring with `id`.
    pub async fn delete(&self, id: &str) -> Result<(), RegistryError> {
        let mut monitorings = self.monitorings.write().await;
        monitorings
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RegistryError::not_found("monitoring", id))
    }

    /// Snapshot of all monitorings, order unspecified.
    pub async fn list(&self) -> Vec<Monitoring> {
        self.monitorings
            .read()
            .await
            .values()
            .map(|slot| slot.snapshot())
            .collect()
    }

    async fn slot(&self, id: &str) -> Result<Arc<MonitoringSlot>, RegistryError> {
        self.monitorings
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found("monitoring", id))
    }

    async fn validate_config(&self, kind: &str, config: &Metadata) -> Result<(), RegistryError> {
        let controller =
            self.controllers
                .get(kind)
                .await
                .map_err(|_| RegistryError::UnknownType {
                    kind: kind.to_string(),
                })?;
        controller
            .validate_monitoring(config)
            .await
            .map_err(|source| RegistryError::InvalidMetadata { source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::controller::MonitoringController;
    use crate::error::ControllerError;

    struct Probe;

    #[async_trait]
    impl MonitoringController for Probe {
        async fn validate_monitoring(&self, config: &Metadata) -> Result<(), ControllerError> {
            if config.get("endpoint").is_none() {
                return Err(ControllerError::new("endpoint is required"));
            }
            Ok(())
        }
        async fn check_monitoring(&self, _config: &Metadata) -> Result<(), ControllerError> {
            Ok(())
        }
        async fn validate_check(&self, _meta: &Metadata) -> Result<(), ControllerError> {
            Ok(())
        }
        async fn run_check(&self, _meta: &Metadata) -> Result<(), ControllerError> {
            Ok(())
        }
    }

    async fn registry() -> Arc<MonitoringRegistry> {
        let controllers = Arc::new(MonitoringControllerRegistry::new());
        controllers.register("probe", Arc::new(Probe)).await.unwrap();
        MonitoringRegistry::new(controllers)
    }

    fn probe_config() -> Metadata {
        let mut cfg = Metadata::new();
        cfg.insert("endpoint".into(), "http://probe:9090".into());
        cfg
    }

    #[tokio::test]
    async fn register_stamps_pending_and_event() {
        let reg = registry().await;
        let stored = reg
            .register(Monitoring::new("m1", "probe-1", "probe").with_config(probe_config()))
            .await
            .unwrap();
        assert_eq!(
            stored.status_history.as_ref().unwrap().status(),
            Status::Pending
        );
        assert_eq!(
            stored.event_history.unwrap().snapshot()[0].message,
            "Created monitoring!"
        );
    }

    #[tokio::test]
    async fn register_validates_config() {
        let reg = registry().await;
        let err = reg
            .register(Monitoring::new("m1", "probe-1", "probe"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidMetadata { .. }));
    }

    #[tokio::test]
    async fn unknown_kind_is_rejected() {
        let reg = registry().await;
        let err = reg
            .register(Monitoring::new("m1", "probe-1", "nope").with_config(probe_config()))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownType { .. }));
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let reg = registry().await;
        reg.register(Monitoring::new("m1", "probe-1", "probe").with_config(probe_config()))
            .await
            .unwrap();
        assert_eq!(reg.list().await.len(), 1);

        let matches = reg.get_by(MonitoringField::Name, "probe-1").await.unwrap();
        assert_eq!(matches[0].id, "m1");

        reg.update(
            "m1",
            Monitoring::new("", "renamed", "probe").with_config(probe_config()),
        )
        .await
        .unwrap();
        assert_eq!(reg.get("m1").await.unwrap().name, "renamed");

        reg.delete("m1").await.unwrap();
        assert!(reg.get("m1").await.is_err());
    }
}
