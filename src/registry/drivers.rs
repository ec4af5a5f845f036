//! # Driver registry: maps kind strings to controller drivers.
//!
//! One generic registry serves both controller families;
//! [`ControllerRegistry`] and [`MonitoringControllerRegistry`] are its two
//! instantiations. Kinds are opaque strings (`"cluster"`, `"ssh"`, ...);
//! entities reference drivers by kind only.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use crate::controller::{Controller, MonitoringController};
use crate::error::RegistryError;

/// Registry of task controller drivers.
pub type ControllerRegistry = DriverRegistry<dyn Controller>;

/// Registry of monitoring controller drivers.
pub type MonitoringControllerRegistry = DriverRegistry<dyn MonitoringController>;

/// Maps controller-kind strings to driver handles.
pub struct DriverRegistry<T: ?Sized> {
    drivers: RwLock<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized> DriverRegistry<T> {
    pub fn new() -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a driver under `kind`.
    ///
    /// # Errors
    /// `AlreadyRegistered` if the kind exists.
    pub async fn register(
        &self,
        kind: impl Into<String>,
        driver: Arc<T>,
    ) -> Result<(), RegistryError> {
        let kind = kind.into();
        let mut drivers = self.drivers.write().await;
        if drivers.contains_key(&kind) {
            warn!(kind = %kind, "controller kind already registered");
            return Err(RegistryError::AlreadyRegistered {
                entity: "controller",
                id: kind,
            });
        }
        drivers.insert(kind, driver);
        Ok(())
    }

    /// Resolves the driver for `kind`.
    ///
    /// # Errors
    /// `NotFound` if no driver is registered under `kind`.
    pub async fn get(&self, kind: &str) -> Result<Arc<T>, RegistryError> {
        self.drivers
            .read()
            .await
            .get(kind)
            .cloned()
            .ok_or_else(|| RegistryError::not_found("controller", kind))
    }

    /// All registered kinds, order unspecified.
    pub async fn kinds(&self) -> Vec<String> {
        self.drivers.read().await.keys().cloned().collect()
    }

    /// Replaces the driver under `kind`, inserting if absent. Idempotent.
    pub async fn update(&self, kind: impl Into<String>, driver: Arc<T>) {
        self.drivers.write().await.insert(kind.into(), driver);
    }

    /// Removes the driver under `kind` if present. Idempotent.
    pub async fn remove(&self, kind: &str) {
        self.drivers.write().await.remove(kind);
    }

    pub async fn contains(&self, kind: &str) -> bool {
        self.drivers.read().await.contains_key(kind)
    }
}

impl<T: ?Sized> Default for DriverRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
