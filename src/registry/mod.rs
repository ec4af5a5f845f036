//! # Typed registries over the engine's entities.
//!
//! Each registry owns its id map behind a `tokio::sync::RwLock`; entities live
//! in `Arc` slots carrying their own history locks, so independent workers can
//! advance different entities without contending on the registry lock. Callers
//! receive value snapshots, never references into registry internals.

mod components;
mod drivers;
mod graph;
mod monitorings;
mod plans;
mod tasks;

pub use components::{ComponentField, ComponentRegistry};
pub use drivers::{ControllerRegistry, DriverRegistry, MonitoringControllerRegistry};
pub use monitorings::{MonitoringField, MonitoringRegistry};
pub use plans::PlanRegistry;
pub use tasks::TaskRegistry;

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

// Entity-local locks are only held for field reads/writes, never across an
// await; a poisoned lock cannot leave the data inconsistent, so recover it.

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Generates a fresh unique id for entities and executions.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
