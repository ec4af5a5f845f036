//! # Controller contracts: the plug-in surface for component and monitoring drivers.
//!
//! A [`Controller`] validates component/task metadata and executes task actions
//! against components. A [`MonitoringController`] validates monitoring configs
//! and runs checks. Drivers are registered by kind string in a
//! [`DriverRegistry`](crate::registry::DriverRegistry) and resolved at
//! validation/execution time; entities reference them only by kind.
//!
//! All methods reduce driver-internal failures to a single
//! [`ControllerError`] value.
//!
//! # Example
//! ```
//! use async_trait::async_trait;
//! use planvisor::{Controller, ControllerError, Metadata};
//!
//! struct Noop;
//!
//! #[async_trait]
//! impl Controller for Noop {
//!     async fn validate_component(&self, _meta: &Metadata) -> Result<(), ControllerError> {
//!         Ok(())
//!     }
//!     async fn check_component(&self, _meta: &Metadata) -> Result<(), ControllerError> {
//!         Ok(())
//!     }
//!     async fn validate_task(&self, _meta: &Metadata) -> Result<(), ControllerError> {
//!         Ok(())
//!     }
//!     async fn run_task(
//!         &self,
//!         _task_meta: &Metadata,
//!         _component_meta: &Metadata,
//!     ) -> Result<(), ControllerError> {
//!         Ok(())
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Metadata;
use crate::error::ControllerError;

/// Shared handle to a task controller driver.
pub type ControllerRef = Arc<dyn Controller>;

/// Shared handle to a monitoring controller driver.
pub type MonitoringControllerRef = Arc<dyn MonitoringController>;

/// Driver that validates metadata and executes task actions against components.
#[async_trait]
pub trait Controller: Send + Sync + 'static {
    /// Validates component metadata at registration/update time.
    async fn validate_component(&self, meta: &Metadata) -> Result<(), ControllerError>;

    /// Probes a component's current condition.
    async fn check_component(&self, meta: &Metadata) -> Result<(), ControllerError>;

    /// Validates task metadata before execution.
    async fn validate_task(&self, meta: &Metadata) -> Result<(), ControllerError>;

    /// Applies the task action described by `task_meta` to the component
    /// described by `component_meta`.
    async fn run_task(
        &self,
        task_meta: &Metadata,
        component_meta: &Metadata,
    ) -> Result<(), ControllerError>;
}

impl fmt::Debug for dyn Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Controller")
    }
}

/// Driver behind monitoring probes and their checks.
#[async_trait]
pub trait MonitoringController: Send + Sync + 'static {
    /// Validates a monitoring config at registration/update time.
    async fn validate_monitoring(&self, config: &Metadata) -> Result<(), ControllerError>;

    /// Probes the monitoring system itself.
    async fn check_monitoring(&self, config: &Metadata) -> Result<(), ControllerError>;

    /// Validates check metadata.
    async fn validate_check(&self, meta: &Metadata) -> Result<(), ControllerError>;

    /// Runs a check; the return value decides the check's outcome.
    async fn run_check(&self, meta: &Metadata) -> Result<(), ControllerError>;
}
