//! # Engine: the wired-together registry set.
//!
//! [`Engine`] bundles the six registries with a shared [`Bus`] and [`Config`].
//! [`EngineBuilder`] lets callers swap in pre-built registries (for tests or
//! custom wiring); anything not provided is constructed with defaults in
//! dependency order.
//!
//! # Example
//! ```
//! use planvisor::{Config, Engine};
//!
//! let engine = Engine::new(Config::default());
//! assert!(engine.config.blocking_timeout.is_none());
//! ```

use std::sync::Arc;

use crate::config::Config;
use crate::events::Bus;
use crate::registry::{
    ComponentRegistry, ControllerRegistry, MonitoringControllerRegistry, MonitoringRegistry,
    PlanRegistry, TaskRegistry,
};

/// Central orchestrator handle: every registry plus the shared bus and config.
pub struct Engine {
    pub config: Config,
    pub bus: Bus,
    /// Task controller drivers by kind.
    pub controllers: Arc<ControllerRegistry>,
    /// Monitoring controller drivers by kind.
    pub monitor_controllers: Arc<MonitoringControllerRegistry>,
    pub components: Arc<ComponentRegistry>,
    pub monitorings: Arc<MonitoringRegistry>,
    pub tasks: Arc<TaskRegistry>,
    pub plans: Arc<PlanRegistry>,
}

impl Engine {
    /// Builds an engine with default registries. No controller drivers are
    /// pre-registered; callers bring their own.
    pub fn new(config: Config) -> Arc<Self> {
        Self::builder().with_config(config).build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

/// Builder for constructing an [`Engine`] with optional custom registries.
#[derive(Default)]
pub struct EngineBuilder {
    config: Option<Config>,
    controllers: Option<Arc<ControllerRegistry>>,
    monitor_controllers: Option<Arc<MonitoringControllerRegistry>>,
    components: Option<Arc<ComponentRegistry>>,
    monitorings: Option<Arc<MonitoringRegistry>>,
}

impl EngineBuilder {
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_controllers(mut self, controllers: Arc<ControllerRegistry>) -> Self {
        self.controllers = Some(controllers);
        self
    }

    pub fn with_monitor_controllers(
        mut self,
        controllers: Arc<MonitoringControllerRegistry>,
    ) -> Self {
        self.monitor_controllers = Some(controllers);
        self
    }

    pub fn with_components(mut self, components: Arc<ComponentRegistry>) -> Self {
        self.components = Some(components);
        self
    }

    pub fn with_monitorings(mut self, monitorings: Arc<MonitoringRegistry>) -> Self {
        self.monitorings = Some(monitorings);
        self
    }

    /// Builds the engine, constructing any registry not supplied in
    /// dependency order: controllers first, then the entity registries, then
    /// tasks and plans on top.
    pub fn build(self) -> Arc<Engine> {
        let config = self.config.unwrap_or_default();
        let bus = Bus::new(config.bus_capacity);

        let controllers = self
            .controllers
            .unwrap_or_else(|| Arc::new(ControllerRegistry::new()));
        let monitor_controllers = self
            .monitor_controllers
            .unwrap_or_else(|| Arc::new(MonitoringControllerRegistry::new()));
        let components = self
            .components
            .unwrap_or_else(|| ComponentRegistry::new(Arc::clone(&controllers)));
        let monitorings = self
            .monitorings
            .unwrap_or_else(|| MonitoringRegistry::new(Arc::clone(&monitor_controllers)));

        let tasks = TaskRegistry::new(
            Arc::clone(&components),
            Arc::clone(&controllers),
            Arc::clone(&monitorings),
            Arc::clone(&monitor_controllers),
            bus.clone(),
            config.clone(),
        );
        let plans = PlanRegistry::new(
            Arc::clone(&components),
            Arc::clone(&tasks),
            bus.clone(),
            config.clone(),
        );

        Arc::new(Engine {
            config,
            bus,
            controllers,
            monitor_controllers,
            components,
            monitorings,
            tasks,
            plans,
        })
    }
}
