//! Shared fixtures: a scriptable task controller and monitoring controller.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use planvisor::{
    Component, Config, Controller, ControllerError, Engine, Metadata, MonitoringController,
};

/// Task controller that records every `run_task` invocation and fails when the
/// task metadata carries a `fail` key.
///
/// Invocations are logged as the task metadata's `op` value (falling back to
/// the component name) so tests can assert execution and rollback order.
#[derive(Default)]
pub struct MockController {
    pub runs: Mutex<Vec<String>>,
}

impl MockController {
    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Controller for MockController {
    async fn validate_component(&self, meta: &Metadata) -> Result<(), ControllerError> {
        if meta.contains_key("invalid") {
            return Err(ControllerError::new("metadata rejected"));
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
        task_meta: &Metadata,
        component_meta: &Metadata,
    ) -> Result<(), ControllerError> {
        let label = task_meta
            .get("op")
            .or_else(|| component_meta.get("name"))
            .cloned()
            .unwrap_or_else(|| "unnamed".into());
        self.runs.lock().unwrap().push(label);

        if let Some(ms) = task_meta.get("sleep_ms").and_then(|v| v.parse().ok()) {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        }
        if task_meta.contains_key("fail") {
            return Err(ControllerError::new("task action failed"));
        }
        Ok(())
    }
}

/// Monitoring controller that fails checks whose metadata carries a `fail` key.
#[derive(Default)]
pub struct MockMonitor {
    pub checks: Mutex<Vec<String>>,
}

#[async_trait]
impl MonitoringController for MockMonitor {
    async fn validate_monitoring(&self, _config: &Metadata) -> Result<(), ControllerError> {
        Ok(())
    }

    async fn check_monitoring(&self, _config: &Metadata) -> Result<(), ControllerError> {
        Ok(())
    }

    async fn validate_check(&self, _meta: &Metadata) -> Result<(), ControllerError> {
        Ok(())
    }

    async fn run_check(&self, meta: &Metadata) -> Result<(), ControllerError> {
        self.checks
            .lock()
            .unwrap()
            .push(meta.get("op").cloned().unwrap_or_default());
        if meta.contains_key("fail") {
            return Err(ControllerError::new("check failed"));
        }
        Ok(())
    }
}

/// Engine with a `mock` task controller and a `monitor` monitoring controller
/// registered; returns the controller handles for assertions.
pub async fn engine_with_mocks(config: Config) -> (Arc<Engine>, Arc<MockController>, Arc<MockMonitor>) {
    let engine = Engine::new(config);
    let controller = Arc::new(MockController::default());
    let monitor = Arc::new(MockMonitor::default());

    engine
        .controllers
        .register("mock", Arc::clone(&controller) as _)
        .await
        .unwrap();
    engine
        .monitor_controllers
        .register("monitor", Arc::clone(&monitor) as _)
        .await
        .unwrap();
    (engine, controller, monitor)
}

/// Registers a `mock`-typed component with the given id.
pub async fn register_component(engine: &Engine, id: &str) {
    engine
        .components
        .register(Component::new(id, id, "mock", "1.0.0"))
        .await
        .unwrap();
}

/// Metadata carrying an `op` label, so mock controllers can log the call.
pub fn op(label: &str) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("op".into(), label.into());
    meta
}

/// Metadata that makes the mock controller fail, labelled for the log.
pub fn failing_op(label: &str) -> Metadata {
    let mut meta = op(label);
    meta.insert("fail".into(), "true".into());
    meta
}
