//! # Engine configuration.
//!
//! [`Config`] centralizes runtime settings: event bus capacity, the concurrency
//! cap for plan graph workers, and how long a `blocking` dependency may be
//! awaited.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use planvisor::Config;
//!
//! let mut cfg = Config::default();
//! cfg.max_concurrent_graphs = 4;
//! cfg.blocking_timeout = Some(Duration::from_secs(30));
//!
//! assert_eq!(cfg.bus_capacity, 1024);
//! ```

use std::time::Duration;

/// Runtime settings shared by the registries.
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the runtime event bus channel.
    pub bus_capacity: usize,
    /// Maximum number of task graphs a plan runs concurrently (0 = unlimited).
    pub max_concurrent_graphs: usize,
    /// How long a `blocking` dependency is awaited (`None` = indefinitely).
    pub blocking_timeout: Option<Duration>,
}

impl Config {
    /// Concurrency limit as an `Option`, mapping 0 to "unlimited".
    pub fn graph_concurrency(&self) -> Option<usize> {
        match self.max_concurrent_graphs {
            0 => None,
            n => Some(n),
        }
    }
}

impl Default for Config {
    /// - `bus_capacity = 1024`
    /// - `max_concurrent_graphs = 0` (unlimited)
    /// - `blocking_timeout = None` (wait indefinitely)
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            max_concurrent_graphs: 0,
            blocking_timeout: None,
        }
    }
}
