//! minicloud library
//!
//! A tiny multi-tenant cloud: host agents run sandboxed units on a container
//! runtime and expose interactive shells into them, and a router spreads
//! unit creation across a fixed pool of agents.

use std::sync::Arc;
use std::time::Duration;

pub mod api;
pub mod config;
pub mod container;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod router;
pub mod runtime;

/// Host agent state shared across all handlers
pub struct AgentState {
    pub config: config::AgentConfig,
    pub units: Arc<container::UnitManager>,
    pub sessions: container::SessionManager,
}

impl AgentState {
    pub fn new(config: config::AgentConfig, runtime: Arc<dyn runtime::ContainerRuntime>) -> Self {
        let units = Arc::new(container::UnitManager::new(runtime.clone()));
        let sessions = container::SessionManager::new(
            units.clone(),
            runtime,
            Duration::from_millis(config.read_poll_timeout_ms),
            config.read_chunk_size,
        );

        Self {
            config,
            units,
            sessions,
        }
    }
}
