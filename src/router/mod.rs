//! Router in front of a pool of host agents
//!
//! Create requests rotate across the configured agents, listings fan out to
//! all of them, and every other operation goes to the agent the caller names.

mod client;
mod cursor;

use crate::config::RouterConfig;

pub use client::{AgentClient, AgentReply, ForwardError};
pub use cursor::RoundRobin;

/// Response header naming the agent a create was forwarded to
pub const AGENT_HEADER: &str = "x-minicloud-agent";

/// State shared by the router handlers
pub struct RouterState {
    pub config: RouterConfig,
    pub cursor: RoundRobin,
    pub client: AgentClient,
}

impl RouterState {
    pub fn new(config: RouterConfig) -> anyhow::Result<Self> {
        let client = AgentClient::new(&config)?;
        let cursor = RoundRobin::new(config.agents.clone());

        Ok(Self {
            config,
            cursor,
            client,
        })
    }
}
