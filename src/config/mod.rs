//! Configuration module for minicloud
//!
//! Supports configuration via:
//! - TOML/YAML config files (`config/minicloud`, `/etc/minicloud/config`)
//! - Environment variables (with MINICLOUD_ prefix, `__` as section separator)
//! - Command line flags, applied on top by `main`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Host agent settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Router settings
    #[serde(default)]
    pub router: RouterConfig,
}

/// Host agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_agent_port")]
    pub port: u16,

    /// Docker socket path (engine default when unset)
    #[serde(default)]
    pub docker_socket: Option<String>,

    /// Image every unit is created from
    #[serde(default = "default_image")]
    pub image: String,

    /// Command that keeps a unit alive
    #[serde(default = "default_idle_command")]
    pub idle_command: Vec<String>,

    /// Shell started for interactive sessions
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Seconds between reaper sweeps
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,

    /// How long a single shell output poll waits for bytes
    #[serde(default = "default_read_poll_timeout")]
    pub read_poll_timeout_ms: u64,

    /// Maximum bytes returned by one shell output poll
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,

    /// Grace period before a stopped unit is killed
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
}

/// Router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_router_port")]
    pub port: u16,

    /// Host agent base URLs, in round-robin order
    #[serde(default = "default_agents")]
    pub agents: Vec<String>,

    /// Timeout for forwarded create/delete/exec/session calls
    #[serde(default = "default_forward_timeout")]
    pub forward_timeout_secs: u64,

    /// Timeout for each agent queried by list_all
    #[serde(default = "default_list_timeout")]
    pub list_timeout_secs: u64,

    /// Timeout for forwarded shell output polls
    #[serde(default = "default_output_timeout")]
    pub output_timeout_secs: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_agent_port() -> u16 {
    5000
}

fn default_router_port() -> u16 {
    8000
}

fn default_image() -> String {
    "alpine:latest".to_string()
}

fn default_idle_command() -> Vec<String> {
    vec!["sleep".to_string(), "infinity".to_string()]
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

fn default_reaper_interval() -> u64 {
    5
}

fn default_read_poll_timeout() -> u64 {
    500
}

fn default_read_chunk_size() -> usize {
    4096
}

fn default_stop_timeout() -> u64 {
    10
}

fn default_agents() -> Vec<String> {
    vec![
        "http://127.0.0.1:5000".to_string(),
        "http://127.0.0.1:5001".to_string(),
    ]
}

fn default_forward_timeout() -> u64 {
    15
}

fn default_list_timeout() -> u64 {
    5
}

fn default_output_timeout() -> u64 {
    5
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_agent_port(),
            docker_socket: None,
            image: default_image(),
            idle_command: default_idle_command(),
            shell: default_shell(),
            reaper_interval_secs: default_reaper_interval(),
            read_poll_timeout_ms: default_read_poll_timeout(),
            read_chunk_size: default_read_chunk_size(),
            stop_timeout_secs: default_stop_timeout(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_router_port(),
            agents: default_agents(),
            forward_timeout_secs: default_forward_timeout(),
            list_timeout_secs: default_list_timeout(),
            output_timeout_secs: default_output_timeout(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            agent: AgentConfig::default(),
            router: RouterConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        // Try to load .env file if present
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config/minicloud").required(false))
            .add_source(config::File::with_name("/etc/minicloud/config").required(false))
            .add_source(
                config::Environment::with_prefix("MINICLOUD")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("router.agents")
                    .with_list_parse_key("agent.idle_command"),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Validate the settings the agent depends on
    pub fn validate_agent(&self) -> Result<()> {
        let agent = &self.agent;
        if agent.port == 0 {
            anyhow::bail!("Agent port cannot be 0");
        }
        if agent.idle_command.is_empty() {
            anyhow::bail!("Agent idle command cannot be empty");
        }
        if agent.reaper_interval_secs == 0 {
            anyhow::bail!("Reaper interval cannot be 0");
        }
        if agent.read_poll_timeout_ms == 0 {
            anyhow::bail!("Shell read poll timeout cannot be 0");
        }
        if agent.read_chunk_size == 0 {
            anyhow::bail!("Shell read chunk size cannot be 0");
        }
        Ok(())
    }

    /// Validate the settings the router depends on
    pub fn validate_router(&self) -> Result<()> {
        let router = &self.router;
        if router.port == 0 {
            anyhow::bail!("Router port cannot be 0");
        }
        if router.agents.is_empty() {
            anyhow::bail!("Router needs at least one agent");
        }
        if let Some(bad) = router
            .agents
            .iter()
            .find(|a| !a.starts_with("http://") && !a.starts_with("https://"))
        {
            anyhow::bail!("Agent address must be an http(s) URL: {}", bad);
        }
        Ok(())
    }
}
