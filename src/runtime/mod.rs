//! Container runtime adapter
//!
//! The host agent never talks to the container engine directly. Everything it
//! needs (create, inspect, teardown, one-shot exec and interactive attach) goes
//! through [`ContainerRuntime`], which keeps the registries testable without a
//! Docker daemon.

mod docker;

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::io;
use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;

pub use docker::DockerRuntime;

/// Identity of a container created for a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeUnit {
    /// Full engine container ID
    pub id: String,
    /// Container name (equal to the unit name)
    pub name: String,
}

/// Live container status as reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    /// The engine no longer knows the container
    Missing,
    Unknown,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Created => "created",
            UnitStatus::Running => "running",
            UnitStatus::Paused => "paused",
            UnitStatus::Restarting => "restarting",
            UnitStatus::Removing => "removing",
            UnitStatus::Exited => "exited",
            UnitStatus::Dead => "dead",
            UnitStatus::Missing => "missing",
            UnitStatus::Unknown => "unknown",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, UnitStatus::Running)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write half of an attached shell
pub type ShellInput = Pin<Box<dyn AsyncWrite + Send>>;

/// Read half of an attached shell, yielding raw output chunks
pub type ShellOutput = Pin<Box<dyn Stream<Item = io::Result<Vec<u8>>> + Send>>;

/// Raw bidirectional byte stream attached to a shell process inside a unit
pub struct ShellStream {
    pub input: ShellInput,
    pub output: ShellOutput,
}

impl ShellStream {
    pub fn new(input: ShellInput, output: ShellOutput) -> Self {
        Self { input, output }
    }
}

impl fmt::Debug for ShellStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellStream").finish_non_exhaustive()
    }
}

/// Common interface to the underlying container engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a long-lived idle container named `name`
    async fn create_unit(&self, name: &str) -> Result<RuntimeUnit>;

    /// Query the live status of a container; a container the engine does not
    /// know is `Missing`, not an error
    async fn status(&self, id: &str) -> Result<UnitStatus>;

    /// Stop a container gracefully, then remove it
    async fn stop_and_remove(&self, id: &str) -> Result<()>;

    /// Remove a container regardless of its state
    async fn force_remove(&self, id: &str) -> Result<()>;

    /// Run a command to completion and return combined stdout/stderr
    async fn exec(&self, id: &str, command: &str) -> Result<String>;

    /// Start an interactive shell with a TTY and attach to it
    async fn attach_shell(&self, id: &str) -> Result<ShellStream>;
}
