//! Unit lifecycle management

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::models::UnitSummary;
use crate::runtime::{ContainerRuntime, UnitStatus};

use super::ContainerError;

/// A registered unit ("VM") backed by one container
#[derive(Debug)]
pub struct Unit {
    /// Caller-chosen name, unique within this agent
    pub name: String,

    /// Engine container ID
    pub container_id: String,

    /// When the unit was registered
    pub created_at: DateTime<Utc>,
}

impl Unit {
    /// Twelve-character container ID, as the engine CLI prints it
    pub fn short_id(&self) -> &str {
        self.container_id.get(..12).unwrap_or(&self.container_id)
    }
}

/// Thread-safe unit handle
pub type UnitHandle = Arc<Unit>;

/// Registry slot. A name is reserved while its container is being created so
/// the slow runtime call runs without the lock held.
enum UnitEntry {
    Provisioning,
    Ready(UnitHandle),
}

/// Manages unit lifecycle on one agent
pub struct UnitManager {
    /// Container runtime adapter
    runtime: Arc<dyn ContainerRuntime>,

    /// Unit registry by name
    units: RwLock<HashMap<String, UnitEntry>>,
}

impl UnitManager {
    /// Create a new unit manager
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            units: RwLock::new(HashMap::new()),
        }
    }

    /// Create a unit. Without a name one is derived from the current time.
    pub async fn create(&self, name: Option<String>) -> Result<UnitHandle, ContainerError> {
        let name = name.unwrap_or_else(|| format!("vm_{}", Utc::now().timestamp()));
        validate_name(&name)?;

        // Reserve the name
        {
            let mut units = self.units.write().await;
            if units.contains_key(&name) {
                return Err(ContainerError::AlreadyExists(format!(
                    "VM {} already exists",
                    name
                )));
            }
            units.insert(name.clone(), UnitEntry::Provisioning);
        }

        info!(name = %name, "Creating unit");

        let created = match self.runtime.create_unit(&name).await {
            Ok(created) => created,
            Err(e) => {
                self.units.write().await.remove(&name);
                error!(name = %name, error = %e, "Unit creation failed");
                return Err(ContainerError::runtime(e));
            }
        };

        let unit = Arc::new(Unit {
            name: name.clone(),
            container_id: created.id,
            created_at: Utc::now(),
        });

        self.units
            .write()
            .await
            .insert(name.clone(), UnitEntry::Ready(unit.clone()));

        metrics::record_unit_created();
        info!(name = %name, container_id = %unit.short_id(), "Unit created");

        Ok(unit)
    }

    /// Summaries of every registered unit with live runtime status
    pub async fn list(&self) -> Vec<UnitSummary> {
        let units = self.ready_units().await;

        let statuses =
            join_all(units.iter().map(|unit| self.runtime.status(&unit.container_id))).await;

        let mut summaries: Vec<UnitSummary> = units
            .iter()
            .zip(statuses)
            .map(|(unit, status)| UnitSummary {
                name: unit.name.clone(),
                id: unit.short_id().to_string(),
                status: status.unwrap_or_else(|e| {
                    debug!(name = %unit.name, error = %e, "Status query failed");
                    UnitStatus::Unknown
                }),
            })
            .collect();

        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Deregister a unit, then stop and remove its container.
    ///
    /// Teardown is fire-and-forget: once deregistered the unit is gone from the
    /// agent's point of view, and a failed stop/remove is only logged.
    pub async fn delete(&self, name: &str) -> Result<(), ContainerError> {
        let unit = {
            let mut units = self.units.write().await;
            match units.remove(name) {
                Some(UnitEntry::Ready(unit)) => unit,
                Some(UnitEntry::Provisioning) => {
                    units.insert(name.to_string(), UnitEntry::Provisioning);
                    return Err(not_found(name));
                }
                None => return Err(not_found(name)),
            }
        };

        if let Err(e) = self.runtime.stop_and_remove(&unit.container_id).await {
            warn!(
                name = %name,
                container_id = %unit.short_id(),
                error = %e,
                "Container teardown failed after deregistration"
            );
        }

        metrics::record_unit_deleted();
        info!(name = %name, "Unit deleted");
        Ok(())
    }

    /// Run a command to completion inside a unit and return its combined output
    pub async fn exec_once(&self, name: &str, command: &str) -> Result<String, ContainerError> {
        let unit = self.get(name).await?;

        debug!(name = %name, command = %command, "Executing command");

        self.runtime
            .exec(&unit.container_id, command)
            .await
            .map_err(ContainerError::runtime)
    }

    /// Look up a ready unit
    pub async fn get(&self, name: &str) -> Result<UnitHandle, ContainerError> {
        match self.units.read().await.get(name) {
            Some(UnitEntry::Ready(unit)) => Ok(unit.clone()),
            _ => Err(not_found(name)),
        }
    }

    /// Number of ready units
    pub async fn unit_count(&self) -> usize {
        self.units
            .read()
            .await
            .values()
            .filter(|entry| matches!(entry, UnitEntry::Ready(_)))
            .count()
    }

    /// One reaper sweep: evict every unit whose container is not running.
    ///
    /// Removal is best-effort; failures are swallowed because the unit is
    /// already discarded. Returns the names that were evicted.
    pub async fn reap_once(&self) -> Vec<String> {
        let units = self.ready_units().await;
        let statuses =
            join_all(units.iter().map(|unit| self.runtime.status(&unit.container_id))).await;

        let mut reaped = Vec::new();

        for (unit, status) in units.into_iter().zip(statuses) {
            let status = match status {
                Ok(status) if status.is_running() => continue,
                Ok(status) => status,
                Err(e) => {
                    debug!(name = %unit.name, error = %e, "Status query failed, skipping");
                    continue;
                }
            };

            // Only evict the exact unit we inspected; a concurrent delete or a
            // delete-then-recreate under the same name wins.
            let evicted = {
                let mut registry = self.units.write().await;
                match registry.get(&unit.name) {
                    Some(UnitEntry::Ready(current)) if Arc::ptr_eq(current, &unit) => {
                        registry.remove(&unit.name);
                        true
                    }
                    _ => false,
                }
            };
            if !evicted {
                continue;
            }

            info!(name = %unit.name, status = %status, "Removing stopped unit");
            metrics::record_unit_reaped(status.as_str());

            if let Err(e) = self.runtime.force_remove(&unit.container_id).await {
                debug!(name = %unit.name, error = %e, "Force remove failed; ignored");
            }

            reaped.push(unit.name.clone());
        }

        reaped
    }

    async fn ready_units(&self) -> Vec<UnitHandle> {
        self.units
            .read()
            .await
            .values()
            .filter_map(|entry| match entry {
                UnitEntry::Ready(unit) => Some(unit.clone()),
                UnitEntry::Provisioning => None,
            })
            .collect()
    }
}

fn not_found(name: &str) -> ContainerError {
    ContainerError::NotFound(format!("VM {} not found", name))
}

/// Container names follow the engine's rule: `[a-zA-Z0-9][a-zA-Z0-9_.-]*`
static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("static pattern compiles")
});

fn validate_name(name: &str) -> Result<(), ContainerError> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(ContainerError::Validation(format!(
            "Invalid VM name '{}': use letters, digits, '_', '.' or '-', starting with a letter or digit",
            name
        )))
    }
}
