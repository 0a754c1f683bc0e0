//! Background sweep evicting units whose container stopped running

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::UnitManager;

/// Spawn the reaper loop. It runs until the returned handle is aborted.
pub fn spawn_reaper(units: Arc<UnitManager>, every: Duration) -> JoinHandle<()> {
    info!(interval_secs = every.as_secs_f64(), "Reaper started");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let reaped = units.reap_once().await;
            if !reaped.is_empty() {
                debug!(count = reaped.len(), units = ?reaped, "Reaper sweep evicted units");
            }
        }
    })
}
