//! Background task reclaiming idle sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::registry::SessionRegistry;

/// Spawn a task that sweeps `registry` every `interval` until `shutdown`
/// flips or its sender is dropped.
pub fn spawn_sweep_task(
    registry: Arc<SessionRegistry>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let removed = registry.sweep(Instant::now()).await;
                    let remaining = registry.session_count().await;
                    debug!(removed, remaining, "Sweep finished");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Session sweeper shutting down");
                        return;
                    }
                }
            }
        }
    })
}
