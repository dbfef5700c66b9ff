//! Interval scheduler: runs one sync pass per tick when
//! `SYNC_INTERVAL_SECS` is configured.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use larksync_core::SyncEngine;

/// Spawn the background sync loop. A failed pass is logged and the
/// next tick retries from scratch; ticks never overlap because the
/// loop awaits each pass before sleeping again.
pub fn spawn(engine: Arc<SyncEngine>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of tokio's interval fires immediately; skip it
        // so startup does not double-trigger alongside an HTTP call.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match engine.run_pass().await {
                Ok(result) => tracing::info!(
                    synced = result.synced,
                    deleted = result.deleted,
                    "scheduled sync pass complete"
                ),
                Err(error) => tracing::error!(error = %error, "scheduled sync pass failed"),
            }
        }
    });
}
