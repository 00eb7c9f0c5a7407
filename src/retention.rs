//! Background retention sweeper
//!
//! Deletes entries older than the retention window. Runs once at startup,
//! then on a fixed interval. Failures are logged and retried at the next
//! interval; a sweep is bounded by a timeout so it can never run forever.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::store::LogStore;

/// Entries older than this are swept.
pub const RETENTION_DAYS: i64 = 30;

const SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

const SWEEP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// The oldest instant still inside the retention window.
pub fn retention_cutoff() -> DateTime<Utc> {
    Utc::now() - chrono::Duration::days(RETENTION_DAYS)
}

/// Spawn the sweeper task.
pub fn spawn_retention_sweeper(store: Arc<LogStore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            // First tick completes immediately, running the startup sweep
            interval.tick().await;
            run_sweep(&store).await;
        }
    })
}

async fn run_sweep(store: &LogStore) {
    let cutoff = retention_cutoff();
    let start = Instant::now();
    tracing::info!(%cutoff, "starting retention sweep");

    match tokio::time::timeout(SWEEP_TIMEOUT, store.delete_before(cutoff)).await {
        Ok(Ok(deleted)) => {
            tracing::info!(
                deleted,
                duration_ms = start.elapsed().as_millis() as u64,
                "retention sweep completed"
            );
        }
        Ok(Err(e)) => {
            tracing::error!(
                error = %e,
                duration_ms = start.elapsed().as_millis() as u64,
                "retention sweep failed"
            );
        }
        Err(_) => {
            tracing::error!(
                timeout_secs = SWEEP_TIMEOUT.as_secs(),
                "retention sweep timed out"
            );
        }
    }
}
