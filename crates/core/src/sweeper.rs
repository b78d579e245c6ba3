//! Background reconciliation sweeper.
//!
//! A single long-running task, not one per swap. Each pass snapshots the
//! non-terminal swap ids and pushes every one of them through `advance`
//! with bounded parallelism. Failures are logged and swallowed — one bad
//! swap must not stall the rest, and the next pass retries everything.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::orchestrator::Orchestrator;

/// How many swaps a pass advances concurrently.
const SWEEP_CONCURRENCY: usize = 8;

/// Advance every non-terminal swap once.
pub async fn sweep_once(orch: &Orchestrator) {
    let ids = orch.registry().non_terminal_ids();
    if ids.is_empty() {
        return;
    }
    debug!(swaps = ids.len(), "sweeping");

    stream::iter(ids)
        .for_each_concurrent(SWEEP_CONCURRENCY, |id| async move {
            if let Err(e) = orch.advance(&id).await {
                warn!(swap_id = %id, error = %e, "sweep advance failed");
            }
        })
        .await;
}

/// Spawn the sweeper loop. Runs until the returned handle is aborted at
/// shutdown; any in-flight mutation either persisted already or the next
/// start re-enters `advance` from a consistent snapshot.
pub fn spawn(orch: Arc<Orchestrator>) -> JoinHandle<()> {
    let interval = Duration::from_secs(orch.settings().sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep_once(&orch).await;
        }
    })
}
