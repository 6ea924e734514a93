//! Fixed-interval delta polling.
//!
//! One poll task runs per active scope. Each tick asks the backend for
//! events newer than the high-water mark and merges them at the head of
//! the event collection. Failed ticks log and keep going — transient
//! backend trouble self-heals on the next tick, and the interval is never
//! stretched (no backoff, matching the observed upstream behavior).

use crate::sync::controller::Shared;
use crate::sync::SyncError;
use std::sync::atomic::Ordering;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Cancellation handle for a scope's poll task.
///
/// The controller owns exactly one per active scope; dropping (or
/// stopping) it aborts the task, so no orphaned timer from a previous
/// scope can ever fire.
pub(crate) struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub(crate) fn stop(self) {
        self.task.abort();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn the poll task for the scope identified by `epoch`.
///
/// The first tick fires one full interval after the scope bootstrapped;
/// the bootstrap page load is the baseline, not tick zero.
pub(crate) fn spawn(shared: Weak<Shared>, epoch: u64, interval: Duration) -> PollHandle {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // interval's immediate first tick

        let mut consecutive_failures: u32 = 0;
        loop {
            ticker.tick().await;
            // Weak: a dropped controller must not keep the timer alive
            let Some(shared) = shared.upgrade() else {
                break;
            };
            match poll_once(&shared, epoch).await {
                Ok(0) => {
                    consecutive_failures = 0;
                }
                Ok(merged) => {
                    consecutive_failures = 0;
                    tracing::debug!(merged, "Delta poll merged new events");
                }
                Err(SyncError::StaleScope) => {
                    // A new scope owns the state now; this task is done.
                    tracing::trace!(epoch, "Poll task exiting after scope change");
                    break;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        error = %e,
                        consecutive_failures,
                        "Delta poll failed, will retry on next tick"
                    );
                }
            }
        }
    });

    PollHandle { task }
}

/// One delta tick: fetch everything newer than the high-water mark and
/// merge it, atomically from the caller's perspective — either all new
/// events land with an updated mark, or none do.
pub(crate) async fn poll_once(shared: &Shared, epoch: u64) -> Result<usize, SyncError> {
    // Snapshot the baseline without holding the lock across the fetch
    let (scope, baseline) = {
        let state = shared.lock_state();
        if shared.epoch.load(Ordering::Acquire) != epoch {
            return Err(SyncError::StaleScope);
        }
        (state.scope.clone(), state.last_seen_max_id)
    };

    // Delta queries are only meaningful once a baseline exists
    let Some(after_id) = baseline else {
        tracing::trace!("No events loaded yet, skipping delta tick");
        return Ok(0);
    };

    let mut fresh = shared.api.events_after(&scope, after_id).await?;
    if fresh.is_empty() {
        return Ok(0);
    }

    // Server order is not contractually guaranteed
    fresh.sort_by_key(|e| e.event_id);

    let mut state = shared.lock_state();
    if shared.epoch.load(Ordering::Acquire) != epoch {
        return Err(SyncError::StaleScope);
    }

    // The mark may have advanced while the fetch was in flight
    let high_water = state.last_seen_max_id.unwrap_or(after_id);
    fresh.retain(|e| e.event_id > high_water);
    let Some(new_max) = fresh.last().map(|e| e.event_id) else {
        return Ok(0);
    };

    let merged = fresh.len();
    // Newest-first at the head: reverse the ascending batch, then append
    // the existing collection behind it.
    fresh.reverse();
    fresh.extend(state.events.drain(..));
    state.events = fresh;
    state.event_pager.add_total(merged as u64);
    state.last_seen_max_id = Some(new_max.max(high_water));

    Ok(merged)
}
