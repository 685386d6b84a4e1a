//! Background loops: sample every interval, prune on a slower cadence.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::registry::StatsCore;
use crate::sample::SampleState;

/// Sample every registered metric each `interval` until cancelled.
///
/// File I/O runs on the blocking pool. The sample state moves into each
/// blocking call and comes back out, so rate baselines survive between
/// ticks.
pub async fn run_collector_loop(
    core: Arc<StatsCore>,
    mut state: SampleState,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let core = core.clone();
                let now = Utc::now().timestamp();
                let result = tokio::task::spawn_blocking(move || {
                    let written = core.collect_all(&mut state, now);
                    (state, written)
                })
                .await;
                state = match result {
                    Ok((returned, written)) => {
                        tracing::trace!(written, "Statistics tick");
                        returned
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Statistics tick panicked, resetting sample state");
                        SampleState::new()
                    }
                };
            }
        }
    }
    tracing::debug!("Statistics collector stopped");
}

/// Drop records older than `retention` every `interval` until cancelled.
pub async fn run_cleaner_loop(
    core: Arc<StatsCore>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let core = core.clone();
                let cutoff = Utc::now().timestamp() - retention.as_secs() as i64;
                match tokio::task::spawn_blocking(move || core.clean_all(cutoff)).await {
                    Ok(removed) => tracing::debug!(removed, cutoff, "Statistics retention pass"),
                    Err(e) => tracing::warn!(error = %e, "Statistics retention pass panicked"),
                }
            }
        }
    }
    tracing::debug!("Statistics cleaner stopped");
}
