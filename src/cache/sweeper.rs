//! Periodic expiration of idle cache entries.

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::ContentCache;

/// Spawn the sweep task.
///
/// Runs [`ContentCache::sweep`] every `interval` until the shutdown channel
/// fires or all senders drop.
pub fn spawn_sweeper(
    cache: ContentCache,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; consume it so sweeps start one
        // interval from now.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!("Cache sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = cache.sweep();
                    if removed > 0 {
                        tracing::info!(removed, "Expired idle cache entries");
                    }
                }
            }
        }
    })
}
