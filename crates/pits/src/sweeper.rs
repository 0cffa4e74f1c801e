//! Periodic eviction of expired pits.

use std::sync::Arc;

use tracing::debug;

use crate::registry::PitRegistry;

/// One sweep pass: collect expired candidates, then evict each one.
///
/// Two phases on purpose. The candidate set is a snapshot; by the time a
/// candidate is deleted a client may have come back, so
/// [`PitRegistry::evict`] re-checks both eviction conditions under the
/// registry lock and aborts for any pit that is live again.
pub async fn sweep(registry: &PitRegistry) -> usize {
    let candidates = registry.expired_slugs().await;
    if candidates.is_empty() {
        return 0;
    }
    debug!(candidates = candidates.len(), "sweeping expired pits");
    let mut evicted = 0;
    for slug in candidates {
        if registry.evict(&slug).await {
            evicted += 1;
        }
    }
    evicted
}

/// Drive [`sweep`] on the registry's cleanup interval until the task is
/// aborted.
pub async fn run_sweeper(registry: Arc<PitRegistry>) {
    let mut interval = tokio::time::interval(registry.cleanup_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        sweep(&registry).await;
    }
}
