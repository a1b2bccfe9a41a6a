//! Background eviction of idle buckets.
//!
//! Without a sweep the bucket map grows with every distinct caller ever seen.
//! The sweeper periodically drops buckets that have been idle long enough to
//! refill completely; see [`RateLimiter::sweep_idle`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::clock::Clock;
use super::limiter::RateLimiter;

/// Configuration for the idle-bucket sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    /// How often to sweep
    pub interval: Duration,
    /// Minimum idle time before a bucket may be evicted, in milliseconds
    pub idle_ms: u64,
}

/// Spawn a task sweeping `limiter` every `config.interval`.
///
/// The task exits once `shutdown` observes `true` or its sender is dropped.
pub fn spawn_sweeper<C>(
    limiter: Arc<RateLimiter<C>>,
    config: SweeperConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    C: Clock + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        info!(
            interval_secs = config.interval.as_secs(),
            idle_ms = config.idle_ms,
            "Bucket sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = limiter.sweep_idle(config.idle_ms);
                    debug!(
                        removed,
                        remaining = limiter.bucket_count(),
                        "Swept idle buckets"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Bucket sweeper stopped");
    })
}
