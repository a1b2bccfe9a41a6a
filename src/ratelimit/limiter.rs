//! Core rate limiter implementation.

use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use tracing::{debug, trace};

use super::bucket::TokenBucket;
use super::clock::{Clock, SystemClock};
use super::key::ClientKey;
use crate::error::{Result, TurnstileError};

/// Configuration for a token-bucket limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Length of the refill window in milliseconds
    pub window_ms: u64,
    /// Bucket capacity, also the number of requests allowed per full window
    pub max_requests: u64,
}

impl LimitConfig {
    /// Create a limit allowing `max_requests` per `window_ms`.
    pub fn new(window_ms: u64, max_requests: u64) -> Self {
        Self {
            window_ms,
            max_requests,
        }
    }

    /// Reject configurations that would make the refill rate meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(TurnstileError::Config(
                "window_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_requests == 0 {
            return Err(TurnstileError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Tokens regenerated per millisecond.
    pub fn refill_rate_per_ms(&self) -> f64 {
        self.max_requests as f64 / self.window_ms as f64
    }

    fn capacity(&self) -> f64 {
        self.max_requests as f64
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The caller may proceed.
    Admit {
        /// Whole tokens left in the bucket after this admission
        remaining: u64,
    },
    /// The caller must answer with a "too many requests" response.
    Reject(Rejection),
}

impl Decision {
    /// Whether the request was admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit { .. })
    }
}

/// Details of a rejected check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// The key whose bucket was empty
    pub key: ClientKey,
    /// Requests allowed per window
    pub limit: u64,
    /// Window length in milliseconds
    pub window_ms: u64,
}

/// Admission control as seen by request-handling code.
pub trait AdmissionControl: Send + Sync {
    /// Decide whether a request from `key` may proceed.
    fn check(&self, key: &ClientKey) -> Decision;
}

/// Per-client token-bucket rate limiter.
///
/// Bucket state lives in this process only. Several instances behind a load
/// balancer each enforce their own limits, so the effective capacity grows
/// with the instance count.
///
/// The read-modify-write for one key runs while holding that key's map shard
/// lock, so concurrent checks can never spend the same token twice.
///
/// Clock readings are clamped to the latest reading the limiter has seen, so
/// a wall clock stepping backwards behaves like a paused one for every bucket,
/// including buckets recreated after a sweep.
pub struct RateLimiter<C: Clock = SystemClock> {
    /// Token buckets indexed by client key
    buckets: DashMap<ClientKey, TokenBucket>,
    /// Limit applied to every key
    config: LimitConfig,
    /// Cached `max_requests / window_ms`
    refill_rate_per_ms: f64,
    /// Time source for refills
    clock: C,
    /// Latest clock reading observed by a check or sweep
    high_water_ms: AtomicI64,
}

impl RateLimiter<SystemClock> {
    /// Create a rate limiter driven by the system clock.
    pub fn new(config: LimitConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a rate limiter driven by the given clock.
    pub fn with_clock(config: LimitConfig, clock: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            buckets: DashMap::new(),
            config,
            refill_rate_per_ms: config.refill_rate_per_ms(),
            clock,
            high_water_ms: AtomicI64::new(i64::MIN),
        })
    }

    /// Record `now_ms` and return the latest reading seen so far.
    fn observe(&self, now_ms: i64) -> i64 {
        self.high_water_ms
            .fetch_max(now_ms, Ordering::SeqCst)
            .max(now_ms)
    }

    /// Check `key` against the current clock reading.
    pub fn check(&self, key: &ClientKey) -> Decision {
        self.check_at(key, self.clock.now_ms())
    }

    /// Check `key` as if the clock read `now_ms`.
    pub fn check_at(&self, key: &ClientKey, now_ms: i64) -> Decision {
        let capacity = self.config.capacity();
        let now_ms = self.observe(now_ms);

        trace!(key = %key, now_ms, "Checking rate limit");

        let mut bucket = self.buckets.entry(key.clone()).or_insert_with(|| {
            debug!(
                key = %key,
                capacity = self.config.max_requests,
                window_ms = self.config.window_ms,
                "Creating new token bucket"
            );
            TokenBucket::full(capacity, now_ms)
        });

        bucket.refill(now_ms, self.refill_rate_per_ms, capacity);

        if bucket.try_take() {
            Decision::Admit {
                remaining: bucket.tokens().floor() as u64,
            }
        } else {
            drop(bucket);
            debug!(key = %key, "Rate limit exceeded");
            Decision::Reject(Rejection {
                key: key.clone(),
                limit: self.config.max_requests,
                window_ms: self.config.window_ms,
            })
        }
    }

    /// Remove buckets idle for at least `idle_ms` that have refilled to capacity.
    ///
    /// A removed key is recreated full on its next check. Because readings never
    /// go below the sweep's own reading, a kept bucket would also be full by
    /// then, so sweeping never changes a decision.
    pub fn sweep_idle(&self, idle_ms: u64) -> usize {
        self.sweep_idle_at(self.clock.now_ms(), idle_ms)
    }

    /// Sweep as if the clock read `now_ms`.
    pub fn sweep_idle_at(&self, now_ms: i64, idle_ms: u64) -> usize {
        let capacity = self.config.capacity();
        let now_ms = self.observe(now_ms);
        let idle_ms = i64::try_from(idle_ms).unwrap_or(i64::MAX);
        let before = self.buckets.len();

        self.buckets.retain(|_, bucket| {
            if now_ms.saturating_sub(bucket.last_updated_ms()) < idle_ms {
                return true;
            }
            let mut projected = bucket.clone();
            projected.refill(now_ms, self.refill_rate_per_ms, capacity);
            !projected.is_full(capacity)
        });

        before.saturating_sub(self.buckets.len())
    }

    /// The limit applied to every key.
    pub fn config(&self) -> LimitConfig {
        self.config
    }

    /// Get the number of tracked buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl<C: Clock> AdmissionControl for RateLimiter<C> {
    fn check(&self, key: &ClientKey) -> Decision {
        RateLimiter::check(self, key)
    }
}
