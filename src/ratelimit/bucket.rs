//! Token bucket state.

/// Per-key admission state.
///
/// Tokens are tracked as a real number so partial refills accumulate between
/// checks instead of being rounded away.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucket {
    /// Tokens currently available, `0 <= tokens <= capacity`
    tokens: f64,
    /// Clock reading of the last refill, in milliseconds
    last_updated_ms: i64,
}

impl TokenBucket {
    /// Create a bucket holding `capacity` tokens.
    pub fn full(capacity: f64, now_ms: i64) -> Self {
        Self {
            tokens: capacity,
            last_updated_ms: now_ms,
        }
    }

    /// Add the tokens earned since the last update, capped at `capacity`.
    ///
    /// A reading earlier than the last update counts as zero elapsed time and
    /// leaves the stored timestamp where it is.
    pub fn refill(&mut self, now_ms: i64, rate_per_ms: f64, capacity: f64) {
        let elapsed = now_ms.saturating_sub(self.last_updated_ms).max(0);
        self.tokens = (self.tokens + elapsed as f64 * rate_per_ms).min(capacity);
        self.last_updated_ms = self.last_updated_ms.max(now_ms);
    }

    /// Consume one token if at least one is available.
    pub fn try_take(&mut self) -> bool {
        if self.tokens < 1.0 {
            return false;
        }
        self.tokens -= 1.0;
        true
    }

    /// Tokens currently available.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Clock reading of the last refill.
    pub fn last_updated_ms(&self) -> i64 {
        self.last_updated_ms
    }

    /// Whether the bucket holds its full capacity.
    pub fn is_full(&self, capacity: f64) -> bool {
        self.tokens >= capacity
    }
}
