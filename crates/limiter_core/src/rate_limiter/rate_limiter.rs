use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::limits::RateLimitConfig;
use crate::rate_limiter::algorithm::{AllowResult, BucketState, RateLimitAlgorithm};
use crate::rate_limiter::token_bucket::TokenBucket;

/// Raised by [`RateLimiter::check`] when a key is over budget.
#[derive(Debug)]
pub struct Denied {
    pub retry_after: Duration,
    pub snapshot: BucketState,
}

/// Keyed bucket store. Buckets are created lazily on first check and are
/// fully independent of each other; the map lock serializes every
/// refill-then-decrement, so token counts hold their bounds under
/// concurrent callers.
pub struct RateLimiter<K, A = TokenBucket> {
    buckets: Arc<Mutex<HashMap<K, A>>>,
}

impl<K, A> Clone for RateLimiter<K, A> {
    fn clone(&self) -> Self {
        Self {
            buckets: Arc::clone(&self.buckets),
        }
    }
}

impl<K, A> Default for RateLimiter<K, A>
where
    K: Eq + Hash,
    A: RateLimitAlgorithm,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, A> RateLimiter<K, A>
where
    K: Eq + Hash,
    A: RateLimitAlgorithm,
{
    pub fn new() -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Admits or denies one request for `key` at `now`.
    ///
    /// A never-seen key gets a fresh full bucket and is admitted
    /// immediately, leaving `max_requests - 1` tokens behind.
    pub fn check(
        &self,
        key: K,
        config: RateLimitConfig,
        now: Instant,
    ) -> Result<BucketState, Denied> {
        let mut buckets = self.buckets.lock().unwrap();

        let bucket = buckets.entry(key).or_insert_with(|| A::new(config, now));

        bucket.set_last_seen(now);

        match bucket.allow(now) {
            AllowResult::Allowed => Ok(bucket.state(now)),
            AllowResult::Denied { retry_after } => Err(Denied {
                retry_after,
                snapshot: bucket.state(now),
            }),
        }
    }

    /// Read-only view for quota displays. Never consumes a token and never
    /// creates a bucket; a never-seen key reports a full budget.
    pub fn status(&self, key: &K, config: RateLimitConfig, now: Instant) -> BucketState {
        let buckets = self.buckets.lock().unwrap();

        match buckets.get(key) {
            Some(bucket) => bucket.state(now),
            None => BucketState {
                limit: config.max_requests,
                remaining: config.max_requests,
                reset_after: Duration::ZERO,
            },
        }
    }

    /// Forgets `key` entirely; the next check starts from a fresh bucket.
    /// No-op for a never-seen key.
    pub fn reset(&self, key: &K) {
        self.buckets.lock().unwrap().remove(key);
    }

    /// Drops buckets idle for longer than `ttl`. Safe whenever `ttl` covers
    /// the refill window: a bucket idle past its window is full again, so
    /// forgetting it is indistinguishable from keeping it.
    pub fn cleanup(&self, ttl: Duration) {
        let mut buckets = self.buckets.lock().unwrap();
        let before = buckets.len();

        let now = Instant::now();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_seen()) <= ttl);

        tracing::debug!(before, after = buckets.len(), "swept idle rate buckets");
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.lock().unwrap().len()
    }
}
