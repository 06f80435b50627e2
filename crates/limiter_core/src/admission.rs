use std::future::Future;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::limits::{ConfigError, LimitTable, OperationClass, RateLimitConfig};
use crate::rate_limiter::algorithm::BucketState;
use crate::rate_limiter::RateLimiter;

/// Admission was denied: the caller is over budget for this class.
///
/// Recoverable by waiting; `retry_after` is the recommended wait in whole
/// seconds, a single-token replenishment estimate rather than an exact bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limit exceeded for {operation_class}, retry after {retry_after}s")]
pub struct RateLimitError {
    pub operation_class: OperationClass,
    pub retry_after: u64,
}

/// Per-caller, per-class admission control over one keyed bucket store.
///
/// Constructed and shared explicitly (an `Arc` in server state, a plain
/// value in tests) rather than living as a module-level singleton, so each
/// process can run as many independent gates as it wants.
pub struct AdmissionGate {
    store: RateLimiter<String>,
    limits: LimitTable,
}

impl Default for AdmissionGate {
    fn default() -> Self {
        // The shipped table upholds its own invariants.
        Self {
            store: RateLimiter::new(),
            limits: LimitTable::default(),
        }
    }
}

impl AdmissionGate {
    /// Builds a gate over `limits`, rejecting invalid tables up front.
    pub fn new(limits: LimitTable) -> Result<Self, ConfigError> {
        limits.validate()?;

        Ok(Self {
            store: RateLimiter::new(),
            limits,
        })
    }

    pub fn limits(&self) -> &LimitTable {
        &self.limits
    }

    /// Bucket key for an (identity, class) pair. Identity is opaque; the
    /// gate neither parses nor validates it.
    fn key(identity: &str, class: OperationClass) -> String {
        format!("{identity}:{class}")
    }

    pub fn check(
        &self,
        identity: &str,
        class: OperationClass,
    ) -> Result<BucketState, RateLimitError> {
        self.check_at(identity, class, Instant::now())
    }

    pub fn check_at(
        &self,
        identity: &str,
        class: OperationClass,
        now: Instant,
    ) -> Result<BucketState, RateLimitError> {
        let config = self.limits.get(class);

        self.store
            .check(Self::key(identity, class), config, now)
            .map_err(|denied| {
                tracing::debug!(
                    identity,
                    class = %class,
                    remaining = denied.snapshot.remaining,
                    "admission denied"
                );
                RateLimitError {
                    operation_class: class,
                    retry_after: retry_after_secs(config),
                }
            })
    }

    pub fn status(&self, identity: &str, class: OperationClass) -> BucketState {
        self.status_at(identity, class, Instant::now())
    }

    pub fn status_at(&self, identity: &str, class: OperationClass, now: Instant) -> BucketState {
        self.store
            .status(&Self::key(identity, class), self.limits.get(class), now)
    }

    /// Restores `(identity, class)` to never-seen.
    pub fn reset(&self, identity: &str, class: OperationClass) {
        self.store.reset(&Self::key(identity, class));
    }

    /// Sweeps buckets idle longer than `ttl`; see [`RateLimiter::cleanup`].
    pub fn cleanup(&self, ttl: Duration) {
        self.store.cleanup(ttl);
    }
}

/// ceil(window / max_requests) in whole seconds, floored at one second.
fn retry_after_secs(config: RateLimitConfig) -> u64 {
    let per_token_ms = (config.window.as_millis() / config.max_requests as u128).max(1);
    per_token_ms.div_ceil(1000) as u64
}

/// Gates `op` behind an admission check for `(identity, class)`.
///
/// Runs `op` exactly once when admitted; when denied, fails with
/// [`RateLimitError`] without ever polling `op`. Failures of `op` itself
/// pass through untouched.
pub async fn with_rate_limit<F, T, E>(
    gate: &AdmissionGate,
    identity: &str,
    class: OperationClass,
    op: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<RateLimitError>,
{
    gate.check(identity, class)?;
    op.await
}
