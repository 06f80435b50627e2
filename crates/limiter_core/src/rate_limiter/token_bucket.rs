use std::cmp::min;
use std::time::{Duration, Instant};

use crate::limits::RateLimitConfig;
use crate::rate_limiter::algorithm::{AllowResult, BucketState, RateLimitAlgorithm};

/// Continuous-refill token bucket: tokens come back proportionally to
/// elapsed time, floored, never past `max_requests`.
#[derive(Clone)]
pub struct TokenBucket {
    max_requests: u32,
    tokens: u32,
    window: Duration,
    last_refill: Instant,
    pub last_seen: Instant,
}

impl RateLimitAlgorithm for TokenBucket {
    fn new(config: RateLimitConfig, now: Instant) -> Self {
        TokenBucket::new(config, now)
    }
    fn allow(&mut self, now: Instant) -> AllowResult {
        TokenBucket::allow(self, now)
    }
    fn state(&self, now: Instant) -> BucketState {
        TokenBucket::state(self, now)
    }
    fn last_seen(&self) -> Instant {
        self.last_seen
    }
    fn set_last_seen(&mut self, now: Instant) {
        self.last_seen = now;
    }
}

impl TokenBucket {
    pub fn new(config: RateLimitConfig, now: Instant) -> Self {
        Self {
            max_requests: config.max_requests,
            tokens: config.max_requests,
            window: config.window,
            last_refill: now,
            last_seen: now,
        }
    }

    /// floor(elapsed / window * max_requests), in integer nanosecond math.
    fn earned_tokens(&self, elapsed: Duration) -> u32 {
        let earned = elapsed.as_nanos() * self.max_requests as u128 / self.window.as_nanos();
        min(earned, self.max_requests as u128) as u32
    }

    /// Best-effort wait for one token to come back, not an exact bound.
    fn token_interval(&self) -> Duration {
        self.window / self.max_requests
    }

    pub fn allow(&mut self, now: Instant) -> AllowResult {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let earned = self.earned_tokens(elapsed);

        if earned > 0 {
            self.tokens = min(self.tokens.saturating_add(earned), self.max_requests);
            self.last_refill = now;
        }

        if self.tokens > 0 {
            self.tokens -= 1;
            return AllowResult::Allowed;
        }

        AllowResult::Denied {
            retry_after: self.token_interval(),
        }
    }

    /// Projects the refill without touching the bucket; never consumes.
    pub fn state(&self, now: Instant) -> BucketState {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let remaining = min(
            self.tokens.saturating_add(self.earned_tokens(elapsed)),
            self.max_requests,
        );

        let reset_after = if remaining == self.max_requests {
            Duration::ZERO
        } else {
            self.token_interval()
        };

        BucketState {
            limit: self.max_requests,
            remaining,
            reset_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_requests: u32, window_ms: u64) -> RateLimitConfig {
        RateLimitConfig::new(max_requests, Duration::from_millis(window_ms))
    }

    #[test]
    fn burst_up_to_capacity_then_deny() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(config(5, 1000), t0);

        for _ in 0..5 {
            assert!(matches!(bucket.allow(t0), AllowResult::Allowed));
        }
        assert!(matches!(bucket.allow(t0), AllowResult::Denied { .. }));
    }

    #[test]
    fn refill_after_full_window() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(config(5, 100), t0);

        for _ in 0..5 {
            assert!(matches!(bucket.allow(t0), AllowResult::Allowed));
        }
        assert!(matches!(bucket.allow(t0), AllowResult::Denied { .. }));

        assert!(matches!(
            bucket.allow(t0 + Duration::from_millis(100)),
            AllowResult::Allowed
        ));
    }

    #[test]
    fn no_refill_before_one_token_is_earned() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(config(5, 1000), t0);

        for _ in 0..5 {
            assert!(matches!(bucket.allow(t0), AllowResult::Allowed));
        }

        // One token takes 200ms to come back; 199ms floors to zero.
        assert!(matches!(
            bucket.allow(t0 + Duration::from_millis(199)),
            AllowResult::Denied { .. }
        ));
        assert!(matches!(
            bucket.allow(t0 + Duration::from_millis(200)),
            AllowResult::Allowed
        ));
    }

    #[test]
    fn refill_is_proportional() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(config(10, 1000), t0);

        for _ in 0..10 {
            let _ = bucket.allow(t0);
        }

        // 700ms earns exactly 7 tokens.
        let t1 = t0 + Duration::from_millis(700);
        for _ in 0..7 {
            assert!(matches!(bucket.allow(t1), AllowResult::Allowed));
        }
        assert!(matches!(bucket.allow(t1), AllowResult::Denied { .. }));
    }

    #[test]
    fn refill_never_exceeds_capacity() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(config(5, 1000), t0);

        for _ in 0..5 {
            assert!(matches!(bucket.allow(t0), AllowResult::Allowed));
        }
        assert!(matches!(bucket.allow(t0), AllowResult::Denied { .. }));

        // A long idle period refills to capacity, not past it.
        let t1 = t0 + Duration::from_secs(100);
        for _ in 0..5 {
            assert!(matches!(bucket.allow(t1), AllowResult::Allowed));
        }
        assert!(matches!(bucket.allow(t1), AllowResult::Denied { .. }));
    }

    #[test]
    fn denied_carries_single_token_estimate() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(config(10, 1000), t0);

        for _ in 0..10 {
            let _ = bucket.allow(t0);
        }

        match bucket.allow(t0) {
            AllowResult::Denied { retry_after } => {
                assert_eq!(retry_after, Duration::from_millis(100));
            }
            AllowResult::Allowed => panic!("bucket should be empty"),
        }
    }

    #[test]
    fn state_is_read_only() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(config(10, 1000), t0);

        assert!(matches!(bucket.allow(t0), AllowResult::Allowed));

        let t1 = t0 + Duration::from_millis(100);
        let first = bucket.state(t1);
        let second = bucket.state(t1);
        assert_eq!(first, second);
        assert_eq!(first.limit, 10);
        // 9 left after one admit, plus 1 earned over 100ms.
        assert_eq!(first.remaining, 10);
        assert_eq!(first.reset_after, Duration::ZERO);
    }

    #[test]
    fn state_projects_partial_refill() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(config(10, 1000), t0);

        for _ in 0..10 {
            let _ = bucket.allow(t0);
        }

        let state = bucket.state(t0 + Duration::from_millis(350));
        assert_eq!(state.remaining, 3);
        assert_eq!(state.reset_after, Duration::from_millis(100));
    }

    #[test]
    fn tokens_stay_within_bounds() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(config(5, 1000), t0);

        for step in 0..50u64 {
            let now = t0 + Duration::from_millis(step * 70);
            let _ = bucket.allow(now);
            let state = bucket.state(now);
            assert!(state.remaining <= state.limit);
        }
    }
}
