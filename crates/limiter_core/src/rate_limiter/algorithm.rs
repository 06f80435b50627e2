use std::time::{Duration, Instant};

use crate::limits::RateLimitConfig;

/// Outcome of a single admission attempt.
pub enum AllowResult {
    Allowed,
    Denied { retry_after: Duration },
}

/// Point-in-time view of a bucket, for quota displays and response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketState {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

pub trait RateLimitAlgorithm: Sized {
    fn new(config: RateLimitConfig, now: Instant) -> Self;
    fn allow(&mut self, now: Instant) -> AllowResult;
    fn state(&self, now: Instant) -> BucketState;
    fn last_seen(&self) -> Instant;
    fn set_last_seen(&mut self, now: Instant);
}
