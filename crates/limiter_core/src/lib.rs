//! Admission control for the complaint platform's data API.
//!
//! Every outbound data operation is classified (read, write, bulk, auth,
//! search, upload) and gated by a per-caller token bucket before it runs.
//! [`AdmissionGate::check`] answers "may this caller do this now";
//! [`with_rate_limit`] wraps an async operation so it either runs exactly
//! once or fails fast with a [`RateLimitError`] carrying retry guidance.
//!
//! Buckets live in process memory. In a horizontally scaled deployment the
//! aggregate rate is the per-instance limit times the instance count;
//! externalizing the store is a deployment decision, not assumed here.

pub mod admission;
pub mod limits;
pub mod rate_limiter;

pub use admission::{with_rate_limit, AdmissionGate, RateLimitError};
pub use limits::{ConfigError, LimitTable, OperationClass, RateLimitConfig};
pub use rate_limiter::algorithm::{AllowResult, BucketState};
pub use rate_limiter::RateLimiter;
