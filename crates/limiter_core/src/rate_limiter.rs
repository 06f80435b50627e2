pub mod algorithm;
pub mod rate_limiter;
pub mod token_bucket;

pub use rate_limiter::{Denied, RateLimiter};
pub use token_bucket::TokenBucket;
