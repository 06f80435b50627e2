pub mod limiter_metrics;

pub use limiter_metrics::LimiterMetrics;
