use std::sync::atomic::{AtomicU64, Ordering};

use limiter_core::OperationClass;
use serde::Serialize;

/// Request counters on the admission path. Plain atomics, no locking.
#[derive(Debug, Default)]
pub struct LimiterMetrics {
    pub total_requests: AtomicU64,
    pub total_allowed: AtomicU64,
    pub total_denied: AtomicU64,
    pub read_denied: AtomicU64,
    pub write_denied: AtomicU64,
    pub bulk_denied: AtomicU64,
    pub auth_denied: AtomicU64,
    pub search_denied: AtomicU64,
    pub upload_denied: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_allowed: u64,
    pub total_denied: u64,
    pub read_denied: u64,
    pub write_denied: u64,
    pub bulk_denied: u64,
    pub auth_denied: u64,
    pub search_denied: u64,
    pub upload_denied: u64,
}

impl LimiterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_denied(&self, class: OperationClass) {
        self.total_denied.fetch_add(1, Ordering::Relaxed);
        self.class_counter(class).fetch_add(1, Ordering::Relaxed);
    }

    fn class_counter(&self, class: OperationClass) -> &AtomicU64 {
        match class {
            OperationClass::Read => &self.read_denied,
            OperationClass::Write => &self.write_denied,
            OperationClass::Bulk => &self.bulk_denied,
            OperationClass::Auth => &self.auth_denied,
            OperationClass::Search => &self.search_denied,
            OperationClass::Upload => &self.upload_denied,
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_allowed: self.total_allowed.load(Ordering::Relaxed),
            total_denied: self.total_denied.load(Ordering::Relaxed),
            read_denied: self.read_denied.load(Ordering::Relaxed),
            write_denied: self.write_denied.load(Ordering::Relaxed),
            bulk_denied: self.bulk_denied.load(Ordering::Relaxed),
            auth_denied: self.auth_denied.load(Ordering::Relaxed),
            search_denied: self.search_denied.load(Ordering::Relaxed),
            upload_denied: self.upload_denied.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denials_count_per_class_and_in_total() {
        let metrics = LimiterMetrics::new();

        metrics.record_denied(OperationClass::Write);
        metrics.record_denied(OperationClass::Write);
        metrics.record_denied(OperationClass::Bulk);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_denied, 3);
        assert_eq!(snapshot.write_denied, 2);
        assert_eq!(snapshot.bulk_denied, 1);
        assert_eq!(snapshot.read_denied, 0);
    }
}
