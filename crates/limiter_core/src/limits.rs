use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse category of data operation, used to select a rate-limit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationClass {
    Read,
    Write,
    Bulk,
    Auth,
    Search,
    Upload,
}

impl OperationClass {
    pub const ALL: [Self; 6] = [
        Self::Read,
        Self::Write,
        Self::Bulk,
        Self::Auth,
        Self::Search,
        Self::Upload,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Bulk => "bulk",
            Self::Auth => "auth",
            Self::Search => "search",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationClass {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "bulk" => Ok(Self::Bulk),
            "auth" => Ok(Self::Auth),
            "search" => Ok(Self::Search),
            "upload" => Ok(Self::Upload),
            other => Err(ConfigError::UnknownClass(other.to_string())),
        }
    }
}

/// Budget for one operation class: up to `max_requests` admissions per
/// `window`, with the full window's worth available as burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    /// # Panics
    ///
    /// Panics if either parameter is zero.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        assert!(max_requests > 0, "max_requests must be greater than 0");
        assert!(!window.is_zero(), "window must be greater than 0");

        Self {
            max_requests,
            window,
        }
    }
}

/// Process-wide class -> budget mapping. `Default` is the shipped table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitTable {
    pub read: RateLimitConfig,
    pub write: RateLimitConfig,
    pub bulk: RateLimitConfig,
    pub auth: RateLimitConfig,
    pub search: RateLimitConfig,
    pub upload: RateLimitConfig,
}

impl Default for LimitTable {
    fn default() -> Self {
        let minute = Duration::from_millis(60_000);

        Self {
            read: RateLimitConfig::new(100, minute),
            write: RateLimitConfig::new(30, minute),
            bulk: RateLimitConfig::new(10, minute),
            auth: RateLimitConfig::new(20, minute),
            search: RateLimitConfig::new(50, minute),
            upload: RateLimitConfig::new(20, minute),
        }
    }
}

impl LimitTable {
    pub fn get(&self, class: OperationClass) -> RateLimitConfig {
        match class {
            OperationClass::Read => self.read,
            OperationClass::Write => self.write,
            OperationClass::Bulk => self.bulk,
            OperationClass::Auth => self.auth,
            OperationClass::Search => self.search,
            OperationClass::Upload => self.upload,
        }
    }

    pub fn get_mut(&mut self, class: OperationClass) -> &mut RateLimitConfig {
        match class {
            OperationClass::Read => &mut self.read,
            OperationClass::Write => &mut self.write,
            OperationClass::Bulk => &mut self.bulk,
            OperationClass::Auth => &mut self.auth,
            OperationClass::Search => &mut self.search,
            OperationClass::Upload => &mut self.upload,
        }
    }

    /// Rejects tables with empty budgets or a broken priority order.
    ///
    /// Invariant: `read > search > write > bulk` on `max_requests`; cheaper,
    /// more frequent operations always get the bigger budget.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for class in OperationClass::ALL {
            let config = self.get(class);
            if config.max_requests == 0 || config.window.is_zero() {
                return Err(ConfigError::NonPositiveLimit(class));
            }
        }

        let ordered = self.read.max_requests > self.search.max_requests
            && self.search.max_requests > self.write.max_requests
            && self.write.max_requests > self.bulk.max_requests;
        if !ordered {
            return Err(ConfigError::BrokenPriorityOrder);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown operation class: {0}")]
    UnknownClass(String),

    #[error("{0} limit must have a positive max_requests and window")]
    NonPositiveLimit(OperationClass),

    #[error("limit table breaks the read > search > write > bulk priority order")]
    BrokenPriorityOrder,
}
