//! Request options and builder

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of retries after the first attempt
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default cache TTL
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(300_000);

/// Caller-declared request priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Get priority as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// Configuration for a single request
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Retries after the first attempt
    pub retry_count: u32,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Read from and write to the response cache
    pub cache: bool,
    /// How long a stored response stays fresh
    pub cache_ttl: Duration,
    /// Caller-declared priority
    pub priority: Priority,
    /// Label for metrics and health grouping (defaults to the cache key)
    pub endpoint: Option<String>,
    /// Value handed to the generic recovery fallback when nothing is cached
    pub empty_state: Option<serde_json::Value>,
    /// Mirror successful responses into the persistent stale store
    pub persist_stale: bool,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_RETRY_COUNT,
            timeout: DEFAULT_TIMEOUT,
            cache: true,
            cache_ttl: DEFAULT_CACHE_TTL,
            priority: Priority::Medium,
            endpoint: None,
            empty_state: None,
            persist_stale: true,
        }
    }
}

/// Builder for RequestConfig with fluent API
#[derive(Debug, Clone, Default)]
pub struct RequestOpts(RequestConfig);

impl RequestOpts {
    /// Create new options builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set retries after the first attempt
    pub fn retries(mut self, count: u32) -> Self {
        self.0.retry_count = count;
        self
    }

    /// Set per-attempt timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.0.timeout = timeout;
        self
    }

    /// Set per-attempt timeout in milliseconds
    pub fn timeout_ms(self, millis: u64) -> Self {
        self.timeout(Duration::from_millis(millis))
    }

    /// Set cache TTL
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.0.cache_ttl = ttl;
        self
    }

    /// Set cache TTL in milliseconds
    pub fn ttl_ms(self, millis: u64) -> Self {
        self.ttl(Duration::from_millis(millis))
    }

    /// Set cache TTL in minutes
    pub fn ttl_mins(self, minutes: u64) -> Self {
        self.ttl(Duration::from_secs(minutes * 60))
    }

    /// Bypass the response cache
    pub fn no_cache(mut self) -> Self {
        self.0.cache = false;
        self
    }

    /// Set priority
    pub fn priority(mut self, priority: Priority) -> Self {
        self.0.priority = priority;
        self
    }

    /// Set endpoint label
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.0.endpoint = Some(endpoint.into());
        self
    }

    /// Set the empty state returned when recovery has nothing better
    pub fn empty_state<T: Serialize>(mut self, value: &T) -> Self {
        self.0.empty_state = serde_json::to_value(value).ok();
        self
    }

    /// Do not mirror responses into the persistent stale store
    pub fn no_persist(mut self) -> Self {
        self.0.persist_stale = false;
        self
    }

    /// Build the config
    pub fn build(self) -> RequestConfig {
        self.0
    }
}

impl From<RequestOpts> for RequestConfig {
    fn from(opts: RequestOpts) -> Self {
        opts.0
    }
}

impl From<Duration> for RequestConfig {
    fn from(ttl: Duration) -> Self {
        RequestConfig {
            cache_ttl: ttl,
            ..Default::default()
        }
    }
}
