//! Metrics trait for request observability

use std::time::Duration;

/// How a request pipeline ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestOutcome {
    /// Live operation succeeded
    Success,
    /// Live operation failed terminally
    Failure,
    /// Failed, served from an expired entry
    StaleFallback,
    /// Failed, served by a recovery strategy
    Recovered,
}

impl RequestOutcome {
    /// Get outcome as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::Success => "success",
            RequestOutcome::Failure => "failure",
            RequestOutcome::StaleFallback => "stale_fallback",
            RequestOutcome::Recovered => "recovered",
        }
    }
}

/// Reason for cache eviction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// Lowest-priority geographic entry dropped
    Priority,
    /// Explicitly invalidated
    Invalidated,
    /// Whole cache cleared
    Cleared,
}

impl EvictionReason {
    /// Get reason as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Priority => "priority",
            EvictionReason::Invalidated => "invalidated",
            EvictionReason::Cleared => "cleared",
        }
    }
}

/// Trait for request metrics/observability
///
/// Implement this to integrate with your metrics system (Prometheus, StatsD, etc.)
pub trait ClientMetrics: Send + Sync + 'static {
    /// Record a fresh cache hit
    fn record_hit(&self, key: &str);

    /// Record a cache miss
    fn record_miss(&self, key: &str);

    /// Record a retry of a failed attempt
    fn record_retry(&self, endpoint: &str, attempt: u32);

    /// Record the end of a request pipeline
    fn record_request(&self, endpoint: &str, outcome: RequestOutcome, duration: Duration);

    /// Record a circuit breaker opening
    fn record_circuit_open(&self, key: &str);

    /// Record an eviction
    fn record_eviction(&self, reason: EvictionReason);
}

/// No-op metrics implementation (default)
///
/// Zero overhead when metrics are not needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl ClientMetrics for NoopMetrics {
    #[inline]
    fn record_hit(&self, _key: &str) {}

    #[inline]
    fn record_miss(&self, _key: &str) {}

    #[inline]
    fn record_retry(&self, _endpoint: &str, _attempt: u32) {}

    #[inline]
    fn record_request(&self, _endpoint: &str, _outcome: RequestOutcome, _duration: Duration) {}

    #[inline]
    fn record_circuit_open(&self, _key: &str) {}

    #[inline]
    fn record_eviction(&self, _reason: EvictionReason) {}
}

/// Metrics adapter using the `metrics` crate
///
/// Integrates with Prometheus, StatsD, and other exporters via the `metrics` ecosystem.
///
/// # Example
/// ```ignore
/// use wayfare_core::MetricsCrateAdapter;
///
/// // Set up a metrics recorder (e.g., prometheus_exporter)
/// // metrics::set_global_recorder(recorder);
///
/// let metrics = MetricsCrateAdapter::new("wayfare");
/// // Emits: wayfare_cache_hits_total, wayfare_requests_total, etc.
/// ```
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
pub struct MetricsCrateAdapter {
    prefix: String,
}

#[cfg(feature = "metrics")]
impl MetricsCrateAdapter {
    /// Create a new adapter with the given metric name prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn metric_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }
}

#[cfg(feature = "metrics")]
impl ClientMetrics for MetricsCrateAdapter {
    fn record_hit(&self, _key: &str) {
        metrics::counter!(self.metric_name("cache_hits_total")).increment(1);
    }

    fn record_miss(&self, _key: &str) {
        metrics::counter!(self.metric_name("cache_misses_total")).increment(1);
    }

    fn record_retry(&self, endpoint: &str, _attempt: u32) {
        metrics::counter!(self.metric_name("retries_total"), "endpoint" => endpoint.to_string())
            .increment(1);
    }

    fn record_request(&self, endpoint: &str, outcome: RequestOutcome, duration: Duration) {
        metrics::counter!(
            self.metric_name("requests_total"),
            "endpoint" => endpoint.to_string(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        metrics::histogram!(
            self.metric_name("request_duration_seconds"),
            "endpoint" => endpoint.to_string()
        )
        .record(duration.as_secs_f64());
    }

    fn record_circuit_open(&self, _key: &str) {
        metrics::counter!(self.metric_name("circuit_opened_total")).increment(1);
    }

    fn record_eviction(&self, reason: EvictionReason) {
        metrics::counter!(
            self.metric_name("evictions_total"),
            "reason" => reason.as_str()
        )
        .increment(1);
    }
}
