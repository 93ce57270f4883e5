use crate::{ClientMetrics, EvictionReason, RequestOutcome};
use std::time::Duration;
use tracing::{debug, info};

/// Metrics adapter that logs events via `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingMetrics {
    /// Service name/prefix (optional)
    service_name: Option<String>,
}

impl TracingMetrics {
    /// Create new tracing metrics adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with service name prefix
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }
}

impl ClientMetrics for TracingMetrics {
    fn record_hit(&self, key: &str) {
        debug!(
            target: "wayfare",
            event = "hit",
            key = %key,
            service = ?self.service_name,
            "Cache Hit"
        );
    }

    fn record_miss(&self, key: &str) {
        debug!(
            target: "wayfare",
            event = "miss",
            key = %key,
            service = ?self.service_name,
            "Cache Miss"
        );
    }

    fn record_retry(&self, endpoint: &str, attempt: u32) {
        debug!(
            target: "wayfare",
            event = "retry",
            endpoint = %endpoint,
            attempt,
            service = ?self.service_name,
            "Retrying Request"
        );
    }

    fn record_request(&self, endpoint: &str, outcome: RequestOutcome, duration: Duration) {
        tracing::trace!(
            target: "wayfare",
            event = "request",
            endpoint = %endpoint,
            outcome = outcome.as_str(),
            duration_ms = duration.as_millis(),
            service = ?self.service_name,
            "Request Completed"
        );
    }

    fn record_circuit_open(&self, key: &str) {
        info!(
            target: "wayfare",
            event = "circuit_open",
            key = %key,
            service = ?self.service_name,
            "Circuit Breaker Opened"
        );
    }

    fn record_eviction(&self, reason: EvictionReason) {
        debug!(
            target: "wayfare",
            event = "eviction",
            reason = reason.as_str(),
            service = ?self.service_name,
            "Cache Eviction"
        );
    }
}
