//! Request and store statistics

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::ErrorKind;

/// Error rate above which an endpoint is unhealthy
pub const UNHEALTHY_ERROR_RATE: f64 = 0.5;
/// Error rate above which an endpoint is degraded
pub const DEGRADED_ERROR_RATE: f64 = 0.1;
/// Average latency (ms) above which an endpoint is unhealthy
pub const UNHEALTHY_LATENCY_MS: f64 = 5000.0;
/// Average latency (ms) above which an endpoint is degraded
pub const DEGRADED_LATENCY_MS: f64 = 2000.0;

/// Statistics for a cache store
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Number of fresh hits
    pub hits: u64,
    /// Number of misses
    pub misses: u64,
    /// Number of stale lookups
    pub stale_hits: u64,
    /// Number of write operations
    pub writes: u64,
    /// Number of evictions
    pub evictions: u64,
    /// Current number of entries
    pub size: usize,
    /// Approximate memory usage in bytes
    pub memory_bytes: usize,
}

impl StoreStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.total_lookups();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total lookups
    pub fn total_lookups(&self) -> u64 {
        self.hits + self.stale_hits + self.misses
    }
}

/// Per-endpoint request counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Rolling mean over live operations, in milliseconds
    pub average_response_time_ms: f64,
    pub cache_hits: u64,
    pub retries: u64,
    /// Epoch ms of the last completed request
    pub last_request: u64,
    /// Bytes in the last successful payload
    pub payload_size: usize,
    pub errors_by_kind: BTreeMap<ErrorKind, u64>,
    /// Live operations that contributed to the average
    #[serde(skip)]
    pub timed_requests: u64,
}

impl EndpointMetrics {
    /// Failures over total requests
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.failed_requests as f64 / self.total_requests as f64
        }
    }

    /// Successes over total requests
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }

    /// Fold a new latency sample into the rolling mean
    pub fn record_response_time(&mut self, millis: f64) {
        self.timed_requests += 1;
        let n = self.timed_requests as f64;
        self.average_response_time_ms += (millis - self.average_response_time_ms) / n;
    }

    /// Classify by error-rate and latency thresholds
    pub fn health(&self) -> EndpointHealth {
        let error_rate = self.error_rate();
        let latency = self.average_response_time_ms;
        if error_rate > UNHEALTHY_ERROR_RATE || latency > UNHEALTHY_LATENCY_MS {
            EndpointHealth::Unhealthy
        } else if error_rate > DEGRADED_ERROR_RATE || latency > DEGRADED_LATENCY_MS {
            EndpointHealth::Degraded
        } else {
            EndpointHealth::Healthy
        }
    }
}

/// Endpoint health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

impl EndpointHealth {
    /// Get health as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointHealth::Healthy => "healthy",
            EndpointHealth::Degraded => "degraded",
            EndpointHealth::Unhealthy => "unhealthy",
        }
    }
}

/// Aggregate health snapshot of a request client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Worst endpoint classification (healthy when there are no endpoints)
    pub overall: EndpointHealth,
    pub success_rate: f64,
    pub average_response_time_ms: f64,
    pub cache_hit_rate: f64,
    pub open_circuit_breakers: usize,
    pub total_requests: u64,
    pub endpoints: HashMap<String, EndpointHealth>,
}

impl HealthStatus {
    /// Aggregate per-endpoint metrics
    pub fn from_metrics<'a, I>(metrics: I, open_circuit_breakers: usize) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a EndpointMetrics)>,
    {
        let mut total = 0u64;
        let mut successes = 0u64;
        let mut hits = 0u64;
        let mut timed = 0u64;
        let mut weighted_latency = 0.0;
        let mut endpoints = HashMap::new();

        for (name, m) in metrics {
            total += m.total_requests;
            successes += m.successful_requests;
            hits += m.cache_hits;
            timed += m.timed_requests;
            weighted_latency += m.average_response_time_ms * m.timed_requests as f64;
            if m.total_requests > 0 {
                endpoints.insert(name.clone(), m.health());
            }
        }

        let ratio = |n: u64| if total == 0 { 0.0 } else { n as f64 / total as f64 };
        let overall = endpoints
            .values()
            .copied()
            .max()
            .unwrap_or(EndpointHealth::Healthy);

        Self {
            overall,
            success_rate: ratio(successes),
            average_response_time_ms: if timed == 0 {
                0.0
            } else {
                weighted_latency / timed as f64
            },
            cache_hit_rate: ratio(hits),
            open_circuit_breakers,
            total_requests: total,
            endpoints,
        }
    }
}
