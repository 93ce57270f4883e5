use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use wayfare_core::{epoch_millis, EndpointMetrics, ErrorKind, HealthStatus};

/// In-process per-endpoint counters backing health reporting
#[derive(Debug, Clone, Default)]
pub struct MetricsRegistry {
    endpoints: Arc<DashMap<String, EndpointMetrics>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, endpoint: &str, f: impl FnOnce(&mut EndpointMetrics)) {
        let mut metrics = self.endpoints.entry(endpoint.to_string()).or_default();
        f(&mut *metrics);
        metrics.last_request = epoch_millis();
    }

    /// A fresh cache entry answered the request
    pub fn record_cache_hit(&self, endpoint: &str) {
        self.update(endpoint, |m| {
            m.total_requests += 1;
            m.successful_requests += 1;
            m.cache_hits += 1;
        });
    }

    /// A live operation succeeded
    pub fn record_success(&self, endpoint: &str, elapsed: Duration, payload_size: usize) {
        self.update(endpoint, |m| {
            m.total_requests += 1;
            m.successful_requests += 1;
            m.payload_size = payload_size;
            m.record_response_time(elapsed.as_secs_f64() * 1000.0);
        });
    }

    /// The request failed; `elapsed` is `None` when no operation ran
    pub fn record_failure(&self, endpoint: &str, kind: ErrorKind, elapsed: Option<Duration>) {
        self.update(endpoint, |m| {
            m.total_requests += 1;
            m.failed_requests += 1;
            *m.errors_by_kind.entry(kind).or_default() += 1;
            if let Some(elapsed) = elapsed {
                m.record_response_time(elapsed.as_secs_f64() * 1000.0);
            }
        });
    }

    pub fn record_retry(&self, endpoint: &str) {
        self.endpoints
            .entry(endpoint.to_string())
            .or_default()
            .retries += 1;
    }

    /// Snapshot for one endpoint
    pub fn endpoint(&self, endpoint: &str) -> Option<EndpointMetrics> {
        self.endpoints.get(endpoint).map(|m| m.clone())
    }

    /// Snapshot of every endpoint
    pub fn all(&self) -> Vec<(String, EndpointMetrics)> {
        self.endpoints
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Aggregate health
    pub fn health(&self, open_circuit_breakers: usize) -> HealthStatus {
        let snapshot = self.all();
        HealthStatus::from_metrics(snapshot.iter().map(|(k, v)| (k, v)), open_circuit_breakers)
    }

    pub fn clear(&self) {
        self.endpoints.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfare_core::EndpointHealth;

    #[test]
    fn test_counts() {
        let metrics = MetricsRegistry::new();
        metrics.record_cache_hit("weather");
        metrics.record_success("weather", Duration::from_millis(120), 64);
        metrics.record_retry("weather");
        metrics.record_failure("weather", ErrorKind::ApiTimeout, Some(Duration::from_millis(80)));

        let m = metrics.endpoint("weather").unwrap();
        assert_eq!(m.total_requests, 3);
        assert_eq!(m.successful_requests, 2);
        assert_eq!(m.failed_requests, 1);
        assert_eq!(m.cache_hits, 1);
        assert_eq!(m.retries, 1);
        assert_eq!(m.payload_size, 64);
        assert_eq!(m.errors_by_kind[&ErrorKind::ApiTimeout], 1);
        assert!((m.average_response_time_ms - 100.0).abs() < 1e-9);
        assert!(m.last_request > 0);
    }

    #[test]
    fn test_health_classification() {
        let metrics = MetricsRegistry::new();
        for _ in 0..3 {
            metrics.record_failure("maps", ErrorKind::ServerError, None);
        }
        metrics.record_success("maps", Duration::from_millis(10), 1);
        metrics.record_success("events", Duration::from_millis(10), 1);

        let health = metrics.health(1);
        assert_eq!(health.endpoints["maps"], EndpointHealth::Unhealthy);
        assert_eq!(health.endpoints["events"], EndpointHealth::Healthy);
        assert_eq!(health.overall, EndpointHealth::Unhealthy);
        assert_eq!(health.open_circuit_breakers, 1);
        assert_eq!(health.total_requests, 5);
    }

    #[test]
    fn test_empty_is_healthy() {
        let health = MetricsRegistry::new().health(0);
        assert_eq!(health.overall, EndpointHealth::Healthy);
        assert!(health.endpoints.is_empty());
    }
}
