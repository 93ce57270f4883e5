//! Integration tests for RequestClient

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use crate::recovery::OnlineFlag;
    use crate::{EndpointHealth, MemoryKv, StaleStore};
    use futures_util::future::{join_all, BoxFuture};
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::{advance, sleep, Instant};

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Forecast {
        city: String,
        temperature: i32,
    }

    fn forecast() -> Forecast {
        Forecast {
            city: "Barcelona".to_string(),
            temperature: 22,
        }
    }

    /// Counts invocations; fails while `failing` is set
    #[derive(Clone, Default)]
    struct Backend {
        calls: Arc<AtomicU32>,
        failing: Arc<AtomicBool>,
    }

    impl Backend {
        fn failing() -> Self {
            let backend = Self::default();
            backend.failing.store(true, Ordering::SeqCst);
            backend
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn op(&self) -> impl Fn() -> BoxFuture<'static, Result<Forecast>> + Send + Sync + 'static {
            let backend = self.clone();
            move || {
                let backend = backend.clone();
                async move {
                    backend.calls.fetch_add(1, Ordering::SeqCst);
                    if backend.failing.load(Ordering::SeqCst) {
                        Err(ApiError::network("connection reset"))
                    } else {
                        Ok(forecast())
                    }
                }
                .boxed()
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_until_ttl_elapses() {
        let client = RequestClient::default();
        let backend = Backend::default();
        let opts = RequestOpts::new().ttl_ms(1000);

        let first = client
            .request(backend.op(), opts.clone(), Some("k1"))
            .await
            .unwrap();
        assert!(!first.cached);

        advance(Duration::from_millis(999)).await;
        let hit = client
            .request(backend.op(), opts.clone(), Some("k1"))
            .await
            .unwrap();
        assert!(hit.cached);
        assert_eq!(hit.data, forecast());
        assert_eq!(backend.calls(), 1);

        advance(Duration::from_millis(2)).await;
        let refreshed = client
            .request(backend.op(), opts, Some("k1"))
            .await
            .unwrap();
        assert!(!refreshed.cached);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_scenario_0_500_1500() {
        let client = RequestClient::default();
        let backend = Backend::default();
        let opts = RequestOpts::new().ttl_ms(1000);

        client.request(backend.op(), opts.clone(), Some("k1")).await.unwrap();

        advance(Duration::from_millis(500)).await;
        let at_500 = client
            .request(backend.op(), opts.clone(), Some("k1"))
            .await
            .unwrap();
        assert!(at_500.cached);
        assert_eq!(backend.calls(), 1);

        advance(Duration::from_millis(1000)).await;
        client.request(backend.op(), opts, Some("k1")).await.unwrap();
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_coalesce() {
        let client = RequestClient::default();
        let calls = Arc::new(AtomicU32::new(0));

        let requests = (0..8).map(|_| {
            let calls = calls.clone();
            client.request(
                move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(100)).await;
                        Ok(forecast())
                    }
                },
                RequestOpts::new(),
                Some("forecast-barcelona"),
            )
        });

        let responses = join_all(requests).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(responses.len(), 8);
        for response in responses {
            assert_eq!(response.unwrap().data, forecast());
        }
        assert!(!client.is_inflight("forecast-barcelona"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesced_failure_reaches_every_caller() {
        let client = RequestClient::default();
        let calls = Arc::new(AtomicU32::new(0));

        let requests = (0..3).map(|_| {
            let calls = calls.clone();
            client.request(
                move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(50)).await;
                        Err::<Forecast, _>(ApiError::network("connection reset"))
                    }
                },
                RequestOpts::new().retries(0),
                Some("k"),
            )
        });
        for result in join_all(requests).await {
            assert_eq!(result.unwrap_err().kind, ErrorKind::NetworkError);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opens_after_five_failures_and_resets() {
        let client = RequestClient::default();
        let backend = Backend::failing();
        let opts = RequestOpts::new().retries(0);

        for _ in 0..5 {
            let err = client
                .request(backend.op(), opts.clone(), Some("events"))
                .await
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::NetworkError);
        }
        assert!(client.is_circuit_open("events"));

        let err = client
            .request(backend.op(), opts.clone(), Some("events"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ServerError);
        assert_eq!(backend.calls(), 5);

        advance(Duration::from_secs(60) + Duration::from_millis(1)).await;
        backend.failing.store(false, Ordering::SeqCst);
        let response = client
            .request(backend.op(), opts, Some("events"))
            .await
            .unwrap();
        assert_eq!(response.data, forecast());
        assert_eq!(backend.calls(), 6);
        assert!(!client.is_circuit_open("events"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backs_off_exponentially() {
        let client = RequestClient::default();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let start = Instant::now();
        let response = client
            .request(
                move || {
                    let counter = counter.clone();
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(ApiError::from_status(503, "unavailable"))
                        } else {
                            Ok(forecast())
                        }
                    }
                },
                RequestOpts::new().retries(3).endpoint("forecast"),
                Some("forecast-barcelona"),
            )
            .await
            .unwrap();

        assert_eq!(response.data, forecast());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1000 ms after the first attempt, 2000 ms after the second
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
        assert_eq!(client.endpoint_metrics("forecast").unwrap().retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fallback_after_failure() {
        let client = RequestClient::default();
        let backend = Backend::default();
        let opts = RequestOpts::new().ttl_ms(1000).retries(0);

        client.request(backend.op(), opts.clone(), Some("k1")).await.unwrap();
        advance(Duration::from_millis(1500)).await;
        backend.failing.store(true, Ordering::SeqCst);

        let response = client
            .request(backend.op(), opts, Some("k1"))
            .await
            .unwrap();
        assert!(response.cached && response.stale);
        assert_eq!(response.data, forecast());
        assert_eq!(backend.calls(), 2);
        assert_eq!(client.error_logger().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_stale_fallback_when_cache_disabled() {
        let client = RequestClient::default();
        let backend = Backend::default();

        client
            .request(backend.op(), RequestOpts::new().ttl_ms(1000), Some("k1"))
            .await
            .unwrap();
        advance(Duration::from_millis(1500)).await;
        backend.failing.store(true, Ordering::SeqCst);

        let result = client
            .request(backend.op(), RequestOpts::new().no_cache().retries(0), Some("k1"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keyless_requests_skip_cache() {
        let client = RequestClient::default();
        let backend = Backend::default();

        for _ in 0..2 {
            let response = client
                .request(backend.op(), RequestOpts::new().endpoint("search"), None)
                .await
                .unwrap();
            assert!(!response.cached);
        }
        assert_eq!(backend.calls(), 2);
        assert_eq!(client.store_stats().size, 0);
        assert_eq!(
            client.endpoint_metrics("search").unwrap().successful_requests,
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_retries_network_failure() {
        let recovery = RecoveryService::builder().connectivity(OnlineFlag::new()).build();
        let client = RequestClient::default().with_recovery(recovery.clone());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let response = client
            .request(
                move || {
                    let counter = counter.clone();
                    async move {
                        // Fails the initial attempt and both retries
                        if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                            Err(ApiError::network("offline"))
                        } else {
                            Ok(forecast())
                        }
                    }
                },
                RequestOpts::new().retries(2).endpoint("forecast"),
                Some("forecast-girona"),
            )
            .await
            .unwrap();

        assert!(response.recovered);
        assert_eq!(response.data, forecast());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(recovery.open_breakers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_serves_persisted_copy() {
        let kv = MemoryKv::new();
        let stale = StaleStore::new(kv.clone());
        let recovery = RecoveryService::builder().stale_store(stale.clone()).build();
        let client = RequestClient::default()
            .with_stale_store(stale)
            .with_recovery(recovery);
        let backend = Backend::default();

        client
            .request(backend.op(), RequestOpts::new(), Some("forecast-sitges"))
            .await
            .unwrap();
        assert_eq!(kv.len(), 1);

        // A fresh process: empty response cache, same durable store
        client.clear_cache();
        let bad = || async { Err::<Forecast, _>(ApiError::invalid_response("truncated body")) };

        let response = client
            .request(bad, RequestOpts::new(), Some("forecast-sitges"))
            .await
            .unwrap();
        assert!(response.recovered);
        assert_eq!(response.data, forecast());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_falls_back_to_empty_state() {
        let client = RequestClient::default().with_recovery(RecoveryService::new());

        let response = client
            .request(
                || async { Err::<Vec<String>, _>(ApiError::invalid_response("not json")) },
                RequestOpts::new().empty_state(&Vec::<String>::new()),
                Some("events-today"),
            )
            .await
            .unwrap();
        assert!(response.recovered);
        assert!(response.data.is_empty());
        // Recovered bodies are not cached
        assert_eq!(client.store_stats().size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_status() {
        let client = RequestClient::default();
        let backend = Backend::default();
        let opts = RequestOpts::new().endpoint("forecast");

        client.request(backend.op(), opts.clone(), Some("k1")).await.unwrap();
        client.request(backend.op(), opts.clone(), Some("k1")).await.unwrap();

        let health = client.get_health_status();
        assert_eq!(health.total_requests, 2);
        assert_eq!(health.success_rate, 1.0);
        assert_eq!(health.cache_hit_rate, 0.5);
        assert_eq!(health.overall, EndpointHealth::Healthy);
        assert_eq!(health.open_circuit_breakers, 0);

        let failing = Backend::failing();
        for _ in 0..5 {
            let _ = client
                .request(failing.op(), opts.clone().retries(0), Some("k2"))
                .await;
        }
        let health = client.get_health_status();
        assert_eq!(health.open_circuit_breakers, 1);
        assert_eq!(health.overall, EndpointHealth::Unhealthy);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let client = RequestClient::default();
        let backend = Backend::default();

        client.request(backend.op(), RequestOpts::new(), Some("k")).await.unwrap();
        assert!(client.invalidate("k"));
        assert!(!client.invalidate("k"));

        let again = client.request(backend.op(), RequestOpts::new(), Some("k")).await.unwrap();
        assert!(!again.cached);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let client = RequestClient::default();
        let other = client.clone();
        let backend = Backend::default();

        client.request(backend.op(), RequestOpts::new(), Some("k")).await.unwrap();
        let response = other.request(backend.op(), RequestOpts::new(), Some("k")).await.unwrap();
        assert!(response.cached);
        assert_eq!(backend.calls(), 1);
    }
}
