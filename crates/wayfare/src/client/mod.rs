//! Resilient request client

mod circuit_breaker;
mod coalescer;
mod metrics;
mod retry;

pub use circuit_breaker::{
    BreakerRegistry, BreakerState, DEFAULT_FAILURE_THRESHOLD, DEFAULT_RESET_WINDOW,
};
pub use coalescer::{Coalescer, InflightGuard, Role};
pub use metrics::MetricsRegistry;
pub use retry::{RetryExecutor, DEFAULT_BASE_DELAY};

use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use wayfare_core::{
    ApiError, ApiResponse, CacheStore, ClientMetrics, EndpointMetrics, EvictionReason,
    HealthStatus, JsonSerializer, Lookup, NoopMetrics, RequestConfig, RequestOutcome, Result,
    Serializer, StoreStats,
};
use wayfare_storage::{MemoryStore, StaleStore};

use crate::logger::{ErrorContext, ErrorLogger};
use crate::recovery::{RawOperation, RecoveryContext, RecoveryService};

/// Endpoint label for requests with neither a cache key nor an endpoint
const ANONYMOUS_ENDPOINT: &str = "anonymous";

/// Configuration for RequestClient
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Consecutive terminal failures that open a key's breaker
    pub failure_threshold: u32,
    /// How long an open breaker fails fast
    pub reset_window: Duration,
    /// Backoff unit between attempts
    pub base_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_window: DEFAULT_RESET_WINDOW,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl ClientConfig {
    /// Create config with a specific breaker threshold
    pub fn with_failure_threshold(threshold: u32) -> Self {
        Self {
            failure_threshold: threshold,
            ..Default::default()
        }
    }

    pub fn reset_window(mut self, window: Duration) -> Self {
        self.reset_window = window;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Source {
    Live,
    Stale,
    Recovered,
}

/// Serialized outcome shared with coalesced followers
#[derive(Debug, Clone)]
struct Settled {
    body: Vec<u8>,
    source: Source,
    response_time: Option<Duration>,
}

impl Settled {
    fn into_response<T>(self, data: T) -> ApiResponse<T> {
        match self.source {
            Source::Live => ApiResponse::live(data, self.response_time.unwrap_or_default()),
            Source::Stale => ApiResponse::stale(data),
            Source::Recovered => ApiResponse::recovered(data),
        }
    }
}

/// Request client with caching, coalescing, circuit breaking and retry
///
/// Generic over:
/// - `B`: The response cache
/// - `S`: The serializer (JSON, MessagePack, Bincode)
/// - `M`: The metrics collector
///
/// Cloning creates a new handle to the SAME caches, breakers and metrics.
pub struct RequestClient<B = MemoryStore, S = JsonSerializer, M = NoopMetrics>
where
    B: CacheStore,
    S: Serializer,
    M: ClientMetrics,
{
    store: Arc<B>,
    serializer: Arc<S>,
    metrics: Arc<M>,
    registry: MetricsRegistry,
    breakers: BreakerRegistry,
    retry: RetryExecutor,
    coalescer: Coalescer<Result<Settled>>,
    logger: ErrorLogger,
    stale: Option<StaleStore>,
    recovery: Option<RecoveryService<S>>,
}

impl Default for RequestClient {
    fn default() -> Self {
        Self::new(MemoryStore::default())
    }
}

// Constructors for default serializer/metrics
impl<B: CacheStore> RequestClient<B, JsonSerializer, NoopMetrics> {
    /// Create a client with JSON serialization and no metrics
    pub fn new(store: B) -> Self {
        Self::with_config(store, ClientConfig::default())
    }

    /// Create with custom config
    pub fn with_config(store: B, config: ClientConfig) -> Self {
        Self::with_serializer_and_metrics(store, JsonSerializer, NoopMetrics, config)
    }
}

impl<B, S, M> RequestClient<B, S, M>
where
    B: CacheStore,
    S: Serializer,
    M: ClientMetrics,
{
    /// Create a client with custom serializer and metrics
    pub fn with_serializer_and_metrics(
        store: B,
        serializer: S,
        metrics: M,
        config: ClientConfig,
    ) -> Self {
        Self {
            store: Arc::new(store),
            serializer: Arc::new(serializer),
            metrics: Arc::new(metrics),
            registry: MetricsRegistry::new(),
            breakers: BreakerRegistry::new(config.failure_threshold, config.reset_window),
            retry: RetryExecutor::new().with_base_delay(config.base_delay),
            coalescer: Coalescer::new(),
            logger: ErrorLogger::default(),
            stale: None,
            recovery: None,
        }
    }

    /// Share an error logger
    pub fn with_logger(mut self, logger: ErrorLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Mirror successful keyed responses into durable storage
    pub fn with_stale_store(mut self, stale: StaleStore) -> Self {
        self.stale = Some(stale);
        self
    }

    /// Offer terminal failures to a recovery service
    pub fn with_recovery(mut self, recovery: RecoveryService<S>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Run `op` through the resilience pipeline
    ///
    /// In order: a fresh cache entry answers without running `op`; an
    /// open breaker fails fast; a request already in flight for the key
    /// is joined; otherwise `op` runs with timeout and backoff. Terminal
    /// failures fall back to an expired entry, then to recovery, before
    /// the error is returned.
    ///
    /// Without a cache key there is no caching or coalescing, and the
    /// breaker is keyed by the endpoint label if one is configured.
    pub async fn request<T, F, Fut>(
        &self,
        op: F,
        config: impl Into<RequestConfig>,
        cache_key: Option<&str>,
    ) -> Result<ApiResponse<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let config = config.into();
        let endpoint = config
            .endpoint
            .as_deref()
            .or(cache_key)
            .unwrap_or(ANONYMOUS_ENDPOINT)
            .to_string();

        if let Some(key) = cache_key.filter(|_| config.cache) {
            if let Lookup::Fresh(entry) = self.store.get(key) {
                self.metrics.record_hit(key);
                self.registry.record_cache_hit(&endpoint);
                self.metrics
                    .record_request(&endpoint, RequestOutcome::Success, Duration::ZERO);
                let data: T = self.serializer.deserialize(&entry.value)?;
                return Ok(ApiResponse::cached(data));
            }
            self.metrics.record_miss(key);
        }

        let breaker_key = cache_key.or(config.endpoint.as_deref());
        if let Some(breaker_key) = breaker_key {
            if !self.breakers.allow_request(breaker_key) {
                let err = ApiError::server(format!("circuit breaker open for {breaker_key}"))
                    .with_endpoint(endpoint.as_str());
                self.registry.record_failure(&endpoint, err.kind, None);
                self.metrics
                    .record_request(&endpoint, RequestOutcome::Failure, Duration::ZERO);
                self.logger.log(&err, self.error_context(cache_key));
                return Err(err);
            }
        }

        let raw = self.raw_operation(op);
        let settled = match cache_key {
            Some(key) => self.coalesced(key, raw, &config, &endpoint).await?,
            None => self.execute(None, breaker_key, raw, &config, &endpoint).await?,
        };

        let data: T = self.serializer.deserialize(&settled.body)?;
        Ok(settled.into_response(data))
    }

    /// Erase the operation's type so it can be shared and re-invoked
    fn raw_operation<T, F, Fut>(&self, op: F) -> RawOperation
    where
        T: Serialize + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let op = Arc::new(op);
        let serializer = self.serializer.clone();
        Arc::new(move || {
            let op = op.clone();
            let serializer = serializer.clone();
            async move {
                let value = op().await?;
                serializer.serialize(&value)
            }
            .boxed()
        })
    }

    async fn coalesced(
        &self,
        key: &str,
        raw: RawOperation,
        config: &RequestConfig,
        endpoint: &str,
    ) -> Result<Settled> {
        loop {
            match self.coalescer.join(key) {
                Role::Leader(guard) => {
                    let settled = self
                        .execute(Some(key), Some(key), raw.clone(), config, endpoint)
                        .await;
                    guard.settle(settled.clone());
                    return settled;
                }
                Role::Follower(mut rx) => match rx.recv().await {
                    Ok(settled) => return settled,
                    // Leader went away without settling; try to lead
                    Err(_) => debug!(target: "wayfare", key = %key, "In-flight leader abandoned"),
                },
            }
        }
    }

    async fn execute(
        &self,
        key: Option<&str>,
        breaker_key: Option<&str>,
        raw: RawOperation,
        config: &RequestConfig,
        endpoint: &str,
    ) -> Result<Settled> {
        let start = Instant::now();
        let outcome = self
            .retry
            .execute(
                || raw(),
                config.retry_count,
                config.timeout,
                |attempt, _| {
                    self.registry.record_retry(endpoint);
                    self.metrics.record_retry(endpoint, attempt);
                },
            )
            .await;
        let elapsed = start.elapsed();

        let err = match outcome {
            Ok(body) => {
                if let Some(key) = key.filter(|_| config.cache) {
                    self.store.set(key, body.clone(), config.cache_ttl);
                }
                if let Some(breaker_key) = breaker_key {
                    self.breakers.record_success(breaker_key);
                }
                self.registry.record_success(endpoint, elapsed, body.len());
                self.metrics
                    .record_request(endpoint, RequestOutcome::Success, elapsed);

                if let (Some(stale), Some(key)) = (&self.stale, key) {
                    if config.persist_stale {
                        if let Err(e) = stale.save(key, &body).await {
                            warn!(target: "wayfare", key = %key, error = %e, "Failed to persist stale copy");
                        }
                    }
                }

                return Ok(Settled {
                    body,
                    source: Source::Live,
                    response_time: Some(elapsed),
                });
            }
            Err(err) if err.endpoint.is_none() => err.with_endpoint(endpoint),
            Err(err) => err,
        };

        if let Some(breaker_key) = breaker_key {
            if self.breakers.record_failure(breaker_key) {
                self.metrics.record_circuit_open(breaker_key);
                warn!(target: "wayfare", key = %breaker_key, "Circuit breaker opened");
            }
        }
        self.registry.record_failure(endpoint, err.kind, Some(elapsed));
        self.logger.log(&err, self.error_context(key));

        if let Some(key) = key.filter(|_| config.cache) {
            if let Some(entry) = self.store.get(key).entry() {
                warn!(
                    target: "wayfare",
                    key = %key,
                    age_ms = entry.age().as_millis() as u64,
                    kind = %err.kind,
                    "Serving stale data after failure"
                );
                self.metrics
                    .record_request(endpoint, RequestOutcome::StaleFallback, elapsed);
                return Ok(Settled {
                    body: entry.value,
                    source: Source::Stale,
                    response_time: None,
                });
            }
        }

        if let Some(recovery) = &self.recovery {
            let mut context = RecoveryContext::new().raw_operation(raw).endpoint(endpoint);
            context.cache_key = key.map(str::to_string);
            context.empty_state = config.empty_state.clone();

            match recovery.recover_raw(&err, &context).await {
                Ok(Some(body)) => {
                    self.metrics
                        .record_request(endpoint, RequestOutcome::Recovered, elapsed);
                    return Ok(Settled {
                        body,
                        source: Source::Recovered,
                        response_time: None,
                    });
                }
                Ok(None) => {}
                Err(recovery_err) => {
                    debug!(target: "wayfare", endpoint, error = %recovery_err, "Recovery failed");
                }
            }
        }

        self.metrics
            .record_request(endpoint, RequestOutcome::Failure, elapsed);
        Err(err)
    }

    fn error_context(&self, cache_key: Option<&str>) -> ErrorContext {
        let context = ErrorContext::new().component("request-client");
        match cache_key {
            Some(key) => context.extra("cache_key", key),
            None => context,
        }
    }

    /// Drop the cached response for `key`
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.store.remove(key);
        if removed {
            self.metrics.record_eviction(EvictionReason::Invalidated);
        }
        removed
    }

    /// Drop every cached response
    pub fn clear_cache(&self) {
        self.store.clear();
        self.metrics.record_eviction(EvictionReason::Cleared);
    }

    /// Manually close the breaker for `key`
    pub fn reset_circuit_breaker(&self, key: &str) -> bool {
        self.breakers.reset(key)
    }

    pub fn is_circuit_open(&self, key: &str) -> bool {
        self.breakers.is_open(key)
    }

    /// Whether a request for `key` is running
    pub fn is_inflight(&self, key: &str) -> bool {
        self.coalescer.is_inflight(key)
    }

    pub fn endpoint_metrics(&self, endpoint: &str) -> Option<EndpointMetrics> {
        self.registry.endpoint(endpoint)
    }

    /// Aggregate health over every endpoint seen so far
    pub fn get_health_status(&self) -> HealthStatus {
        self.registry.health(self.breakers.open_count())
    }

    pub fn error_logger(&self) -> &ErrorLogger {
        &self.logger
    }

    pub fn recovery(&self) -> Option<&RecoveryService<S>> {
        self.recovery.as_ref()
    }

    pub fn store(&self) -> &B {
        &self.store
    }

    pub fn store_stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }
}

impl<B, S, M> Clone for RequestClient<B, S, M>
where
    B: CacheStore,
    S: Serializer,
    M: ClientMetrics,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            serializer: self.serializer.clone(),
            metrics: self.metrics.clone(),
            registry: self.registry.clone(),
            breakers: self.breakers.clone(),
            retry: self.retry,
            coalescer: self.coalescer.clone(),
            logger: self.logger.clone(),
            stale: self.stale.clone(),
            recovery: self.recovery.clone(),
        }
    }
}
