//! Recovery strategies applied after the request pipeline gives up

mod strategies;

pub use strategies::{
    AuthRefresh, GenericFallback, NetworkRetry, RateLimitBackoff, AUTH_REFRESH, GENERIC_FALLBACK,
    NETWORK_RETRY, RATE_LIMIT_BACKOFF,
};

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use wayfare_core::{ApiError, ErrorKind, JsonSerializer, Result, Serializer};
use wayfare_storage::StaleStore;

use crate::logger::{ErrorContext, ErrorLogger};

/// Type-erased operation that produces a serialized body
pub type RawOperation = Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<u8>>> + Send + Sync>;

/// Configuration for the recovery service
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// How long a recovery breaker stays open
    pub reset_window: Duration,
    /// Cap on network-retry backoff
    pub max_network_delay: Duration,
    /// Rate-limit wait when the error carries no hint
    pub default_retry_after: Duration,
    /// Where auth-refresh sends the user when refresh fails
    pub login_route: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            reset_window: Duration::from_secs(60),
            max_network_delay: Duration::from_secs(30),
            default_retry_after: Duration::from_secs(60),
            login_route: "/login".to_string(),
        }
    }
}

/// Whether the client currently has connectivity
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Assumes connectivity
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Connectivity toggled by the host (e.g. from OS network events)
#[derive(Debug, Clone)]
pub struct OnlineFlag(Arc<AtomicBool>);

impl Default for OnlineFlag {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl OnlineFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

impl Connectivity for OnlineFlag {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Session management owned by the host application
#[async_trait]
pub trait AuthCollaborator: Send + Sync {
    /// Refresh the current session's credentials
    async fn refresh_session(&self) -> Result<()>;

    /// Navigate the user to the login route
    fn redirect_to_login(&self, route: &str);
}

/// No session to refresh: refresh always fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl AuthCollaborator for NoAuth {
    async fn refresh_session(&self) -> Result<()> {
        Err(ApiError::new(
            ErrorKind::AuthenticationError,
            "no session to refresh",
        ))
    }

    fn redirect_to_login(&self, route: &str) {
        debug!(target: "wayfare", route, "Login redirect requested with no auth collaborator");
    }
}

/// Everything a strategy may need about the failed request
#[derive(Clone, Default)]
pub struct RecoveryContext {
    /// Re-invokes the original operation
    pub operation: Option<RawOperation>,
    pub cache_key: Option<String>,
    pub endpoint: Option<String>,
    /// Returned by the generic fallback when nothing is persisted
    pub empty_state: Option<serde_json::Value>,
}

impl RecoveryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the operation to re-invoke
    pub fn operation<F, Fut>(mut self, op: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
    {
        self.operation = Some(Arc::new(move || op().boxed()));
        self
    }

    pub fn raw_operation(mut self, op: RawOperation) -> Self {
        self.operation = Some(op);
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn empty_state<T: Serialize>(mut self, value: &T) -> Self {
        self.empty_state = serde_json::to_value(value).ok();
        self
    }

    /// Label used in recovery breaker keys
    pub fn recovery_endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .or(self.cache_key.as_deref())
            .unwrap_or("unknown")
    }
}

/// Result of a single strategy attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    /// A substitute body
    Value(Vec<u8>),
    /// Re-invoke the original operation
    Retry,
    /// Handled, nothing to return
    Nothing,
}

/// A way to recover from one class of errors
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    /// Stable id, part of the breaker key
    fn id(&self) -> &str;

    /// Consecutive failures before the strategy's breaker opens
    fn max_retries(&self) -> u32;

    fn can_handle(&self, error: &ApiError) -> bool;

    /// Try to recover; `retry_count` is the strategy's consecutive failures
    /// for this endpoint so far
    async fn attempt(
        &self,
        error: &ApiError,
        context: &RecoveryContext,
        retry_count: u32,
    ) -> Result<RecoveryOutcome>;
}

#[derive(Debug, Clone, Copy, Default)]
struct RecoveryState {
    retries: u32,
    opened_at: Option<Instant>,
}

struct Inner<S: Serializer> {
    strategies: RwLock<Vec<Arc<dyn RecoveryStrategy>>>,
    states: DashMap<String, RecoveryState>,
    config: RecoveryConfig,
    serializer: S,
    logger: Option<ErrorLogger>,
}

/// Strategy registry with per-strategy, per-endpoint breakers
///
/// Strategies are tried in registration order, first match wins; the
/// generic fallback always stays last. Cloning creates a new handle to
/// the SAME registry.
pub struct RecoveryService<S: Serializer = JsonSerializer> {
    inner: Arc<Inner<S>>,
}

impl<S: Serializer> Clone for RecoveryService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Default for RecoveryService<JsonSerializer> {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RecoveryService<JsonSerializer> {
    /// Service with the built-in strategies and no persisted stale data
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> RecoveryBuilder<JsonSerializer> {
        RecoveryBuilder::new(JsonSerializer)
    }
}

impl<S: Serializer> RecoveryService<S> {
    /// Insert a strategy ahead of the generic fallback
    pub fn register(&self, strategy: impl RecoveryStrategy + 'static) {
        let mut strategies = self.inner.strategies.write();
        let at = strategies
            .iter()
            .position(|s| s.id() == GENERIC_FALLBACK)
            .unwrap_or(strategies.len());
        strategies.insert(at, Arc::new(strategy));
    }

    /// Strategy ids in evaluation order
    pub fn strategies(&self) -> Vec<String> {
        self.inner
            .strategies
            .read()
            .iter()
            .map(|s| s.id().to_string())
            .collect()
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.inner.config
    }

    fn select(&self, error: &ApiError) -> Option<Arc<dyn RecoveryStrategy>> {
        self.inner
            .strategies
            .read()
            .iter()
            .find(|s| s.can_handle(error))
            .cloned()
    }

    /// Whether the breaker for `key` is open, closing it once its window passed
    fn breaker_open(&self, key: &str) -> bool {
        let opened_at = match self.inner.states.get(key).and_then(|s| s.opened_at) {
            Some(at) => at,
            None => return false,
        };
        if opened_at.elapsed() > self.inner.config.reset_window {
            self.inner.states.remove(key);
            false
        } else {
            true
        }
    }

    /// Recover from `error`, returning a serialized body
    ///
    /// `Ok(None)` means a strategy handled the error but had nothing to
    /// substitute.
    pub async fn recover_raw(
        &self,
        error: &ApiError,
        context: &RecoveryContext,
    ) -> Result<Option<Vec<u8>>> {
        let Some(strategy) = self.select(error) else {
            return Ok(None);
        };
        let endpoint = context.recovery_endpoint();
        let key = format!("{}-{}", strategy.id(), endpoint);

        if self.breaker_open(&key) {
            return Err(ApiError::new(
                ErrorKind::CircuitBreakerOpen,
                format!("recovery circuit open for {key}"),
            )
            .with_endpoint(endpoint));
        }

        let retry_count = self.inner.states.get(&key).map(|s| s.retries).unwrap_or(0);
        let result = match strategy.attempt(error, context, retry_count).await {
            Ok(RecoveryOutcome::Value(body)) => Ok(Some(body)),
            Ok(RecoveryOutcome::Nothing) => Ok(None),
            Ok(RecoveryOutcome::Retry) => match &context.operation {
                Some(op) => op().await.map(Some),
                None => Err(error.clone()),
            },
            Err(err) => Err(err),
        };

        match result {
            Ok(body) => {
                self.inner.states.remove(&key);
                debug!(target: "wayfare", strategy = strategy.id(), endpoint, "Recovered");
                Ok(body)
            }
            Err(err) => {
                self.record_failure(&key, strategy.max_retries());
                if let Some(logger) = &self.inner.logger {
                    logger.log(
                        &err,
                        ErrorContext::new()
                            .component("recovery")
                            .extra("strategy", strategy.id())
                            .extra("endpoint", endpoint),
                    );
                }
                Err(err)
            }
        }
    }

    /// Recover from `error`, deserializing the substitute body
    pub async fn recover<T: DeserializeOwned>(
        &self,
        error: &ApiError,
        context: &RecoveryContext,
    ) -> Result<Option<T>> {
        match self.recover_raw(error, context).await? {
            Some(body) => self.inner.serializer.deserialize(&body).map(Some),
            None => Ok(None),
        }
    }

    fn record_failure(&self, key: &str, max_retries: u32) {
        let mut state = self.inner.states.entry(key.to_string()).or_default();
        state.retries += 1;
        if state.retries >= max_retries && state.opened_at.is_none() {
            state.opened_at = Some(Instant::now());
            info!(target: "wayfare", key = %key, retries = state.retries, "Recovery circuit opened");
        }
    }

    /// Consecutive failures recorded for a strategy/endpoint key
    pub fn retry_count(&self, key: &str) -> u32 {
        self.inner.states.get(key).map(|s| s.retries).unwrap_or(0)
    }

    /// Keys whose breaker is currently open
    pub fn open_breakers(&self) -> Vec<String> {
        let window = self.inner.config.reset_window;
        let mut keys: Vec<String> = self
            .inner
            .states
            .iter()
            .filter(|s| s.opened_at.is_some_and(|at| at.elapsed() <= window))
            .map(|s| s.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Forget every counter and breaker
    pub fn reset(&self) {
        self.inner.states.clear();
    }
}

/// Builder for a recovery service
pub struct RecoveryBuilder<S: Serializer> {
    config: RecoveryConfig,
    serializer: S,
    stale: Option<StaleStore>,
    connectivity: Arc<dyn Connectivity>,
    auth: Arc<dyn AuthCollaborator>,
    logger: Option<ErrorLogger>,
}

impl<S: Serializer> RecoveryBuilder<S> {
    fn new(serializer: S) -> Self {
        Self {
            config: RecoveryConfig::default(),
            serializer,
            stale: None,
            connectivity: Arc::new(AlwaysOnline),
            auth: Arc::new(NoAuth),
            logger: None,
        }
    }

    pub fn config(mut self, config: RecoveryConfig) -> Self {
        self.config = config;
        self
    }

    /// Serializer used for empty states and typed recovery
    ///
    /// Must match the request client's serializer.
    pub fn serializer<S2: Serializer>(self, serializer: S2) -> RecoveryBuilder<S2> {
        RecoveryBuilder {
            config: self.config,
            serializer,
            stale: self.stale,
            connectivity: self.connectivity,
            auth: self.auth,
            logger: self.logger,
        }
    }

    /// Persisted stale data read by the generic fallback
    pub fn stale_store(mut self, stale: StaleStore) -> Self {
        self.stale = Some(stale);
        self
    }

    pub fn connectivity(mut self, connectivity: impl Connectivity + 'static) -> Self {
        self.connectivity = Arc::new(connectivity);
        self
    }

    pub fn auth(mut self, auth: impl AuthCollaborator + 'static) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    pub fn logger(mut self, logger: ErrorLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> RecoveryService<S> {
        let strategies: Vec<Arc<dyn RecoveryStrategy>> = vec![
            Arc::new(NetworkRetry::new(
                self.connectivity,
                self.config.max_network_delay,
            )),
            Arc::new(RateLimitBackoff::new(self.config.default_retry_after)),
            Arc::new(AuthRefresh::new(self.auth, self.config.login_route.clone())),
            Arc::new(GenericFallback::new(self.stale, self.serializer.clone())),
        ];
        RecoveryService {
            inner: Arc::new(Inner {
                strategies: RwLock::new(strategies),
                states: DashMap::new(),
                config: self.config,
                serializer: self.serializer,
                logger: self.logger,
            }),
        }
    }
}
