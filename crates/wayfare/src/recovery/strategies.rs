//! Built-in recovery strategies

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use wayfare_core::{ApiError, ErrorKind, Result, Serializer};
use wayfare_storage::StaleStore;

use super::{AuthCollaborator, Connectivity, RecoveryContext, RecoveryOutcome, RecoveryStrategy};
use crate::client::RetryExecutor;

pub const NETWORK_RETRY: &str = "network-retry";
pub const RATE_LIMIT_BACKOFF: &str = "rate-limit-backoff";
pub const AUTH_REFRESH: &str = "auth-refresh";
pub const GENERIC_FALLBACK: &str = "generic-fallback";

/// Retries connectivity failures with capped exponential backoff
pub struct NetworkRetry {
    connectivity: Arc<dyn Connectivity>,
    backoff: RetryExecutor,
}

impl NetworkRetry {
    pub fn new(connectivity: Arc<dyn Connectivity>, max_delay: Duration) -> Self {
        Self {
            connectivity,
            backoff: RetryExecutor::new().with_max_delay(max_delay),
        }
    }

    /// `min(1000 * 2^attempt, max_delay)`
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.backoff(attempt)
    }
}

#[async_trait]
impl RecoveryStrategy for NetworkRetry {
    fn id(&self) -> &str {
        NETWORK_RETRY
    }

    fn max_retries(&self) -> u32 {
        3
    }

    fn can_handle(&self, error: &ApiError) -> bool {
        matches!(
            error.kind,
            ErrorKind::NetworkError | ErrorKind::ApiTimeout | ErrorKind::CorsError
        )
    }

    async fn attempt(
        &self,
        _error: &ApiError,
        _context: &RecoveryContext,
        retry_count: u32,
    ) -> Result<RecoveryOutcome> {
        if !self.connectivity.is_online() {
            return Err(ApiError::network("offline, not retrying"));
        }
        let delay = self.delay(retry_count);
        debug!(target: "wayfare", delay_ms = delay.as_millis() as u64, "Network retry scheduled");
        tokio::time::sleep(delay).await;
        Ok(RecoveryOutcome::Retry)
    }
}

/// Waits out a rate limit before retrying
pub struct RateLimitBackoff {
    default_wait: Duration,
}

impl RateLimitBackoff {
    pub fn new(default_wait: Duration) -> Self {
        Self { default_wait }
    }
}

#[async_trait]
impl RecoveryStrategy for RateLimitBackoff {
    fn id(&self) -> &str {
        RATE_LIMIT_BACKOFF
    }

    fn max_retries(&self) -> u32 {
        2
    }

    fn can_handle(&self, error: &ApiError) -> bool {
        error.kind == ErrorKind::RateLimit
    }

    async fn attempt(
        &self,
        error: &ApiError,
        _context: &RecoveryContext,
        _retry_count: u32,
    ) -> Result<RecoveryOutcome> {
        let wait = error.retry_after.unwrap_or(self.default_wait);
        debug!(target: "wayfare", wait_secs = wait.as_secs(), "Backing off for rate limit");
        tokio::time::sleep(wait).await;
        Ok(RecoveryOutcome::Retry)
    }
}

/// Refreshes credentials, or sends the user to log in
pub struct AuthRefresh {
    auth: Arc<dyn AuthCollaborator>,
    login_route: String,
}

impl AuthRefresh {
    pub fn new(auth: Arc<dyn AuthCollaborator>, login_route: impl Into<String>) -> Self {
        Self {
            auth,
            login_route: login_route.into(),
        }
    }
}

#[async_trait]
impl RecoveryStrategy for AuthRefresh {
    fn id(&self) -> &str {
        AUTH_REFRESH
    }

    fn max_retries(&self) -> u32 {
        1
    }

    fn can_handle(&self, error: &ApiError) -> bool {
        error.kind == ErrorKind::AuthenticationError
    }

    async fn attempt(
        &self,
        error: &ApiError,
        _context: &RecoveryContext,
        _retry_count: u32,
    ) -> Result<RecoveryOutcome> {
        match self.auth.refresh_session().await {
            Ok(()) => Ok(RecoveryOutcome::Retry),
            Err(refresh_err) => {
                warn!(
                    target: "wayfare",
                    route = %self.login_route,
                    reason = %refresh_err,
                    "Session refresh failed, redirecting to login"
                );
                self.auth.redirect_to_login(&self.login_route);
                Err(error.clone())
            }
        }
    }
}

/// Last resort: persisted stale data, then the caller's empty state
pub struct GenericFallback<S: Serializer> {
    stale: Option<StaleStore>,
    serializer: S,
}

impl<S: Serializer> GenericFallback<S> {
    pub fn new(stale: Option<StaleStore>, serializer: S) -> Self {
        Self { stale, serializer }
    }
}

#[async_trait]
impl<S: Serializer> RecoveryStrategy for GenericFallback<S> {
    fn id(&self) -> &str {
        GENERIC_FALLBACK
    }

    fn max_retries(&self) -> u32 {
        1
    }

    fn can_handle(&self, _error: &ApiError) -> bool {
        true
    }

    async fn attempt(
        &self,
        _error: &ApiError,
        context: &RecoveryContext,
        _retry_count: u32,
    ) -> Result<RecoveryOutcome> {
        if let (Some(stale), Some(key)) = (&self.stale, context.cache_key.as_deref()) {
            // An unreadable record is no worse than a missing one
            match stale.load(key).await {
                Ok(Some(record)) => {
                    debug!(
                        target: "wayfare",
                        key = %key,
                        age_secs = record.age().as_secs(),
                        "Serving persisted stale data"
                    );
                    return Ok(RecoveryOutcome::Value(record.data));
                }
                Ok(None) => {}
                Err(err) => warn!(target: "wayfare", key = %key, error = %err, "Stale record unreadable"),
            }
        }

        match &context.empty_state {
            Some(empty) => Ok(RecoveryOutcome::Value(self.serializer.serialize(empty)?)),
            None => Ok(RecoveryOutcome::Nothing),
        }
    }
}
