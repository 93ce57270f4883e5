//! Error taxonomy for resilient requests
//!
//! Every failure that crosses the request pipeline is normalized into an
//! [`ApiError`] once, at construction. Nothing downstream inspects messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Backend error codes that indicate a transient condition
/// (statement cancelled, connection loss, pool exhaustion, gateway down).
pub const TRANSIENT_BACKEND_CODES: &[&str] = &[
    "57014", "08000", "08001", "08003", "08006", "53300", "PGRST000", "PGRST001", "PGRST002",
];

/// Closed set of error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Generic connectivity failure
    NetworkError,
    /// Operation exceeded the configured timeout
    ApiTimeout,
    /// Backend signaled throttling (HTTP 429)
    RateLimit,
    /// HTTP 401
    AuthenticationError,
    /// HTTP >= 500 or an open circuit breaker
    ServerError,
    /// Malformed or unexpected payload
    InvalidResponse,
    /// Request rejected as invalid
    ValidationError,
    /// Cross-origin rejection
    CorsError,
    /// Recovery refused because its breaker is open
    CircuitBreakerOpen,
}

impl ErrorKind {
    /// Whether the retry executor may try again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkError
                | ErrorKind::ApiTimeout
                | ErrorKind::RateLimit
                | ErrorKind::ServerError
        )
    }

    /// Get kind as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::ApiTimeout => "API_TIMEOUT",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::AuthenticationError => "AUTHENTICATION_ERROR",
            ErrorKind::ServerError => "SERVER_ERROR",
            ErrorKind::InvalidResponse => "INVALID_RESPONSE",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::CorsError => "CORS_ERROR",
            ErrorKind::CircuitBreakerOpen => "CIRCUIT_BREAKER_OPEN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized error returned by every fallible operation in wayfare
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ApiError {
    /// Taxonomy bucket
    pub kind: ErrorKind,
    /// Human-readable message, safe to show to users
    pub message: String,
    /// Endpoint or cache key the error belongs to
    pub endpoint: Option<String>,
    /// HTTP status, when the failure came from an HTTP response
    pub status: Option<u16>,
    /// Backend error code, when the backend reported one
    pub code: Option<String>,
    /// Server-requested wait before retrying
    #[serde(with = "opt_secs")]
    pub retry_after: Option<Duration>,
}

impl ApiError {
    /// Create an error of the given kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            endpoint: None,
            status: None,
            code: None,
            retry_after: None,
        }
    }

    /// Connectivity failure
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkError, message)
    }

    /// Attempt exceeded its timeout
    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ErrorKind::ApiTimeout,
            format!("request timeout after {}ms", after.as_millis()),
        )
    }

    /// Unexpected payload shape
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidResponse, message)
    }

    /// Server-side failure
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerError, message)
    }

    /// Map an HTTP status to the taxonomy
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 => ErrorKind::AuthenticationError,
            429 => ErrorKind::RateLimit,
            400 | 422 => ErrorKind::ValidationError,
            s if s >= 500 => ErrorKind::ServerError,
            _ => ErrorKind::InvalidResponse,
        };
        let mut err = Self::new(kind, message);
        err.status = Some(status);
        err
    }

    /// Map a backend error code to the taxonomy
    ///
    /// Transient codes become retryable server errors, anything else is
    /// treated as a rejected request.
    pub fn from_backend_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let kind = if TRANSIENT_BACKEND_CODES.contains(&code.as_str()) {
            ErrorKind::ServerError
        } else {
            ErrorKind::ValidationError
        };
        let mut err = Self::new(kind, message);
        err.code = Some(code);
        err
    }

    /// Attach the endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Attach a retry-after hint
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Whether the retry executor may try again
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Result type alias for wayfare operations
pub type Result<T> = std::result::Result<T, ApiError>;

mod opt_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
