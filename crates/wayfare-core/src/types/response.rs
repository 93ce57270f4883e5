//! Response envelope returned to callers

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Outcome of a resilient request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Response body
    pub data: T,
    /// Always true for a returned response; failures come back as `ApiError`
    pub success: bool,
    /// Served from cache rather than a live operation
    pub cached: bool,
    /// When the response was produced (epoch ms)
    pub timestamp: u64,
    /// Served past its TTL because the live operation failed
    pub stale: bool,
    /// Produced by a recovery strategy
    pub recovered: bool,
    /// Wall time spent producing the response
    pub response_time: Option<Duration>,
}

impl<T> ApiResponse<T> {
    /// Response from a live operation
    pub fn live(data: T, response_time: Duration) -> Self {
        Self {
            data,
            success: true,
            cached: false,
            timestamp: epoch_millis(),
            stale: false,
            recovered: false,
            response_time: Some(response_time),
        }
    }

    /// Response served from a fresh cache entry
    pub fn cached(data: T) -> Self {
        Self {
            data,
            success: true,
            cached: true,
            timestamp: epoch_millis(),
            stale: false,
            recovered: false,
            response_time: None,
        }
    }

    /// Response served from an expired entry after a failure
    pub fn stale(data: T) -> Self {
        Self {
            stale: true,
            ..Self::cached(data)
        }
    }

    /// Response produced by recovery
    pub fn recovered(data: T) -> Self {
        Self {
            data,
            success: true,
            cached: false,
            timestamp: epoch_millis(),
            stale: false,
            recovered: true,
            response_time: None,
        }
    }

    /// Map the body, keeping flags
    pub fn map<U, F>(self, f: F) -> ApiResponse<U>
    where
        F: FnOnce(T) -> U,
    {
        ApiResponse {
            data: f(self.data),
            success: self.success,
            cached: self.cached,
            timestamp: self.timestamp,
            stale: self.stale,
            recovered: self.recovered,
            response_time: self.response_time,
        }
    }

    /// Convert a fallible body mapping, keeping flags
    pub fn try_map<U, E, F>(self, f: F) -> Result<ApiResponse<U>, E>
    where
        F: FnOnce(T) -> Result<U, E>,
    {
        Ok(ApiResponse {
            data: f(self.data)?,
            success: self.success,
            cached: self.cached,
            timestamp: self.timestamp,
            stale: self.stale,
            recovered: self.recovered,
            response_time: self.response_time,
        })
    }
}
