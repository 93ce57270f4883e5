//! Core types for resilient requests

mod entry;
mod lookup;
mod options;
mod response;
mod stats;

pub use entry::CacheEntry;
pub use lookup::Lookup;
pub use options::{
    Priority, RequestConfig, RequestOpts, DEFAULT_CACHE_TTL, DEFAULT_RETRY_COUNT, DEFAULT_TIMEOUT,
};
pub use response::{epoch_millis, ApiResponse};
pub use stats::{EndpointHealth, EndpointMetrics, HealthStatus, StoreStats};
