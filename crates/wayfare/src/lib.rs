//! wayfare: Client-side API resilience layer
//!
//! # Features
//!
//! - **Request coalescing** (one in-flight call per cache key)
//! - **TTL response cache** with stale fallback after failures
//! - **Per-key circuit breakers** and exponential backoff retry
//! - **Recovery strategies** (network retry, rate-limit backoff, auth refresh, fallback)
//! - **Geographic POI cache** with tile eviction and movement-aware prefetch
//! - **Pluggable serialization** (JSON, MessagePack, Bincode)
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use wayfare::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let client = RequestClient::default();
//!
//!     let response = client
//!         .request(
//!             || async { Ok(vec!["Sagrada Família".to_string()]) },
//!             RequestOpts::new().ttl_mins(5).endpoint("landmarks"),
//!             Some("landmarks-barcelona"),
//!         )
//!         .await?;
//!
//!     println!("{:?} (cached: {})", response.data, response.cached);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod geo;
pub mod logger;
pub mod recovery;
pub mod services;

// Re-export core
pub use wayfare_core::*;

// Re-export storage
#[cfg(feature = "file")]
pub use wayfare_storage::FileKv;
pub use wayfare_storage::{MemoryConfig, MemoryKv, MemoryStore, StaleRecord, StaleStore};

// The derive shares its name with the trait, like serde's derives
pub use wayfare_derive::RequestKey;

pub use client::{ClientConfig, RequestClient};
pub use geo::{GeoConfig, GeographicCache};
pub use logger::{ErrorContext, ErrorLogger, LoggerConfig};
pub use recovery::{RecoveryContext, RecoveryService, RecoveryStrategy};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ApiError, ApiResponse, ClientConfig, ErrorKind, JsonSerializer, MemoryStore,
        RequestClient, RequestConfig, RequestKey, RequestOpts, Result, Serializer,
    };

    pub use crate::geo::{Bounds, GeoConfig, GeographicCache, LatLng, Poi};
    pub use crate::logger::ErrorLogger;
    pub use crate::recovery::{RecoveryContext, RecoveryService};

    #[cfg(feature = "msgpack")]
    pub use crate::MsgPackSerializer;

    #[cfg(feature = "bincode")]
    pub use crate::BincodeSerializer;
}

#[cfg(test)]
mod tests;
