//! Core traits for resilient requests

mod key;
mod metrics;
mod serializer;
mod store;

#[cfg(feature = "tracing")]
mod tracing;

pub use key::{json_part, CompositeKey, RequestKey, KEY_SEPARATOR};
pub use metrics::{ClientMetrics, EvictionReason, NoopMetrics, RequestOutcome};
pub use serializer::{JsonSerializer, Serializer};
pub use store::{CacheStore, KeyValueStore};

#[cfg(feature = "metrics")]
pub use metrics::MetricsCrateAdapter;

#[cfg(feature = "tracing")]
pub use self::tracing::TracingMetrics;

#[cfg(feature = "msgpack")]
pub use serializer::MsgPackSerializer;

#[cfg(feature = "bincode")]
pub use serializer::BincodeSerializer;
