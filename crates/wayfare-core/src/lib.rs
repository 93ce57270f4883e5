//! wayfare-core: Core traits and types for the wayfare resilience layer
//!
//! This crate provides the error taxonomy, cache entry and response types,
//! and the seams (stores, persistence, serialization, metrics) shared by
//! the storage backends and the request client.

mod compression;
mod error;
mod traits;
mod types;

pub use compression::{Compressor, NoopCompressor, DEFAULT_COMPRESSION_LEVEL, MIN_COMPRESSION_SIZE};
#[cfg(feature = "compression")]
pub use compression::ZstdCompressor;
pub use error::{ApiError, ErrorKind, Result, TRANSIENT_BACKEND_CODES};
pub use traits::*;
pub use types::*;
