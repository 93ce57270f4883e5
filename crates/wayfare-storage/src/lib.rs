//! wayfare-storage: Cache stores and persistence backends for wayfare

#[cfg(feature = "memory")]
pub mod memory;
pub mod persist;

#[cfg(feature = "memory")]
pub use memory::{MemoryConfig, MemoryStore};
#[cfg(feature = "file")]
pub use persist::FileKv;
#[cfg(feature = "memory")]
pub use persist::MemoryKv;
pub use persist::{StaleRecord, StaleStore, STALE_PREFIX};
