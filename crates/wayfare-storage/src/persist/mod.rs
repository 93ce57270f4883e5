//! Durable key-value backends and the stale-record codec

#[cfg(feature = "file")]
mod file;
#[cfg(feature = "memory")]
mod memory;
mod stale;

#[cfg(feature = "file")]
pub use file::FileKv;
#[cfg(feature = "memory")]
pub use memory::MemoryKv;
pub use stale::{StaleRecord, StaleStore, STALE_PREFIX};
