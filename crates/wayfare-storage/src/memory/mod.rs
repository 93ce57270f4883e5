//! In-memory response cache

mod store;

pub use store::{MemoryConfig, MemoryStore};
