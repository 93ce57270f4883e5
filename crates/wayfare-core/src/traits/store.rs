//! Cache store and persistence traits

use async_trait::async_trait;
use crate::{Lookup, Result, StoreStats};
use std::time::Duration;

/// In-process response cache
///
/// Values are serialized bytes so one store can hold every response type.
/// Entries are never dropped on expiry: a stale entry is the fallback when
/// the live operation fails.
pub trait CacheStore: Send + Sync + 'static {
    /// Look up a key, classifying the entry as fresh or stale
    fn get(&self, key: &str) -> Lookup<Vec<u8>>;

    /// Store or overwrite a value with the given TTL
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);

    /// Remove a key
    ///
    /// Returns `true` if the key existed.
    fn remove(&self, key: &str) -> bool;

    /// Clear all entries
    fn clear(&self);

    /// Get the number of entries
    fn len(&self) -> usize;

    /// Check if the store is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get store statistics
    fn stats(&self) -> StoreStats;
}

/// Durable key-value storage used as the stale-cache backstop
///
/// Best effort: callers treat errors as "nothing stored".
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Read the bytes stored under `key`
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store bytes under `key`, replacing any previous value
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Remove `key`
    ///
    /// Returns `true` if the key existed.
    async fn remove(&self, key: &str) -> Result<bool>;
}
