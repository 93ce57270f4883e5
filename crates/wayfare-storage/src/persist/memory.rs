//! Process-local key-value store

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use wayfare_core::{KeyValueStore, Result};

/// Key-value store held in memory
///
/// Survives client rebuilds within a process, not restarts.
/// Cloning creates a new handle to the SAME underlying map.
#[derive(Clone, Default)]
pub struct MemoryKv {
    data: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryKv {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.data.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let kv = MemoryKv::new();
        kv.set("stale-weather", b"cloudy".to_vec()).await.unwrap();

        assert_eq!(kv.get("stale-weather").await.unwrap(), Some(b"cloudy".to_vec()));
        assert!(kv.remove("stale-weather").await.unwrap());
        assert!(kv.get("stale-weather").await.unwrap().is_none());
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let kv = MemoryKv::new();
        let other = kv.clone();
        kv.set("k", vec![1]).await.unwrap();
        assert_eq!(other.len(), 1);
    }
}
