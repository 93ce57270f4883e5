//! In-memory response cache using DashMap

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

use wayfare_core::{CacheEntry, CacheStore, Lookup, StoreStats};

/// Configuration for the memory store
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Maximum number of entries (0 = unlimited)
    pub max_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_capacity: 1_000,
        }
    }
}

impl MemoryConfig {
    /// Create config with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            max_capacity: capacity,
        }
    }

    /// Create config with unlimited capacity
    pub fn unlimited() -> Self {
        Self { max_capacity: 0 }
    }
}

/// Internal statistics tracking
#[derive(Debug, Default)]
struct MemoryStats {
    hits: u64,
    misses: u64,
    stale_hits: u64,
    writes: u64,
    evictions: u64,
}

/// In-memory response cache
///
/// Expired entries stay in place so they can back a stale fallback; the
/// store only shrinks on `remove`, `clear` or when the capacity bound
/// evicts the oldest entry.
/// Cloning creates a new handle to the SAME underlying store.
#[derive(Clone)]
pub struct MemoryStore {
    /// Main data store
    data: Arc<DashMap<String, CacheEntry<Vec<u8>>>>,
    /// Statistics
    stats: Arc<RwLock<MemoryStats>>,
    /// Configuration
    config: MemoryConfig,
}

impl MemoryStore {
    /// Create a new memory store
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            data: Arc::new(DashMap::with_capacity(config.max_capacity.min(1_000))),
            stats: Arc::new(RwLock::new(MemoryStats::default())),
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(MemoryConfig::default())
    }

    /// Evict the oldest entries until a new key fits
    fn maybe_evict(&self, incoming: &str) {
        if self.config.max_capacity == 0 {
            return; // Unlimited
        }

        // Overwrites never grow the store
        if self.data.contains_key(incoming) || self.data.len() < self.config.max_capacity {
            return;
        }

        let excess = self.data.len() + 1 - self.config.max_capacity;
        let mut by_age: Vec<(String, tokio::time::Instant)> = self
            .data
            .iter()
            .map(|entry| (entry.key().clone(), entry.stored_at))
            .collect();
        by_age.sort_by_key(|(_, stored_at)| *stored_at);

        for (key, _) in by_age.into_iter().take(excess) {
            self.data.remove(&key);
            self.stats.write().evictions += 1;
        }
    }

    /// Get approximate memory usage
    pub fn memory_usage(&self) -> usize {
        self.data
            .iter()
            .map(|entry| entry.size + entry.key().len())
            .sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Lookup<Vec<u8>> {
        let lookup = match self.data.get(key) {
            Some(entry) => Lookup::from(entry.clone()),
            None => Lookup::Miss,
        };

        let mut stats = self.stats.write();
        match &lookup {
            Lookup::Fresh(_) => stats.hits += 1,
            Lookup::Stale(_) => stats.stale_hits += 1,
            Lookup::Miss => stats.misses += 1,
        }
        lookup
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.maybe_evict(key);

        let size = value.len();
        self.data
            .insert(key.to_string(), CacheEntry::new(value, size, ttl));
        self.stats.write().writes += 1;
    }

    fn remove(&self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    fn clear(&self) {
        self.data.clear();
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn stats(&self) -> StoreStats {
        let stats = self.stats.read();
        StoreStats {
            hits: stats.hits,
            misses: stats.misses,
            stale_hits: stats.stale_hits,
            writes: stats.writes,
            evictions: stats.evictions,
            size: self.data.len(),
            memory_bytes: self.memory_usage(),
        }
    }
}
