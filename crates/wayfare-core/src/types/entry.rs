//! Cache entry type

use std::time::Duration;
use tokio::time::Instant;

/// A cached response body with its freshness window
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The cached value
    pub value: T,
    /// When the entry was stored
    pub stored_at: Instant,
    /// Time-to-live
    pub ttl: Duration,
    /// Size in bytes
    pub size: usize,
}

impl<T> CacheEntry<T> {
    /// Create a new entry stored now
    pub fn new(value: T, size: usize, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
            size,
        }
    }

    /// Fresh iff `age <= ttl`
    pub fn is_fresh(&self) -> bool {
        self.age() <= self.ttl
    }

    /// Past its TTL but still servable as a degraded fallback
    pub fn is_stale(&self) -> bool {
        !self.is_fresh()
    }

    /// Get remaining TTL
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.ttl.checked_sub(self.age())
    }

    /// Get age of the entry
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    /// Map the value, keeping metadata
    pub fn map<U, F>(self, f: F) -> CacheEntry<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheEntry {
            value: f(self.value),
            stored_at: self.stored_at,
            ttl: self.ttl,
            size: self.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fresh_until_ttl_inclusive() {
        let entry = CacheEntry::new("poi", 3, Duration::from_millis(1000));
        assert!(entry.is_fresh());

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(entry.is_fresh());
        assert_eq!(entry.ttl_remaining(), Some(Duration::ZERO));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(entry.is_stale());
        assert!(entry.ttl_remaining().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_map_keeps_metadata() {
        let entry = CacheEntry::new(21, 4, Duration::from_secs(60));
        let stored_at = entry.stored_at;
        let mapped = entry.map(|v| v * 2);
        assert_eq!(mapped.value, 42);
        assert_eq!(mapped.stored_at, stored_at);
        assert_eq!(mapped.ttl, Duration::from_secs(60));
    }
}
