//! Cache lookup result type

use super::entry::CacheEntry;

/// Result of a cache lookup
#[derive(Debug, Clone)]
pub enum Lookup<T> {
    /// Within its TTL
    Fresh(CacheEntry<T>),
    /// Expired, usable only as a fallback
    Stale(CacheEntry<T>),
    /// Nothing stored
    Miss,
}

impl<T> Lookup<T> {
    /// Check if this is a fresh hit
    pub fn is_fresh(&self) -> bool {
        matches!(self, Lookup::Fresh(_))
    }

    /// Check if this is a miss
    pub fn is_miss(&self) -> bool {
        matches!(self, Lookup::Miss)
    }

    /// Check if stale
    pub fn is_stale(&self) -> bool {
        matches!(self, Lookup::Stale(_))
    }

    /// Extract the fresh entry only
    pub fn fresh(self) -> Option<CacheEntry<T>> {
        match self {
            Lookup::Fresh(entry) => Some(entry),
            _ => None,
        }
    }

    /// Extract the entry whether fresh or stale
    pub fn entry(self) -> Option<CacheEntry<T>> {
        match self {
            Lookup::Fresh(entry) | Lookup::Stale(entry) => Some(entry),
            Lookup::Miss => None,
        }
    }

    /// Map the value if present
    pub fn map<U, F>(self, f: F) -> Lookup<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Lookup::Fresh(entry) => Lookup::Fresh(entry.map(f)),
            Lookup::Stale(entry) => Lookup::Stale(entry.map(f)),
            Lookup::Miss => Lookup::Miss,
        }
    }
}

impl<T> From<CacheEntry<T>> for Lookup<T> {
    fn from(entry: CacheEntry<T>) -> Self {
        if entry.is_fresh() {
            Lookup::Fresh(entry)
        } else {
            Lookup::Stale(entry)
        }
    }
}
