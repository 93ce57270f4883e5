//! `stale-<cacheKey>` backstop records

use std::sync::Arc;
use std::time::Duration;

use wayfare_core::{epoch_millis, ApiError, Compressor, KeyValueStore, NoopCompressor, Result};

/// Prefix of every persisted stale record key
pub const STALE_PREFIX: &str = "stale-";

const FLAG_RAW: u8 = 0;
const FLAG_COMPRESSED: u8 = 1;
const HEADER_LEN: usize = 9;

/// A response body recovered from durable storage
#[derive(Debug, Clone, PartialEq)]
pub struct StaleRecord {
    /// Serialized response body
    pub data: Vec<u8>,
    /// When the body was persisted (epoch ms)
    pub stored_at_ms: u64,
}

impl StaleRecord {
    /// Time since the record was persisted
    pub fn age(&self) -> Duration {
        Duration::from_millis(epoch_millis().saturating_sub(self.stored_at_ms))
    }

    /// Encode as `[flag][stored_at_ms: u64 BE][body]`
    fn encode(&self, compressor: &dyn Compressor) -> Result<Vec<u8>> {
        let (flag, body) = if compressor.should_compress(&self.data) {
            (FLAG_COMPRESSED, compressor.compress(&self.data)?)
        } else {
            (FLAG_RAW, self.data.clone())
        };
        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.push(flag);
        out.extend_from_slice(&self.stored_at_ms.to_be_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn decode(bytes: &[u8], compressor: &dyn Compressor) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(ApiError::invalid_response("stale record truncated"));
        }
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&bytes[1..HEADER_LEN]);
        let body = &bytes[HEADER_LEN..];
        let data = match bytes[0] {
            FLAG_RAW => body.to_vec(),
            FLAG_COMPRESSED => compressor.decompress(body)?,
            other => {
                return Err(ApiError::invalid_response(format!(
                    "unknown stale record flag {other}"
                )));
            }
        };
        Ok(Self {
            data,
            stored_at_ms: u64::from_be_bytes(ts),
        })
    }
}

/// Durable mirror of successful responses, read back by the generic
/// recovery fallback
///
/// Cloning creates a new handle to the SAME underlying store.
#[derive(Clone)]
pub struct StaleStore {
    kv: Arc<dyn KeyValueStore>,
    compressor: Arc<dyn Compressor>,
}

impl StaleStore {
    /// Wrap a key-value store, storing bodies uncompressed
    pub fn new(kv: impl KeyValueStore) -> Self {
        Self::with_compressor(kv, NoopCompressor)
    }

    /// Wrap a key-value store with a compressor for large bodies
    pub fn with_compressor(kv: impl KeyValueStore, compressor: impl Compressor) -> Self {
        Self {
            kv: Arc::new(kv),
            compressor: Arc::new(compressor),
        }
    }

    /// Storage key for a cache key
    pub fn stale_key(cache_key: &str) -> String {
        format!("{STALE_PREFIX}{cache_key}")
    }

    /// Persist a response body for `cache_key`
    pub async fn save(&self, cache_key: &str, data: &[u8]) -> Result<()> {
        let record = StaleRecord {
            data: data.to_vec(),
            stored_at_ms: epoch_millis(),
        };
        let encoded = record.encode(self.compressor.as_ref())?;
        self.kv.set(&Self::stale_key(cache_key), encoded).await
    }

    /// Read the persisted body for `cache_key`
    pub async fn load(&self, cache_key: &str) -> Result<Option<StaleRecord>> {
        match self.kv.get(&Self::stale_key(cache_key)).await? {
            Some(bytes) => StaleRecord::decode(&bytes, self.compressor.as_ref()).map(Some),
            None => Ok(None),
        }
    }

    /// Drop the persisted body for `cache_key`
    pub async fn remove(&self, cache_key: &str) -> Result<bool> {
        self.kv.remove(&Self::stale_key(cache_key)).await
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::MemoryKv;
    use wayfare_core::ErrorKind;

    #[tokio::test]
    async fn test_save_and_load() {
        let kv = MemoryKv::new();
        let store = StaleStore::new(kv.clone());
        store.save("weather-41.39-2.17", br#"{"temp":21}"#).await.unwrap();

        assert!(kv.get("stale-weather-41.39-2.17").await.unwrap().is_some());

        let record = store.load("weather-41.39-2.17").await.unwrap().unwrap();
        assert_eq!(record.data, br#"{"temp":21}"#.to_vec());
        assert!(record.stored_at_ms > 0);
        assert!(record.age() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_missing_record() {
        let store = StaleStore::new(MemoryKv::new());
        assert!(store.load("nothing").await.unwrap().is_none());
        assert!(!store.remove("nothing").await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_invalid_response() {
        let kv = MemoryKv::new();
        kv.set("stale-broken", vec![7, 0, 0]).await.unwrap();
        let store = StaleStore::new(kv);

        let err = store.load("broken").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_encoding_layout() {
        let record = StaleRecord {
            data: b"[]".to_vec(),
            stored_at_ms: 1,
        };
        let bytes = record.encode(&NoopCompressor).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0, 0, 0, 1, b'[', b']']);
        assert_eq!(StaleRecord::decode(&bytes, &NoopCompressor).unwrap(), record);
    }
}
