//! Body compression for persisted stale records
//!
//! A stale record outlives the process, so its body sits in durable
//! storage that is often small. POI and event lists repeat the same keys
//! on every row and shrink several-fold under zstd.

use crate::ApiError;

/// zstd level used for stale bodies
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Bodies shorter than this are persisted raw
pub const MIN_COMPRESSION_SIZE: usize = 256;

/// Codec applied to a stale record body before it is persisted
///
/// `StaleStore` flags each record with whether the body went through
/// `compress`, so changing compressors never misreads old records that
/// were stored raw.
pub trait Compressor: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn compress(&self, body: &[u8]) -> Result<Vec<u8>, ApiError>;

    fn decompress(&self, body: &[u8]) -> Result<Vec<u8>, ApiError>;

    /// Whether `body` is worth compressing
    fn should_compress(&self, body: &[u8]) -> bool {
        body.len() >= MIN_COMPRESSION_SIZE
    }
}

/// Undecodable persisted bodies surface as `INVALID_RESPONSE`
#[cfg(feature = "compression")]
fn corrupt_body(action: &str, err: std::io::Error) -> ApiError {
    ApiError::invalid_response(format!("stale record body could not be {action}: {err}"))
}

/// Stores every body raw
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn name(&self) -> &str {
        "none"
    }

    fn compress(&self, body: &[u8]) -> Result<Vec<u8>, ApiError> {
        Ok(body.to_vec())
    }

    fn decompress(&self, body: &[u8]) -> Result<Vec<u8>, ApiError> {
        Ok(body.to_vec())
    }

    fn should_compress(&self, _body: &[u8]) -> bool {
        false
    }
}

/// zstd codec for bodies of at least `min_size` bytes
#[cfg(feature = "compression")]
#[derive(Debug, Clone)]
pub struct ZstdCompressor {
    level: i32,
    min_size: usize,
}

#[cfg(feature = "compression")]
impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

#[cfg(feature = "compression")]
impl ZstdCompressor {
    /// Level is clamped to zstd's 1-22 range
    pub fn new(level: i32) -> Self {
        Self {
            level: level.clamp(1, 22),
            min_size: MIN_COMPRESSION_SIZE,
        }
    }

    pub fn with_min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    pub fn level(&self) -> i32 {
        self.level
    }
}

#[cfg(feature = "compression")]
impl Compressor for ZstdCompressor {
    fn name(&self) -> &str {
        "zstd"
    }

    fn compress(&self, body: &[u8]) -> Result<Vec<u8>, ApiError> {
        zstd::encode_all(body, self.level).map_err(|e| corrupt_body("compressed", e))
    }

    fn decompress(&self, body: &[u8]) -> Result<Vec<u8>, ApiError> {
        zstd::decode_all(body).map_err(|e| corrupt_body("decompressed", e))
    }

    fn should_compress(&self, body: &[u8]) -> bool {
        body.len() >= self.min_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_never_compresses() {
        let compressor = NoopCompressor;
        let body = vec![b'x'; 4096];

        assert!(!compressor.should_compress(&body));
        assert_eq!(compressor.compress(&body).unwrap(), body);
        assert_eq!(compressor.name(), "none");
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_zstd_shrinks_repetitive_poi_list() {
        let compressor = ZstdCompressor::new(3);
        let body = r#"{"id":"museum","category":"culture","rating":4.0},"#.repeat(64);

        assert!(compressor.should_compress(body.as_bytes()));
        let compressed = compressor.compress(body.as_bytes()).unwrap();
        assert!(compressed.len() < body.len());
        assert_eq!(compressor.decompress(&compressed).unwrap(), body.as_bytes());
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_zstd_threshold_and_clamping() {
        let compressor = ZstdCompressor::new(100).with_min_size(16);
        assert_eq!(compressor.level(), 22);
        assert!(!compressor.should_compress(b"tiny"));
        assert!(compressor.should_compress(&[0u8; 16]));
        assert_eq!(ZstdCompressor::new(-5).level(), 1);
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_zstd_rejects_garbage() {
        let err = ZstdCompressor::default().decompress(b"not zstd").unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::InvalidResponse);
        assert!(!err.is_retryable());
        assert!(err.message.starts_with("stale record body could not be decompressed"));
    }
}
