//! Response body encodings

use crate::ApiError;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;

/// Encoding for response bodies held in the cache, in stale records and
/// on the coalescing channel
///
/// Operations return typed values; the client stores and shares them as
/// bytes, so one encoding must round-trip every response type it sees.
pub trait Serializer: Send + Sync + Clone + 'static {
    fn name(&self) -> &str;

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ApiError>;

    /// Decode a cached body. A body of the wrong shape is an
    /// `INVALID_RESPONSE`, which recovery never retries.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, ApiError>;
}

fn encode_error(format: &str, err: impl Display) -> ApiError {
    ApiError::invalid_response(format!("response body could not be encoded as {format}: {err}"))
}

fn decode_error(format: &str, err: impl Display) -> ApiError {
    ApiError::invalid_response(format!("cached body is not valid {format}: {err}"))
}

/// Default encoding; cached bodies stay readable in stale records
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &str {
        "json"
    }

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ApiError> {
        serde_json::to_vec(value).map_err(|e| encode_error(self.name(), e))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, ApiError> {
        serde_json::from_slice(bytes).map_err(|e| decode_error(self.name(), e))
    }
}

/// Compact binary bodies, behind the `msgpack` feature
#[cfg(feature = "msgpack")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackSerializer;

#[cfg(feature = "msgpack")]
impl Serializer for MsgPackSerializer {
    fn name(&self) -> &str {
        "msgpack"
    }

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ApiError> {
        rmp_serde::to_vec(value).map_err(|e| encode_error(self.name(), e))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, ApiError> {
        rmp_serde::from_slice(bytes).map_err(|e| decode_error(self.name(), e))
    }
}

/// Smallest bodies, behind the `bincode` feature. Records written with it
/// are only readable by the same struct layout.
#[cfg(feature = "bincode")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

#[cfg(feature = "bincode")]
impl Serializer for BincodeSerializer {
    fn name(&self) -> &str {
        "bincode"
    }

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ApiError> {
        bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| encode_error(self.name(), e))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, ApiError> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(value, _read)| value)
            .map_err(|e| decode_error(self.name(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Poi {
        id: String,
        rating: f64,
    }

    #[test]
    fn test_json_body() {
        let serializer = JsonSerializer;
        let value = vec![Poi {
            id: "cathedral".to_string(),
            rating: 4.5,
        }];

        let bytes = serializer.serialize(&value).unwrap();
        assert_eq!(bytes, br#"[{"id":"cathedral","rating":4.5}]"#.to_vec());

        let decoded: Vec<Poi> = serializer.deserialize(&bytes).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn test_shape_mismatch_is_invalid_response() {
        let err = JsonSerializer
            .deserialize::<Vec<Poi>>(br#"{"unexpected":true}"#)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
        assert!(!err.is_retryable());
        assert!(err.message.starts_with("cached body is not valid json"));
    }

    #[test]
    fn test_json_serializer_name() {
        assert_eq!(JsonSerializer.name(), "json");
    }
}
