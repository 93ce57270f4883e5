//! Directory-backed key-value store

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use wayfare_core::{ApiError, KeyValueStore, Result};

/// Key bytes spelled out in the file name before the digest suffix
const MAX_HEX_BYTES: usize = 64;

/// Key-value store keeping one file per key
///
/// File names are the hex-encoded key, so any key string is safe. Keys
/// longer than 64 bytes get a SHA-256 suffix, which keeps names stable
/// across builds. Writes go through a temporary file and a rename.
#[derive(Debug, Clone)]
pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    /// Open (creating if needed) a store rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(io_error)?;
        Ok(Self { dir })
    }

    /// Root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let bytes = key.as_bytes();
        let mut name = String::with_capacity(MAX_HEX_BYTES * 2 + 72);
        for byte in bytes.iter().take(MAX_HEX_BYTES) {
            name.push_str(&format!("{byte:02x}"));
        }
        // Long keys (JSON filters) would exceed file name limits
        if bytes.len() > MAX_HEX_BYTES {
            name.push_str(&format!("-{:x}", Sha256::digest(bytes)));
        }
        name.push_str(".bin");
        self.dir.join(name)
    }
}

fn io_error(err: std::io::Error) -> ApiError {
    ApiError::server(format!("persistence io error: {err}"))
}

#[async_trait]
impl KeyValueStore for FileKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, value).await.map_err(io_error)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_error)
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::open(dir.path()).await.unwrap();
        kv.set("stale-carousel-poi-event-{\"free\":true}", b"[1,2]".to_vec())
            .await
            .unwrap();

        let reopened = FileKv::open(dir.path()).await.unwrap();
        assert_eq!(
            reopened
                .get("stale-carousel-poi-event-{\"free\":true}")
                .await
                .unwrap(),
            Some(b"[1,2]".to_vec())
        );
    }

    #[tokio::test]
    async fn test_long_keys_stay_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::open(dir.path()).await.unwrap();
        let base = "carousel-poi-".repeat(20);
        let (a, b) = (format!("{base}a"), format!("{base}b"));

        kv.set(&a, b"a".to_vec()).await.unwrap();
        kv.set(&b, b"b".to_vec()).await.unwrap();

        assert_eq!(kv.get(&a).await.unwrap(), Some(b"a".to_vec()));
        assert_eq!(kv.get(&b).await.unwrap(), Some(b"b".to_vec()));
    }

    #[tokio::test]
    async fn test_long_key_file_name_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::open(dir.path()).await.unwrap();
        let key = "k".repeat(70);
        kv.set(&key, b"v".to_vec()).await.unwrap();

        let expected = format!(
            "{}-5c6ced41eb6f5564254b35c889a38b89d1d16008bdf351fd216967010e442daf.bin",
            "6b".repeat(64)
        );
        assert_eq!(kv.path_for(&key), dir.path().join(&expected));
        assert!(dir.path().join(expected).exists());
        assert_eq!(kv.path_for("k"), dir.path().join("6b.bin"));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::open(dir.path().join("nested")).await.unwrap();

        assert!(kv.get("nothing").await.unwrap().is_none());
        assert!(!kv.remove("nothing").await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::open(dir.path()).await.unwrap();
        kv.set("k", b"one".to_vec()).await.unwrap();
        kv.set("k", b"two".to_vec()).await.unwrap();

        assert_eq!(kv.get("k").await.unwrap(), Some(b"two".to_vec()));
        assert!(kv.remove("k").await.unwrap());
        assert!(kv.get("k").await.unwrap().is_none());
    }
}
