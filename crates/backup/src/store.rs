//! Durable store contract and reference adapters.
//!
//! The core never talks to a concrete storage engine; it sees N independent
//! key-value stores with no cross-store transaction. `MemoryStore` backs
//! tests and failure drills, `FileStore` is the file-backed reference
//! adapter (CBOR + zstd payloads, sha256 integrity manifest).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Errors from store adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    Encode(String),
    #[error("CBOR deserialization error: {0}")]
    Decode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store `{store}` unavailable: {reason}")]
    Unavailable { store: String, reason: String },
    #[error("integrity check failed for `{key}`")]
    Integrity { key: String },
}

/// One independent redundant store: get/set/remove/list by key.
///
/// `Send` so full and emergency backups can fan writes out across stores.
pub trait DurableStore: Send {
    fn label(&self) -> &str;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
    fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// The redundant store chain, in priority order.
pub type StoreChain = Vec<Box<dyn DurableStore>>;

/// In-memory store adapter.
///
/// `set_offline` flips the store into a hard-failure mode for durability
/// drills: every operation returns `Unavailable` until it is brought back.
#[derive(Debug, Default)]
pub struct MemoryStore {
    label: String,
    entries: BTreeMap<String, Vec<u8>>,
    offline: bool,
}

impl MemoryStore {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::Unavailable {
                store: self.label.clone(),
                reason: "store is offline".into(),
            });
        }
        Ok(())
    }
}

impl DurableStore for MemoryStore {
    fn label(&self) -> &str {
        &self.label
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_online()?;
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.check_online()?;
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.check_online()?;
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.check_online()?;
        Ok(self
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Entries in the file store's integrity manifest, keyed by store key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FileManifest {
    entries: BTreeMap<String, String>,
}

/// File-backed store adapter.
///
/// Layout inside the store directory:
/// ```text
/// manifest.json   - key -> sha256 of the compressed payload
/// blobs/<key>.zst - zstd-compressed values, one file per key
/// ```
pub struct FileStore {
    label: String,
    root: PathBuf,
    manifest: FileManifest,
}

impl FileStore {
    /// Open or create a file store rooted at the given directory.
    pub fn open(label: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("blobs"))?;
        let manifest_path = root.join("manifest.json");
        let manifest = if manifest_path.exists() {
            serde_json::from_reader(std::fs::File::open(&manifest_path)?)?
        } else {
            FileManifest::default()
        };
        Ok(Self {
            label: label.into(),
            root,
            manifest,
        })
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        // Keys use '/' as a namespace separator; keep that structure on disk.
        self.root.join("blobs").join(format!("{key}.zst"))
    }

    fn save_manifest(&self) -> Result<(), StoreError> {
        let path = self.root.join("manifest.json");
        serde_json::to_writer_pretty(std::fs::File::create(path)?, &self.manifest)?;
        Ok(())
    }
}

impl DurableStore for FileStore {
    fn label(&self) -> &str {
        &self.label
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(expected) = self.manifest.entries.get(key) else {
            return Ok(None);
        };
        let compressed = std::fs::read(self.blob_path(key))?;
        if sha256_hex(&compressed) != *expected {
            return Err(StoreError::Integrity {
                key: key.to_string(),
            });
        }
        Ok(Some(zstd_decompress(&compressed)?))
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let compressed = zstd_compress(value)?;
        let path = self.blob_path(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &compressed)?;
        self.manifest
            .entries
            .insert(key.to_string(), sha256_hex(&compressed));
        self.save_manifest()
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if self.manifest.entries.remove(key).is_some() {
            match std::fs::remove_file(self.blob_path(key)) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
            self.save_manifest()?;
        }
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .manifest
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Serialize a value to CBOR bytes.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Deserialize a value from CBOR bytes.
pub fn from_cbor<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(data).map_err(|e| StoreError::Decode(e.to_string()))
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let mut store = MemoryStore::new("mem-1");
        store.set("full/a", b"payload").unwrap();
        assert_eq!(store.get("full/a").unwrap().unwrap(), b"payload");
        assert_eq!(store.get("full/b").unwrap(), None);
        store.remove("full/a").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn memory_store_offline_fails_everything() {
        let mut store = MemoryStore::new("mem-1");
        store.set("k", b"v").unwrap();
        store.set_offline(true);
        assert!(store.get("k").is_err());
        assert!(store.set("k2", b"v").is_err());
        assert!(store.keys("").is_err());
        store.set_offline(false);
        assert_eq!(store.get("k").unwrap().unwrap(), b"v");
    }

    #[test]
    fn memory_store_keys_by_prefix() {
        let mut store = MemoryStore::new("mem-1");
        store.set("incr/1", b"a").unwrap();
        store.set("incr/2", b"b").unwrap();
        store.set("full/1", b"c").unwrap();
        let keys = store.keys("incr/").unwrap();
        assert_eq!(keys, vec!["incr/1".to_string(), "incr/2".to_string()]);
    }

    #[test]
    fn file_store_roundtrip_and_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("store-a");
        {
            let mut store = FileStore::open("file-a", &path).unwrap();
            store.set("full/000001-aa", b"snapshot bytes").unwrap();
        }
        let store = FileStore::open("file-a", &path).unwrap();
        assert_eq!(
            store.get("full/000001-aa").unwrap().unwrap(),
            b"snapshot bytes"
        );
        assert_eq!(store.keys("full/").unwrap().len(), 1);
    }

    #[test]
    fn file_store_integrity_fail_closed_on_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("store-a");
        let mut store = FileStore::open("file-a", &path).unwrap();
        store.set("full/x", b"snapshot bytes").unwrap();

        let blob = path.join("blobs").join("full").join("x.zst");
        let mut data = std::fs::read(&blob).unwrap();
        if let Some(byte) = data.last_mut() {
            *byte ^= 0xff;
        }
        std::fs::write(&blob, &data).unwrap();

        assert!(matches!(
            store.get("full/x"),
            Err(StoreError::Integrity { .. })
        ));
    }

    #[test]
    fn file_store_remove_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = FileStore::open("file-a", tmp.path().join("s")).unwrap();
        store.set("k", b"v").unwrap();
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn cbor_roundtrip() {
        let value = vec!["a".to_string(), "b".to_string()];
        let bytes = to_cbor(&value).unwrap();
        let back: Vec<String> = from_cbor(&bytes).unwrap();
        assert_eq!(back, value);
    }
}
