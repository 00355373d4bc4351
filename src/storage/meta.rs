//! Flat-file metadata store.
//!
//! Metadata records are JSON documents stored as `root/namespace/key.json`.
//! The store works on `serde_json::Value` so it can sit behind a trait
//! object; typed conversion happens in the repository layer.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::storage::errors::{StorageError, StorageResult};

/// Operations the repository layer needs from a key/value file store.
pub trait MetadataStore: Send + Sync {
    /// Location of the entry for `key` in `namespace`.
    fn path(&self, root: &Path, namespace: &str, key: &str) -> PathBuf;

    /// Create or replace an entry.
    fn write(&self, root: &Path, namespace: &str, key: &str, value: &Value) -> StorageResult<()>;

    /// Read an entry. Missing entries are `MetaNotFound`, bad JSON is `Decode`.
    fn read(&self, root: &Path, namespace: &str, key: &str) -> StorageResult<Value>;

    /// Delete an entry. Missing entries fail with the file system error.
    fn remove(&self, root: &Path, namespace: &str, key: &str) -> StorageResult<()>;
}

/// [`MetadataStore`] writing one pretty-printed JSON file per entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileStore;

impl JsonFileStore {
    fn check(namespace: &str, key: &str) -> StorageResult<()> {
        if namespace.is_empty() {
            return Err(StorageError::InvalidArgument(
                "meta-data namespace cannot be empty".to_string(),
            ));
        }
        if key.is_empty() {
            return Err(StorageError::InvalidArgument(
                "meta-data key cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl MetadataStore for JsonFileStore {
    fn path(&self, root: &Path, namespace: &str, key: &str) -> PathBuf {
        root.join(namespace).join(format!("{key}.json"))
    }

    fn write(&self, root: &Path, namespace: &str, key: &str, value: &Value) -> StorageResult<()> {
        Self::check(namespace, key)?;

        let dir = root.join(namespace);
        fs::create_dir_all(&dir).map_err(|e| StorageError::io("create directory", &dir, e))?;

        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Encode {
            key: key.to_string(),
            source,
        })?;

        // write a sibling first so readers never see a partial file
        let path = self.path(root, namespace, key);
        let tmp = dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, bytes).map_err(|e| StorageError::io("write meta-data", &tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| StorageError::io("rename meta-data", &path, e))?;
        Ok(())
    }

    fn read(&self, root: &Path, namespace: &str, key: &str) -> StorageResult<Value> {
        Self::check(namespace, key)?;

        let path = self.path(root, namespace, key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::MetaNotFound(path))
            }
            Err(e) => return Err(StorageError::io("read meta-data", path, e)),
        };

        serde_json::from_slice(&bytes).map_err(|source| StorageError::Decode { path, source })
    }

    fn remove(&self, root: &Path, namespace: &str, key: &str) -> StorageResult<()> {
        Self::check(namespace, key)?;

        let path = self.path(root, namespace, key);
        fs::remove_file(&path).map_err(|e| StorageError::io("remove meta-data", path, e))
    }
}
