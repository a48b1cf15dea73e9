//! Key/blob persistence for uploads and run artifacts.
//!
//! Keys are `/`-separated relative paths (`uploads/<id>.pdf`,
//! `results/<run-key>/<file>`). A namespace is any key prefix that names a
//! directory; listing one returns the blobs directly inside it.

pub mod filesystem;

pub use filesystem::FileStorage;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Handle returned by a successful `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub key: String,
    pub size: u64,
}

/// One blob inside a namespace listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub name: String,
    pub size: u64,
}

pub trait ArtifactStore: Send + Sync {
    /// Writes the whole blob under `key`. Readers never observe a partial write.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<ArtifactRef, StorageError>;

    /// Reads a blob. A missing key is `Ok(None)`, not an error.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Lists blobs directly inside `namespace`, sorted by name. A missing
    /// namespace lists as empty.
    fn list(&self, namespace: &str) -> Result<Vec<StoredEntry>, StorageError>;

    /// Deletes a namespace and everything in it. Returns false if it did not exist.
    fn remove_namespace(&self, namespace: &str) -> Result<bool, StorageError>;
}

/// Joins key segments with `/`.
pub fn join_key(namespace: &str, name: &str) -> String {
    let namespace = namespace.trim_end_matches('/');
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", namespace, name)
    }
}

/// Checks that `key` is a relative, `/`-separated path with no empty, `.` or
/// `..` segments.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = |reason| StorageError::InvalidKey {
        key: key.to_string(),
        reason,
    };

    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.starts_with('/') {
        return Err(invalid("key must be relative"));
    }
    if key.contains('\\') {
        return Err(invalid("backslashes are not allowed"));
    }
    for segment in key.split('/') {
        match segment {
            "" => return Err(invalid("empty path segment")),
            "." | ".." => return Err(invalid("relative path segment")),
            _ => {}
        }
    }
    Ok(())
}
