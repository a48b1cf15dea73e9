use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

use super::{validate_key, ArtifactRef, ArtifactStore, StoredEntry};

/// Prefix of in-flight temp files. Listings skip them.
const PARTIAL_PREFIX: &str = ".partial-";

/// Filesystem-backed [`ArtifactStore`] rooted at a content directory.
///
/// Writes go to a temp file in the destination directory and are renamed
/// into place, so a blob is either absent or complete.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |p, s| p.join(s)))
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

impl ArtifactStore for FileStorage {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<ArtifactRef, StorageError> {
        let path = self.resolve(key)?;
        let dir = path.parent().unwrap_or(self.root.as_path());
        self.ensure_directory(dir)?;

        let write_err = |source| StorageError::WriteFile {
            path: path.clone(),
            source,
        };

        let mut temp = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .tempfile_in(dir)
            .map_err(write_err)?;
        temp.write_all(bytes).map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;
        temp.persist(&path).map_err(|e| write_err(e.error))?;

        Ok(ArtifactRef {
            key: key.to_string(),
            size: bytes.len() as u64,
        })
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.resolve(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::ReadFile { path, source: e }),
        }
    }

    fn list(&self, namespace: &str) -> Result<Vec<StoredEntry>, StorageError> {
        let dir = self.resolve(namespace)?;
        let read_err = |source| StorageError::ReadFile {
            path: dir.clone(),
            source,
        };

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(read_err(e)),
        };

        let mut listing = Vec::new();
        for entry in entries {
            let entry = entry.map_err(read_err)?;
            let metadata = entry.metadata().map_err(read_err)?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(PARTIAL_PREFIX) {
                continue;
            }
            listing.push(StoredEntry {
                name,
                size: metadata.len(),
            });
        }

        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    fn remove_namespace(&self, namespace: &str) -> Result<bool, StorageError> {
        let dir = self.resolve(namespace)?;
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Remove {
                path: dir,
                source: e,
            }),
        }
    }
}
