//! Versioned JSON persistence
//!
//! Each registry is one JSON file in the storage directory, wrapped with its
//! key and version so older files can be detected on load.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch for {key}: expected {expected}, found {found}")]
    VersionMismatch {
        key: String,
        expected: u32,
        found: u32,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// On-disk wrapper of one registry
///
/// ```json
/// { "version": 1, "minor_version": 1, "key": "hub.rules", "data": { ... } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    /// Major version, bumped on breaking layout changes
    pub version: u32,
    pub minor_version: u32,
    /// Storage key (file name)
    pub key: String,
    pub data: T,
}

/// Data that is persisted as one storage file
pub trait Storable: Serialize + DeserializeOwned {
    const KEY: &'static str;
    const VERSION: u32;
    const MINOR_VERSION: u32;
}

/// Directory of storage files
#[derive(Debug)]
pub struct Storage {
    storage_dir: PathBuf,
    /// Serializes writers so temp files are never shared
    write_lock: Mutex<()>,
}

impl Storage {
    /// Create a storage rooted at `storage_dir` (created on first save)
    pub fn new(storage_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: storage_dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Get the file path for a storage key
    pub fn file_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.file_path(key).exists()
    }

    /// Load a storable value
    ///
    /// Returns `None` if nothing was stored yet. A different major version is
    /// an error; an older minor version is loaded with a warning.
    pub async fn load<T: Storable>(&self) -> StorageResult<Option<T>> {
        let path = self.file_path(T::KEY);
        if !path.exists() {
            debug!(key = T::KEY, "Storage file not found");
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let file: StorageFile<T> = serde_json::from_str(&content)?;

        if file.version != T::VERSION {
            return Err(StorageError::VersionMismatch {
                key: T::KEY.to_string(),
                expected: T::VERSION,
                found: file.version,
            });
        }
        if file.minor_version < T::MINOR_VERSION {
            warn!(
                key = T::KEY,
                found = file.minor_version,
                current = T::MINOR_VERSION,
                "Storage file has an older minor version"
            );
        }

        debug!(key = T::KEY, version = file.version, "Loaded storage file");
        Ok(Some(file.data))
    }

    /// Save a storable value atomically (temp file, then rename)
    pub async fn save<T: Storable>(&self, data: &T) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;

        if !self.storage_dir.exists() {
            fs::create_dir_all(&self.storage_dir).await?;
            debug!(dir = ?self.storage_dir, "Created storage directory");
        }

        let file = StorageFile {
            version: T::VERSION,
            minor_version: T::MINOR_VERSION,
            key: T::KEY.to_string(),
            data,
        };
        let content = serde_json::to_string_pretty(&file)?;

        let path = self.file_path(T::KEY);
        let temp_path = self.file_path(&format!("{}.tmp", T::KEY));
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(key = T::KEY, "Saved storage file");
        Ok(())
    }

    /// Delete a storage file if present
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.file_path(key);
        if path.exists() {
            fs::remove_file(&path).await?;
            debug!(key, "Deleted storage file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        value: i32,
    }

    impl Storable for Sample {
        const KEY: &'static str = "test.sample";
        const VERSION: u32 = 2;
        const MINOR_VERSION: u32 = 1;
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join(".storage"));

        let data = Sample {
            name: "pump".to_string(),
            value: 42,
        };
        storage.save(&data).await.unwrap();
        assert!(storage.exists("test.sample"));
        assert!(!storage.exists("test.sample.tmp"));

        let loaded: Option<Sample> = storage.load().await.unwrap();
        assert_eq!(loaded, Some(data));
    }

    #[tokio::test]
    async fn test_load_missing() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let loaded: Option<Sample> = storage.load().await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        std::fs::write(
            storage.file_path("test.sample"),
            r#"{"version": 1, "minor_version": 1, "key": "test.sample", "data": {"name": "x", "value": 1}}"#,
        )
        .unwrap();

        let result: StorageResult<Option<Sample>> = storage.load().await;
        assert!(matches!(
            result,
            Err(StorageError::VersionMismatch {
                expected: 2,
                found: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        storage
            .save(&Sample {
                name: "x".to_string(),
                value: 1,
            })
            .await
            .unwrap();

        storage.delete("test.sample").await.unwrap();
        assert!(!storage.exists("test.sample"));
    }
}
