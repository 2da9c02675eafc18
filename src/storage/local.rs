//! Local filesystem snapshot storage.
//!
//! Snapshots are written atomically (temp file, then rename) so an
//! interrupted run never leaves a half-written baseline behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{ComparedReport, Entity};
use crate::storage::{Snapshot, SnapshotStore, StorageKey, StoredSnapshot};

/// File name of the last run's comparison report.
pub const COMPARED_FILE: &str = "compared.json";

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalSnapshotStore {
    root_dir: PathBuf,
}

impl LocalSnapshotStore {
    /// Create a store rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Full path of the snapshot file for `key`.
    pub fn path_for(&self, key: &StorageKey) -> PathBuf {
        self.root_dir.join(key.relative_path())
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.ensure_dir(path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(path, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match self.read_bytes(path).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Load the last comparison report, if one was written.
    pub async fn load_report(&self) -> Result<Option<ComparedReport>> {
        self.read_json(&self.root_dir.join(COMPARED_FILE)).await
    }
}

#[async_trait]
impl SnapshotStore for LocalSnapshotStore {
    async fn load(&self, key: &StorageKey) -> Result<Option<Snapshot>> {
        let path = self.path_for(key);
        log::info!("Loading entity from '{}'", path.display());

        let stored: Option<StoredSnapshot> = self.read_json(&path).await?;
        match stored {
            Some(stored) => {
                log::info!("'{}' - json fetched correctly", path.display());
                Ok(Some(Snapshot::from(stored)))
            }
            None => {
                log::info!("No snapshot stored at '{}'", path.display());
                Ok(None)
            }
        }
    }

    async fn save(&self, key: &StorageKey, entity: &Entity) -> Result<()> {
        let path = self.path_for(key);
        log::info!("Saving entity to '{}'", path.display());
        self.write_json(&path, entity).await
    }

    async fn save_report(&self, report: &ComparedReport) -> Result<()> {
        let path = self.root_dir.join(COMPARED_FILE);
        log::debug!(
            "Writing {} change(s) to '{}'",
            report.change_count,
            path.display()
        );
        self.write_json(&path, report).await
    }
}
