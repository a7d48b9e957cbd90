//! Flat workspace artifact store.
//!
//! Artifacts are plain files in one shared directory. Names must be bare file
//! names; anything that could escape the workspace is rejected before it
//! reaches the filesystem. Writes go through a temp file and a rename so a
//! concurrent read never observes a partially written artifact. Same-name
//! races are last-writer-wins.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::label;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("invalid artifact name: {0}")]
    InvalidName(String),

    #[error("artifact {name} does not carry a readable label: {reason}")]
    InvalidFormat { name: String, reason: String },

    #[error("workspace i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Opens (and creates if necessary) the workspace directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves an artifact name to its workspace path, rejecting anything
    /// that is not a bare file name.
    pub fn artifact_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    /// Creates or replaces an artifact. The write is atomic: content lands in
    /// a temp file that is renamed into place.
    pub async fn put(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.artifact_path(name)?;
        let tmp = self.root.join(format!(".tmp-{}", Uuid::new_v4()));

        let mut file = tokio::fs::File::create(&tmp).await?;
        if let Err(e) = file.write_all(bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(artifact = name, size = bytes.len(), "stored artifact");
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.artifact_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let path = self.artifact_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(artifact = name, "deleted artifact");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parses the artifact's leading text label into nested JSON.
    pub async fn label(&self, name: &str) -> Result<serde_json::Value, StoreError> {
        let bytes = self.get(name).await?;
        let text = String::from_utf8_lossy(&bytes);
        label::parse_label(&text).map_err(|e| StoreError::InvalidFormat {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Removes every artifact whose mtime is older than the retention window
    /// and returns the number removed.
    pub async fn sweep(&self, retention: Duration) -> Result<usize, StoreError> {
        let now = SystemTime::now();
        let mut removed = 0usize;

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            let modified = match meta.modified() {
                Ok(modified) => modified,
                Err(_) => continue,
            };
            let age = match now.duration_since(modified) {
                Ok(age) => age,
                // mtime in the future; leave it alone
                Err(_) => continue,
            };

            if age > retention {
                let name = entry.file_name().to_string_lossy().into_owned();
                debug!(
                    artifact = %name,
                    modified = %DateTime::<Utc>::from(modified),
                    "removing stale artifact"
                );
                if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                    warn!(artifact = %name, error = %e, "failed to remove stale artifact");
                    continue;
                }
                removed += 1;
            }
        }

        Ok(removed)
    }
}

/// Spawns the background staleness sweeper. Runs off the request path for the
/// life of the process.
pub fn spawn_sweeper(
    store: std::sync::Arc<ArtifactStore>,
    retention: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(retention);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match store.sweep(retention).await {
                Ok(0) => info!("no stale artifacts to remove"),
                Ok(removed) => info!(removed, "removed stale artifacts"),
                Err(e) => warn!(error = %e, "artifact sweep failed"),
            }
        }
    })
}
