//! Raw markup archive keyed by product cache key

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;

use crate::error::RepositoryError;
use crate::links::log_id;

/// Stores raw bytes by id
#[async_trait]
pub trait ByteStore: Send + Sync {
    async fn save(&self, id: &str, data: Bytes) -> Result<(), RepositoryError>;

    async fn get(&self, id: &str) -> Result<Bytes, RepositoryError>;
}

/// Keeps markup in memory; used when no archive directory is configured
#[derive(Debug, Default)]
pub struct MemoryArchive {
    storage: DashMap<String, Bytes>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[async_trait]
impl ByteStore for MemoryArchive {
    async fn save(&self, id: &str, data: Bytes) -> Result<(), RepositoryError> {
        self.storage.insert(id.to_string(), data);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Bytes, RepositoryError> {
        self.storage
            .get(id)
            .map(|data| data.value().clone())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }
}

/// Writes each entry to `<dir>/<log id>.<extension>`.
///
/// Ids are hashed into file names, so any cache key is file-safe. Saves go to a
/// temporary sibling that is renamed over the entry, so a reader sees either
/// the previous or the new markup in full.
#[derive(Debug)]
pub struct FileArchive {
    dir: PathBuf,
    extension: String,
    next_temp: AtomicU64,
}

impl FileArchive {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            next_temp: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", log_id(id), self.extension))
    }
}

#[async_trait]
impl ByteStore for FileArchive {
    async fn save(&self, id: &str, data: Bytes) -> Result<(), RepositoryError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(id);
        let temp = path.with_extension(format!(
            "{}.tmp-{}-{}",
            self.extension,
            std::process::id(),
            self.next_temp.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = tokio::fs::write(&temp, &data).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        debug!("Archived {} bytes for {} at {}", data.len(), id, path.display());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Bytes, RepositoryError> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(RepositoryError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
