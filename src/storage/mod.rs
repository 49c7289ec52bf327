//! Process-local storage: the expiring key/value repository used for product
//! and delivery caches, and the raw markup archive.

pub mod archive;

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::RepositoryError;

pub use archive::{ByteStore, FileArchive, MemoryArchive};

/// A successful read. `Expired` still carries the stored value so callers can
/// decide whether stale data is good enough.
#[derive(Debug, Clone, PartialEq)]
pub enum Cached<V> {
    Fresh(V),
    Expired(V),
}

impl<V> Cached<V> {
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired(_))
    }

    /// The value, fresh or not
    pub fn into_inner(self) -> V {
        match self {
            Self::Fresh(value) | Self::Expired(value) => value,
        }
    }

    pub fn fresh(self) -> Option<V> {
        match self {
            Self::Fresh(value) => Some(value),
            Self::Expired(_) => None,
        }
    }
}

/// Stores (`save`) and retrieves (`get`) values by string id
pub trait Repository<V>: Send + Sync {
    fn save(&self, id: &str, value: V) -> Result<(), RepositoryError>;

    fn get(&self, id: &str) -> Result<Cached<V>, RepositoryError>;
}

#[derive(Debug, Clone)]
struct CacheItem<V> {
    value: V,
    stored_at: DateTime<Utc>,
}

/// In-memory repository whose entries expire after a fixed TTL.
///
/// Expired entries are never evicted in the background; they stay until the
/// same key is saved again. Under heavy churn of unique keys memory grows
/// without bound.
#[derive(Debug)]
pub struct ExpiringRepository<V> {
    ttl: Duration,
    storage: DashMap<String, CacheItem<V>>,
}

impl<V: Clone + Send + Sync> ExpiringRepository<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            storage: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    fn save_at(&self, id: &str, value: V, stored_at: DateTime<Utc>) {
        self.storage.insert(id.to_string(), CacheItem { value, stored_at });
    }

    fn get_at(&self, id: &str, now: DateTime<Utc>) -> Result<Cached<V>, RepositoryError> {
        let item = self
            .storage
            .get(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        // a stamp in the future (clock moved back) counts as just stored
        let elapsed = (now - item.stored_at).to_std().unwrap_or(Duration::ZERO);
        if elapsed >= self.ttl {
            Ok(Cached::Expired(item.value.clone()))
        } else {
            Ok(Cached::Fresh(item.value.clone()))
        }
    }
}

impl<V: Clone + Send + Sync> Repository<V> for ExpiringRepository<V> {
    fn save(&self, id: &str, value: V) -> Result<(), RepositoryError> {
        self.save_at(id, value, Utc::now());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Cached<V>, RepositoryError> {
        self.get_at(id, Utc::now())
    }
}
