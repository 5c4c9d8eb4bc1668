//! Persisted path-to-interval index stores.
//!
//! One table, `idx(path PRIMARY KEY, min_time REAL, max_time REAL)`, with
//! times in epoch seconds. Two variants implement the same capability set:
//! a plain local store and a network-safe decorator that wraps every
//! operation in an external file lock.

mod lock;
mod nfs;
mod sqlite;

pub use lock::{lock_path_for, FsLock, DEFAULT_LOCK_LIFETIME};
pub use nfs::NfsIndex;
pub use sqlite::SqliteIndex;

use crate::error::Result;
use crate::types::IndexKind;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// One persisted index entry.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRow {
    pub path: String,
    pub min_time: f64,
    pub max_time: f64,
}

/// Capability set shared by every store variant.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Insert a row. Inserting a path twice is a caller error.
    async fn add(&self, path: &str, min_time: f64, max_time: f64) -> Result<()>;

    /// Delete a row; no-op if absent.
    async fn remove(&self, path: &str) -> Result<()>;

    /// Whether a path already has a row.
    async fn indexed(&self, path: &str) -> Result<bool>;

    /// Rows overlapping the (optionally half-open) epoch window:
    /// `(begin unset OR begin <= max_time) AND (end unset OR min_time <= end)`.
    async fn query(&self, begin: Option<f64>, end: Option<f64>) -> Result<Vec<IndexRow>>;

    /// Delete every row whose path no longer exists on the filesystem;
    /// returns how many were removed.
    async fn clean(&self) -> Result<u64>;

    /// Release resources.
    async fn close(&self);
}

/// Open the store variant a descriptor asks for.
pub async fn open(kind: IndexKind, path: &Path) -> Result<Arc<dyn IndexStore>> {
    match kind {
        IndexKind::Sqlite => Ok(Arc::new(SqliteIndex::open(path).await?)),
        IndexKind::SqliteNfs => Ok(Arc::new(NfsIndex::open(path).await?)),
    }
}
