//! Network-safe store: the local store decorated with an on-disk lock.
//!
//! Every operation, reads included, runs under the sibling lock file so
//! writers on other hosts are excluded. Mutations commit inside the store
//! before the guard drops.

use super::lock::{lock_path_for, FsLock, DEFAULT_LOCK_LIFETIME};
use super::{IndexRow, IndexStore, SqliteIndex};
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct NfsIndex {
    inner: SqliteIndex,
    lock_path: PathBuf,
    lifetime: Duration,
}

impl NfsIndex {
    pub async fn open(path: &Path) -> Result<Self> {
        Self::with_lifetime(path, DEFAULT_LOCK_LIFETIME).await
    }

    pub async fn with_lifetime(path: &Path, lifetime: Duration) -> Result<Self> {
        let lock_path = lock_path_for(path);
        // Schema creation is a write; take the lock for the open too.
        let guard = FsLock::acquire(&lock_path, lifetime).await?;
        let inner = SqliteIndex::open(path).await?;
        drop(guard);
        Ok(Self {
            inner,
            lock_path,
            lifetime,
        })
    }

    async fn lock(&self) -> Result<FsLock> {
        FsLock::acquire(&self.lock_path, self.lifetime).await
    }
}

#[async_trait]
impl IndexStore for NfsIndex {
    async fn add(&self, path: &str, min_time: f64, max_time: f64) -> Result<()> {
        let _guard = self.lock().await?;
        self.inner.add(path, min_time, max_time).await
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let _guard = self.lock().await?;
        self.inner.remove(path).await
    }

    async fn indexed(&self, path: &str) -> Result<bool> {
        let _guard = self.lock().await?;
        self.inner.indexed(path).await
    }

    async fn query(&self, begin: Option<f64>, end: Option<f64>) -> Result<Vec<IndexRow>> {
        let _guard = self.lock().await?;
        self.inner.query(begin, end).await
    }

    async fn clean(&self) -> Result<u64> {
        let _guard = self.lock().await?;
        self.inner.clean().await
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn operations_run_and_release_the_lock() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("idx.db");
        let store = NfsIndex::open(&db_path).await.unwrap();

        store.add("/a", 1.0, 2.0).await.unwrap();
        assert!(store.indexed("/a").await.unwrap());
        assert_eq!(store.query(None, None).await.unwrap().len(), 1);

        // Guard released after each call.
        assert!(!lock_path_for(&db_path).exists());
        store.close().await;
    }

    #[tokio::test]
    async fn abandoned_foreign_lock_does_not_wedge() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("idx.db");
        let store = NfsIndex::with_lifetime(&db_path, Duration::from_millis(200))
            .await
            .unwrap();

        // A crashed peer left its lock file behind.
        std::fs::write(lock_path_for(&db_path), b"{}").unwrap();
        store.add("/a", 1.0, 2.0).await.unwrap();
        assert!(store.indexed("/a").await.unwrap());
        store.close().await;
    }
}
