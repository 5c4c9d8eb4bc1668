//! Local single-process SQLite store.
//!
//! A one-connection pool serializes access in-process; "database is locked"
//! transients from other processes are retried until they clear.

use super::{IndexRow, IndexStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const SCHEMA_SQL: &str =
    "CREATE TABLE IF NOT EXISTS idx (path TEXT PRIMARY KEY, min_time REAL NOT NULL, max_time REAL NOT NULL)";

const RETRY_DELAY: Duration = Duration::from_millis(50);

fn is_transient_lock(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("locked"))
}

/// Loop an operation until it stops failing with a lock transient.
async fn retry<T, F, Fut>(op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_transient_lock(&err) => {
                debug!(error = %err, "index store busy, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Open (creating if missing) and ensure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        retry(|| async { sqlx::query(SCHEMA_SQL).execute(&pool).await }).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl IndexStore for SqliteIndex {
    async fn add(&self, path: &str, min_time: f64, max_time: f64) -> Result<()> {
        if min_time > max_time {
            return Err(Error::Index(format!(
                "inverted interval for '{path}': {min_time} > {max_time}"
            )));
        }
        retry(|| async {
            sqlx::query("INSERT INTO idx (path, min_time, max_time) VALUES (?1, ?2, ?3)")
                .bind(path)
                .bind(min_time)
                .bind(max_time)
                .execute(&self.pool)
                .await
                .map(|_| ())
        })
        .await
    }

    async fn remove(&self, path: &str) -> Result<()> {
        retry(|| async {
            sqlx::query("DELETE FROM idx WHERE path = ?1")
                .bind(path)
                .execute(&self.pool)
                .await
                .map(|_| ())
        })
        .await
    }

    async fn indexed(&self, path: &str) -> Result<bool> {
        let row = retry(|| async {
            sqlx::query("SELECT 1 FROM idx WHERE path = ?1")
                .bind(path)
                .fetch_optional(&self.pool)
                .await
        })
        .await?;
        Ok(row.is_some())
    }

    async fn query(&self, begin: Option<f64>, end: Option<f64>) -> Result<Vec<IndexRow>> {
        let rows = retry(|| async {
            sqlx::query(
                "SELECT path, min_time, max_time FROM idx \
                 WHERE (?1 IS NULL OR ?1 <= max_time) AND (?2 IS NULL OR min_time <= ?2)",
            )
            .bind(begin)
            .bind(end)
            .fetch_all(&self.pool)
            .await
        })
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| IndexRow {
                path: row.get("path"),
                min_time: row.get("min_time"),
                max_time: row.get("max_time"),
            })
            .collect())
    }

    async fn clean(&self) -> Result<u64> {
        let paths: Vec<(String,)> = retry(|| async {
            sqlx::query_as("SELECT path FROM idx").fetch_all(&self.pool).await
        })
        .await?;
        let mut removed = 0;
        for (path,) in paths {
            if !Path::new(&path).exists() {
                self.remove(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(tmp: &TempDir) -> SqliteIndex {
        SqliteIndex::open(&tmp.path().join("test.db")).await.unwrap()
    }

    #[tokio::test]
    async fn add_indexed_remove() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        assert!(!store.indexed("/a").await.unwrap());
        store.add("/a", 10.0, 20.0).await.unwrap();
        assert!(store.indexed("/a").await.unwrap());

        store.remove("/a").await.unwrap();
        assert!(!store.indexed("/a").await.unwrap());
        // Removing an absent path is a no-op.
        store.remove("/a").await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_add_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.add("/a", 10.0, 20.0).await.unwrap();
        assert!(store.add("/a", 10.0, 20.0).await.is_err());
    }

    #[tokio::test]
    async fn inverted_interval_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        assert!(store.add("/a", 20.0, 10.0).await.is_err());
    }

    #[tokio::test]
    async fn query_overlap_predicate() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.add("/early", 0.0, 10.0).await.unwrap();
        store.add("/mid", 20.0, 30.0).await.unwrap();
        store.add("/late", 40.0, 50.0).await.unwrap();

        let all = store.query(None, None).await.unwrap();
        assert_eq!(all.len(), 3);

        let mid = store.query(Some(15.0), Some(35.0)).await.unwrap();
        assert_eq!(mid.len(), 1);
        assert_eq!(mid[0].path, "/mid");

        // Endpoint equality is an overlap.
        let edge = store.query(Some(10.0), Some(10.0)).await.unwrap();
        assert_eq!(edge.len(), 1);
        assert_eq!(edge[0].path, "/early");

        let tail = store.query(Some(30.0), None).await.unwrap();
        assert_eq!(tail.len(), 2);

        let head = store.query(None, Some(0.0)).await.unwrap();
        assert_eq!(head.len(), 1);
    }

    #[tokio::test]
    async fn clean_drops_vanished_paths_and_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        let alive = tmp.path().join("alive.log");
        std::fs::write(&alive, b"x").unwrap();
        store
            .add(&alive.to_string_lossy(), 1.0, 2.0)
            .await
            .unwrap();
        store.add("/gone/file.log", 3.0, 4.0).await.unwrap();

        assert_eq!(store.clean().await.unwrap(), 1);
        let rows = store.query(None, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(std::path::Path::new(&rows[0].path).exists());

        assert_eq!(store.clean().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn schema_creation_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.db");
        let store = SqliteIndex::open(&path).await.unwrap();
        store.add("/a", 1.0, 2.0).await.unwrap();
        store.close().await;

        let store = SqliteIndex::open(&path).await.unwrap();
        assert!(store.indexed("/a").await.unwrap());
    }
}
