//! Concurrent index construction.
//!
//! Candidate files come from the walker (full build) or from fuzzy
//! resolution (windowed build). A bounded pool of tasks runs one external
//! indexer subprocess each; results are committed to the store serially as
//! they complete, so a mid-run failure leaves earlier commits durable.

use crate::error::{Error, Result};
use crate::source::Descriptor;
use crate::types::Window;
use crate::{fuzzy, index, walk};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Worker-pool configuration for index builds.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    /// Concurrent indexer subprocesses.
    pub workers: usize,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

/// Run the external indexer on one file and parse its `"<min> <max>"` line.
async fn run_indexer(program: &Path, path: &Path) -> Result<(f64, f64)> {
    let fail = |message: String| Error::Indexer {
        program: program.display().to_string(),
        path: path.display().to_string(),
        message,
    };

    let output = Command::new(program)
        .arg(path)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| fail(format!("failed to spawn: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(fail(format!(
            "exit status {:?}, stderr: {}",
            output.status.code(),
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout
        .lines()
        .next()
        .ok_or_else(|| fail("no output".to_string()))?;
    let mut parts = first.split_whitespace();
    let min: f64 = parts
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| fail(format!("unparseable output line '{first}'")))?;
    let max: f64 = parts
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| fail(format!("unparseable output line '{first}'")))?;
    if min > max {
        return Err(fail(format!("inverted interval {min} > {max}")));
    }
    Ok((min, max))
}

impl IndexBuilder {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Materialize or extend one descriptor's index. Returns how many rows
    /// were added.
    pub async fn build(&self, descriptor: &Descriptor, window: &Window) -> Result<u64> {
        let indexer = descriptor.indexer.clone().ok_or_else(|| {
            Error::Config(format!("source '{}' has no indexer", descriptor.source))
        })?;
        let index_path = descriptor.index_path()?;
        let store = index::open(descriptor.index_type, index_path).await?;

        let paths: Vec<PathBuf> = if window.is_unbounded() {
            walk::walk(descriptor)?.collect()
        } else {
            fuzzy::resolve(descriptor, window)?
                .into_iter()
                .map(|span| span.path)
                .collect()
        };
        info!(
            source = %descriptor.source,
            candidates = paths.len(),
            workers = self.workers,
            "indexing"
        );

        let mut results = stream::iter(paths.into_iter().map(|path| {
            let store = store.clone();
            let indexer = indexer.clone();
            async move {
                if store.indexed(&path.to_string_lossy()).await? {
                    debug!(path = %path.display(), "already indexed, skipping");
                    return Ok(None);
                }
                let (min, max) = run_indexer(&indexer, &path).await?;
                Ok::<_, Error>(Some((path, min, max)))
            }
        }))
        .buffer_unordered(self.workers.max(1));

        let mut added = 0u64;
        while let Some(result) = results.next().await {
            // A failed task aborts the run; rows committed so far stay.
            if let Some((path, min, max)) = result? {
                store.add(&path.to_string_lossy(), min, max).await?;
                added += 1;
            }
        }
        drop(results);
        store.close().await;
        info!(source = %descriptor.source, added, "indexing complete");
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SqliteIndex;
    use crate::index::IndexStore;
    use crate::types::IndexKind;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Write an executable shell script acting as an indexer.
    fn write_indexer(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("mock-indexer.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn descriptor(data: &std::path::Path, index_path: PathBuf, indexer: PathBuf) -> Descriptor {
        Descriptor {
            source: "test".to_string(),
            paths: vec![data.to_string_lossy().into_owned()],
            index_type: IndexKind::Sqlite,
            index_path: Some(index_path),
            indexer: Some(indexer),
            ..Descriptor::default()
        }
    }

    #[tokio::test]
    async fn hundred_files_four_workers() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        fs::create_dir_all(&data).unwrap();
        for i in 0..100 {
            fs::write(data.join(format!("f{i:03}.20140101.log")), b"x").unwrap();
        }
        let indexer = write_indexer(tmp.path(), "echo \"10.0 20.0\"");
        let index_path = tmp.path().join("idx.db");
        let desc = descriptor(&data, index_path.clone(), indexer);

        let added = IndexBuilder::new(4).build(&desc, &Window::default()).await.unwrap();
        assert_eq!(added, 100);

        let store = SqliteIndex::open(&index_path).await.unwrap();
        let rows = store.query(None, None).await.unwrap();
        assert_eq!(rows.len(), 100);
        assert!(rows.iter().all(|r| r.min_time == 10.0 && r.max_time == 20.0));
    }

    #[tokio::test]
    async fn rebuild_skips_indexed_paths() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("a.20140101.log"), b"x").unwrap();
        fs::write(data.join("b.20140102.log"), b"xy").unwrap();
        let indexer = write_indexer(tmp.path(), "echo \"1.5 2.5\"");
        let index_path = tmp.path().join("idx.db");
        let desc = descriptor(&data, index_path.clone(), indexer);

        let builder = IndexBuilder::new(2);
        assert_eq!(builder.build(&desc, &Window::default()).await.unwrap(), 2);
        // Second run is a no-op: presence by path is sufficient.
        assert_eq!(builder.build(&desc, &Window::default()).await.unwrap(), 0);

        let store = SqliteIndex::open(&index_path).await.unwrap();
        assert_eq!(store.query(None, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failing_indexer_aborts_the_run() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("a.20140101.log"), b"x").unwrap();
        let indexer = write_indexer(tmp.path(), "exit 3");
        let desc = descriptor(&data, tmp.path().join("idx.db"), indexer);

        let err = IndexBuilder::new(1).build(&desc, &Window::default()).await.unwrap_err();
        assert!(matches!(err, Error::Indexer { .. }));
    }

    #[tokio::test]
    async fn garbage_output_is_an_indexer_error() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("a.20140101.log"), b"x").unwrap();
        let indexer = write_indexer(tmp.path(), "echo \"not numbers\"");
        let desc = descriptor(&data, tmp.path().join("idx.db"), indexer);

        let err = IndexBuilder::new(1).build(&desc, &Window::default()).await.unwrap_err();
        assert!(matches!(err, Error::Indexer { .. }));
    }

    #[tokio::test]
    async fn extra_output_lines_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let indexer = write_indexer(tmp.path(), "echo \"5.0 6.0\"\necho \"debug noise\"");
        let target = tmp.path().join("whatever.log");
        fs::write(&target, b"x").unwrap();
        let (min, max) = run_indexer(&indexer, &target).await.unwrap();
        assert_eq!((min, max), (5.0, 6.0));
    }

    #[tokio::test]
    async fn windowed_build_uses_fuzzy_candidates() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("a.20140101.log"), b"x").unwrap();
        fs::write(data.join("a.20140110.log"), b"xy").unwrap();
        let indexer = write_indexer(tmp.path(), "echo \"1.0 2.0\"");
        let index_path = tmp.path().join("idx.db");
        let mut desc = descriptor(&data, index_path.clone(), indexer);
        desc.file_time_is_end_time = false;

        // Window covering only the first file's interval start.
        let begin = crate::extract::extract("20140101").unwrap();
        let end = crate::extract::extract("20140102").unwrap();
        let window = Window::new(Some(begin), Some(end));
        let added = IndexBuilder::new(2).build(&desc, &window).await.unwrap();
        assert_eq!(added, 1);
    }
}
