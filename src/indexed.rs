//! Indexed resolution via the persisted store.
//!
//! The inverse of fuzzy mode: intervals come from rows an external indexer
//! computed from file contents, so they are exact for whatever was indexed.

use crate::epoch;
use crate::error::{Error, Result};
use crate::index;
use crate::source::Descriptor;
use crate::types::{FileSpan, Window};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::warn;

fn index_mtime_epoch(path: &Path) -> Option<f64> {
    let mtime = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let since = mtime.duration_since(UNIX_EPOCH).ok()?;
    Some(since.as_secs_f64())
}

/// Resolve a descriptor's files from its index.
pub async fn resolve(descriptor: &Descriptor, window: &Window) -> Result<Vec<FileSpan>> {
    let index_path = descriptor.index_path()?;
    if !index_path.exists() {
        return Err(Error::IndexNotFound(index_path.clone()));
    }

    if let Some(end) = window.end {
        let end_epoch = epoch::to_epoch(&end);
        if index_mtime_epoch(index_path).is_some_and(|mtime| mtime < end_epoch) {
            warn!(
                index = %index_path.display(),
                "index is older than the query end; results may be stale, re-run indexing"
            );
        }
    }

    let store = index::open(descriptor.index_type, index_path).await?;
    let begin = window.begin.as_ref().map(epoch::to_epoch);
    let end = window.end.as_ref().map(epoch::to_epoch);
    let rows = store.query(begin, end).await;
    store.close().await;

    rows?
        .into_iter()
        .map(|row| {
            let begin = epoch::from_epoch(row.min_time);
            let end = epoch::from_epoch(row.max_time);
            match (begin, end) {
                (Some(begin), Some(end)) => Ok(FileSpan {
                    path: PathBuf::from(row.path),
                    begin,
                    end,
                }),
                _ => Err(Error::Index(format!(
                    "unrepresentable interval for '{}': {} .. {}",
                    row.path, row.min_time, row.max_time
                ))),
            }
        })
        .collect()
}
