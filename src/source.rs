//! Data sources and descriptor composition.
//!
//! A descriptor is one (paths, filters, extractor, index) bundle; a data
//! source is a named set of them. Both are built at configuration load and
//! immutable for the life of the process.

use crate::builder::IndexBuilder;
use crate::error::{Error, Result};
use crate::types::{FileSpan, IndexKind, Window};
use crate::{fuzzy, index, indexed};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;

/// Immutable per-descriptor configuration.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Name of the data source this descriptor belongs to.
    pub source: String,
    /// Ordered directory glob patterns.
    pub paths: Vec<String>,
    /// Filename include patterns; empty means everything.
    pub include: Vec<String>,
    /// Filename exclude patterns; empty means nothing.
    pub exclude: Vec<String>,
    /// Whether a path-derived timestamp marks the end of the file's data.
    pub file_time_is_end_time: bool,
    /// Named extractor, or `None` for the default heuristic.
    pub extractor: Option<String>,
    pub index_type: IndexKind,
    pub index_path: Option<PathBuf>,
    /// External indexer program.
    pub indexer: Option<PathBuf>,
}

impl Default for Descriptor {
    fn default() -> Self {
        Self {
            source: String::new(),
            paths: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            file_time_is_end_time: true,
            extractor: None,
            index_type: IndexKind::default(),
            index_path: None,
            indexer: None,
        }
    }
}

impl Descriptor {
    pub(crate) fn index_path(&self) -> Result<&PathBuf> {
        self.index_path.as_ref().ok_or_else(|| {
            Error::Config(format!("source '{}' has no index_path", self.source))
        })
    }
}

/// A named set of descriptors forming one logical feed.
#[derive(Debug, Clone)]
pub struct DataSource {
    pub name: String,
    pub descriptors: Vec<Descriptor>,
}

impl DataSource {
    /// Fuzzy resolution across every descriptor, flattened.
    pub fn resolve_fuzzy(&self, window: &Window) -> Result<Vec<FileSpan>> {
        let mut spans = Vec::new();
        for descriptor in &self.descriptors {
            spans.extend(fuzzy::resolve(descriptor, window)?);
        }
        Ok(spans)
    }

    /// Indexed resolution over the unique-index set; a shared index is
    /// queried once.
    pub async fn resolve_indexed(&self, window: &Window) -> Result<Vec<FileSpan>> {
        let mut spans = Vec::new();
        for descriptor in self.unique_index_descriptors() {
            spans.extend(indexed::resolve(descriptor, window).await?);
        }
        Ok(spans)
    }

    /// Build or extend every descriptor's index. Cleaning, when requested,
    /// runs once per unique index before any building starts.
    pub async fn index(&self, window: &Window, builder: &IndexBuilder, clean: bool) -> Result<u64> {
        if clean {
            self.clean().await?;
        }
        let mut added = 0;
        for descriptor in &self.descriptors {
            added += builder.build(descriptor, window).await?;
        }
        Ok(added)
    }

    /// Drop rows for vanished files from each unique index.
    pub async fn clean(&self) -> Result<u64> {
        let mut removed = 0;
        for descriptor in self.unique_index_descriptors() {
            let path = descriptor.index_path()?;
            let store = index::open(descriptor.index_type, path).await?;
            let dropped = store.clean().await?;
            store.close().await;
            info!(index = %path.display(), dropped, "index cleaned");
            removed += dropped;
        }
        Ok(removed)
    }

    /// One descriptor per distinct `index_path`, in descriptor order.
    fn unique_index_descriptors(&self) -> Vec<&Descriptor> {
        let mut seen = HashSet::new();
        self.descriptors
            .iter()
            .filter(|d| match &d.index_path {
                Some(path) => seen.insert(path.clone()),
                // Descriptors without an index surface their config error
                // from the resolver, not here.
                None => true,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(index_path: Option<&str>) -> Descriptor {
        Descriptor {
            source: "s".to_string(),
            index_path: index_path.map(PathBuf::from),
            ..Descriptor::default()
        }
    }

    #[test]
    fn shared_index_collapses_to_one() {
        let source = DataSource {
            name: "s".to_string(),
            descriptors: vec![desc(Some("/tmp/a.db")), desc(Some("/tmp/a.db")), desc(Some("/tmp/b.db"))],
        };
        assert_eq!(source.unique_index_descriptors().len(), 2);
    }

    #[test]
    fn descriptor_defaults() {
        let d = Descriptor::default();
        assert!(d.file_time_is_end_time);
        assert_eq!(d.index_type, IndexKind::Sqlite);
        assert!(matches!(d.index_path(), Err(Error::Config(_))));
    }
}
