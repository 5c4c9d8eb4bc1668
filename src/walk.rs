//! File enumeration under a descriptor's path globs.
//!
//! Each `paths` entry is expanded as a filesystem glob to matching
//! directories; every directory is walked recursively, following symlinks.
//! Filename include/exclude patterns apply to the basename only.

use crate::error::{Error, Result};
use crate::source::Descriptor;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::PathBuf;
use tracing::debug;

fn build_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Config(format!("invalid filename pattern '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Config(e.to_string()))
}

/// Basename filter built from a descriptor's include/exclude patterns.
pub struct NameFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl NameFilter {
    pub fn new(descriptor: &Descriptor) -> Result<Self> {
        Ok(Self {
            include: build_set(&descriptor.include)?,
            exclude: build_set(&descriptor.exclude)?,
        })
    }

    pub fn accepts(&self, name: &str) -> bool {
        (self.include.is_empty() || self.include.is_match(name))
            && (self.exclude.is_empty() || !self.exclude.is_match(name))
    }
}

/// Expand the descriptor's path globs to canonical directory roots, in
/// configuration order.
pub fn roots(descriptor: &Descriptor) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for pattern in &descriptor.paths {
        let entries = glob::glob(pattern)
            .map_err(|e| Error::Glob(format!("bad path glob '{pattern}': {e}")))?;
        for entry in entries {
            let path = entry.map_err(|e| Error::Glob(e.to_string()))?;
            if path.is_dir() {
                out.push(std::fs::canonicalize(&path)?);
            }
        }
    }
    if out.is_empty() {
        debug!(source = %descriptor.source, "path globs matched no directories");
    }
    Ok(out)
}

/// Lazily enumerate the files a descriptor covers.
pub fn walk(descriptor: &Descriptor) -> Result<impl Iterator<Item = PathBuf>> {
    let filter = NameFilter::new(descriptor)?;
    let roots = roots(descriptor)?;
    let files = roots
        .into_iter()
        .flat_map(|root| {
            WalkBuilder::new(&root)
                .follow_links(true)
                .hidden(false)
                .ignore(false)
                .git_ignore(false)
                .git_global(false)
                .git_exclude(false)
                .build()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
                .map(|entry| entry.into_path())
        })
        .filter(move |path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| filter.accepts(name))
        });
    Ok(files)
}
