//! Core types shared across the resolver.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which backing store variant a descriptor uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Single-process local SQLite store.
    Sqlite,
    /// SQLite store guarded by an external file lock, safe on network shares.
    SqliteNfs,
}

impl Default for IndexKind {
    fn default() -> Self {
        IndexKind::Sqlite
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Sqlite => write!(f, "sqlite"),
            IndexKind::SqliteNfs => write!(f, "sqlite_nfs"),
        }
    }
}

/// An optionally half-open query window. Both endpoints are inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Window {
    pub begin: Option<DateTime<Local>>,
    pub end: Option<DateTime<Local>>,
}

impl Window {
    pub fn new(begin: Option<DateTime<Local>>, end: Option<DateTime<Local>>) -> Self {
        Self { begin, end }
    }

    pub fn is_unbounded(&self) -> bool {
        self.begin.is_none() && self.end.is_none()
    }

    /// Overlap test against a file interval.
    pub fn admits(&self, begin: DateTime<Local>, end: DateTime<Local>) -> bool {
        self.end.map_or(true, |e| begin <= e) && self.begin.map_or(true, |b| b <= end)
    }
}

/// A resolved file with the interval of data it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSpan {
    pub path: PathBuf,
    pub begin: DateTime<Local>,
    pub end: DateTime<Local>,
}
