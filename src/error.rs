//! Error types for the resolver and index engine.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Resolver error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Unknown extractor: {0}")]
    UnknownExtractor(String),

    #[error("Glob error: {0}")]
    Glob(String),

    #[error("Index not found: {0}")]
    IndexNotFound(PathBuf),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Indexer '{program}' failed on '{path}': {message}")]
    Indexer {
        program: String,
        path: String,
        message: String,
    },

    #[error("Lock error: {0}")]
    Lock(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
