//! logspan - temporal file resolution over log archives.
//!
//! Answers "which files in data source S overlap [begin, end]?" without a
//! catalog of the archive. Two strategies:
//!
//! - **fuzzy**: infer each file's interval from path tokens and its
//!   neighbors in the same time series ([`fuzzy`]);
//! - **indexed**: look intervals up in a SQLite index populated by external
//!   per-format indexer programs ([`indexed`], [`builder`]).

pub mod builder;
pub mod config;
pub mod epoch;
pub mod error;
pub mod extract;
pub mod fuzzy;
pub mod index;
pub mod indexed;
pub mod source;
pub mod types;
pub mod walk;

pub use builder::IndexBuilder;
pub use config::Config;
pub use error::{Error, Result};
pub use source::{DataSource, Descriptor};
pub use types::{FileSpan, IndexKind, Window};
