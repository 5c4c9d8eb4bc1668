//! TOML configuration loading.
//!
//! Each `[source.<name>]` table describes one descriptor; nested sub-tables
//! (`[source.<name>.<sub>]`) each become one more descriptor and inherit any
//! key they do not set from their parent section.

use crate::error::{Error, Result};
use crate::extract::Registry;
use crate::source::{DataSource, Descriptor};
use crate::types::IndexKind;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One `[source.*]` table, possibly with nested sub-sections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceSection {
    pub paths: Option<Vec<String>>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub file_time_is_end_time: Option<bool>,
    pub extractor: Option<String>,
    pub index_type: Option<IndexKind>,
    pub index_path: Option<PathBuf>,
    pub indexer: Option<PathBuf>,
    /// Nested sub-sections; every non-descriptor key is one of these.
    #[serde(flatten)]
    pub sections: BTreeMap<String, SourceSection>,
}

impl SourceSection {
    /// Fill unset keys from a parent section (sub-sections excluded).
    fn inherit(&self, parent: &SourceSection) -> SourceSection {
        SourceSection {
            paths: self.paths.clone().or_else(|| parent.paths.clone()),
            include: self.include.clone().or_else(|| parent.include.clone()),
            exclude: self.exclude.clone().or_else(|| parent.exclude.clone()),
            file_time_is_end_time: self.file_time_is_end_time.or(parent.file_time_is_end_time),
            extractor: self.extractor.clone().or_else(|| parent.extractor.clone()),
            index_type: self.index_type.or(parent.index_type),
            index_path: self.index_path.clone().or_else(|| parent.index_path.clone()),
            indexer: self.indexer.clone().or_else(|| parent.indexer.clone()),
            sections: self.sections.clone(),
        }
    }

    fn descriptor(&self, source: &str) -> Result<Descriptor> {
        let paths = self
            .paths
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::Config(format!("source '{source}' has no paths")))?;
        Ok(Descriptor {
            source: source.to_string(),
            paths,
            include: self.include.clone().unwrap_or_default(),
            exclude: self.exclude.clone().unwrap_or_default(),
            file_time_is_end_time: self.file_time_is_end_time.unwrap_or(true),
            extractor: self.extractor.clone().filter(|e| !e.is_empty()),
            index_type: self.index_type.unwrap_or_default(),
            index_path: self.index_path.clone(),
            indexer: self.indexer.clone(),
        })
    }
}

/// Top-level configuration file.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: BTreeMap<String, SourceSection>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Build and validate the configured data sources, sorted by name.
    pub fn sources(&self) -> Result<Vec<DataSource>> {
        let registry = Registry::builtin();
        let mut sources = Vec::new();
        for (name, section) in &self.source {
            let mut descriptors = Vec::new();
            collect(name, section, None, &mut descriptors)?;
            if descriptors.is_empty() {
                return Err(Error::Config(format!("source '{name}' has no paths")));
            }
            for descriptor in &descriptors {
                registry.resolve(descriptor.extractor.as_deref())?;
            }
            sources.push(DataSource {
                name: name.clone(),
                descriptors,
            });
        }
        check_index_sharing(&sources)?;
        Ok(sources)
    }
}

fn collect(
    source: &str,
    section: &SourceSection,
    parent: Option<&SourceSection>,
    out: &mut Vec<Descriptor>,
) -> Result<()> {
    let merged = match parent {
        Some(parent) => section.inherit(parent),
        None => section.clone(),
    };
    if merged.paths.as_ref().is_some_and(|p| !p.is_empty()) {
        out.push(merged.descriptor(source)?);
    }
    for child in section.sections.values() {
        collect(source, child, Some(&merged), out)?;
    }
    Ok(())
}

/// Two descriptors in different sources may not share an index.
fn check_index_sharing(sources: &[DataSource]) -> Result<()> {
    let mut owners: BTreeMap<&PathBuf, &str> = BTreeMap::new();
    for source in sources {
        for descriptor in &source.descriptors {
            if let Some(index_path) = &descriptor.index_path {
                match owners.get(index_path) {
                    Some(owner) if *owner != source.name.as_str() => {
                        return Err(Error::Config(format!(
                            "index '{}' is shared by sources '{}' and '{}'",
                            index_path.display(),
                            owner,
                            source.name
                        )));
                    }
                    _ => {
                        owners.insert(index_path, &source.name);
                    }
                }
            }
        }
    }
    Ok(())
}
