//! Offline source backed by a static set of keys.
//!
//! The file format is one key per line; blank lines and `#` comments are ignored:
//!
//! ```text
//! # datacenter exit nodes
//! 203.0.113.7
//! 2001:db8::dead:beef
//! 4f7d2c1e-8a3b-4c5d-9e6f-0a1b2c3d4e5f   # leaked account
//! ```

use super::Source;
use crate::{errors::SourceError, key::Key};
use async_trait::async_trait;
use std::{collections::HashSet, io, path::Path};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum BlocklistError {
    #[error("failed to read blocklist {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{path}:{line}: {message}")]
    InvalidEntry { path: String, line: usize, message: String },
}

/// Answers positive for every key in its list.
#[derive(Debug, Clone)]
pub struct BlocklistSource {
    name: String,
    entries: HashSet<Key>,
}

impl BlocklistSource {
    pub fn new(name: impl Into<String>, entries: impl IntoIterator<Item = Key>) -> Self {
        Self { name: name.into(), entries: entries.into_iter().collect() }
    }

    /// Loads a blocklist file. Any malformed line rejects the whole file.
    pub fn from_file(name: impl Into<String>, path: &Path) -> Result<Self, BlocklistError> {
        let shown = path.display().to_string();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| BlocklistError::Io { path: shown.clone(), source })?;

        let source = Self::parse(name, &contents).map_err(|(line, message)| {
            BlocklistError::InvalidEntry { path: shown.clone(), line, message }
        })?;

        info!(source = %source.name, path = %shown, entries = source.len(), "loaded blocklist");
        Ok(source)
    }

    fn parse(name: impl Into<String>, contents: &str) -> Result<Self, (usize, String)> {
        let mut entries = HashSet::new();
        for (idx, raw) in contents.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let key = line.parse::<Key>().map_err(|e| (idx + 1, e.to_string()))?;
            entries.insert(key);
        }
        Ok(Self::new(name, entries))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Source for BlocklistSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_credential(&self) -> bool {
        false
    }

    fn max_concurrency(&self) -> usize {
        1024
    }

    async fn query(&self, key: &Key) -> Result<bool, SourceError> {
        Ok(self.entries.contains(key))
    }
}
