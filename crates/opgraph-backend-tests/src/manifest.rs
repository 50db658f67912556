//! Per-backend skip lists.
//!
//! One case name or `*` glob per line. `#` starts a comment; blank lines are ignored.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::matches_pattern;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest line {line}: entry '{entry}' contains whitespace")]
    InvalidEntry { line: usize, entry: String },
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    patterns: Vec<String>,
}

impl Manifest {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parse(src: &str) -> Result<Self, ManifestError> {
        let mut patterns = Vec::new();
        for (index, raw) in src.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            if line.chars().any(char::is_whitespace) {
                return Err(ManifestError::InvalidEntry {
                    line: index + 1,
                    entry: line.to_string(),
                });
            }
            patterns.push(line.to_string());
        }
        Ok(Self { patterns })
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let contents = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// First pattern that skips `case`, if any.
    pub fn skip_reason(&self, case: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|pattern| matches_pattern(case, pattern))
            .map(String::as_str)
    }

    pub fn is_skipped(&self, case: &str) -> bool {
        self.skip_reason(case).is_some()
    }
}
