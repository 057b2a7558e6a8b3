//! Access to files written by test runs.

use std::collections::HashMap;
use crate::error::Result;

/// Fetches a file out of a finished test's output.
pub trait ArtifactSource: Send + Sync {
    /// Contents of `path` under `output_location`, `None` when the file does
    /// not exist.
    fn fetch(&self, output_location: &str, path: &str) -> Result<Option<String>>;
}

impl<F> ArtifactSource for F
where
    F: Fn(&str, &str) -> Result<Option<String>> + Send + Sync,
{
    fn fetch(&self, output_location: &str, path: &str) -> Result<Option<String>> {
        self(output_location, path)
    }
}

/// Artifact source backed by a map, keyed by output location then path.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifacts {
    files: HashMap<String, HashMap<String, String>>,
}

impl InMemoryArtifacts {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a file.
    pub fn insert(&mut self, output_location: impl Into<String>, path: impl Into<String>, contents: impl Into<String>) {
        self.files
            .entry(output_location.into())
            .or_default()
            .insert(path.into(), contents.into());
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_file(mut self, output_location: impl Into<String>, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.insert(output_location, path, contents);
        self
    }
}

impl ArtifactSource for InMemoryArtifacts {
    fn fetch(&self, output_location: &str, path: &str) -> Result<Option<String>> {
        Ok(self
            .files
            .get(output_location)
            .and_then(|files| files.get(path))
            .cloned())
    }
}
