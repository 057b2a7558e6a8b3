//! Services a bisection talks to: commit history, builds and tests.
//!
//! Evaluators call these synchronously and only to start work or read a
//! result that is already available; long-running work is reported back
//! through update events.

use std::collections::HashMap;
use culprit_core::{Artifact, BuildOptions, BuildStatus, Change, Commit, TestOptions, TestStatus};

/// Commit history lookups failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// Commit unknown to the history service
    #[error("commit {0} not found")]
    UnknownCommit(String),

    /// End does not come after start
    #[error("{end} is not a descendant of {start}")]
    InvalidRange {
        /// Start commit
        start: String,
        /// End commit
        end: String,
    },

    /// Service failure
    #[error("history service error: {0}")]
    Service(String),
}

/// A build or test service failed to take a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// The service refused the request
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The service could not be reached
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Expands a commit range.
pub trait CommitHistory: Send + Sync {
    /// Commits after `start` up to and including `end`, oldest first.
    fn commit_range(&self, start: &Commit, end: &Commit) -> Result<Vec<Commit>, HistoryError>;
}

/// Builds changes into testable artifacts.
pub trait BuildService: Send + Sync {
    /// Request a build of `change`.
    fn request_build(&self, options: &BuildOptions, change: &Change) -> Result<BuildStatus, CollaboratorError>;
}

impl<F> BuildService for F
where
    F: Fn(&BuildOptions, &Change) -> Result<BuildStatus, CollaboratorError> + Send + Sync,
{
    fn request_build(&self, options: &BuildOptions, change: &Change) -> Result<BuildStatus, CollaboratorError> {
        self(options, change)
    }
}

/// Runs tests against built artifacts.
pub trait TestService: Send + Sync {
    /// Schedule attempt `index` of `change` against `artifact`.
    fn schedule_test(
        &self,
        options: &TestOptions,
        artifact: &Artifact,
        change: &Change,
        index: u32,
    ) -> Result<TestStatus, CollaboratorError>;
}

impl<F> TestService for F
where
    F: Fn(&TestOptions, &Artifact, &Change, u32) -> Result<TestStatus, CollaboratorError> + Send + Sync,
{
    fn schedule_test(
        &self,
        options: &TestOptions,
        artifact: &Artifact,
        change: &Change,
        index: u32,
    ) -> Result<TestStatus, CollaboratorError> {
        self(options, artifact, change, index)
    }
}

/// Linear per-repository histories held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    repositories: HashMap<String, Vec<String>>,
}

impl InMemoryHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the history of a repository, oldest commit first.
    pub fn with_repository(
        mut self,
        repository: impl Into<String>,
        hashes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.repositories
            .insert(repository.into(), hashes.into_iter().map(Into::into).collect());
        self
    }
}

impl CommitHistory for InMemoryHistory {
    fn commit_range(&self, start: &Commit, end: &Commit) -> Result<Vec<Commit>, HistoryError> {
        let history = self
            .repositories
            .get(&start.repository)
            .ok_or_else(|| HistoryError::UnknownCommit(start.id_string()))?;
        let position = |commit: &Commit| {
            if commit.repository != start.repository {
                return None;
            }
            history.iter().position(|h| *h == commit.git_hash)
        };
        let from = position(start).ok_or_else(|| HistoryError::UnknownCommit(start.id_string()))?;
        let to = position(end).ok_or_else(|| HistoryError::UnknownCommit(end.id_string()))?;
        if to < from {
            return Err(HistoryError::InvalidRange {
                start: start.id_string(),
                end: end.id_string(),
            });
        }
        Ok(history[from + 1..=to]
            .iter()
            .map(|hash| Commit::new(start.repository.clone(), hash.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> InMemoryHistory {
        InMemoryHistory::new().with_repository("chromium", ["c0", "c1", "c2", "c3"])
    }

    #[test]
    fn test_range_excludes_start_includes_end() {
        let range = history()
            .commit_range(&Commit::new("chromium", "c0"), &Commit::new("chromium", "c2"))
            .unwrap();
        let hashes: Vec<&str> = range.iter().map(|c| c.git_hash.as_str()).collect();
        assert_eq!(hashes, vec!["c1", "c2"]);
    }

    #[test]
    fn test_range_errors() {
        let h = history();
        assert!(matches!(
            h.commit_range(&Commit::new("chromium", "c0"), &Commit::new("chromium", "zz")),
            Err(HistoryError::UnknownCommit(_))
        ));
        assert!(matches!(
            h.commit_range(&Commit::new("chromium", "c3"), &Commit::new("chromium", "c1")),
            Err(HistoryError::InvalidRange { .. })
        ));
        assert!(h
            .commit_range(&Commit::new("v8", "c0"), &Commit::new("v8", "c1"))
            .is_err());
        assert!(h
            .commit_range(&Commit::new("chromium", "c2"), &Commit::new("chromium", "c2"))
            .unwrap()
            .is_empty());
    }
}
