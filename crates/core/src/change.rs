//! Commits, patches and the changes built from them.

use serde::{Deserialize, Serialize};

/// A single revision in one repository.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Commit {
    /// Repository short name or URL
    pub repository: String,

    /// Revision hash
    pub git_hash: String,
}

impl Commit {
    /// Create a new commit.
    pub fn new(repository: impl Into<String>, git_hash: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            git_hash: git_hash.into(),
        }
    }

    /// Stable textual id, `<repository>@<git_hash>`.
    pub fn id_string(&self) -> String {
        format!("{}@{}", self.repository, self.git_hash)
    }
}

/// A code-review patch applied on top of a change's commits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GerritPatch {
    /// Review server host
    pub server: String,

    /// Change number or id on the server
    pub change: String,

    /// Patchset revision
    pub revision: String,
}

impl GerritPatch {
    /// Stable textual id, `<server>/<change>/<revision>`.
    pub fn id_string(&self) -> String {
        format!("{}/{}/{}", self.server, self.change, self.revision)
    }
}

/// One point in the bisection range: a set of commits, at most one per
/// repository, plus an optional patch overlay.
///
/// The first commit is the base commit, the one the range is expanded over.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Change {
    /// Commits, base commit first
    pub commits: Vec<Commit>,

    /// Optional patch applied on top
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<GerritPatch>,
}

impl Change {
    /// Build a change from commits. A later commit for an already present
    /// repository replaces the earlier one in place.
    pub fn new(commits: impl IntoIterator<Item = Commit>, patch: Option<GerritPatch>) -> Self {
        let mut deduped: Vec<Commit> = Vec::new();
        for commit in commits {
            match deduped.iter_mut().find(|c| c.repository == commit.repository) {
                Some(existing) => *existing = commit,
                None => deduped.push(commit),
            }
        }
        Self {
            commits: deduped,
            patch,
        }
    }

    /// A change consisting of a single commit.
    pub fn from_commit(commit: Commit) -> Self {
        Self::new([commit], None)
    }

    /// Attach a patch overlay.
    pub fn with_patch(mut self, patch: Option<GerritPatch>) -> Self {
        self.patch = patch;
        self
    }

    /// The commit the bisection range is expanded over.
    pub fn base_commit(&self) -> Option<&Commit> {
        self.commits.first()
    }

    /// Same dependencies and patch, different base commit.
    pub fn with_base_commit(&self, commit: Commit) -> Self {
        let mut commits = self.commits.clone();
        match commits.first_mut() {
            Some(base) => *base = commit,
            None => commits.push(commit),
        }
        Self::new(commits, self.patch.clone())
    }

    /// Stable textual id used to derive task ids.
    pub fn id_string(&self) -> String {
        let mut ids: Vec<String> = self.commits.iter().map(Commit::id_string).collect();
        ids.sort();
        let mut id = ids.join(" ");
        if let Some(patch) = &self.patch {
            id.push_str(" + ");
            id.push_str(&patch.id_string());
        }
        id
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_dedupes_per_repository() {
        let change = Change::new(
            [
                Commit::new("chromium", "a"),
                Commit::new("v8", "b"),
                Commit::new("chromium", "c"),
            ],
            None,
        );
        assert_eq!(change.commits.len(), 2);
        assert_eq!(change.base_commit().unwrap().git_hash, "c");
    }

    #[test]
    fn test_change_id_string() {
        let change = Change::new(
            [Commit::new("v8", "b"), Commit::new("chromium", "a")],
            Some(GerritPatch {
                server: "review.example.com".to_string(),
                change: "1234".to_string(),
                revision: "2".to_string(),
            }),
        );
        assert_eq!(
            change.id_string(),
            "chromium@a v8@b + review.example.com/1234/2"
        );
        assert_eq!(Change::from_commit(Commit::new("chromium", "x")).id_string(), "chromium@x");
    }

    #[test]
    fn test_with_base_commit_keeps_patch_and_deps() {
        let patch = GerritPatch {
            server: "s".to_string(),
            change: "c".to_string(),
            revision: "r".to_string(),
        };
        let start = Change::new(
            [Commit::new("chromium", "0"), Commit::new("v8", "dep")],
            Some(patch.clone()),
        );
        let moved = start.with_base_commit(Commit::new("chromium", "5"));
        assert_eq!(moved.base_commit().unwrap().git_hash, "5");
        assert_eq!(moved.commits[1], Commit::new("v8", "dep"));
        assert_eq!(moved.patch, Some(patch));
        assert_ne!(moved, start);
    }

    #[test]
    fn test_change_equality_includes_patch() {
        let a = Change::from_commit(Commit::new("chromium", "0"));
        let b = a.clone().with_patch(Some(GerritPatch {
            server: "s".to_string(),
            change: "1".to_string(),
            revision: "1".to_string(),
        }));
        assert_ne!(a, b);
        assert_eq!(a, Change::from_commit(Commit::new("chromium", "0")));
    }
}
