// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Template snapshots.
//!
//! A __snapshot__ is the flat content of a template repository at one point
//! in its history: a mapping from relative file path to file content,
//! restricted to the paths that a target repository manages. Snapshots only
//! live for the duration of a single sync, and are never written anywhere
//! as-is.
//!
//! Every sync needs up to two snapshots:
//!
//! - __upstream__: the template at the head of the tracked branch.
//! - __base__: the template at the commit recorded by the lock file, which
//!   acts as the common ancestor for three-way merges.
//!
//! The base commit may no longer exist upstream, e.g., because the branch was
//! force-pushed. Providers report that case as
//! [`SnapshotError::BaseUnavailable`] so callers can carry on without a base
//! instead of failing the entire sync.
//!
//! # See Also
//!
//! 1. [`git`] for the libgit2 backed provider.
//! 2. [`rules`] for include and exclude rule matching.

pub mod git;
pub mod rules;

use crate::snapshot::rules::PathRules;

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Opaque identifier of a template commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(String);

impl CommitId {
    /// Construct new commit identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Treat commit identifier as string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Abbreviated form for log output.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(self.0.as_str())
    }
}

impl Display for CommitId {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.0.as_str())
    }
}

/// Point in template history to take a snapshot of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    /// Head of a branch.
    Branch(String),

    /// Specific commit.
    Commit(CommitId),
}

impl Display for Revision {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Branch(branch) => write!(fmt, "branch {branch}"),
            Self::Commit(commit) => write!(fmt, "commit {}", commit.short()),
        }
    }
}

/// Flat mapping of relative file path to file content.
///
/// # Invariant
///
/// - Paths are forward-slash separated, case-sensitive, and relative.
/// - Iteration order is sorted by path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    files: BTreeMap<String, String>,
}

impl Snapshot {
    /// Construct new empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add file to snapshot.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    /// Lookup file content.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Iterate over files in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files
            .iter()
            .map(|(path, content)| (path.as_str(), content.as_str()))
    }

    /// Iterate over paths in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Number of files in snapshot.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if snapshot has no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Keep only files accepted by path rules.
    pub fn filtered(self, rules: &PathRules) -> Self {
        Self {
            files: self
                .files
                .into_iter()
                .filter(|(path, _)| rules.allows(path))
                .collect(),
        }
    }
}

impl<P, C> FromIterator<(P, C)> for Snapshot
where
    P: Into<String>,
    C: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        Self {
            files: iter
                .into_iter()
                .map(|(path, content)| (path.into(), content.into()))
                .collect(),
        }
    }
}

/// Source of template snapshots.
///
/// A provider is bound to one template repository and one tracked branch.
pub trait SnapshotProvider {
    /// Resolve head commit of tracked branch.
    fn head(&self) -> Result<CommitId>;

    /// Take snapshot of template at revision.
    ///
    /// Only files accepted by `rules` are part of the snapshot. Reserved
    /// paths are never part of it.
    ///
    /// # Errors
    ///
    /// - Return [`SnapshotError::BaseUnavailable`] if a commit revision cannot
    ///   be found in the template repository.
    fn snapshot(&self, revision: &Revision, rules: &PathRules) -> Result<Snapshot>;
}

/// Snapshot error types.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Commit no longer exists in template repository.
    #[error("commit {commit} is not available in template repository")]
    BaseUnavailable { commit: CommitId },

    /// Tracked branch does not exist in template repository.
    #[error("branch {branch:?} not found in template repository")]
    BranchNotFound {
        #[source]
        source: git2::Error,
        branch: String,
    },

    /// Template repository cannot be cloned.
    #[error("failed to clone template repository {url:?}")]
    Clone {
        #[source]
        source: git2::Error,
        url: String,
    },

    /// Scratch directory for clones cannot be created.
    #[error("failed to create scratch directory for template clone")]
    Scratch(#[source] std::io::Error),

    /// Path rules cannot be built.
    #[error(transparent)]
    Rules(#[from] crate::snapshot::rules::RulesError),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = SnapshotError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn snapshot_iterates_in_path_order() {
        let snapshot = Snapshot::from_iter([("b", "2"), ("a/z", "1"), ("a", "0")]);
        let paths = snapshot.paths().collect::<Vec<_>>();

        assert_eq!(paths, vec!["a", "a/z", "b"]);
    }

    #[test]
    fn filtered_snapshot_drops_reserved_paths() -> anyhow::Result<()> {
        let snapshot = Snapshot::from_iter([
            (".graft/template.toml", "config"),
            (".graft/history", "history"),
            (".graft/template.lock", "lock"),
            ("Makefile", "all:"),
        ]);
        let rules = PathRules::new([".graft", "Makefile"], Vec::<String>::new())?;

        let result = snapshot.filtered(&rules);
        assert_eq!(result, Snapshot::from_iter([("Makefile", "all:")]));

        Ok(())
    }

    #[test]
    fn commit_id_short_form() {
        let commit = CommitId::new("0123456789abcdef0123");

        assert_eq!(commit.short(), "0123456789ab");
        assert_eq!(CommitId::new("abc").short(), "abc");
    }
}
