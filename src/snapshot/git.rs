// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Snapshots through libgit2.
//!
//! The template repository is cloned bare into a scratch directory that lives
//! as long as the provider does. Snapshots are read straight out of commit
//! trees, so no working tree is ever checked out. Include and exclude rules do
//! the job that a sparse checkout would otherwise do.
//!
//! # Symbolic Links
//!
//! Template repositories sometimes share files between locations through
//! symbolic links. A link whose target lies inside the repository is
//! materialized as the content of its target, re-rooted at the link's own
//! path. Links that escape the repository, dangle, or point at other links are
//! skipped.

use crate::snapshot::{
    rules::PathRules, CommitId, Result, Revision, Snapshot, SnapshotError, SnapshotProvider,
};

use auth_git2::{GitAuthenticator, Prompter};
use git2::{
    build::RepoBuilder, Commit, Config, FetchOptions, ObjectType, Oid, RemoteCallbacks,
    Repository, Tree,
};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{collections::VecDeque, path::Path, time};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

const LINK_MODE: i32 = 0o120000;

/// Snapshot provider backed by a bare libgit2 clone.
pub struct Git2Provider {
    repository: Repository,
    branch: String,
    _scratch: TempDir,
}

impl Git2Provider {
    /// Clone template repository.
    ///
    /// Clones the template repository at `url` into a scratch directory,
    /// checking out `branch`. The progress of the clone is displayed through
    /// the given progress bar. If credentials are needed, the user is prompted
    /// for them, blocking the progress bar in the meantime.
    ///
    /// # Errors
    ///
    /// - Return [`SnapshotError::Scratch`] if scratch directory cannot be
    ///   created.
    /// - Return [`SnapshotError::Clone`] if cloning fails.
    #[instrument(skip(bar), level = "debug")]
    pub fn fetch(url: &str, branch: &str, bar: ProgressBar) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("graft-")
            .tempdir()
            .map_err(SnapshotError::Scratch)?;
        debug!("clone {url:?} into {:?}", scratch.path().display());

        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        bar.set_message(url.to_string());
        bar.enable_steady_tick(time::Duration::from_millis(100));

        let prompter = IndicatifPrompter::new(bar.clone());
        let authenticator = GitAuthenticator::default().set_prompter(prompter.clone());
        let config = Config::open_default()?;

        let mut throttle = time::Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(|progress| {
            let stats = progress.to_owned();
            let bar_size = stats.total_objects() as u64;
            let bar_pos = stats.received_objects() as u64;
            if throttle.elapsed() > time::Duration::from_millis(10) {
                throttle = time::Instant::now();
                prompter.bar.set_length(bar_size);
                prompter.bar.set_position(bar_pos);
            }
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        let repository = RepoBuilder::new()
            .bare(true)
            .branch(branch)
            .fetch_options(fo)
            .clone(url, scratch.path())
            .map_err(|err| SnapshotError::Clone {
                source: err,
                url: url.to_string(),
            })?;
        bar.finish_and_clear();

        Ok(Self {
            repository,
            branch: branch.to_string(),
            _scratch: scratch,
        })
    }

    fn branch_commit(&self, branch: &str) -> Result<Commit<'_>> {
        let reference = self
            .repository
            .find_reference(&format!("refs/heads/{branch}"))
            .or_else(|_| {
                self.repository
                    .find_reference(&format!("refs/remotes/origin/{branch}"))
            })
            .map_err(|err| SnapshotError::BranchNotFound {
                source: err,
                branch: branch.to_string(),
            })?;

        Ok(reference.peel_to_commit()?)
    }

    fn find_commit(&self, commit: &CommitId) -> Result<Commit<'_>> {
        self.repository
            .revparse_single(commit.as_str())
            .and_then(|object| object.peel_to_commit())
            .map_err(|err| {
                debug!("cannot find commit {commit}: {err}");
                SnapshotError::BaseUnavailable {
                    commit: commit.clone(),
                }
            })
    }

    // Thank you Eric at https://www.hydrogen18.com/blog/list-all-files-git-repo-pygit2.html.
    fn list_files(&self, tree: &Tree<'_>) -> Result<Vec<TreeFile>> {
        let mut entries = Vec::new();
        let mut trees_and_paths = VecDeque::new();
        trees_and_paths.push_front((tree.clone(), String::new()));

        // Use DFS to traverse commit tree.
        while let Some((tree, path)) = trees_and_paths.pop_front() {
            for tree_entry in &tree {
                let Some(name) = tree_entry.name() else {
                    warn!("skip tree entry with non UTF-8 name under {path:?}");
                    continue;
                };
                let full_path = if path.is_empty() {
                    name.to_string()
                } else {
                    format!("{path}/{name}")
                };

                match tree_entry.kind() {
                    // INVARIANT: Hit a tree? Traverse it!
                    Some(ObjectType::Tree) => {
                        let next_tree = self.repository.find_tree(tree_entry.id())?;
                        trees_and_paths.push_front((next_tree, full_path));
                    }
                    // INVARIANT: Hit a blob? Record our current path!
                    Some(ObjectType::Blob) => entries.push(TreeFile {
                        path: full_path,
                        oid: tree_entry.id(),
                        is_link: tree_entry.filemode() == LINK_MODE,
                    }),
                    _ => continue,
                }
            }
        }

        Ok(entries)
    }

    fn resolve_link(&self, root: &Tree<'_>, link: &TreeFile) -> Result<Vec<TreeFile>> {
        let blob = self.repository.find_blob(link.oid)?;
        let Ok(target) = std::str::from_utf8(blob.content()) else {
            warn!("skip symlink {:?} with non UTF-8 target", link.path);
            return Ok(Vec::new());
        };

        let parent = link.path.rsplit_once('/').map_or("", |(parent, _)| parent);
        let Some(resolved) = join_lexically(parent, target) else {
            warn!("skip symlink {:?} pointing outside template repository", link.path);
            return Ok(Vec::new());
        };

        let Ok(entry) = root.get_path(Path::new(&resolved)) else {
            warn!("skip dangling symlink {:?} -> {resolved:?}", link.path);
            return Ok(Vec::new());
        };

        match entry.kind() {
            Some(ObjectType::Blob) if entry.filemode() != LINK_MODE => {
                info!("symlink detected: {} -> {resolved}", link.path);
                Ok(vec![TreeFile {
                    path: link.path.clone(),
                    oid: entry.id(),
                    is_link: false,
                }])
            }
            Some(ObjectType::Tree) => {
                info!("symlink detected: {} -> {resolved}/", link.path);
                let subtree = self.repository.find_tree(entry.id())?;
                Ok(self
                    .list_files(&subtree)?
                    .into_iter()
                    .filter(|file| !file.is_link)
                    .map(|file| TreeFile {
                        path: format!("{}/{}", link.path, file.path),
                        oid: file.oid,
                        is_link: false,
                    })
                    .collect())
            }
            _ => {
                warn!("skip symlink chain {:?} -> {resolved:?}", link.path);
                Ok(Vec::new())
            }
        }
    }
}

impl SnapshotProvider for Git2Provider {
    fn head(&self) -> Result<CommitId> {
        let commit = self.branch_commit(&self.branch)?;
        Ok(CommitId::new(commit.id().to_string()))
    }

    #[instrument(skip(self, rules), level = "debug")]
    fn snapshot(&self, revision: &Revision, rules: &PathRules) -> Result<Snapshot> {
        let commit = match revision {
            Revision::Branch(branch) => self.branch_commit(branch)?,
            Revision::Commit(commit) => self.find_commit(commit)?,
        };
        let tree = commit.tree()?;

        let mut files = Vec::new();
        for file in self.list_files(&tree)? {
            if file.is_link {
                files.extend(self.resolve_link(&tree, &file)?);
            } else {
                files.push(file);
            }
        }

        let mut snapshot = Snapshot::new();
        for file in files {
            if !rules.allows(&file.path) {
                continue;
            }

            let blob = self.repository.find_blob(file.oid)?;
            match String::from_utf8(blob.content().to_vec()) {
                Ok(content) => snapshot.insert(file.path, content),
                Err(_) => warn!("skip {:?}: not valid UTF-8 text", file.path),
            }
        }
        debug!("{revision}: {} file(s)", snapshot.len());

        Ok(snapshot)
    }
}

#[derive(Debug, Clone)]
struct TreeFile {
    path: String,
    oid: Oid,
    is_link: bool,
}

// INVARIANT: Never climb above the top-level of the repository.
fn join_lexically(parent: &str, target: &str) -> Option<String> {
    if target.starts_with('/') {
        return None;
    }

    let mut segments = parent
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();
    for segment in target.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop()?;
            }
            segment => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return None;
    }

    Some(segments.join("/"))
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    pub(crate) bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| -> Option<String> {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| -> Option<String> {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case("configs", "../shared/ci.yml", Some("shared/ci.yml"); "sibling directory")]
    #[test_case("", "shared", Some("shared"); "top-level link")]
    #[test_case("a/b", "./c/../d", Some("a/b/d"); "dot segments")]
    #[test_case("a", "../../etc/passwd", None; "escapes repository")]
    #[test_case("a", "/etc/passwd", None; "absolute target")]
    #[test_case("a", "..", None; "points at top-level")]
    #[test]
    fn symlink_target_resolution(parent: &str, target: &str, expect: Option<&str>) {
        assert_eq!(join_lexically(parent, target).as_deref(), expect);
    }
}
