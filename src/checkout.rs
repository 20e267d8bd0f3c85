// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Target branch selection.
//!
//! Template changes can land on a dedicated branch of the target repository,
//! so they can be reviewed before being merged. The branch is checked out if
//! it already exists, or created from the current HEAD if it does not.

use git2::{build::CheckoutBuilder, Branch, BranchType, ErrorCode, Object, Repository};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// How target branch was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    /// Branch already existed and was checked out.
    CheckedOut,

    /// Branch was created from HEAD and checked out.
    Created,
}

/// Check out branch of target repository, creating it from HEAD if missing.
///
/// A target without any commits simply has its unborn HEAD pointed at the
/// new branch name.
///
/// # Errors
///
/// - Return [`CheckoutError::Open`] if target is not a git repository.
/// - Return [`CheckoutError::InvalidName`] if branch name is not valid.
/// - Return [`CheckoutError::Checkout`] if checkout would overwrite local
///   changes.
/// - Return [`CheckoutError::Git2`] for any other libgit2 failure.
#[instrument(skip(root), level = "debug")]
pub fn switch_branch(root: impl AsRef<Path>, name: &str) -> Result<Switch> {
    let repo = Repository::open(root.as_ref()).map_err(|source| CheckoutError::Open {
        source,
        repo_path: root.as_ref().to_path_buf(),
    })?;

    if !Branch::name_is_valid(name)? {
        return Err(CheckoutError::InvalidName(name.into()));
    }
    let refname = format!("refs/heads/{name}");

    match repo.find_branch(name, BranchType::Local) {
        Ok(branch) => {
            let commit = branch.get().peel_to_commit()?;
            checkout(&repo, commit.as_object(), name, &refname)?;
            info!("checked out target branch {name}");
            return Ok(Switch::CheckedOut);
        }
        Err(err) if err.code() == ErrorCode::NotFound => {}
        Err(err) => return Err(err.into()),
    }

    match repo.head() {
        Ok(head) => {
            let commit = head.peel_to_commit()?;
            repo.branch(name, &commit, false)?;
            checkout(&repo, commit.as_object(), name, &refname)?;
        }
        // INVARIANT: Unborn HEAD has nothing to branch from, so just rename it.
        Err(err) if err.code() == ErrorCode::UnbornBranch => repo.set_head(&refname)?,
        Err(err) => return Err(err.into()),
    }
    info!("created target branch {name}");

    Ok(Switch::Created)
}

fn checkout(repo: &Repository, target: &Object<'_>, name: &str, refname: &str) -> Result<()> {
    // INVARIANT: Checkout worktree before moving HEAD, so a refused checkout
    // leaves target on its current branch.
    repo.checkout_tree(target, Some(CheckoutBuilder::new().safe()))
        .map_err(|source| CheckoutError::Checkout {
            source,
            name: name.into(),
        })?;
    repo.set_head(refname)?;

    Ok(())
}

/// Target branch error types.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    /// Target is not a git repository.
    #[error("target {:?} is not a git repository", repo_path.display())]
    Open {
        #[source]
        source: git2::Error,
        repo_path: PathBuf,
    },

    /// Branch name is rejected by git.
    #[error("invalid target branch name {0:?}")]
    InvalidName(String),

    /// Worktree cannot be switched over to branch.
    #[error("failed to check out target branch {name:?}, commit or stash local changes first")]
    Checkout {
        #[source]
        source: git2::Error,
        name: String,
    },

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = CheckoutError> = std::result::Result<T, E>;
