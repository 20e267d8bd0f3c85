// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Lock file handling.
//!
//! The lock file records the template commit whose snapshot was last fully
//! reconciled into a target repository. That commit becomes the common
//! ancestor of the next three-way merge. The file holds a single line with
//! the commit identifier followed by a newline.
//!
//! No locking happens here despite the name. Callers must make sure only one
//! sync runs against a target at a time.

use crate::{
    path::{self, LOCK_FILE},
    snapshot::CommitId,
    workspace::{write_atomic, WorkspaceError},
};

use std::{
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Read last synced commit of target repository.
///
/// Returns `None` if no lock file exists, or if it is empty.
///
/// # Errors
///
/// - Return [`LockError::Read`] if the lock file exists but cannot be read.
#[instrument(skip(root), level = "debug")]
pub fn read(root: impl AsRef<Path>) -> Result<Option<CommitId>> {
    let lock_path = path::resolve(root.as_ref(), LOCK_FILE);
    let data = match read_to_string(&lock_path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("no lock file at {:?}", lock_path.display());
            return Ok(None);
        }
        Err(err) => {
            return Err(LockError::Read {
                source: err,
                lock_path,
            })
        }
    };

    let commit = data.trim();
    if commit.is_empty() {
        return Ok(None);
    }

    Ok(Some(CommitId::new(commit)))
}

/// Record synced commit of target repository.
///
/// Replaces the lock file in one step, creating `.graft/` if needed.
///
/// # Errors
///
/// - Return [`LockError::Write`] if the lock file cannot be written.
#[instrument(skip(root), level = "debug")]
pub fn write(root: impl AsRef<Path>, commit: &CommitId) -> Result<()> {
    let lock_path = path::resolve(root.as_ref(), LOCK_FILE);
    write_atomic(&lock_path, &format!("{commit}\n"))?;
    info!("updated {LOCK_FILE} to {}", commit.short());

    Ok(())
}

/// Lock file error types.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Lock file cannot be read.
    #[error("failed to read lock file at {:?}", lock_path.display())]
    Read {
        #[source]
        source: std::io::Error,
        lock_path: PathBuf,
    },

    /// Lock file cannot be written.
    #[error(transparent)]
    Write(#[from] WorkspaceError),
}

/// Friendly result alias :3
pub type Result<T, E = LockError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test]
    fn read_missing_lock() -> anyhow::Result<()> {
        assert_eq!(read(std::env::current_dir()?)?, None);
        Ok(())
    }

    #[sealed_test]
    fn write_then_read_lock() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let commit = CommitId::new("0123456789abcdef0123456789abcdef01234567");

        write(&root, &commit)?;
        assert_eq!(read(&root)?, Some(commit.clone()));
        assert_eq!(
            read_to_string(root.join(".graft").join("template.lock"))?,
            "0123456789abcdef0123456789abcdef01234567\n"
        );

        let next = CommitId::new("fedcba9876543210fedcba9876543210fedcba98");
        write(&root, &next)?;
        assert_eq!(read(&root)?, Some(next));

        Ok(())
    }

    #[sealed_test]
    fn read_blank_lock() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        std::fs::create_dir_all(root.join(".graft"))?;
        std::fs::write(root.join(".graft").join("template.lock"), "\n")?;

        assert_eq!(read(&root)?, None);

        Ok(())
    }
}
