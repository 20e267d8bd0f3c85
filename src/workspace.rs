// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Target repository file access.
//!
//! The __workspace__ is the working tree of the target repository that
//! template files get written into. All paths handed to a workspace are
//! relative, forward-slash separated, and resolved against its root.

use crate::path;

use std::{
    fs::{read_to_string, remove_file, rename, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Read, write, and delete files of a target repository.
pub trait Workspace {
    /// Absolute path to root of target repository.
    fn root(&self) -> &Path;

    /// Read file content.
    ///
    /// Returns `None` if the file does not exist.
    fn read(&self, relative: &str) -> Result<Option<String>>;

    /// Write file content, creating parent directories as needed.
    fn write(&self, relative: &str, contents: &str) -> Result<()>;

    /// Remove file.
    ///
    /// Returns `false` if the file did not exist to begin with.
    fn remove(&self, relative: &str) -> Result<bool>;
}

/// Workspace on the local file system.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    /// Construct new local workspace rooted at target path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, relative: &str) -> PathBuf {
        path::resolve(&self.root, relative)
    }
}

impl Workspace for LocalWorkspace {
    fn root(&self) -> &Path {
        self.root.as_path()
    }

    fn read(&self, relative: &str) -> Result<Option<String>> {
        let file_path = self.resolve(relative);
        match read_to_string(&file_path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(WorkspaceError::Read {
                source: err,
                file_path,
            }),
        }
    }

    #[instrument(skip(self, contents), level = "debug")]
    fn write(&self, relative: &str, contents: &str) -> Result<()> {
        let file_path = self.resolve(relative);
        ensure_parent(&file_path)?;
        write(&file_path, contents).map_err(|err| WorkspaceError::Write {
            source: err,
            file_path,
        })
    }

    #[instrument(skip(self), level = "debug")]
    fn remove(&self, relative: &str) -> Result<bool> {
        let file_path = self.resolve(relative);
        match remove_file(&file_path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(WorkspaceError::Remove {
                source: err,
                file_path,
            }),
        }
    }
}

/// Replace file content in one step.
///
/// Content goes to a sibling scratch file first, which is then renamed over
/// the destination. A failure midway leaves the previous content in place.
pub(crate) fn write_atomic(file_path: &Path, contents: &str) -> Result<()> {
    ensure_parent(file_path)?;

    let mut scratch = file_path.as_os_str().to_owned();
    scratch.push(".tmp");
    let scratch = PathBuf::from(scratch);

    debug!("write {:?} through {:?}", file_path.display(), scratch.display());
    write(&scratch, contents).map_err(|err| WorkspaceError::Write {
        source: err,
        file_path: scratch.clone(),
    })?;
    rename(&scratch, file_path).map_err(|err| {
        let _ = remove_file(&scratch);
        WorkspaceError::Write {
            source: err,
            file_path: file_path.to_path_buf(),
        }
    })
}

fn ensure_parent(file_path: &Path) -> Result<()> {
    if let Some(parent) = file_path.parent() {
        mkdirp::mkdirp(parent).map_err(|err| WorkspaceError::CreateDir {
            source: err,
            dir_path: parent.to_path_buf(),
        })?;
    }

    Ok(())
}

/// Workspace error types.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// File cannot be read.
    #[error("failed to read {:?}", file_path.display())]
    Read {
        #[source]
        source: std::io::Error,
        file_path: PathBuf,
    },

    /// File cannot be written.
    #[error("failed to write {:?}", file_path.display())]
    Write {
        #[source]
        source: std::io::Error,
        file_path: PathBuf,
    },

    /// File cannot be removed.
    #[error("failed to remove {:?}", file_path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        file_path: PathBuf,
    },

    /// Parent directory cannot be created.
    #[error("failed to create directory {:?}", dir_path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        dir_path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = WorkspaceError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test]
    fn local_workspace_round_trip() -> anyhow::Result<()> {
        let workspace = LocalWorkspace::new(std::env::current_dir()?);

        assert_eq!(workspace.read("a/b/c.txt")?, None);
        workspace.write("a/b/c.txt", "hello\n")?;
        assert_eq!(workspace.read("a/b/c.txt")?.as_deref(), Some("hello\n"));

        assert!(workspace.remove("a/b/c.txt")?);
        assert!(!workspace.remove("a/b/c.txt")?);
        assert_eq!(workspace.read("a/b/c.txt")?, None);

        Ok(())
    }

    #[sealed_test]
    fn write_atomic_replaces_content() -> anyhow::Result<()> {
        let file_path = std::env::current_dir()?.join("nested").join("state");

        write_atomic(&file_path, "one\n")?;
        write_atomic(&file_path, "two\n")?;

        assert_eq!(read_to_string(&file_path)?, "two\n");
        assert!(!file_path.with_file_name("state.tmp").exists());

        Ok(())
    }
}
