// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Managed file history.
//!
//! The history file lists every path currently under template management.
//! Each sync rewrites it from scratch. Paths that were listed by the previous
//! history but are no longer produced by the template are __orphans__, and
//! get removed from the target.
//!
//! # Layout
//!
//! Lines starting with `#` are comments. Every other non-blank line is one
//! relative path. Paths are written sorted and deduplicated.

use crate::{
    path::{self, HISTORY_FILE},
    workspace::{write_atomic, WorkspaceError},
};

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Set of managed relative paths.
pub type ManagedPaths = BTreeSet<String>;

/// History record to write into target repository.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct History {
    /// Template repository the paths came from.
    pub repository: String,

    /// Template branch the paths came from.
    pub branch: String,

    /// Managed paths.
    pub paths: ManagedPaths,
}

impl History {
    /// Construct new history record.
    pub fn new(
        repository: impl Into<String>,
        branch: impl Into<String>,
        paths: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        Self {
            repository: repository.into(),
            branch: branch.into(),
            paths: paths
                .into_iter()
                .map(|path| path::normalize(path.as_ref()))
                .filter(|path| !path.is_empty())
                .collect(),
        }
    }
}

impl Display for History {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        writeln!(fmt, "# Template History")?;
        writeln!(fmt, "# This file lists all files managed by the template.")?;
        writeln!(fmt, "# Template repository: {}", self.repository)?;
        writeln!(fmt, "# Template branch: {}", self.branch)?;
        writeln!(fmt, "#")?;
        writeln!(fmt, "# Files under template control:")?;
        for path in &self.paths {
            writeln!(fmt, "{path}")?;
        }

        Ok(())
    }
}

/// Parse managed paths out of history file content.
///
/// Entries that are absolute or climb out of the target root through a `..`
/// segment are skipped with a warning, so they can never become orphans.
pub fn parse(data: &str) -> ManagedPaths {
    data.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| {
            let contained = path::is_contained(line);
            if !contained {
                warn!("skip history entry {line:?}, it points outside of target");
            }
            contained
        })
        .map(path::normalize)
        .collect()
}

/// Read managed paths of target repository.
///
/// Returns an empty set if no history file exists.
///
/// # Errors
///
/// - Return [`HistoryError::Read`] if history file exists but cannot be read.
#[instrument(skip(root), level = "debug")]
pub fn read(root: impl AsRef<Path>) -> Result<ManagedPaths> {
    let history_path = path::resolve(root.as_ref(), HISTORY_FILE);
    match read_to_string(&history_path) {
        Ok(data) => Ok(parse(&data)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(ManagedPaths::new()),
        Err(err) => Err(HistoryError::Read {
            source: err,
            history_path,
        }),
    }
}

/// Replace history of target repository.
///
/// # Errors
///
/// - Return [`HistoryError::Write`] if history file cannot be written.
#[instrument(skip(root, history), level = "debug")]
pub fn write(root: impl AsRef<Path>, history: &History) -> Result<()> {
    let history_path = path::resolve(root.as_ref(), HISTORY_FILE);
    write_atomic(&history_path, &history.to_string())?;
    info!("updated {HISTORY_FILE} with {} file(s)", history.paths.len());

    Ok(())
}

/// Determine orphaned paths.
///
/// An orphan is a previously managed path that is no longer managed. The
/// template configuration file is never considered an orphan.
pub fn orphans(previous: &ManagedPaths, current: &ManagedPaths) -> Vec<String> {
    previous
        .difference(current)
        .filter(|path| !path::is_reserved(path))
        .cloned()
        .collect()
}

/// History error types.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// History file cannot be read.
    #[error("failed to read history file at {:?}", history_path.display())]
    Read {
        #[source]
        source: std::io::Error,
        history_path: PathBuf,
    },

    /// History file cannot be written.
    #[error(transparent)]
    Write(#[from] WorkspaceError),
}

/// Friendly result alias :3
pub type Result<T, E = HistoryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[test]
    fn history_layout_is_sorted_and_deduplicated() {
        let history = History::new(
            "acme/templates",
            "main",
            ["b.txt", ".github/ci.yml", "./b.txt", "a/c.txt"],
        );

        let expect = indoc! {r#"
            # Template History
            # This file lists all files managed by the template.
            # Template repository: acme/templates
            # Template branch: main
            #
            # Files under template control:
            .github/ci.yml
            a/c.txt
            b.txt
        "#};
        assert_eq!(history.to_string(), expect);
    }

    #[test]
    fn parse_skips_comments_and_blanks() {
        let result = parse(indoc! {r#"
            # header

            b.txt
            # another comment
            a.txt
        "#});

        let expect = ["a.txt", "b.txt"]
            .into_iter()
            .map(String::from)
            .collect::<ManagedPaths>();
        assert_eq!(result, expect);
    }

    #[test]
    fn parse_skips_entries_outside_of_target() {
        let result = parse(indoc! {r#"
            # Files under template control:
            ../outside.txt
            /etc/passwd
            docs/../../escape.txt
            kept.txt
        "#});

        let expect = ["kept.txt"]
            .into_iter()
            .map(String::from)
            .collect::<ManagedPaths>();
        assert_eq!(result, expect);
    }

    #[sealed_test]
    fn read_missing_history() -> anyhow::Result<()> {
        assert!(read(std::env::current_dir()?)?.is_empty());
        Ok(())
    }

    #[sealed_test]
    fn write_overwrites_previous_history() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;

        write(&root, &History::new("acme/t", "main", ["one", "two"]))?;
        write(&root, &History::new("acme/t", "main", ["three"]))?;

        let expect = ["three"]
            .into_iter()
            .map(String::from)
            .collect::<ManagedPaths>();
        assert_eq!(read(&root)?, expect);

        Ok(())
    }

    #[test]
    fn orphans_never_include_config_file() {
        let previous = [".graft/template.toml", "gone.txt", "kept.txt"]
            .into_iter()
            .map(String::from)
            .collect::<ManagedPaths>();
        let current = ["kept.txt", "new.txt"]
            .into_iter()
            .map(String::from)
            .collect::<ManagedPaths>();

        assert_eq!(orphans(&previous, &current), vec!["gone.txt".to_string()]);
    }
}
