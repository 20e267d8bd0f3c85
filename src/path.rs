// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path layout of a target repository.
//!
//! Graft keeps all of its own state inside a single `.graft` directory at the
//! top-level of the target repository:
//!
//! - `.graft/template.toml`: template configuration, owned by the user.
//! - `.graft/template.lock`: commit identifier of the last full sync.
//! - `.graft/history`: listing of every file under template management.
//!
//! These __reserved paths__ are managed out-of-band. They are never offered
//! for merging, never shown in diffs, and never picked up from a template
//! repository, even when the template repository happens to contain them.

use std::path::Path;

/// Template configuration file, relative to target root.
pub const CONFIG_FILE: &str = ".graft/template.toml";

/// Lock file, relative to target root.
pub const LOCK_FILE: &str = ".graft/template.lock";

/// History file, relative to target root.
pub const HISTORY_FILE: &str = ".graft/history";

/// Leading segments of CI workflow definitions.
pub const WORKFLOW_PREFIX: [&str; 2] = [".github", "workflows"];

/// All reserved paths.
pub const RESERVED: [&str; 3] = [CONFIG_FILE, LOCK_FILE, HISTORY_FILE];

/// Check if relative path is reserved for graft itself.
pub fn is_reserved(path: impl AsRef<str>) -> bool {
    let path = normalize(path.as_ref());
    RESERVED.iter().any(|reserved| *reserved == path)
}

/// Check if relative path points into the CI workflow directory.
pub fn is_workflow_file(path: impl AsRef<str>) -> bool {
    let path = normalize(path.as_ref());
    let mut segments = path.split('/');
    WORKFLOW_PREFIX
        .iter()
        .all(|prefix| segments.next() == Some(*prefix))
        && segments.next().is_some()
}

/// Normalize a relative path into forward-slash form.
///
/// Strips leading "./" and "/" segments, collapses repeated separators, and
/// converts backslashes. Case is preserved.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if path stays inside the directory it is relative to.
///
/// Absolute paths and paths with a `..` segment escape their root.
pub fn is_contained(path: &str) -> bool {
    let path = path.replace('\\', "/");
    !path.starts_with('/') && !path.split('/').any(|segment| segment == "..")
}

/// Convert relative forward-slash path into a path under target root.
pub fn resolve(root: &Path, relative: &str) -> std::path::PathBuf {
    relative
        .split('/')
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}
