// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the template configuration file that every target
//! repository carries at `.graft/template.toml`, and turn it into a validated
//! [`TemplateSource`] that the rest of graft can work with. Everything that can
//! go wrong with user input is caught here, before any network I/O happens.

use crate::path::{self, CONFIG_FILE};

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Branch used when neither configuration nor caller name one.
pub const DEFAULT_BRANCH: &str = "main";

/// Template configuration layout.
///
/// # General Layout
///
/// ```toml
/// template-repository = "owner/templates"
/// template-branch = "main"
/// template-host = "github"
/// include = [".github", ".editorconfig"]
/// exclude = [".github/CODEOWNERS"]
/// ```
///
/// An empty include listing means "everything in the template repository",
/// which only makes sense together with at least one exclude entry. Older
/// field names `repository` and `ref` are accepted as aliases.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct TemplateConfig {
    /// Template repository as `owner/name`, URL, or local path.
    #[serde(
        rename = "template-repository",
        alias = "repository",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub repository: Option<String>,

    /// Branch of template repository to track.
    #[serde(
        rename = "template-branch",
        alias = "ref",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub branch: Option<String>,

    /// Hosting platform of `owner/name` style repositories.
    #[serde(rename = "template-host", default)]
    pub host: TemplateHost,

    /// Paths of template repository to manage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    /// Paths of template repository to leave alone.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl TemplateConfig {
    /// Load template configuration of target repository.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Missing`] if configuration file does not exist.
    /// - Return [`ConfigError::Read`] if configuration file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if configuration is malformed.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let config_path = path::resolve(root.as_ref(), CONFIG_FILE);
        let data = read_to_string(&config_path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => ConfigError::Missing {
                config_path: config_path.clone(),
            },
            _ => ConfigError::Read {
                source: err,
                config_path: config_path.clone(),
            },
        })?;

        data.parse()
    }

    /// Validate configuration into a usable template source.
    ///
    /// The branch named by the configuration wins over `fallback_branch`.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::MissingRepository`] if no repository is set.
    /// - Return [`ConfigError::NoPaths`] if neither include nor exclude
    ///   entries exist.
    /// - Return [`ConfigError::ShellExpansion`] if a local repository path
    ///   cannot be expanded.
    pub fn validate(&self, fallback_branch: impl Into<String>) -> Result<TemplateSource> {
        let repository = match self.repository.as_deref().map(str::trim) {
            Some(repository) if !repository.is_empty() => repository.to_string(),
            _ => return Err(ConfigError::MissingRepository),
        };

        if self.include.is_empty() && self.exclude.is_empty() {
            return Err(ConfigError::NoPaths);
        }

        let branch = self
            .branch
            .clone()
            .filter(|branch| !branch.trim().is_empty())
            .unwrap_or_else(|| fallback_branch.into());
        let url = self.host.git_url(&repository)?;

        Ok(TemplateSource {
            repository,
            branch,
            url,
            include: self.include.clone(),
            exclude: self.exclude.clone(),
        })
    }
}

impl FromStr for TemplateConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(ConfigError::Deserialize)
    }
}

impl Display for TemplateConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Hosting platform of a template repository.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateHost {
    #[default]
    Github,
    Gitlab,
}

impl TemplateHost {
    /// Construct clone URL for repository.
    ///
    /// Repositories that already look like a URL or a local path are passed
    /// through untouched, apart from shell expansion of local paths.
    pub fn git_url(&self, repository: &str) -> Result<String> {
        if repository.contains("://") || repository.starts_with("git@") {
            return Ok(repository.to_string());
        }

        if repository.starts_with(['/', '.', '~', '$']) {
            return Ok(shellexpand::full(repository)
                .map_err(ConfigError::ShellExpansion)?
                .into_owned());
        }

        let url = match self {
            Self::Github => format!("https://github.com/{repository}.git"),
            Self::Gitlab => format!("https://gitlab.com/{repository}.git"),
        };

        Ok(url)
    }
}

/// Validated template source.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TemplateSource {
    /// Repository as written in configuration.
    pub repository: String,

    /// Branch to track.
    pub branch: String,

    /// Resolved clone URL.
    pub url: String,

    /// Include entries.
    pub include: Vec<String>,

    /// Exclude entries.
    pub exclude: Vec<String>,
}

/// Strategy used to reconcile template files with a target.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Hash, clap::ValueEnum)]
pub enum Strategy {
    /// Three-way merge that keeps local edits.
    #[default]
    Merge,

    /// Copy every template file verbatim.
    Overwrite,

    /// Show what would change without touching anything.
    Diff,
}

impl Strategy {
    /// Check if strategy writes to the target.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Diff)
    }
}

impl Display for Strategy {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Merge => fmt.write_str("merge"),
            Self::Overwrite => fmt.write_str("overwrite"),
            Self::Diff => fmt.write_str("diff"),
        }
    }
}

/// Layout of conflict hunks written into merged files.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, clap::ValueEnum)]
pub enum ConflictStyle {
    /// Local and upstream sides only.
    #[default]
    Merge,

    /// Local, base, and upstream sides.
    Diff3,
}

/// Subset of managed paths to restrict a sync to.
///
/// Each entry is either a relative path, which matches itself and anything
/// beneath it, or a glob pattern. Wildcards never cross a path separator.
#[derive(Debug, Clone)]
pub struct PathScope {
    entries: Vec<(String, Pattern)>,
}

impl PathScope {
    /// Construct new path scope.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Scope`] if an entry is not a valid pattern.
    pub fn new(entries: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self> {
        let entries = entries
            .into_iter()
            .map(|entry| {
                let entry = path::normalize(entry.as_ref());
                Pattern::new(&entry)
                    .map(|pattern| (entry.clone(), pattern))
                    .map_err(|err| ConfigError::Scope { source: err, entry })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { entries })
    }

    /// Check if relative path falls inside scope.
    pub fn contains(&self, path: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };

        self.entries.iter().any(|(entry, pattern)| {
            path == entry
                || path
                    .strip_prefix(entry.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
                || pattern.matches_with(path, options)
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file does not exist.
    #[error("no template configuration found at {:?}", config_path.display())]
    Missing { config_path: PathBuf },

    /// Configuration file cannot be read.
    #[error("failed to read template configuration at {:?}", config_path.display())]
    Read {
        #[source]
        source: std::io::Error,
        config_path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// No template repository configured.
    #[error("template configuration does not name a template repository")]
    MissingRepository,

    /// Neither include nor exclude entries configured.
    #[error("template configuration must list at least one include or exclude path")]
    NoPaths,

    /// Path scope entry is not a valid pattern.
    #[error("invalid path scope {entry:?}")]
    Scope {
        #[source]
        source: glob::PatternError,
        entry: String,
    },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
