// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Include and exclude rules for template files.
//!
//! Rules use gitignore syntax, with one tweak: plain paths like `.github` or
//! `docs/guide.md` are anchored to the top-level of the template repository,
//! so they only ever match that exact file or directory. Globs such as
//! `*.bak` keep their usual unanchored meaning. A leading `!` re-includes a
//! path that an earlier rule matched.
//!
//! Reserved paths of graft itself are always excluded, no matter what the
//! rules say.

use crate::path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

/// Match template file paths against include and exclude rules.
#[derive(Debug, Clone)]
pub struct PathRules {
    include: Option<Gitignore>,
    exclude: Gitignore,
}

impl PathRules {
    /// Construct new path rules.
    ///
    /// An empty include listing includes every path.
    ///
    /// # Errors
    ///
    /// - Return [`RulesError::Pattern`] if a rule cannot be parsed.
    pub fn new(
        include: impl IntoIterator<Item = impl AsRef<str>>,
        exclude: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self> {
        Ok(Self {
            include: build(include)?,
            exclude: build(exclude)?.unwrap_or_else(Gitignore::empty),
        })
    }

    /// Rules that accept every non-reserved path.
    pub fn all() -> Self {
        Self {
            include: None,
            exclude: Gitignore::empty(),
        }
    }

    /// Check if relative path is accepted by rules.
    pub fn allows(&self, path: &str) -> bool {
        if path::is_reserved(path) {
            return false;
        }

        if let Some(include) = &self.include {
            if !is_match(include, path) {
                return false;
            }
        }

        !is_match(&self.exclude, path)
    }
}

fn build(rules: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Option<Gitignore>> {
    let mut builder = GitignoreBuilder::new(".");
    let mut count = 0;
    for rule in rules {
        let Some(line) = anchor(rule.as_ref()) else {
            continue;
        };

        builder
            .add_line(None, &line)
            .map_err(|err| RulesError::Pattern {
                source: err,
                rule: rule.as_ref().to_string(),
            })?;
        count += 1;
    }

    if count == 0 {
        return Ok(None);
    }

    let matcher = builder.build().map_err(|err| RulesError::Pattern {
        source: err,
        rule: String::from("<combined rules>"),
    })?;

    Ok(Some(matcher))
}

// INVARIANT: Plain paths only ever match from the top-level.
fn anchor(rule: &str) -> Option<String> {
    let rule = rule.trim();
    let (negated, pattern) = match rule.strip_prefix('!') {
        Some(pattern) => (true, pattern),
        None => (false, rule),
    };

    let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
    if pattern.is_empty() {
        return None;
    }

    let is_glob = pattern.contains(['*', '?', '[']);
    let pattern = if pattern.starts_with('/') || is_glob {
        pattern.to_string()
    } else {
        format!("/{pattern}")
    };

    if negated {
        Some(format!("!{pattern}"))
    } else {
        Some(pattern)
    }
}

fn is_match(matcher: &Gitignore, path: &str) -> bool {
    matcher
        .matched_path_or_any_parents(Path::new(path), false)
        .is_ignore()
}

/// Path rule error types.
#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    /// Rule is not a valid pattern.
    #[error("invalid path rule {rule:?}")]
    Pattern {
        #[source]
        source: ignore::Error,
        rule: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = RulesError> = std::result::Result<T, E>;
