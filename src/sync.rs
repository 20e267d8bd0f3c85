// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Sync orchestration.
//!
//! A sync walks through the following states, in order:
//!
//! 1. Read lock of target repository.
//! 2. Resolve head of tracked template branch. Stop right here if the lock
//!    already points at it.
//! 3. Take upstream snapshot, and a base snapshot of the locked commit if
//!    merging.
//! 4. Reconcile every upstream file with the target.
//! 5. Remove orphaned files.
//! 6. Rewrite history.
//! 7. Advance lock.
//!
//! The lock is advanced last, and only once every file was reconciled
//! without failure. An interrupted or partially failed sync thus leaves the
//! lock where it was, and the next sync simply redoes the work. Reconciling a
//! file twice is harmless, since a file that already matches upstream comes
//! out as [`Outcome::Unchanged`].
//!
//! The [`Strategy::Diff`] strategy stops after step 4 without touching
//! anything, reporting unified diffs instead. A sync restricted through a
//! [`PathScope`] never removes orphans nor advances the lock, because the
//! template was only partially reconciled.

use crate::{
    config::{ConflictStyle, PathScope, Strategy, TemplateSource},
    diff,
    history::{self, History, HistoryError, ManagedPaths},
    lock::{self, LockError},
    merge::{self, Outcome, Resolution},
    path,
    snapshot::{
        rules::{PathRules, RulesError},
        CommitId, Revision, Snapshot, SnapshotError, SnapshotProvider,
    },
    workspace::Workspace,
};

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
};
use tracing::{debug, error, info, instrument, warn};

/// Knobs of a single sync.
#[derive(Debug, Default, Clone)]
pub struct SyncOptions {
    /// How to reconcile template files.
    pub strategy: Strategy,

    /// Restrict sync to subset of managed files.
    pub scope: Option<PathScope>,

    /// Layout of conflict hunks.
    pub conflict_style: ConflictStyle,
}

/// How a sync ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Lock already pointed at upstream head, nothing was done.
    UpToDate,

    /// Template files were reconciled.
    Completed,
}

/// Everything a sync did, or would have done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// How the sync ended.
    pub status: SyncStatus,

    /// Whether the target was left untouched on purpose.
    pub read_only: bool,

    /// Upstream head commit.
    pub upstream: CommitId,

    /// Outcome of every reconciled file.
    pub outcomes: BTreeMap<String, Outcome>,

    /// Unified diffs of files that differ from upstream, read-only syncs only.
    pub diffs: BTreeMap<String, String>,

    /// Files that could not be read or written.
    pub failed: Vec<String>,

    /// Orphaned files that were removed.
    pub deleted: Vec<String>,

    /// Orphaned files that a writing sync would remove, read-only syncs only.
    pub orphans: Vec<String>,

    /// CI workflow files that took upstream content.
    pub workflows: Vec<String>,

    /// Whether the lock now points at upstream head.
    pub lock_updated: bool,
}

impl SyncReport {
    fn new(status: SyncStatus, read_only: bool, upstream: CommitId) -> Self {
        Self {
            status,
            read_only,
            upstream,
            outcomes: BTreeMap::new(),
            diffs: BTreeMap::new(),
            failed: Vec::new(),
            deleted: Vec::new(),
            orphans: Vec::new(),
            workflows: Vec::new(),
            lock_updated: false,
        }
    }

    /// Number of files with given outcome.
    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes
            .values()
            .filter(|value| **value == outcome)
            .count()
    }

    /// Files written with conflict markers.
    pub fn conflicts(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| **outcome == Outcome::Conflict)
            .map(|(path, _)| path.as_str())
            .collect()
    }

    /// Check if every file was handled without failure.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Display for SyncReport {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        if self.status == SyncStatus::UpToDate {
            return write!(fmt, "up to date with template at {}", self.upstream.short());
        }

        if self.read_only {
            write!(
                fmt,
                "{} file(s) differ from template at {}",
                self.diffs.len(),
                self.upstream.short()
            )?;
            if !self.orphans.is_empty() {
                write!(fmt, "\n  would delete: {}", self.orphans.len())?;
            }
            return Ok(());
        }

        write!(
            fmt,
            "processed {} file(s) from template at {}",
            self.outcomes.len(),
            self.upstream.short()
        )?;
        for outcome in Outcome::ALL {
            let count = self.count(outcome);
            if count > 0 {
                write!(fmt, "\n  {outcome}: {count}")?;
            }
        }
        if !self.deleted.is_empty() {
            write!(fmt, "\n  deleted: {}", self.deleted.len())?;
        }
        if !self.failed.is_empty() {
            write!(fmt, "\n  failed: {}", self.failed.len())?;
        }

        Ok(())
    }
}

/// Reconcile template files with a target repository.
pub struct Syncer<'a, P, W>
where
    P: SnapshotProvider,
    W: Workspace,
{
    provider: &'a P,
    workspace: &'a W,
    source: &'a TemplateSource,
    rules: PathRules,
    options: SyncOptions,
}

impl<'a, P, W> Syncer<'a, P, W>
where
    P: SnapshotProvider,
    W: Workspace,
{
    /// Construct new syncer.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Rules`] if include or exclude entries of
    ///   template source are invalid.
    pub fn new(
        provider: &'a P,
        workspace: &'a W,
        source: &'a TemplateSource,
        options: SyncOptions,
    ) -> Result<Self> {
        let rules = PathRules::new(&source.include, &source.exclude)?;
        Ok(Self {
            provider,
            workspace,
            source,
            rules,
            options,
        })
    }

    /// Sync target with head of template branch.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Lock`] if the lock cannot be read or written.
    /// - Return [`SyncError::Snapshot`] if the upstream snapshot cannot be
    ///   taken. An unavailable base only degrades the merge.
    /// - Return [`SyncError::History`] if history cannot be read or written.
    ///
    /// Failing to read or write individual files is not an error. Those files
    /// are listed in the report instead, and the lock stays put.
    #[instrument(skip(self), level = "debug")]
    pub fn run(&self) -> Result<SyncReport> {
        let root = self.workspace.root();
        let strategy = self.options.strategy;

        let locked = lock::read(root)?;
        let head = self.provider.head()?;
        if locked.as_ref() == Some(&head) {
            info!("up to date with {} at {}", self.source.repository, head.short());
            return Ok(SyncReport::new(
                SyncStatus::UpToDate,
                strategy.is_read_only(),
                head,
            ));
        }

        info!(
            "sync {} ({}) at {} with {strategy} strategy",
            self.source.repository,
            self.source.branch,
            head.short()
        );
        let mut upstream = self
            .provider
            .snapshot(&Revision::Branch(self.source.branch.clone()), &self.rules)?;
        if let Some(scope) = &self.options.scope {
            upstream = upstream
                .iter()
                .filter(|(path, _)| scope.contains(path))
                .collect();
            debug!("{} file(s) in scope", upstream.len());
        }
        if upstream.is_empty() {
            warn!("template provides no files, check include and exclude paths");
        }

        let base = match (strategy, &locked) {
            (Strategy::Merge, Some(commit)) => self.base(commit)?,
            _ => None,
        };

        let mut report = SyncReport::new(SyncStatus::Completed, strategy.is_read_only(), head);
        for (rel_path, content) in upstream.iter() {
            let base_content = base.as_ref().and_then(|base| base.get(rel_path));
            self.reconcile(rel_path, base_content, content, &mut report);
        }

        let scoped = self.options.scope.is_some();
        self.finish(&upstream, scoped, &mut report)?;
        if strategy.is_read_only() {
            return Ok(report);
        }

        if scoped {
            warn!("lock not advanced, only part of the template was synced");
        } else if !report.is_success() {
            warn!(
                "lock not advanced, {} file(s) failed to sync",
                report.failed.len()
            );
        } else {
            lock::write(root, &report.upstream)?;
            report.lock_updated = true;
        }

        Ok(report)
    }

    /// Copy template files into target.
    ///
    /// Files missing from the target are always copied. Files that exist but
    /// differ are only replaced if `force` is set. Orphans are removed and
    /// history is rewritten, but the lock is never read nor written.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Snapshot`] if the upstream snapshot cannot be
    ///   taken.
    /// - Return [`SyncError::History`] if history cannot be read or written.
    #[instrument(skip(self), level = "debug")]
    pub fn materialize(&self, force: bool) -> Result<SyncReport> {
        let head = self.provider.head()?;
        info!(
            "materialize {} ({}) at {}",
            self.source.repository,
            self.source.branch,
            head.short()
        );
        let upstream = self
            .provider
            .snapshot(&Revision::Branch(self.source.branch.clone()), &self.rules)?;

        let mut report = SyncReport::new(SyncStatus::Completed, false, head);
        for (rel_path, content) in upstream.iter() {
            let local = match self.workspace.read(rel_path) {
                Ok(local) => local,
                Err(err) => {
                    self.fail(rel_path, &err, &mut report);
                    continue;
                }
            };

            let resolution = match local {
                None => Resolution {
                    outcome: Outcome::NewFromUpstream,
                    content: content.to_string(),
                },
                Some(local) if local == content => Resolution {
                    outcome: Outcome::Unchanged,
                    content: local,
                },
                Some(_) if force => Resolution {
                    outcome: Outcome::TemplateOnly,
                    content: content.to_string(),
                },
                Some(local) => {
                    debug!("{rel_path} exists locally, use --force to replace it");
                    Resolution {
                        outcome: Outcome::LocalOnly,
                        content: local,
                    }
                }
            };

            let writes = matches!(
                resolution.outcome,
                Outcome::NewFromUpstream | Outcome::TemplateOnly
            );
            self.apply(rel_path, resolution, writes, &mut report);
        }

        self.finish(&upstream, false, &mut report)?;

        Ok(report)
    }

    fn base(&self, commit: &CommitId) -> Result<Option<Snapshot>> {
        match self
            .provider
            .snapshot(&Revision::Commit(commit.clone()), &self.rules)
        {
            Ok(base) => Ok(Some(base)),
            Err(SnapshotError::BaseUnavailable { commit }) => {
                warn!(
                    "base commit {} is no longer available, merging without base",
                    commit.short()
                );
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn reconcile(
        &self,
        rel_path: &str,
        base: Option<&str>,
        upstream: &str,
        report: &mut SyncReport,
    ) {
        let local = match self.workspace.read(rel_path) {
            Ok(local) => local,
            Err(err) => {
                self.fail(rel_path, &err, report);
                return;
            }
        };

        let resolution = match self.options.strategy {
            Strategy::Diff => {
                if let Some(diff) = diff::unified(upstream, local.as_deref(), rel_path) {
                    report.diffs.insert(rel_path.to_string(), diff);
                }
                return;
            }
            Strategy::Overwrite => overwrite(upstream, local),
            Strategy::Merge => merge::resolve(
                base,
                upstream,
                local.as_deref(),
                self.options.conflict_style,
            ),
        };

        let writes = resolution.outcome.needs_write();
        self.apply(rel_path, resolution, writes, report);
    }

    fn apply(&self, rel_path: &str, resolution: Resolution, writes: bool, report: &mut SyncReport) {
        if writes {
            if let Err(err) = self.workspace.write(rel_path, &resolution.content) {
                self.fail(rel_path, &err, report);
                return;
            }
        }

        let outcome = resolution.outcome;
        match outcome {
            Outcome::Conflict => warn!("{} {rel_path}", outcome.tag()),
            Outcome::Unchanged | Outcome::LocalOnly => debug!("{} {rel_path}", outcome.tag()),
            _ => info!("{} {rel_path}", outcome.tag()),
        }
        report.outcomes.insert(rel_path.to_string(), outcome);
    }

    fn fail(&self, rel_path: &str, err: &dyn std::error::Error, report: &mut SyncReport) {
        match err.source() {
            Some(source) => error!("[FAIL] {rel_path}: {err}: {source}"),
            None => error!("[FAIL] {rel_path}: {err}"),
        }
        report.failed.push(rel_path.to_string());
    }

    fn finish(&self, upstream: &Snapshot, scoped: bool, report: &mut SyncReport) -> Result<()> {
        let root = self.workspace.root();
        let current = upstream
            .paths()
            .map(String::from)
            .collect::<ManagedPaths>();

        if !report.read_only {
            report.workflows = report
                .outcomes
                .iter()
                .filter(|(rel_path, outcome)| {
                    path::is_workflow_file(rel_path) && outcome.adopts_upstream()
                })
                .map(|(rel_path, _)| rel_path.clone())
                .collect();
            if !report.workflows.is_empty() {
                warn!(
                    "{} CI workflow file(s) changed, pushing them upstream may need extra permissions",
                    report.workflows.len()
                );
                for workflow in &report.workflows {
                    warn!("  {workflow}");
                }
            }
        }

        let previous = history::read(root)?;
        if scoped {
            if !report.read_only {
                let paths = previous.union(&current).collect::<Vec<_>>();
                history::write(root, &self.history(paths))?;
            }
            return Ok(());
        }

        let orphans = history::orphans(&previous, &current);
        if report.read_only {
            for orphan in &orphans {
                info!("[DEL] {orphan} (preview)");
            }
            report.orphans = orphans;
            return Ok(());
        }

        for orphan in orphans {
            match self.workspace.remove(&orphan) {
                Ok(true) => {
                    info!("[DEL] {orphan}");
                    report.deleted.push(orphan);
                }
                Ok(false) => debug!("orphan {orphan} already gone"),
                Err(err) => self.fail(&orphan, &err, report),
            }
        }

        history::write(root, &self.history(&current))?;

        Ok(())
    }

    fn history(&self, paths: impl IntoIterator<Item = impl AsRef<str>>) -> History {
        History::new(&self.source.repository, &self.source.branch, paths)
    }
}

fn overwrite(upstream: &str, local: Option<String>) -> Resolution {
    let outcome = match local {
        None => Outcome::NewFromUpstream,
        Some(local) if local == upstream => Outcome::Unchanged,
        Some(_) => Outcome::TemplateOnly,
    };

    Resolution {
        outcome,
        content: upstream.to_string(),
    }
}

/// Sync error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Lock cannot be read or written.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// History cannot be read or written.
    #[error(transparent)]
    History(#[from] HistoryError),

    /// Snapshot cannot be taken.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Path rules are invalid.
    #[error(transparent)]
    Rules(#[from] RulesError),
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
