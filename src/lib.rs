// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Keep repositories in sync with a configuration template.
//!
//! A __template__ is a git repository holding shared configuration, e.g., CI
//! workflows, editor settings, or lint rules. A __target__ is any repository
//! that adopts a subset of those files. Graft copies template files into the
//! target, and on every later sync reconciles upstream template changes with
//! whatever the target changed locally in the meantime.
//!
//! # Three-Way Sync
//!
//! The target records the template commit it was last synced against in a
//! lock file. That commit serves as the common ancestor of a three-way merge
//! between the local copy of a file and its latest upstream version. Local
//! edits the template never touched are kept verbatim, template changes the
//! target never touched are adopted verbatim, and overlapping changes are
//! written with git-style conflict markers for the user to resolve.
//!
//! # See Also
//!
//! 1. [`sync`] for the overall sync procedure.
//! 2. [`merge`] for the per-file decision logic.
//! 3. [`path`] for the on-disk layout inside a target.

pub mod checkout;
pub mod config;
pub mod diff;
pub mod history;
pub mod lock;
pub mod merge;
pub mod path;
pub mod snapshot;
pub mod sync;
pub mod workspace;

pub use config::{ConflictStyle, PathScope, Strategy, TemplateConfig, TemplateSource};
pub use merge::Outcome;
pub use snapshot::{git::Git2Provider, CommitId, Snapshot, SnapshotProvider};
pub use sync::{SyncOptions, SyncReport, SyncStatus, Syncer};
pub use workspace::{LocalWorkspace, Workspace};
