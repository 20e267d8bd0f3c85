// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Three-way merge of template files.
//!
//! Every file of the upstream snapshot is reconciled with the copy living in
//! the target repository, using the base snapshot as common ancestor. Most
//! files never need a real merge: they are either missing locally, identical
//! to upstream, or untouched by the template since the last sync. Only files
//! that changed on both sides go through the line-based merge below.
//!
//! # Line Merge
//!
//! The line merge follows the classic diff3 approach. Both sides are diffed
//! against the base, and the lines that all three versions agree on become
//! __sync regions__. Between two sync regions, whichever side changed wins.
//! If both sides changed the same stretch differently, a conflict hunk is
//! written using git's marker format:
//!
//! ```text
//! <<<<<<< local
//! ... local lines ...
//! =======
//! ... upstream lines ...
//! >>>>>>> upstream
//! ```
//!
//! Conflict hunks are refined by diffing both sides against each other, so
//! lines they happen to share end up outside the markers. With
//! [`ConflictStyle::Diff3`] hunks are left whole and additionally carry the
//! base lines between `||||||| base` and `=======`.
//!
//! Without a base, e.g., on a first sync, the base is treated as empty. Any
//! difference between local and upstream then surfaces as a conflict instead
//! of being silently resolved one way or the other.
//!
//! # See Also
//!
//! 1. [A Formal Investigation of Diff3](https://www.cis.upenn.edu/~bcpierce/papers/diff3-short.pdf)

use crate::config::ConflictStyle;

use similar::{capture_diff_slices, Algorithm, DiffOp};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    ops::Range,
};

/// Opening conflict marker.
pub const MARKER_LOCAL: &str = "<<<<<<< local";

/// Base section marker of diff3 style conflicts.
pub const MARKER_BASE: &str = "||||||| base";

/// Separator between conflict sides.
pub const MARKER_SEPARATOR: &str = "=======";

/// Closing conflict marker.
pub const MARKER_UPSTREAM: &str = ">>>>>>> upstream";

/// How a single file was reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Outcome {
    /// Local copy already matches upstream.
    Unchanged,

    /// Only the template changed, upstream content adopted.
    TemplateOnly,

    /// Only the local copy changed, local content kept.
    LocalOnly,

    /// Both changed, merged without conflicts.
    MergedClean,

    /// Both changed, merged with conflict markers.
    Conflict,

    /// File did not exist locally.
    NewFromUpstream,
}

impl Outcome {
    /// All outcomes in reporting order.
    pub const ALL: [Outcome; 6] = [
        Self::NewFromUpstream,
        Self::TemplateOnly,
        Self::MergedClean,
        Self::Conflict,
        Self::LocalOnly,
        Self::Unchanged,
    ];

    /// Check if outcome requires writing the file.
    pub fn needs_write(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// Check if outcome brings upstream content into the target.
    pub fn adopts_upstream(&self) -> bool {
        !matches!(self, Self::Unchanged | Self::LocalOnly)
    }

    /// Short tag for per-file log lines.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Unchanged => "[SKIP]",
            Self::TemplateOnly => "[UPDATE]",
            Self::LocalOnly => "[KEEP]",
            Self::MergedClean => "[MERGE]",
            Self::Conflict => "[CONFLICT]",
            Self::NewFromUpstream => "[ADD]",
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Unchanged => "unchanged",
            Self::TemplateOnly => "template-only",
            Self::LocalOnly => "local-only",
            Self::MergedClean => "merged-clean",
            Self::Conflict => "conflict",
            Self::NewFromUpstream => "new-from-upstream",
        };
        fmt.write_str(name)
    }
}

/// Reconciled file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// How the file was reconciled.
    pub outcome: Outcome,

    /// Content the file should have afterwards.
    pub content: String,
}

impl Resolution {
    fn new(outcome: Outcome, content: impl Into<String>) -> Self {
        Self {
            outcome,
            content: content.into(),
        }
    }
}

/// Reconcile one file.
///
/// Decides between the outcomes in priority order:
///
/// 1. No local copy: take upstream.
/// 2. Local copy equals upstream: nothing to do.
/// 3. Upstream equals base: keep local copy verbatim.
/// 4. Local copy equals base: take upstream.
/// 5. Otherwise run a line merge, with an empty base if none exists.
///
/// A local copy that was deleted while upstream still has the file comes back
/// through rule 1, even if the template never touched it since the last sync.
pub fn resolve(
    base: Option<&str>,
    upstream: &str,
    local: Option<&str>,
    style: ConflictStyle,
) -> Resolution {
    let Some(local) = local else {
        return Resolution::new(Outcome::NewFromUpstream, upstream);
    };

    if local == upstream {
        return Resolution::new(Outcome::Unchanged, upstream);
    }

    if base == Some(upstream) {
        return Resolution::new(Outcome::LocalOnly, local);
    }

    if base == Some(local) {
        return Resolution::new(Outcome::TemplateOnly, upstream);
    }

    let merged = merge3(local, base.unwrap_or_default(), upstream, style);
    if merged.conflicts == 0 {
        Resolution::new(Outcome::MergedClean, merged.content)
    } else {
        Resolution::new(Outcome::Conflict, merged.content)
    }
}

/// Result of a line merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    /// Merged content, possibly with conflict markers.
    pub content: String,

    /// Number of conflict hunks written.
    pub conflicts: usize,
}

/// Line-based three-way merge of `local` and `upstream` against `base`.
pub fn merge3(local: &str, base: &str, upstream: &str, style: ConflictStyle) -> Merged {
    let local = split_lines(local);
    let base = split_lines(base);
    let upstream = split_lines(upstream);

    let mut out = Output::new(style);
    for region in merge_regions(&local, &base, &upstream) {
        match region {
            Region::Unchanged(range) => out.lines(&base[range]),
            Region::Local(range) => out.lines(&local[range]),
            Region::Upstream(range) => out.lines(&upstream[range]),
            Region::Conflict {
                local: l,
                base: b,
                upstream: u,
            } => out.conflict(&local[l], &base[b], &upstream[u]),
        }
    }

    Merged {
        content: out.content,
        conflicts: out.conflicts,
    }
}

fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Region {
    /// Lines all three versions agree on, indexing base.
    Unchanged(Range<usize>),

    /// Lines taken from local.
    Local(Range<usize>),

    /// Lines taken from upstream.
    Upstream(Range<usize>),

    /// Lines both sides changed differently.
    Conflict {
        local: Range<usize>,
        base: Range<usize>,
        upstream: Range<usize>,
    },
}

/// Stretch of lines that is identical in all three versions.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SyncRegion {
    base: Range<usize>,
    local: Range<usize>,
    upstream: Range<usize>,
}

/// Matching run between base and one side: base start, side start, length.
type Block = (usize, usize, usize);

fn matching_blocks(base: &[&str], side: &[&str]) -> Vec<Block> {
    capture_diff_slices(Algorithm::Myers, base, side)
        .into_iter()
        .filter_map(|op| match op {
            DiffOp::Equal {
                old_index,
                new_index,
                len,
            } => Some((old_index, new_index, len)),
            _ => None,
        })
        .collect()
}

fn sync_regions(local: &[&str], base: &[&str], upstream: &[&str]) -> Vec<SyncRegion> {
    let local_blocks = matching_blocks(base, local);
    let upstream_blocks = matching_blocks(base, upstream);

    let mut regions = Vec::new();
    let (mut il, mut iu) = (0, 0);
    while il < local_blocks.len() && iu < upstream_blocks.len() {
        let (l_base, l_side, l_len) = local_blocks[il];
        let (u_base, u_side, u_len) = upstream_blocks[iu];

        // INVARIANT: Only the overlap of both matching runs is stable.
        let start = l_base.max(u_base);
        let end = (l_base + l_len).min(u_base + u_len);
        if start < end {
            let len = end - start;
            let local_start = l_side + (start - l_base);
            let upstream_start = u_side + (start - u_base);
            regions.push(SyncRegion {
                base: start..end,
                local: local_start..local_start + len,
                upstream: upstream_start..upstream_start + len,
            });
        }

        if l_base + l_len < u_base + u_len {
            il += 1;
        } else {
            iu += 1;
        }
    }

    // INVARIANT: Sentinel region flushes whatever trails the last match.
    regions.push(SyncRegion {
        base: base.len()..base.len(),
        local: local.len()..local.len(),
        upstream: upstream.len()..upstream.len(),
    });

    regions
}

fn merge_regions(local: &[&str], base: &[&str], upstream: &[&str]) -> Vec<Region> {
    let mut regions = Vec::new();
    let (mut ib, mut il, mut iu) = (0, 0, 0);

    for sync in sync_regions(local, base, upstream) {
        let changed_local = il..sync.local.start;
        let changed_base = ib..sync.base.start;
        let changed_upstream = iu..sync.upstream.start;

        // INVARIANT: Both sides deleting the same lines leaves nothing behind.
        if !changed_local.is_empty() || !changed_upstream.is_empty() {
            let l = &local[changed_local.clone()];
            let b = &base[changed_base.clone()];
            let u = &upstream[changed_upstream.clone()];

            if l == u || u == b {
                regions.push(Region::Local(changed_local));
            } else if l == b {
                regions.push(Region::Upstream(changed_upstream));
            } else {
                regions.push(Region::Conflict {
                    local: changed_local,
                    base: changed_base,
                    upstream: changed_upstream,
                });
            }
        }

        if !sync.base.is_empty() {
            regions.push(Region::Unchanged(sync.base.clone()));
        }

        ib = sync.base.end;
        il = sync.local.end;
        iu = sync.upstream.end;
    }

    regions
}

/// Merged content under construction.
struct Output {
    style: ConflictStyle,
    content: String,
    conflicts: usize,
}

impl Output {
    fn new(style: ConflictStyle) -> Self {
        Self {
            style,
            content: String::new(),
            conflicts: 0,
        }
    }

    fn lines(&mut self, lines: &[&str]) {
        for line in lines {
            self.content.push_str(line);
        }
    }

    fn conflict(&mut self, local: &[&str], base: &[&str], upstream: &[&str]) {
        if self.style == ConflictStyle::Diff3 {
            self.hunk(local, Some(base), upstream);
            return;
        }

        // Refine by diffing both sides, keeping shared lines out of markers.
        let (mut pending_local, mut pending_upstream) = (0..0, 0..0);
        for op in capture_diff_slices(Algorithm::Myers, local, upstream) {
            match op {
                DiffOp::Equal {
                    old_index,
                    new_index,
                    len,
                } => {
                    self.flush(local, upstream, &mut pending_local, &mut pending_upstream);
                    self.lines(&local[old_index..old_index + len]);
                    pending_local = old_index + len..old_index + len;
                    pending_upstream = new_index + len..new_index + len;
                }
                DiffOp::Delete {
                    old_index, old_len, ..
                } => pending_local.end = old_index + old_len,
                DiffOp::Insert {
                    new_index, new_len, ..
                } => pending_upstream.end = new_index + new_len,
                DiffOp::Replace {
                    old_index,
                    old_len,
                    new_index,
                    new_len,
                } => {
                    pending_local.end = old_index + old_len;
                    pending_upstream.end = new_index + new_len;
                }
            }
        }
        self.flush(local, upstream, &mut pending_local, &mut pending_upstream);
    }

    fn flush(
        &mut self,
        local: &[&str],
        upstream: &[&str],
        pending_local: &mut Range<usize>,
        pending_upstream: &mut Range<usize>,
    ) {
        if pending_local.is_empty() && pending_upstream.is_empty() {
            return;
        }

        self.hunk(
            &local[pending_local.clone()],
            None,
            &upstream[pending_upstream.clone()],
        );
        pending_local.start = pending_local.end;
        pending_upstream.start = pending_upstream.end;
    }

    fn hunk(&mut self, local: &[&str], base: Option<&[&str]>, upstream: &[&str]) {
        self.marker(MARKER_LOCAL);
        self.side(local);
        if let Some(base) = base {
            self.marker(MARKER_BASE);
            self.side(base);
        }
        self.marker(MARKER_SEPARATOR);
        self.side(upstream);
        self.marker(MARKER_UPSTREAM);
        self.conflicts += 1;
    }

    fn marker(&mut self, marker: &str) {
        self.content.push_str(marker);
        self.content.push('\n');
    }

    // INVARIANT: Markers always start on a fresh line.
    fn side(&mut self, lines: &[&str]) {
        self.lines(lines);
        if !self.content.is_empty() && !self.content.ends_with('\n') {
            self.content.push('\n');
        }
    }
}
