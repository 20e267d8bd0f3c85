// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::RepoFixture;

use anyhow::Result;
use graft::{
    history, lock, CommitId, Git2Provider, LocalWorkspace, Outcome, Strategy, SyncOptions,
    SyncReport, SyncStatus, Syncer, TemplateSource,
};
use indicatif::ProgressBar;
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{
    fs::{create_dir_all, read_to_string, write},
    path::{Path, PathBuf},
};

struct Setup {
    upstream: RepoFixture,
    target: PathBuf,
    source: TemplateSource,
}

impl Setup {
    fn new() -> Result<Self> {
        let root = std::env::current_dir()?;
        let upstream = RepoFixture::new(root.join("upstream"))?;
        let target = root.join("target");
        create_dir_all(&target)?;
        let source = TemplateSource {
            repository: upstream.url(),
            branch: "main".into(),
            url: upstream.url(),
            include: Vec::new(),
            exclude: vec!["*.bak".into()],
        };

        Ok(Self {
            upstream,
            target,
            source,
        })
    }

    fn sync(&self, strategy: Strategy) -> Result<SyncReport> {
        let provider = Git2Provider::fetch(&self.source.url, "main", ProgressBar::hidden())?;
        let workspace = LocalWorkspace::new(&self.target);
        let options = SyncOptions {
            strategy,
            ..Default::default()
        };

        Ok(Syncer::new(&provider, &workspace, &self.source, options)?.run()?)
    }

    fn file(&self, rel_path: impl AsRef<Path>) -> Result<String> {
        Ok(read_to_string(self.target.join(rel_path))?)
    }
}

#[sealed_test]
fn first_sync_materializes_and_locks() -> Result<()> {
    let setup = Setup::new()?;
    let head = setup.upstream.stage_and_commit("readme.txt", "hello")?;

    let report = setup.sync(Strategy::Merge)?;

    assert_eq!(report.outcomes["readme.txt"], Outcome::NewFromUpstream);
    assert_eq!(setup.file("readme.txt")?, "hello");
    assert_eq!(
        lock::read(&setup.target)?,
        Some(CommitId::new(head.to_string()))
    );

    let report = setup.sync(Strategy::Merge)?;
    assert_eq!(report.status, SyncStatus::UpToDate);

    Ok(())
}

#[sealed_test]
fn upstream_changes_merge_with_local_edits() -> Result<()> {
    let setup = Setup::new()?;
    setup.upstream.stage_and_commit("config.ini", "a\nb\nc\n")?;
    setup.sync(Strategy::Merge)?;

    write(setup.target.join("config.ini"), "A\nb\nc\n")?;
    let head = setup.upstream.stage_and_commit("config.ini", "a\nb\nC\n")?;

    let report = setup.sync(Strategy::Merge)?;
    assert_eq!(report.outcomes["config.ini"], Outcome::MergedClean);
    assert_eq!(setup.file("config.ini")?, "A\nb\nC\n");
    assert_eq!(
        lock::read(&setup.target)?,
        Some(CommitId::new(head.to_string()))
    );

    Ok(())
}

#[sealed_test]
fn rewritten_history_merges_without_base() -> Result<()> {
    let setup = Setup::new()?;
    let head = setup.upstream.stage_and_commit("config.ini", "upstream\n")?;
    lock::write(
        &setup.target,
        &CommitId::new("0123456789abcdef0123456789abcdef01234567"),
    )?;
    write(setup.target.join("config.ini"), "local\n")?;

    let report = setup.sync(Strategy::Merge)?;

    assert_eq!(report.conflicts(), vec!["config.ini"]);
    assert_eq!(
        setup.file("config.ini")?,
        "<<<<<<< local\nlocal\n=======\nupstream\n>>>>>>> upstream\n"
    );
    assert_eq!(
        lock::read(&setup.target)?,
        Some(CommitId::new(head.to_string()))
    );

    Ok(())
}

#[sealed_test]
fn removed_template_files_are_deleted() -> Result<()> {
    let setup = Setup::new()?;
    setup.upstream.stage_and_commit("keep.txt", "keep\n")?;
    setup.upstream.stage_and_commit("drop.txt", "drop\n")?;
    setup.sync(Strategy::Merge)?;
    assert_eq!(setup.file("drop.txt")?, "drop\n");

    setup.upstream.remove_and_commit("drop.txt")?;
    let report = setup.sync(Strategy::Merge)?;

    assert_eq!(report.deleted, vec!["drop.txt".to_string()]);
    assert!(!setup.target.join("drop.txt").exists());
    assert_eq!(
        history::read(&setup.target)?.into_iter().collect::<Vec<_>>(),
        vec!["keep.txt".to_string()]
    );

    Ok(())
}

#[sealed_test]
fn diff_strategy_leaves_target_alone() -> Result<()> {
    let setup = Setup::new()?;
    setup.upstream.stage_and_commit("config.ini", "upstream\n")?;
    write(setup.target.join("config.ini"), "local\n")?;

    let report = setup.sync(Strategy::Diff)?;

    assert!(report.diffs["config.ini"].contains("-local\n+upstream\n"));
    assert_eq!(setup.file("config.ini")?, "local\n");
    assert_eq!(lock::read(&setup.target)?, None);
    assert!(history::read(&setup.target)?.is_empty());

    Ok(())
}

#[sealed_test]
fn overwrite_strategy_discards_local_edits() -> Result<()> {
    let setup = Setup::new()?;
    setup.upstream.stage_and_commit("config.ini", "upstream\n")?;
    setup.upstream.stage_and_commit("notes.bak", "excluded\n")?;
    write(setup.target.join("config.ini"), "local\n")?;

    let report = setup.sync(Strategy::Overwrite)?;

    assert_eq!(report.outcomes["config.ini"], Outcome::TemplateOnly);
    assert_eq!(setup.file("config.ini")?, "upstream\n");
    assert!(!setup.target.join("notes.bak").exists());
    assert!(report.lock_updated);

    Ok(())
}
