// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::RepoFixture;

use anyhow::Result;
use graft::snapshot::{
    git::Git2Provider, rules::PathRules, CommitId, Revision, Snapshot, SnapshotError,
    SnapshotProvider,
};
use indicatif::ProgressBar;
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;

fn branch() -> Revision {
    Revision::Branch("main".into())
}

#[sealed_test]
fn reserved_paths_never_appear_in_snapshot() -> Result<()> {
    let upstream = RepoFixture::new(std::env::current_dir()?.join("upstream"))?;
    upstream.stage_and_commit(".graft/template.toml", "template-repository = \"x\"\n")?;
    upstream.stage_and_commit(".graft/template.lock", "abc\n")?;
    upstream.stage_and_commit(".graft/history", "a.txt\n")?;
    upstream.stage_and_commit("Makefile", "all:\n")?;

    let provider = Git2Provider::fetch(&upstream.url(), "main", ProgressBar::hidden())?;
    let rules = PathRules::new([".graft", "Makefile"], Vec::<String>::new())?;

    let result = provider.snapshot(&branch(), &rules)?;
    assert_eq!(result, Snapshot::from_iter([("Makefile", "all:\n")]));
    assert_eq!(result, provider.snapshot(&branch(), &rules)?);

    Ok(())
}

#[sealed_test]
fn directories_expand_into_files() -> Result<()> {
    let upstream = RepoFixture::new(std::env::current_dir()?.join("upstream"))?;
    upstream.stage_and_commit(".github/workflows/ci.yml", "on: push\n")?;
    upstream.stage_and_commit(".github/CODEOWNERS", "* @acme\n")?;
    upstream.stage_and_commit("src/lib.rs", "\n")?;

    let provider = Git2Provider::fetch(&upstream.url(), "main", ProgressBar::hidden())?;
    let rules = PathRules::new([".github"], [".github/CODEOWNERS"])?;

    let result = provider.snapshot(&branch(), &rules)?;
    assert_eq!(
        result,
        Snapshot::from_iter([(".github/workflows/ci.yml", "on: push\n")])
    );

    Ok(())
}

#[sealed_test]
fn symlinks_resolve_to_target_content() -> Result<()> {
    let upstream = RepoFixture::new(std::env::current_dir()?.join("upstream"))?;
    upstream.stage_and_commit("shared/ci.yml", "shared\n")?;
    upstream.link_and_commit("configs/ci.yml", "../shared/ci.yml")?;
    upstream.link_and_commit("docs", "shared")?;
    upstream.link_and_commit("broken", "missing/file")?;
    upstream.link_and_commit("escape", "../../etc/passwd")?;

    let provider = Git2Provider::fetch(&upstream.url(), "main", ProgressBar::hidden())?;

    let result = provider.snapshot(&branch(), &PathRules::all())?;
    assert_eq!(
        result,
        Snapshot::from_iter([
            ("configs/ci.yml", "shared\n"),
            ("docs/ci.yml", "shared\n"),
            ("shared/ci.yml", "shared\n"),
        ])
    );

    Ok(())
}

#[sealed_test]
fn base_snapshot_of_older_commit() -> Result<()> {
    let upstream = RepoFixture::new(std::env::current_dir()?.join("upstream"))?;
    let first = upstream.stage_and_commit("a.txt", "one\n")?;
    let second = upstream.stage_and_commit("a.txt", "two\n")?;

    let provider = Git2Provider::fetch(&upstream.url(), "main", ProgressBar::hidden())?;
    assert_eq!(provider.head()?, CommitId::new(second.to_string()));

    let base = Revision::Commit(CommitId::new(first.to_string()));
    let result = provider.snapshot(&base, &PathRules::all())?;
    assert_eq!(result, Snapshot::from_iter([("a.txt", "one\n")]));

    Ok(())
}

#[sealed_test]
fn unknown_base_commit_is_unavailable() -> Result<()> {
    let upstream = RepoFixture::new(std::env::current_dir()?.join("upstream"))?;
    upstream.stage_and_commit("a.txt", "one\n")?;

    let provider = Git2Provider::fetch(&upstream.url(), "main", ProgressBar::hidden())?;
    let base = Revision::Commit(CommitId::new("0123456789abcdef0123456789abcdef01234567"));

    let result = provider.snapshot(&base, &PathRules::all());
    assert!(matches!(result, Err(SnapshotError::BaseUnavailable { .. })));

    Ok(())
}

#[sealed_test]
fn unknown_branch_fails_to_fetch() -> Result<()> {
    let upstream = RepoFixture::new(std::env::current_dir()?.join("upstream"))?;
    upstream.stage_and_commit("a.txt", "one\n")?;

    let result = Git2Provider::fetch(&upstream.url(), "no-such-branch", ProgressBar::hidden());
    assert!(matches!(result, Err(SnapshotError::Clone { .. })));

    Ok(())
}
