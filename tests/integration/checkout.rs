// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::RepoFixture;

use anyhow::Result;
use git2::{BranchType, Repository};
use graft::checkout::{switch_branch, Switch};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::fs::{read_to_string, write};

fn head_branch(repo: &Repository) -> Result<String> {
    Ok(repo.head()?.shorthand().unwrap_or_default().to_string())
}

#[sealed_test]
fn missing_target_branch_is_created_from_head() -> Result<()> {
    let target = RepoFixture::new(std::env::current_dir()?.join("target"))?;
    let head = target.stage_and_commit("readme.txt", "hello\n")?;

    let result = switch_branch(target.path(), "graft/update")?;

    let repo = Repository::open(target.path())?;
    assert_eq!(result, Switch::Created);
    assert_eq!(head_branch(&repo)?, "graft/update");
    assert_eq!(repo.head()?.target(), Some(head));
    assert!(repo.find_branch("main", BranchType::Local).is_ok());

    Ok(())
}

#[sealed_test]
fn existing_target_branch_is_checked_out() -> Result<()> {
    let target = RepoFixture::new(std::env::current_dir()?.join("target"))?;
    let review = target.stage_and_commit("config.ini", "one\n")?;
    {
        let repo = Repository::open(target.path())?;
        repo.branch("review", &repo.find_commit(review)?, false)?;
    }
    target.stage_and_commit("config.ini", "two\n")?;
    write(target.path().join("config.ini"), "two\n")?;

    let result = switch_branch(target.path(), "review")?;

    let repo = Repository::open(target.path())?;
    assert_eq!(result, Switch::CheckedOut);
    assert_eq!(head_branch(&repo)?, "review");
    assert_eq!(repo.head()?.target(), Some(review));
    assert_eq!(read_to_string(target.path().join("config.ini"))?, "one\n");

    Ok(())
}

#[sealed_test]
fn switching_twice_reuses_branch() -> Result<()> {
    let target = RepoFixture::new(std::env::current_dir()?.join("target"))?;
    target.stage_and_commit("readme.txt", "hello\n")?;

    assert_eq!(switch_branch(target.path(), "graft/update")?, Switch::Created);
    assert_eq!(switch_branch(target.path(), "main")?, Switch::CheckedOut);
    assert_eq!(
        switch_branch(target.path(), "graft/update")?,
        Switch::CheckedOut
    );

    Ok(())
}
