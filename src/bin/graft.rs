// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use graft::{
    checkout::switch_branch,
    config::{ConfigError, DEFAULT_BRANCH},
    merge::{MARKER_LOCAL, MARKER_SEPARATOR, MARKER_UPSTREAM},
    path::CONFIG_FILE,
    ConflictStyle, Git2Provider, LocalWorkspace, PathScope, Strategy, SyncOptions, SyncReport,
    Syncer, TemplateConfig, TemplateSource, Workspace,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use std::{
    env::current_dir,
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "graft [options] <graft-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        match self.command {
            Command::Sync(opts) => run_sync(opts).await,
            Command::Materialize(opts) => run_materialize(opts).await,
            Command::Init(opts) => run_init(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Sync template changes into target repository.
    #[command(override_usage = "graft sync [options] [target]")]
    Sync(SyncCliOptions),

    /// Copy template files into target repository.
    #[command(override_usage = "graft materialize [options] [target]")]
    Materialize(MaterializeOptions),

    /// Create or validate template configuration.
    #[command(override_usage = "graft init [options] [target]")]
    Init(InitOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncCliOptions {
    /// Path to target repository, current directory by default.
    #[arg(value_name = "target")]
    pub target: Option<PathBuf>,

    /// How to reconcile template files with target.
    #[arg(short, long, value_enum, default_value_t = Strategy::Merge)]
    pub strategy: Strategy,

    /// Template branch to use instead of the configured one.
    #[arg(short, long, value_name = "branch")]
    pub branch: Option<String>,

    /// Branch of target repository to check out, or create from HEAD, first.
    #[arg(long, value_name = "branch")]
    pub target_branch: Option<String>,

    /// Only sync files at or under path, or matching glob.
    #[arg(short, long = "path", value_name = "path")]
    pub paths: Vec<String>,

    /// Layout of conflict hunks.
    #[arg(long, value_enum, default_value_t = ConflictStyle::Merge)]
    pub conflict_style: ConflictStyle,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct MaterializeOptions {
    /// Path to target repository, current directory by default.
    #[arg(value_name = "target")]
    pub target: Option<PathBuf>,

    /// Template branch to use instead of the configured one.
    #[arg(short, long, value_name = "branch")]
    pub branch: Option<String>,

    /// Branch of target repository to check out, or create from HEAD, first.
    #[arg(long, value_name = "branch")]
    pub target_branch: Option<String>,

    /// Replace files that already exist but differ from template.
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Path to target repository, current directory by default.
    #[arg(value_name = "target")]
    pub target: Option<PathBuf>,

    /// Template repository as owner/name, URL, or local path.
    #[arg(short, long, value_name = "repository")]
    pub repository: Option<String>,

    /// Template branch to track.
    #[arg(short, long, value_name = "branch")]
    pub branch: Option<String>,

    /// Template paths to manage.
    #[arg(short, long, value_name = "path")]
    pub include: Vec<String>,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

async fn run_sync(opts: SyncCliOptions) -> Result<()> {
    let target = target_dir(opts.target)?;
    if let Some(name) = &opts.target_branch {
        switch_branch(&target, name)?;
    }
    let source = load_source(&target, opts.branch)?;
    let scope = if opts.paths.is_empty() {
        None
    } else {
        Some(PathScope::new(&opts.paths)?)
    };
    let options = SyncOptions {
        strategy: opts.strategy,
        scope,
        conflict_style: opts.conflict_style,
    };

    let report = interruptible(move || {
        let provider = Git2Provider::fetch(&source.url, &source.branch, ProgressBar::new_spinner())?;
        let workspace = LocalWorkspace::new(target);
        Ok(Syncer::new(&provider, &workspace, &source, options)?.run()?)
    })
    .await?;

    print_report(&report)
}

async fn run_materialize(opts: MaterializeOptions) -> Result<()> {
    let target = target_dir(opts.target)?;
    if let Some(name) = &opts.target_branch {
        switch_branch(&target, name)?;
    }
    let source = load_source(&target, opts.branch)?;

    let report = interruptible(move || {
        let provider = Git2Provider::fetch(&source.url, &source.branch, ProgressBar::new_spinner())?;
        let workspace = LocalWorkspace::new(target);
        Ok(Syncer::new(&provider, &workspace, &source, SyncOptions::default())?
            .materialize(opts.force)?)
    })
    .await?;

    print_report(&report)
}

fn run_init(opts: InitOptions) -> Result<()> {
    let target = target_dir(opts.target)?;
    match TemplateConfig::load(&target) {
        Ok(config) => {
            let source = config.validate(DEFAULT_BRANCH)?;
            info!(
                "{CONFIG_FILE} is valid, tracking {} ({})",
                source.repository, source.branch
            );
            return Ok(());
        }
        Err(ConfigError::Missing { .. }) => {}
        Err(err) => return Err(err.into()),
    }

    let config = TemplateConfig {
        repository: Some(
            opts.repository
                .unwrap_or_else(|| "<put template repository here>".into()),
        ),
        branch: Some(opts.branch.unwrap_or_else(|| DEFAULT_BRANCH.into())),
        include: if opts.include.is_empty() {
            vec![".github".into()]
        } else {
            opts.include
        },
        ..Default::default()
    };

    let workspace = LocalWorkspace::new(&target);
    workspace.write(CONFIG_FILE, &config.to_string())?;
    info!("created {CONFIG_FILE} in {:?}", target.display());

    Ok(())
}

fn target_dir(target: Option<PathBuf>) -> Result<PathBuf> {
    match target {
        Some(target) => Ok(target),
        None => current_dir().context("cannot determine current directory"),
    }
}

fn load_source(target: &Path, branch: Option<String>) -> Result<TemplateSource> {
    let config = TemplateConfig::load(target)?;
    let mut source = config.validate(DEFAULT_BRANCH)?;
    if let Some(branch) = branch {
        source.branch = branch;
    }

    Ok(source)
}

// INVARIANT: Lock is written last, so an interrupted sync never advances it.
async fn interruptible<T, F>(job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(job);
    tokio::select! {
        result = task => result.context("sync task failed")?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, lock was not advanced, run sync again to finish");
            exit(130);
        }
    }
}

fn print_report(report: &SyncReport) -> Result<()> {
    for diff in report.diffs.values() {
        print!("{diff}");
    }

    for orphan in &report.orphans {
        println!("would delete {orphan}");
    }

    info!("{report}");

    let conflicts = report.conflicts();
    if !conflicts.is_empty() {
        warn!(
            "{} file(s) with conflicts, resolve each {MARKER_LOCAL} / {MARKER_SEPARATOR} / {MARKER_UPSTREAM} region:",
            conflicts.len()
        );
        for conflict in conflicts {
            warn!("  {conflict}");
        }
    }

    if !report.is_success() {
        bail!(
            "failed to sync {} file(s): {}",
            report.failed.len(),
            report.failed.join(", ")
        );
    }

    Ok(())
}
