// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use dotsmith::{
    build::{
        recipe::{Recipe, VersionSpec, NCURSES_VERSION},
        BuildPipeline,
    },
    config::SetupDefinition,
    deploy::{backup::RunStamp, policy::DeployOptions, Deployer},
    fetch::Downloader,
    package::SystemPackageInstaller,
    path::{default_config_file, home_dir},
    prereq::{self, missing, Requirement},
    prompt::{InquireConfirmation, PromptError},
    rcfile::RcFile,
    workflow::{GitSetup, Outcome, VimSetup},
};

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::{io::IsTerminal, path::PathBuf, process::exit};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "dotsmith [options] <command>",
    subcommand_help_heading = "Commands",
    version,
    disable_version_flag = true
)]
struct Cli {
    /// Print version.
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,

    /// Path to configuration file.
    #[arg(long, value_name = "path", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let definition = match &self.config {
            Some(path) => SetupDefinition::load(path, true)?,
            None => SetupDefinition::load(default_config_file()?, false)?,
        };

        match self.command {
            Command::Git(opts) => run_git(definition, opts).await,
            Command::Vim(opts) => run_vim(definition, opts).await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Set up git completion and git-aware shell prompt.
    #[command(override_usage = "dotsmith git [options]")]
    Git(GitOptions),

    /// Set up vim configuration, optionally building vim from source.
    #[command(override_usage = "dotsmith vim [options]")]
    Vim(VimOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct GitOptions {
    /// Overwrite existing files without asking, keeping a backup.
    #[arg(short, long)]
    pub force: bool,

    /// Install missing prerequisites through the system package manager.
    #[arg(long)]
    pub install_missing: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct VimOptions {
    /// Overwrite existing files without asking, keeping a backup.
    #[arg(short, long)]
    pub force: bool,

    /// Install missing prerequisites through the system package manager.
    #[arg(long)]
    pub install_missing: bool,

    /// Build ncurses and vim from source into install prefix.
    #[arg(long)]
    pub build: bool,

    /// Vim tag to build.
    #[arg(long, value_name = "tag|latest", requires = "build")]
    pub vim_version: Option<String>,

    /// Ncurses release to build vim against.
    #[arg(long, value_name = "version", requires = "build")]
    pub ncurses_version: Option<String>,

    /// Install prefix of source build.
    #[arg(long, value_name = "path", requires = "build")]
    pub prefix: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    let cli = Cli::parse();

    // INVARIANT: Workflow future is dropped before exit, so scoped cleanup
    // runs on interrupt too.
    let code = tokio::select! {
        result = cli.run() => match result {
            Ok(()) => 0,
            Err(error) => {
                error!("{error:?}");
                exit_code(&error)
            }
        },
        code = shutdown() => code,
    };

    exit(code)
}

async fn shutdown() -> i32 {
    let (Ok(mut interrupt), Ok(mut terminate)) = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) else {
        warn!("cannot listen for signals");
        return std::future::pending().await;
    };

    tokio::select! {
        _ = interrupt.recv() => {
            warn!("interrupted, cleaning up");
            130
        }
        _ = terminate.recv() => {
            warn!("terminated, cleaning up");
            143
        }
    }
}

fn exit_code(error: &anyhow::Error) -> i32 {
    let interrupted = error
        .chain()
        .any(|cause| matches!(cause.downcast_ref(), Some(PromptError::Interrupted)));

    if interrupted {
        130
    } else {
        1
    }
}

fn deploy_options(force: bool) -> DeployOptions {
    DeployOptions {
        force,
        interactive: std::io::stdin().is_terminal(),
    }
}

async fn prepare(requirements: &[Requirement], install_missing: bool) -> Result<()> {
    let installer = if install_missing && !missing(requirements).is_empty() {
        Some(SystemPackageInstaller::detect()?)
    } else {
        None
    };
    prereq::ensure(requirements, installer.as_ref()).await?;
    prereq::ensure_writable(&home_dir()?)?;

    Ok(())
}

fn report(outcome: Outcome) {
    if let Outcome::Declined { instructions } = outcome {
        println!("{instructions}");
    }
}

async fn run_git(definition: SetupDefinition, opts: GitOptions) -> Result<()> {
    prepare(&[Requirement::downloader(), Requirement::git()], opts.install_missing).await?;

    let fetcher = Downloader::detect()?;
    let setup = GitSetup::from_definition(&definition)?;
    let mut deployer = Deployer::new(
        &fetcher,
        InquireConfirmation::new(),
        deploy_options(opts.force),
        RunStamp::now(),
    );
    report(setup.run(&mut deployer).await?);

    Ok(())
}

async fn run_vim(definition: SetupDefinition, opts: VimOptions) -> Result<()> {
    let mut requirements = vec![Requirement::downloader()];
    if opts.build {
        requirements.extend(Requirement::toolchain());
    }
    prepare(&requirements, opts.install_missing).await?;

    let fetcher = Downloader::detect()?;
    let setup = VimSetup::from_definition(&definition)?;
    let mut deployer = Deployer::new(
        &fetcher,
        InquireConfirmation::new(),
        deploy_options(opts.force),
        RunStamp::now(),
    );
    let outcome = setup.run(&mut deployer).await?;

    if !opts.build {
        report(outcome);
        return Ok(());
    }

    if outcome != Outcome::Completed {
        warn!("vim configuration declined, skipping source build");
        report(outcome);
        return Ok(());
    }

    let prefix = match opts.prefix {
        Some(prefix) => prefix,
        None => definition.settings.prefix()?,
    };
    let vim_version = opts
        .vim_version
        .or(definition.vim.version)
        .unwrap_or_default()
        .parse::<VersionSpec>()
        .unwrap_or_default();
    let ncurses_version = opts
        .ncurses_version
        .or(definition.vim.ncurses_version)
        .unwrap_or_else(|| NCURSES_VERSION.into());
    let recipes = [
        Recipe::ncurses(ncurses_version, &prefix),
        Recipe::vim(vim_version, &prefix),
    ];

    let rc = RcFile::new(definition.settings.rc_file()?);
    let built = BuildPipeline::new(&fetcher, &prefix).run(&recipes, &rc).await?;
    for package in &built.installed {
        info!("{} {} installed", package.name, package.version);
    }
    info!(
        "open a new shell or source {:?} to pick up {:?}",
        rc.path().display(),
        prefix.join("bin").display()
    );

    Ok(())
}
