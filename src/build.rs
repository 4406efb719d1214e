// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Source build pipeline.
//!
//! Build packages from source into a user-local prefix. Every recipe goes
//! through the same linear sequence of stages:
//!
//! 1. Resolve version, either pinned or the newest published tag.
//! 2. Verify build toolchain is present.
//! 3. Download release archive.
//! 4. Extract archive.
//! 5. Configure with the recipe's fixed flags.
//! 6. Compile with one job per detected core.
//! 7. Install into the prefix.
//!
//! Once every recipe is installed, the prefix's binary directory gets
//! prepended to `PATH` through the shell resource file.
//!
//! # Cleanup
//!
//! All build artifacts live in a scratch directory owned by a scoped guard.
//! The guard removes the directory when dropped, which happens on every exit
//! path: success, failure at any stage, or cancellation of the pipeline
//! future itself (e.g., on interrupt). Child processes are killed along with
//! the future. A partially installed prefix is left as is.
//!
//! Failure at any stage is fatal. There is no retry, and no rollback.

pub mod recipe;

use crate::{
    build::recipe::{Recipe, VersionSpec},
    fetch::{FetchError, Fetcher},
    prereq::{missing, Missing, Requirement},
    prompt,
    rcfile::{BlockOutcome, ConfigBlock, RcError, RcFile, RcPolicy},
    syscall::{Syscall, SyscallError},
};

use serde::Deserialize;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    thread::available_parallelism,
};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

/// Pipeline stage, reported on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolveVersion,
    Toolchain,
    Download,
    Extract,
    Configure,
    Compile,
    Install,
    PathUpdate,
}

impl Display for Stage {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::ResolveVersion => "version resolution",
            Self::Toolchain => "toolchain check",
            Self::Download => "download",
            Self::Extract => "extraction",
            Self::Configure => "configure",
            Self::Compile => "compile",
            Self::Install => "install",
            Self::PathUpdate => "PATH update",
        })
    }
}

/// Scoped scratch directory for build artifacts.
///
/// Removed unconditionally when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    dir: Option<TempDir>,
}

impl ScratchDir {
    /// Create new scratch directory, inside `root` if given.
    ///
    /// # Errors
    ///
    /// - Return [`std::io::Error`] if directory cannot be created.
    pub fn new(root: Option<&Path>) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("dotsmith-build-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        debug!("created build directory {:?}", dir.path().display());

        Ok(Self { dir: Some(dir) })
    }

    pub fn path(&self) -> &Path {
        self.dir
            .as_ref()
            .map(TempDir::path)
            .unwrap_or_else(|| Path::new(""))
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!("removed build directory {:?}", path.display()),
                Err(err) => warn!("failed to remove build directory {:?}: {err}", path.display()),
            }
        }
    }
}

/// Package installed by a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installed {
    pub name: String,
    pub version: String,
}

/// Results of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub installed: Vec<Installed>,
    pub path_block: BlockOutcome,
}

/// Source build pipeline.
#[derive(Debug)]
pub struct BuildPipeline<'f, F>
where
    F: Fetcher,
{
    fetcher: &'f F,
    prefix: PathBuf,
    jobs: usize,
    toolchain: Vec<Requirement>,
    scratch_root: Option<PathBuf>,
}

impl<'f, F> BuildPipeline<'f, F>
where
    F: Fetcher,
{
    /// Construct new pipeline installing into `prefix`.
    pub fn new(fetcher: &'f F, prefix: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            prefix: prefix.into(),
            jobs: available_parallelism().map(NonZeroUsize::get).unwrap_or(1),
            toolchain: Requirement::toolchain().to_vec(),
            scratch_root: None,
        }
    }

    /// Override number of parallel compile jobs.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Override tools verified before building.
    pub fn with_toolchain(mut self, toolchain: impl IntoIterator<Item = Requirement>) -> Self {
        self.toolchain = toolchain.into_iter().collect();
        self
    }

    /// Place scratch directory inside `root` instead of the system default.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Run every recipe in order, then put prefix on `PATH` through `rc`.
    ///
    /// # Errors
    ///
    /// - Return [`BuildError::Stage`] naming the stage and package that
    ///   failed.
    /// - Return [`BuildError::Scratch`] if scratch directory cannot be made.
    #[instrument(skip(self, recipes, rc), level = "debug")]
    pub async fn run(&self, recipes: &[Recipe], rc: &RcFile) -> Result<BuildReport> {
        let mut resolved = Vec::with_capacity(recipes.len());
        for recipe in recipes {
            let version = resolve_version(self.fetcher, recipe)
                .await
                .map_err(|err| stage_error(Stage::ResolveVersion, recipe.name(), err))?;
            info!("building {} {version}", recipe.name());
            resolved.push((recipe, version));
        }

        let absent = missing(&self.toolchain);
        if !absent.is_empty() {
            return Err(stage_error(
                Stage::Toolchain,
                "toolchain",
                StageError::Missing(Missing(absent)),
            ));
        }

        let scratch = ScratchDir::new(self.scratch_root.as_deref()).map_err(BuildError::Scratch)?;
        let mut installed = Vec::with_capacity(resolved.len());
        for (recipe, version) in resolved {
            self.build_one(&scratch, recipe, &version).await?;
            installed.push(Installed {
                name: recipe.name().to_owned(),
                version,
            });
        }

        let block = ConfigBlock::path_entry(&self.prefix);
        let mut never_asked = |_: &str| -> prompt::Result<bool> { Ok(true) };
        let path_block = rc
            .ensure_block(&block, RcPolicy::Create, true, &mut never_asked)
            .map_err(|err| stage_error(Stage::PathUpdate, "path", err))?;

        Ok(BuildReport {
            installed,
            path_block,
        })
    }

    #[instrument(skip(self, scratch, recipe), fields(name = recipe.name()), level = "debug")]
    async fn build_one(&self, scratch: &ScratchDir, recipe: &Recipe, version: &str) -> Result<()> {
        let name = recipe.name();
        let fail = |stage: Stage| move |err: SyscallError| stage_error(stage, name, err);

        let url = recipe.archive_url(version);
        let archive = scratch.path().join(format!("{name}.tar.gz"));
        self.fetcher
            .fetch(&url, &archive)
            .await
            .map_err(|err| stage_error(Stage::Download, name, err))?;

        Syscall::new("tar")
            .arg("-xzf")
            .arg(&archive)
            .arg("-C")
            .arg(scratch.path())
            .run_with_spinner(format!("extracting {name} {version}"))
            .await
            .map_err(fail(Stage::Extract))?;
        let source = source_dir(scratch.path(), name)
            .map_err(|err| stage_error(Stage::Extract, name, err))?;

        let mut configure = Syscall::new(source.join("configure"))
            .args(recipe.configure())
            .current_dir(&source);
        for (key, value) in recipe.envs() {
            configure = configure.env(key, value);
        }
        configure
            .run_with_spinner(format!("configuring {name} {version}"))
            .await
            .map_err(fail(Stage::Configure))?;

        Syscall::new("make")
            .arg(format!("-j{}", self.jobs))
            .current_dir(&source)
            .run_with_spinner(format!("compiling {name} {version} with {} jobs", self.jobs))
            .await
            .map_err(fail(Stage::Compile))?;

        mkdirp::mkdirp(&self.prefix).map_err(|err| stage_error(Stage::Install, name, err))?;
        Syscall::new("make")
            .arg("install")
            .current_dir(&source)
            .run_with_spinner(format!("installing {name} {version}"))
            .await
            .map_err(fail(Stage::Install))?;

        info!("installed {name} {version} into {:?}", self.prefix.display());
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

/// Resolve version of recipe to build.
///
/// Pinned versions resolve to themselves. The latest version is the first
/// entry of the recipe's tag listing, which is expected in the JSON shape of
/// the GitHub tags API.
///
/// # Errors
///
/// - Return [`StageError::NoTagListing`] if recipe cannot resolve latest.
/// - Return [`StageError::Fetch`] if tag listing cannot be retrieved.
/// - Return [`StageError::Tags`] if tag listing cannot be parsed.
pub async fn resolve_version(
    fetcher: &impl Fetcher,
    recipe: &Recipe,
) -> std::result::Result<String, StageError> {
    let url = match recipe.version() {
        VersionSpec::Pinned(version) => return Ok(version.clone()),
        VersionSpec::Latest => recipe.tags().ok_or(StageError::NoTagListing)?,
    };

    let listing = tempfile::NamedTempFile::new().map_err(|err| FetchError::Store {
        source: err,
        url: url.to_owned(),
    })?;
    fetcher.fetch(url, listing.path()).await?;
    let data = read_to_string(listing.path()).map_err(|err| FetchError::Store {
        source: err,
        url: url.to_owned(),
    })?;

    let tags: Vec<Tag> = serde_json::from_str(&data)?;
    let latest = tags.into_iter().next().ok_or(StageError::NoTags)?;
    debug!("latest {} tag is {}", recipe.name(), latest.name);

    Ok(latest.name)
}

fn source_dir(scratch: &Path, name: &str) -> std::result::Result<PathBuf, StageError> {
    let pattern = format!(
        "{}/{}-*",
        glob::Pattern::escape(scratch.to_string_lossy().as_ref()),
        glob::Pattern::escape(name)
    );
    let mut dirs = glob::glob(&pattern)?
        .filter_map(std::result::Result::ok)
        .filter(|path| path.is_dir())
        .collect::<Vec<_>>();

    match dirs.len() {
        1 => Ok(dirs.remove(0)),
        count => Err(StageError::SourceDir { count }),
    }
}

fn stage_error(stage: Stage, package: &str, source: impl Into<StageError>) -> BuildError {
    BuildError::Stage {
        stage,
        package: package.to_owned(),
        source: source.into(),
    }
}

/// Underlying cause of a failed stage.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Syscall(#[from] SyscallError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed tag listing")]
    Tags(#[from] serde_json::Error),

    #[error("tag listing is empty")]
    NoTags,

    #[error("no tag listing to resolve latest version from, pin a version instead")]
    NoTagListing,

    #[error("missing build tools: {0}")]
    Missing(Missing),

    #[error(transparent)]
    Glob(#[from] glob::PatternError),

    #[error("expected one extracted source directory, found {count}")]
    SourceDir { count: usize },

    #[error(transparent)]
    Rc(#[from] RcError),
}

/// Source build error types.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Stage of pipeline failed.
    #[error("{stage} of {package} failed")]
    Stage {
        stage: Stage,
        package: String,
        #[source]
        source: StageError,
    },

    /// Scratch directory cannot be created.
    #[error("failed to create build directory")]
    Scratch(#[source] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = BuildError> = std::result::Result<T, E>;
