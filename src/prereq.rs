// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Environment checks.
//!
//! Every workflow verifies its environment before doing anything destructive:
//! the tools it drives must be on `PATH`, and the home directory must be
//! writable. A failed check stops the run before a single file is written.

use crate::{
    package::{PackageError, PackageInstaller},
    path::which,
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// External tool a workflow depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    name: &'static str,
    binaries: &'static [&'static str],
    package: &'static str,
}

impl Requirement {
    /// Construct new requirement met by any of the listed binaries.
    pub const fn new(
        name: &'static str,
        binaries: &'static [&'static str],
        package: &'static str,
    ) -> Self {
        Self {
            name,
            binaries,
            package,
        }
    }

    /// Downloader: curl or wget.
    pub const fn downloader() -> Self {
        Self::new("curl or wget", &["curl", "wget"], "curl")
    }

    pub const fn git() -> Self {
        Self::new("git", &["git"], "git")
    }

    /// C compiler, make, and tar needed to build from source.
    pub const fn toolchain() -> [Self; 3] {
        [
            Self::new("C compiler", &["cc", "gcc", "clang"], "gcc"),
            Self::new("make", &["make"], "make"),
            Self::new("tar", &["tar"], "tar"),
        ]
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn package(&self) -> &str {
        self.package
    }

    /// Locate first binary meeting requirement.
    pub fn locate(&self) -> Option<PathBuf> {
        self.binaries.iter().find_map(which)
    }

    pub fn is_met(&self) -> bool {
        self.locate().is_some()
    }
}

impl Display for Requirement {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.name)
    }
}

/// List requirements that are not met.
pub fn missing(requirements: &[Requirement]) -> Vec<Requirement> {
    requirements
        .iter()
        .filter(|requirement| !requirement.is_met())
        .cloned()
        .collect()
}

/// Ensure every requirement is met.
///
/// Missing requirements are handed to the package installer when one is
/// given. Without an installer, any missing requirement is fatal.
///
/// # Errors
///
/// - Return [`PrereqError::Missing`] listing everything that is missing.
/// - Return [`PrereqError::Install`] if the package installer fails.
#[instrument(skip(installer), level = "debug")]
pub async fn ensure(
    requirements: &[Requirement],
    installer: Option<&impl PackageInstaller>,
) -> Result<()> {
    let absent = missing(requirements);
    if absent.is_empty() {
        debug!("all requirements met");
        return Ok(());
    }

    let Some(installer) = installer else {
        return Err(PrereqError::Missing(Missing(absent)));
    };

    for requirement in &absent {
        warn!("{requirement} is missing, installing {}", requirement.package());
        installer.install(requirement.package()).await?;
    }

    let still_absent = missing(&absent);
    if !still_absent.is_empty() {
        return Err(PrereqError::Missing(Missing(still_absent)));
    }

    info!("installed {} missing prerequisites", absent.len());
    Ok(())
}

/// Ensure target directory is writable.
///
/// # Errors
///
/// - Return [`PrereqError::NotWritable`] if no file can be created inside.
#[instrument(level = "debug")]
pub fn ensure_writable(dir: &Path) -> Result<()> {
    tempfile::tempfile_in(dir)
        .map(drop)
        .map_err(|err| PrereqError::NotWritable {
            source: err,
            path: dir.to_path_buf(),
        })
}

/// Listing of unmet requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Missing(pub Vec<Requirement>);

impl Display for Missing {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let names = self.0.iter().map(Requirement::name).collect::<Vec<_>>();
        fmt.write_str(names.join(", ").as_str())
    }
}

/// Environment check error types.
#[derive(Debug, thiserror::Error)]
pub enum PrereqError {
    /// Required tools absent from `PATH`.
    #[error("missing required tools: {0} (rerun with --install-missing to install them)")]
    Missing(Missing),

    /// Directory cannot be written to.
    #[error("cannot write to {:?}", path.display())]
    NotWritable {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Package installer failed.
    #[error(transparent)]
    Install(#[from] PackageError),
}

/// Friendly result alias :3
pub type Result<T, E = PrereqError> = std::result::Result<T, E>;
