// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deployment workflow.
//!
//! A __deployment target__ is a single file dotsmith is responsible for
//! placing on the host: a remote source, and a local destination. Deploying a
//! target follows one fixed sequence:
//!
//! 1. Query whether the destination already exists.
//! 2. Decide what to do about it through the [`policy`].
//! 3. Take a [`backup`] if the decision calls for one.
//! 4. Fetch the source into a staging file next to the destination.
//! 5. Atomically rename the staging file over the destination.
//!
//! Staging guarantees that a failed download never leaves a half-written
//! destination behind, regardless of whether a backup was taken.
//!
//! Several targets can be deployed in one go through
//! [`Deployer::deploy_all`]. A failed download of one target does not stop the
//! remaining targets from being attempted, but failed backups, interrupted
//! prompts, and operator aborts stop the whole run.

pub mod backup;
pub mod policy;

use crate::{
    deploy::{
        backup::{backup_file, BackupError, BackupRecord, RunStamp},
        policy::{decide, Decision, DeployOptions, ExistingFileState},
    },
    fetch::{FetchError, Fetcher},
    prompt::{Confirmation, PromptError},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{error, info, instrument, warn};

/// Kind of file being deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    GitCompletion,
    GitPrompt,
    VimConfig,
}

impl Display for TargetKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::GitCompletion => "git completion",
            Self::GitPrompt => "git prompt",
            Self::VimConfig => "vim configuration",
        })
    }
}

/// Single file to place on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTarget {
    source: String,
    destination: PathBuf,
    kind: TargetKind,
}

impl DeploymentTarget {
    /// Construct new deployment target.
    pub fn new(kind: TargetKind, source: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            kind,
        }
    }

    pub fn source(&self) -> &str {
        self.source.as_str()
    }

    pub fn destination(&self) -> &Path {
        self.destination.as_path()
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }
}

/// Result of deploying one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deployed {
    /// Fresh content now sits at destination.
    Placed { backup: Option<BackupRecord> },

    /// Existing destination was left untouched.
    Skipped,

    /// Operator declined every option.
    Aborted,
}

/// Per-target results of a deployment run.
#[derive(Debug, Default)]
pub struct DeployReport {
    entries: Vec<(DeploymentTarget, Result<Deployed>)>,
}

impl DeployReport {
    pub fn entries(&self) -> &[(DeploymentTarget, Result<Deployed>)] {
        self.entries.as_slice()
    }

    /// Check if the operator aborted the run.
    pub fn is_aborted(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, result)| matches!(result, Ok(Deployed::Aborted)))
    }

    /// Count targets that failed.
    pub fn failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, result)| result.is_err())
            .count()
    }

    /// Backups taken during the run.
    pub fn backups(&self) -> impl Iterator<Item = &BackupRecord> {
        self.entries.iter().filter_map(|(_, result)| match result {
            Ok(Deployed::Placed { backup: Some(record) }) => Some(record),
            _ => None,
        })
    }
}

/// Deployment workflow engine.
///
/// Holds the governing flags, the run stamp, and the injected capabilities
/// explicitly, so nothing is read from ambient state.
#[derive(Debug)]
pub struct Deployer<'f, F, C>
where
    F: Fetcher,
    C: Confirmation,
{
    fetcher: &'f F,
    confirm: C,
    options: DeployOptions,
    stamp: RunStamp,
}

impl<'f, F, C> Deployer<'f, F, C>
where
    F: Fetcher,
    C: Confirmation,
{
    /// Construct new deployer.
    pub fn new(fetcher: &'f F, confirm: C, options: DeployOptions, stamp: RunStamp) -> Self {
        Self {
            fetcher,
            confirm,
            options,
            stamp,
        }
    }

    pub fn options(&self) -> DeployOptions {
        self.options
    }

    /// Hand confirmation capability to follow-up steps of a workflow.
    pub fn confirmation(&mut self) -> &mut C {
        &mut self.confirm
    }

    /// Deploy single target.
    ///
    /// # Errors
    ///
    /// - Return [`DeployError::Prompt`] if confirmation fails.
    /// - Return [`DeployError::Backup`] if the backup cannot be taken. The
    ///   destination is not touched in that case.
    /// - Return [`DeployError::Fetch`] if the source cannot be retrieved or
    ///   put in place. The destination is not touched in that case either.
    #[instrument(skip(self, target), fields(kind = %target.kind()), level = "debug")]
    pub async fn deploy(&mut self, target: &DeploymentTarget) -> Result<Deployed> {
        let state = ExistingFileState::query(target.destination());
        let decision =
            decide(&state, self.options, &mut self.confirm).map_err(DeployError::Prompt)?;

        let backup = match decision {
            Decision::Abort => {
                warn!("declined to replace {:?}", target.destination().display());
                return Ok(Deployed::Aborted);
            }
            Decision::Skip => {
                warn!(
                    "{:?} already exists, rerun with --force to replace it",
                    target.destination().display()
                );
                return Ok(Deployed::Skipped);
            }
            Decision::BackupThenOverwrite => Some(backup_file(target.destination(), &self.stamp)?),
            Decision::OverwriteNoBackup => None,
        };

        info!(
            "deploy {} from {} to {:?}",
            target.kind(),
            target.source(),
            target.destination().display()
        );
        place(self.fetcher, target.source(), target.destination()).await?;

        Ok(Deployed::Placed { backup })
    }

    /// Deploy listing of targets in order.
    ///
    /// Download failures are recorded in the report and do not stop later
    /// targets. An abort stops the run right away.
    ///
    /// # Errors
    ///
    /// - Return [`DeployError::Prompt`] if confirmation fails.
    /// - Return [`DeployError::Backup`] if a backup cannot be taken.
    pub async fn deploy_all(
        &mut self,
        targets: impl IntoIterator<Item = DeploymentTarget>,
    ) -> Result<DeployReport> {
        let mut report = DeployReport::default();
        for target in targets {
            let result = match self.deploy(&target).await {
                Err(err @ DeployError::Fetch(_)) => {
                    error!("{} failed: {err:?}", target.kind());
                    Err(err)
                }
                Err(err) => return Err(err),
                Ok(deployed) => Ok(deployed),
            };

            let aborted = matches!(result, Ok(Deployed::Aborted));
            report.entries.push((target, result));
            if aborted {
                break;
            }
        }

        Ok(report)
    }
}

/// Fetch source into staging file, then rename it over destination.
///
/// Missing parent directories of the destination are created. A destination
/// that is a symlink to an existing file is written through, so the link
/// itself survives. An existing destination keeps its permission bits.
///
/// # Errors
///
/// - Return [`FetchError`] if download fails, or staging file cannot be
///   created or persisted. The destination is never partially written.
#[instrument(skip(fetcher), level = "debug")]
pub async fn place(fetcher: &impl Fetcher, url: &str, dest: &Path) -> Result<(), FetchError> {
    let store_error = |source: std::io::Error| FetchError::Store {
        source,
        url: url.to_owned(),
    };

    let dest = resolve_symlink(dest);
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    mkdirp::mkdirp(&parent).map_err(store_error)?;

    // INVARIANT: Stage next to destination so the final rename stays on the
    // same file system.
    let staging = tempfile::Builder::new()
        .prefix(".dotsmith-")
        .suffix(".part")
        .tempfile_in(&parent)
        .map_err(store_error)?;
    fetcher.fetch(url, staging.path()).await?;
    persist(staging, &dest).map_err(store_error)?;

    Ok(())
}

fn resolve_symlink(dest: &Path) -> PathBuf {
    let is_symlink = dest
        .symlink_metadata()
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false);
    if !is_symlink {
        return dest.to_path_buf();
    }

    match dest.canonicalize() {
        Ok(real) => {
            info!(
                "writing through symlink {:?} to {:?}",
                dest.display(),
                real.display()
            );
            real
        }
        Err(_) => {
            warn!("replacing dangling symlink {:?}", dest.display());
            dest.to_path_buf()
        }
    }
}

fn persist(staging: NamedTempFile, dest: &Path) -> std::io::Result<()> {
    // INVARIANT: Staging files are created 0600. Fresh destinations get 0644,
    // replaced ones keep their own mode.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(dest)
            .map(|meta| meta.permissions().mode() & 0o7777)
            .unwrap_or(0o644);
        std::fs::set_permissions(staging.path(), std::fs::Permissions::from_mode(mode))?;
    }

    staging.persist(dest).map_err(|err| err.error)?;
    Ok(())
}

/// Deployment error types.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Operator confirmation failed.
    #[error("failed to confirm deployment")]
    Prompt(#[source] PromptError),

    /// Backup of existing destination failed.
    #[error(transparent)]
    Backup(#[from] BackupError),

    /// Retrieval of source failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Friendly result alias :3
pub type Result<T, E = DeployError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{collections::HashMap, fs};

    /// Serve fixtures from memory. Unknown URLs fail like a 404 would, after
    /// scribbling into the destination.
    struct MemoryFetcher(HashMap<String, String>);

    impl MemoryFetcher {
        fn new(entries: &[(&str, &str)]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.to_string()))
                    .collect(),
            )
        }
    }

    impl Fetcher for MemoryFetcher {
        async fn fetch(&self, url: &str, dest: &Path) -> crate::fetch::Result<()> {
            match self.0.get(url) {
                Some(body) => fs::write(dest, body).map_err(|err| FetchError::Store {
                    source: err,
                    url: url.into(),
                }),
                None => {
                    let _ = fs::write(dest, "partial garbage");
                    Err(FetchError::NoDownloader)
                }
            }
        }
    }

    fn never(_: &str) -> crate::prompt::Result<bool> {
        panic!("must not ask");
    }

    fn stamp() -> RunStamp {
        use chrono::{Local, TimeZone};
        RunStamp::from_time(Local.with_ymd_and_hms(2025, 6, 7, 8, 9, 10).unwrap())
    }

    const FORCE: DeployOptions = DeployOptions {
        force: true,
        interactive: false,
    };

    #[tokio::test]
    async fn fresh_destination_gets_no_backup() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("sub").join(".vimrc");
        let fetcher = MemoryFetcher::new(&[("https://x/vimrc", "set number\n")]);
        let mut deployer = Deployer::new(&fetcher, never, DeployOptions::default(), stamp());

        let target = DeploymentTarget::new(TargetKind::VimConfig, "https://x/vimrc", &dest);
        let result = deployer.deploy(&target).await?;

        assert_eq!(result, Deployed::Placed { backup: None });
        assert_eq!(fs::read_to_string(&dest)?, "set number\n");
        assert_eq!(fs::read_dir(dest.parent().unwrap())?.count(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn forced_overwrite_keeps_one_backup() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join(".vimrc");
        fs::write(&dest, "old\n")?;
        let fetcher = MemoryFetcher::new(&[("https://x/vimrc", "new\n")]);
        let mut deployer = Deployer::new(&fetcher, never, FORCE, stamp());

        let target = DeploymentTarget::new(TargetKind::VimConfig, "https://x/vimrc", &dest);
        let result = deployer.deploy(&target).await?;

        let backup = dir.path().join(".vimrc.backup.20250607_080910");
        match result {
            Deployed::Placed { backup: Some(record) } => assert_eq!(record.backup, backup),
            other => panic!("expected backup, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(&dest)?, "new\n");
        assert_eq!(fs::read_to_string(&backup)?, "old\n");
        assert_eq!(fs::read_dir(dir.path())?.count(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn failed_download_leaves_destination_intact() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join(".vimrc");
        fs::write(&dest, "precious\n")?;
        let fetcher = MemoryFetcher::new(&[]);
        let mut refuse_backup = |prompt: &str| -> crate::prompt::Result<bool> {
            Ok(prompt.starts_with("Overwrite"))
        };
        let options = DeployOptions {
            force: false,
            interactive: true,
        };
        let mut deployer = Deployer::new(&fetcher, &mut refuse_backup, options, stamp());

        let target = DeploymentTarget::new(TargetKind::VimConfig, "https://x/404", &dest);
        let result = deployer.deploy(&target).await;

        assert!(matches!(result, Err(DeployError::Fetch(_))));
        assert_eq!(fs::read_to_string(&dest)?, "precious\n");
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn decline_twice_leaves_destination_intact() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join(".vimrc");
        fs::write(&dest, "mine\n")?;
        let fetcher = MemoryFetcher::new(&[("https://x/vimrc", "theirs\n")]);
        let mut asked = 0;
        let decline = |_: &str| -> crate::prompt::Result<bool> {
            asked += 1;
            Ok(false)
        };
        let options = DeployOptions {
            force: false,
            interactive: true,
        };
        let mut deployer = Deployer::new(&fetcher, decline, options, stamp());

        let targets = [
            DeploymentTarget::new(TargetKind::VimConfig, "https://x/vimrc", &dest),
            DeploymentTarget::new(TargetKind::GitPrompt, "https://x/vimrc", dir.path().join("p")),
        ];
        let report = deployer.deploy_all(targets).await?;
        drop(deployer);

        assert!(report.is_aborted());
        assert_eq!(report.entries().len(), 1);
        assert_eq!(asked, 2);
        assert_eq!(fs::read_to_string(&dest)?, "mine\n");
        assert!(!dir.path().join("p").exists());

        Ok(())
    }

    #[tokio::test]
    async fn one_failed_download_does_not_block_others() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let fetcher = MemoryFetcher::new(&[("https://x/prompt", "__git_ps1() { :; }\n")]);
        let mut deployer = Deployer::new(&fetcher, never, FORCE, stamp());

        let targets = [
            DeploymentTarget::new(TargetKind::GitCompletion, "https://x/404", dir.path().join("c")),
            DeploymentTarget::new(TargetKind::GitPrompt, "https://x/prompt", dir.path().join("p")),
        ];
        let report = deployer.deploy_all(targets).await?;

        assert_eq!(report.failures(), 1);
        assert!(matches!(report.entries()[0].1, Err(DeployError::Fetch(_))));
        assert!(matches!(
            report.entries()[1].1,
            Ok(Deployed::Placed { backup: None })
        ));
        assert!(!dir.path().join("c").exists());
        assert!(dir.path().join("p").exists());

        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn forced_overwrite_replaces_dangling_symlink() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join(".vimrc");
        std::os::unix::fs::symlink(dir.path().join("gone"), &dest)?;
        let fetcher = MemoryFetcher::new(&[("https://x/vimrc", "new\n")]);
        let mut deployer = Deployer::new(&fetcher, never, FORCE, stamp());

        let target = DeploymentTarget::new(TargetKind::VimConfig, "https://x/vimrc", &dest);
        let result = deployer.deploy(&target).await?;

        assert_eq!(result, Deployed::Placed { backup: None });
        assert!(!dest.symlink_metadata()?.file_type().is_symlink());
        assert_eq!(fs::read_to_string(&dest)?, "new\n");
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);

        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn forced_overwrite_writes_through_symlink() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dotfiles = dir.path().join("dotfiles");
        fs::create_dir(&dotfiles)?;
        let real = dotfiles.join("vimrc");
        fs::write(&real, "old\n")?;
        let dest = dir.path().join(".vimrc");
        std::os::unix::fs::symlink(&real, &dest)?;
        let fetcher = MemoryFetcher::new(&[("https://x/vimrc", "new\n")]);
        let mut deployer = Deployer::new(&fetcher, never, FORCE, stamp());

        let target = DeploymentTarget::new(TargetKind::VimConfig, "https://x/vimrc", &dest);
        let result = deployer.deploy(&target).await?;

        let backup = dir.path().join(".vimrc.backup.20250607_080910");
        assert!(matches!(result, Deployed::Placed { backup: Some(_) }));
        assert!(dest.symlink_metadata()?.file_type().is_symlink());
        assert_eq!(fs::read_to_string(&real)?, "new\n");
        assert_eq!(fs::read_to_string(&backup)?, "old\n");
        assert_eq!(fs::read_dir(&dotfiles)?.count(), 1);

        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn overwrite_keeps_destination_mode() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let private = dir.path().join(".vimrc");
        fs::write(&private, "old\n")?;
        fs::set_permissions(&private, fs::Permissions::from_mode(0o600))?;
        let fresh = dir.path().join(".git-prompt.sh");
        let fetcher = MemoryFetcher::new(&[("https://x/vimrc", "new\n")]);
        let mut deployer = Deployer::new(&fetcher, never, FORCE, stamp());

        let targets = [
            DeploymentTarget::new(TargetKind::VimConfig, "https://x/vimrc", &private),
            DeploymentTarget::new(TargetKind::GitPrompt, "https://x/vimrc", &fresh),
        ];
        let report = deployer.deploy_all(targets).await?;

        assert_eq!(report.failures(), 0);
        assert_eq!(fs::read_to_string(&private)?, "new\n");
        assert_eq!(fs::metadata(&private)?.permissions().mode() & 0o777, 0o600);
        assert_eq!(fs::metadata(&fresh)?.permissions().mode() & 0o777, 0o644);

        Ok(())
    }
}
