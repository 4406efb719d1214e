// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deployment decision policy.
//!
//! Decide what to do with a deployment target's destination before anything
//! gets fetched. The destination file is never silently lost: it is either
//! backed up first, or the operator explicitly refused the backup.
//!
//! | exists | force | interactive | answers              | decision            |
//! |--------|-------|-------------|----------------------|---------------------|
//! | no     | any   | any         | not asked            | overwrite, no backup|
//! | yes    | yes   | any         | not asked            | backup, overwrite   |
//! | yes    | no    | yes         | yes                  | backup, overwrite   |
//! | yes    | no    | yes         | no, yes              | overwrite, no backup|
//! | yes    | no    | yes         | no, no               | abort               |
//! | yes    | no    | no          | not asked            | skip                |

use crate::prompt::{Confirmation, Result};

use std::{
    fs::metadata,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Flags governing a deployment.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeployOptions {
    /// Skip all confirmations, always taking the backup-preserving path.
    pub force: bool,

    /// Operator can be asked questions.
    pub interactive: bool,
}

/// State of a destination path at decision time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingFileState {
    pub present: bool,
    pub path: PathBuf,
}

impl ExistingFileState {
    /// Query file system for destination state.
    ///
    /// Symlinks are followed. A dangling symlink has no content to back up,
    /// so it counts as absent.
    pub fn query(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let present = metadata(&path).is_ok();

        Self { present, path }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }
}

/// Outcome of deployment decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Leave existing destination untouched.
    Skip,

    /// Back existing destination up, then replace it.
    BackupThenOverwrite,

    /// Replace destination without a backup. Also used for fresh
    /// destinations where there is nothing to back up.
    OverwriteNoBackup,

    /// Operator declined every option, stop deploying cleanly.
    Abort,
}

/// Decide what to do with a destination.
///
/// # Errors
///
/// - Return [`PromptError`](crate::prompt::PromptError) if confirmation
///   fails or gets interrupted.
#[instrument(skip(confirm), level = "debug")]
pub fn decide(
    state: &ExistingFileState,
    options: DeployOptions,
    confirm: &mut impl Confirmation,
) -> Result<Decision> {
    if !state.present {
        return Ok(Decision::OverwriteNoBackup);
    }

    if options.force {
        return Ok(Decision::BackupThenOverwrite);
    }

    if !options.interactive {
        debug!("cannot ask about {:?}, skipping", state.path().display());
        return Ok(Decision::Skip);
    }

    let path = state.path().display();
    if confirm.confirm(&format!("{path} already exists. Back it up and overwrite?"))? {
        return Ok(Decision::BackupThenOverwrite);
    }

    if confirm.confirm(&format!("Overwrite {path} without a backup?"))? {
        return Ok(Decision::OverwriteNoBackup);
    }

    Ok(Decision::Abort)
}
