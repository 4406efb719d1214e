// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backup of existing destinations.
//!
//! A backup is a sibling copy of the original file whose name carries the
//! timestamp of the current run, e.g., `.vimrc.backup.20250101_120000`. The
//! timestamp is captured once per run through [`RunStamp`], so every backup
//! taken by one invocation shares the same suffix.
//!
//! Backups are created exclusively. Should the timestamped name already be
//! taken, a numeric counter is appended instead of clobbering the other file.

use chrono::{DateTime, Local};
use std::{
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

const MAX_ATTEMPTS: usize = 100;

/// Timestamp shared by every backup of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStamp(String);

impl RunStamp {
    /// Capture current local time.
    pub fn now() -> Self {
        Self::from_time(Local::now())
    }

    /// Construct run stamp from target time.
    pub fn from_time(time: DateTime<Local>) -> Self {
        Self(time.format("%Y%m%d_%H%M%S").to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Record of a completed backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub original: PathBuf,
    pub backup: PathBuf,
    pub suffix: String,
}

/// Copy existing file to a timestamped sibling.
///
/// Preserves permissions of original file.
///
/// # Errors
///
/// - Return [`BackupError::Copy`] if the copy cannot be made for any reason.
///   Callers must not overwrite the original in that case.
#[instrument(level = "debug")]
pub fn backup_file(original: &Path, stamp: &RunStamp) -> Result<BackupRecord> {
    let to_error = |source: io::Error, backup: &Path| BackupError::Copy {
        source,
        original: original.to_path_buf(),
        backup: backup.to_path_buf(),
    };

    let (mut target, backup) = create_exclusive(original, stamp).map_err(|(err, backup)| {
        to_error(err, &backup)
    })?;

    let result = File::open(original)
        .and_then(|mut source| io::copy(&mut source, &mut target))
        .and_then(|_| target.sync_all())
        .and_then(|_| fs::metadata(original))
        .and_then(|meta| fs::set_permissions(&backup, meta.permissions()));
    if let Err(err) = result {
        // INVARIANT: Never leave a half-written backup behind.
        let _ = fs::remove_file(&backup);
        return Err(to_error(err, &backup));
    }

    info!(
        "backed up {:?} to {:?}",
        original.display(),
        backup.display()
    );

    Ok(BackupRecord {
        original: original.to_path_buf(),
        backup,
        suffix: stamp.as_str().to_owned(),
    })
}

fn create_exclusive(
    original: &Path,
    stamp: &RunStamp,
) -> std::result::Result<(File, PathBuf), (io::Error, PathBuf)> {
    let mut base = original
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("backup"));
    base.push(format!(".backup.{}", stamp.as_str()));

    let mut candidate = original.with_file_name(&base);
    for attempt in 1..=MAX_ATTEMPTS {
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((file, candidate)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                let mut next = base.clone();
                next.push(format!(".{attempt}"));
                candidate = original.with_file_name(next);
            }
            Err(err) => return Err((err, candidate)),
        }
    }

    Err((
        io::Error::new(ErrorKind::AlreadyExists, "no free backup name left"),
        candidate,
    ))
}

/// Backup error types.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Original file cannot be copied to backup location.
    #[error("failed to back up {:?} to {:?}", original.display(), backup.display())]
    Copy {
        #[source]
        source: io::Error,
        original: PathBuf,
        backup: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = BackupError> = std::result::Result<T, E>;
