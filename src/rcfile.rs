// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Shell resource file management.
//!
//! Deployed assets are wired into the operator's shell by appending a
//! __configuration block__ to a shell resource file like `~/.bashrc`. Each
//! block is a fixed snippet fenced by comment lines, and identified by a
//! __marker__: a substring unique to the snippet, e.g., a path the snippet
//! sources.
//!
//! # Idempotency
//!
//! Appending is whole-block only. If the marker already occurs anywhere in
//! the resource file, the block is considered to be in place, and the file is
//! left alone. Thus running any workflow twice leaves exactly one copy of each
//! block behind. No attempt is made to merge or patch an existing block.

use crate::prompt::{Confirmation, PromptError};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Fixed configuration snippet for a shell resource file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBlock {
    name: String,
    marker: String,
    body: String,
}

impl ConfigBlock {
    /// Construct new configuration block.
    ///
    /// The marker must occur in the body, otherwise the block could never be
    /// recognized after being appended.
    pub fn new(
        name: impl Into<String>,
        marker: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let block = Self {
            name: name.into(),
            marker: marker.into(),
            body: body.into(),
        };
        debug_assert!(block.body.contains(&block.marker));

        block
    }

    /// Block sourcing git completion and git prompt scripts.
    pub fn git_prompt(completion: &Path, prompt: &Path) -> Self {
        let prompt = prompt.display().to_string();
        let body = format!(
            r#"[ -f "{completion}" ] && . "{completion}"
[ -f "{prompt}" ] && . "{prompt}"
export GIT_PS1_SHOWDIRTYSTATE=1
export GIT_PS1_SHOWUNTRACKEDFILES=1
export PS1='\[\e[32m\]\u@\h\[\e[0m\]:\[\e[34m\]\w\[\e[33m\]$(__git_ps1 " (%s)")\[\e[0m\]\$ '"#,
            completion = completion.display(),
        );

        Self::new("git prompt", prompt, body)
    }

    /// Block prepending install prefix binaries to `PATH`.
    pub fn path_entry(prefix: &Path) -> Self {
        let bin = prefix.join("bin").display().to_string();
        let body = format!(r#"export PATH="{bin}:$PATH""#);

        Self::new("path", bin, body)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Check if content already carries this block.
    pub fn is_present_in(&self, content: &str) -> bool {
        content.contains(&self.marker)
    }
}

impl Display for ConfigBlock {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        writeln!(fmt, "# >>> dotsmith {} >>>", self.name)?;
        writeln!(fmt, "{}", self.body)?;
        writeln!(fmt, "# <<< dotsmith {} <<<", self.name)
    }
}

/// Policy for a resource file that does not exist yet.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RcPolicy {
    /// Silently create the file.
    #[default]
    Create,

    /// Ask before creating the file, unless forced.
    Confirm,
}

/// Result of ensuring a block is in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Marker found, nothing written.
    AlreadyPresent,

    /// Block appended to resource file.
    Appended,

    /// Operator refused to create missing resource file.
    Declined,
}

/// Shell resource file that configuration blocks get appended to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcFile {
    path: PathBuf,
}

impl RcFile {
    /// Construct new resource file handle.
    ///
    /// Does not touch the file system.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Read current content of resource file.
    ///
    /// A missing file reads as `None`.
    ///
    /// # Errors
    ///
    /// - Return [`RcError::Read`] if resource file exists but cannot be read.
    pub fn content(&self) -> Result<Option<String>> {
        match read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(RcError::Read {
                source: err,
                path: self.path.clone(),
            }),
        }
    }

    /// Ensure configuration block exists in resource file exactly once.
    ///
    /// Appends block if and only if its marker cannot be found. A missing
    /// resource file is handled according to `policy`; the `force` flag
    /// skips the confirmation of [`RcPolicy::Confirm`].
    ///
    /// # Errors
    ///
    /// - Return [`RcError::Read`] if resource file cannot be read.
    /// - Return [`RcError::Write`] if block cannot be appended.
    /// - Return [`RcError::Prompt`] if confirmation fails.
    #[instrument(skip(self, block, confirm), fields(block = block.name()), level = "debug")]
    pub fn ensure_block(
        &self,
        block: &ConfigBlock,
        policy: RcPolicy,
        force: bool,
        confirm: &mut impl Confirmation,
    ) -> Result<BlockOutcome> {
        let content = self.content()?;
        if let Some(content) = &content {
            if block.is_present_in(content) {
                info!(
                    "{} block already configured in {:?}",
                    block.name(),
                    self.path.display()
                );
                return Ok(BlockOutcome::AlreadyPresent);
            }
        } else if policy == RcPolicy::Confirm && !force {
            let question = format!("{} does not exist, create it?", self.path.display());
            if !confirm.confirm(&question).map_err(RcError::Prompt)? {
                warn!("not creating {:?}", self.path.display());
                return Ok(BlockOutcome::Declined);
            }
        }

        // INVARIANT: Block always starts on a fresh line.
        let mut text = String::new();
        match &content {
            Some(content) if !content.is_empty() && !content.ends_with('\n') => {
                text.push_str("\n\n")
            }
            Some(content) if !content.is_empty() => text.push('\n'),
            _ => {}
        }
        text.push_str(block.to_string().as_str());

        info!("append {} block to {:?}", block.name(), self.path.display());
        self.append(&text)?;

        Ok(BlockOutcome::Appended)
    }

    fn append(&self, text: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            mkdirp::mkdirp(parent).map_err(|err| RcError::Write {
                source: err,
                path: self.path.clone(),
            })?;
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(text.as_bytes()))
            .map_err(|err| RcError::Write {
                source: err,
                path: self.path.clone(),
            })
    }
}

/// Resource file error types.
#[derive(Debug, thiserror::Error)]
pub enum RcError {
    /// Resource file cannot be read.
    #[error("failed to read resource file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Resource file cannot be written.
    #[error("failed to write resource file at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Confirmation to create resource file failed.
    #[error("failed to confirm creation of resource file")]
    Prompt(#[source] PromptError),
}

/// Friendly result alias :3
pub type Result<T, E = RcError> = std::result::Result<T, E>;
