// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote asset retrieval.
//!
//! Dotsmith does not speak HTTP itself. Downloads are handed off to whichever
//! downloader the host provides, curl being preferred over wget. The
//! [`Fetcher`] trait is the seam between the workflows and the network, such
//! that the workflows can be exercised against local fixtures.

use crate::{
    path::which,
    syscall::{Syscall, SyscallError},
};

use std::{future::Future, path::Path};
use tracing::{debug, instrument};

/// Retrieve a remote resource into a local file.
pub trait Fetcher {
    /// Download resource at `url` into `dest`.
    ///
    /// The caller is responsible for staging; `dest` may be left partially
    /// written on failure.
    fn fetch(&self, url: &str, dest: &Path) -> impl Future<Output = Result<()>>;
}

/// Host program used to download resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadTool {
    Curl,
    Wget,
}

impl DownloadTool {
    /// Detect first available download tool on `PATH`.
    pub fn detect() -> Option<Self> {
        [Self::Curl, Self::Wget]
            .into_iter()
            .find(|tool| which(tool.program()).is_some())
    }

    pub fn program(&self) -> &'static str {
        match self {
            Self::Curl => "curl",
            Self::Wget => "wget",
        }
    }

    fn syscall(&self, url: &str, dest: &Path) -> Syscall {
        match self {
            Self::Curl => Syscall::new("curl")
                .args(["--fail", "--silent", "--show-error", "--location", "--output"])
                .arg(dest)
                .arg(url),
            Self::Wget => Syscall::new("wget")
                .args(["--quiet", "--output-document"])
                .arg(dest)
                .arg(url),
        }
    }
}

/// Fetcher backed by a host download tool.
#[derive(Debug, Clone, Copy)]
pub struct Downloader {
    tool: DownloadTool,
}

impl Downloader {
    /// Construct new downloader using target tool.
    pub fn new(tool: DownloadTool) -> Self {
        Self { tool }
    }

    /// Construct new downloader from first available tool on `PATH`.
    ///
    /// # Errors
    ///
    /// - Return [`FetchError::NoDownloader`] if neither curl nor wget exist.
    pub fn detect() -> Result<Self> {
        DownloadTool::detect()
            .map(Self::new)
            .ok_or(FetchError::NoDownloader)
    }
}

impl Fetcher for Downloader {
    #[instrument(skip(self, dest), level = "debug")]
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        debug!("download {url} into {:?} with {}", dest.display(), self.tool.program());
        self.tool
            .syscall(url, dest)
            .run_with_spinner(format!("downloading {url}"))
            .await
            .map_err(|err| FetchError::Download {
                source: err,
                url: url.to_owned(),
            })?;

        Ok(())
    }
}

/// Fetch error types.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// No download tool found on host.
    #[error("neither curl nor wget could be found on PATH")]
    NoDownloader,

    /// Download tool failed to retrieve resource.
    #[error("failed to download {url}")]
    Download {
        #[source]
        source: SyscallError,
        url: String,
    },

    /// Downloaded resource could not be handled locally.
    #[error("failed to store download of {url}")]
    Store {
        #[source]
        source: std::io::Error,
        url: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = FetchError> = std::result::Result<T, E>;
