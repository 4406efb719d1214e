// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! System package installation.
//!
//! Missing prerequisites can be installed through whatever package manager
//! the host happens to use. The workflows only ever ask for a package by
//! name through [`PackageInstaller`].
//!
//! Package managers run attached to the terminal, so `sudo` can ask for a
//! password when dotsmith is not run as root.

use crate::{
    path::which,
    syscall::{Syscall, SyscallError},
};

use std::future::Future;
use tokio::sync::OnceCell;
use tracing::{info, instrument};

/// Install system packages by name.
pub trait PackageInstaller {
    /// Install target package.
    fn install(&self, package: &str) -> impl Future<Output = Result<()>>;
}

/// Package manager found on host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Yum,
    Pacman,
    Apk,
    Zypper,
}

impl PackageManager {
    const ALL: [Self; 6] = [
        Self::Apt,
        Self::Dnf,
        Self::Yum,
        Self::Pacman,
        Self::Apk,
        Self::Zypper,
    ];

    /// Detect first available package manager on `PATH`.
    pub fn detect() -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|manager| which(manager.program()).is_some())
    }

    pub fn program(&self) -> &'static str {
        match self {
            Self::Apt => "apt-get",
            Self::Dnf => "dnf",
            Self::Yum => "yum",
            Self::Pacman => "pacman",
            Self::Apk => "apk",
            Self::Zypper => "zypper",
        }
    }

    /// Arguments refreshing the package index, if the manager needs that
    /// before installing anything.
    fn refresh_args(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::Apt => Some(&["update"]),
            Self::Dnf | Self::Yum | Self::Pacman | Self::Apk | Self::Zypper => None,
        }
    }

    fn install_args(&self) -> &'static [&'static str] {
        match self {
            Self::Apt | Self::Dnf | Self::Yum => &["install", "-y"],
            Self::Pacman => &["-S", "--noconfirm", "--needed"],
            Self::Apk => &["add", "--no-cache"],
            Self::Zypper => &["--non-interactive", "install"],
        }
    }
}

/// Package installer backed by host package manager.
///
/// The package index is refreshed at most once per installer, right before
/// the first install.
#[derive(Debug)]
pub struct SystemPackageInstaller {
    manager: PackageManager,
    sudo: bool,
    refreshed: OnceCell<()>,
}

impl SystemPackageInstaller {
    /// Construct new installer through target package manager.
    pub fn new(manager: PackageManager, sudo: bool) -> Self {
        Self {
            manager,
            sudo,
            refreshed: OnceCell::new(),
        }
    }

    /// Detect package manager, and whether sudo is needed to run it.
    ///
    /// # Errors
    ///
    /// - Return [`PackageError::NoManager`] if no known manager is found.
    pub fn detect() -> Result<Self> {
        let manager = PackageManager::detect().ok_or(PackageError::NoManager)?;
        let sudo = !is_root() && which("sudo").is_some();

        Ok(Self::new(manager, sudo))
    }

    fn manager_syscall(&self) -> Syscall {
        if self.sudo {
            Syscall::new("sudo").arg(self.manager.program())
        } else {
            Syscall::new(self.manager.program())
        }
    }

    fn refresh_syscall(&self) -> Option<Syscall> {
        self.manager
            .refresh_args()
            .map(|args| self.manager_syscall().args(args))
    }

    fn install_syscall(&self, package: &str) -> Syscall {
        self.manager_syscall()
            .args(self.manager.install_args())
            .arg(package)
    }

    async fn refresh(&self) -> Result<()> {
        let Some(call) = self.refresh_syscall() else {
            return Ok(());
        };

        self.refreshed
            .get_or_try_init(|| async move {
                info!("refresh package index through {}", self.manager.program());
                call.run_interactive().await.map_err(PackageError::Refresh)
            })
            .await?;

        Ok(())
    }
}

impl PackageInstaller for SystemPackageInstaller {
    #[instrument(skip(self), level = "debug")]
    async fn install(&self, package: &str) -> Result<()> {
        self.refresh().await?;

        info!("install {package} through {}", self.manager.program());
        self.install_syscall(package)
            .run_interactive()
            .await
            .map_err(|err| PackageError::Install {
                source: err,
                package: package.to_owned(),
            })?;

        Ok(())
    }
}

fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Package installation error types.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    /// No supported package manager on host.
    #[error("no supported package manager found on PATH")]
    NoManager,

    /// Package manager failed to refresh its package index.
    #[error("failed to refresh package index")]
    Refresh(#[source] SyscallError),

    /// Package manager failed to install package.
    #[error("failed to install package {package:?}")]
    Install {
        #[source]
        source: SyscallError,
        package: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PackageError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::ffi::OsStr;

    fn args(call: &Syscall) -> Vec<String> {
        call.arguments()
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn sudo_wraps_manager() {
        let installer = SystemPackageInstaller::new(PackageManager::Apt, true);
        let call = installer.install_syscall("curl");
        assert_eq!(call.program(), "sudo");
        assert_eq!(args(&call), vec!["apt-get", "install", "-y", "curl"]);
    }

    #[test]
    fn apt_refreshes_index_first() {
        let installer = SystemPackageInstaller::new(PackageManager::Apt, true);
        let call = installer.refresh_syscall();
        assert_eq!(call.as_ref().map(Syscall::program), Some(OsStr::new("sudo")));
        assert_eq!(call.as_ref().map(args), Some(vec!["apt-get".into(), "update".into()]));

        let installer = SystemPackageInstaller::new(PackageManager::Apt, false);
        let call = installer.refresh_syscall();
        assert_eq!(call.as_ref().map(Syscall::program), Some(OsStr::new("apt-get")));
        assert_eq!(call.as_ref().map(args), Some(vec!["update".into()]));
    }

    #[test]
    fn other_managers_skip_refresh() {
        for manager in [
            PackageManager::Dnf,
            PackageManager::Yum,
            PackageManager::Pacman,
            PackageManager::Apk,
            PackageManager::Zypper,
        ] {
            let installer = SystemPackageInstaller::new(manager, false);
            assert!(installer.refresh_syscall().is_none(), "{manager:?}");
        }
    }

    #[test]
    fn root_runs_manager_directly() {
        let installer = SystemPackageInstaller::new(PackageManager::Pacman, false);
        let call = installer.install_syscall("make");
        assert_eq!(call.program(), "pacman");
        assert_eq!(args(&call), vec!["-S", "--noconfirm", "--needed", "make"]);
    }
}
