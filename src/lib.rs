// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Developer environment setup.
//!
//! dotsmith places developer dotfiles onto a host: git completion and prompt
//! scripts, and a vim configuration. It can also build vim and ncurses from
//! source into a user-local prefix.
//!
//! # Deployment
//!
//! Every file follows the same [`deploy`] workflow. The existing destination
//! is checked first, and the operator decides whether it gets backed up,
//! overwritten, or left alone. Fresh content is always staged next to the
//! destination and renamed into place, so a failed download never clobbers
//! anything.
//!
//! Shell integration happens through fenced [`rcfile`] blocks that are only
//! ever appended once, no matter how often dotsmith runs.
//!
//! # Capabilities
//!
//! Network access, operator prompts, and package installation are injected
//! through the [`fetch::Fetcher`], [`prompt::Confirmation`], and
//! [`package::PackageInstaller`] traits. The binary wires in process-backed
//! implementations of these, while tests provide their own.

pub mod build;
pub mod config;
pub mod deploy;
pub mod fetch;
pub mod package;
pub mod path;
pub mod prereq;
pub mod prompt;
pub mod rcfile;
pub mod syscall;
pub mod workflow;
