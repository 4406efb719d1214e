// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External process execution.
//!
//! Every external tool dotsmith drives (downloaders, tar, configure, make,
//! package managers) runs as a single child process while a cosmetic spinner
//! ticks at a fixed interval. The spinner owns no state beyond the terminal
//! line it draws; it stops as soon as the child exits, and the child's exit
//! status is propagated to the caller.
//!
//! Children that need the operator (e.g., `sudo` asking for a password) run
//! attached to the terminal instead, without spinner or captured output.
//!
//! Children are spawned with `kill_on_drop`, so dropping the future that
//! awaits them (e.g., because the process received an interrupt) also takes
//! the child down.

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    ffi::{OsStr, OsString},
    path::PathBuf,
    process::{ExitStatus, Stdio},
    time::Duration,
};
use tokio::{process::Command, time};
use tracing::{debug, instrument};

const TICK: Duration = Duration::from_millis(100);

/// Description of a child process to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syscall {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    current_dir: Option<PathBuf>,
}

impl Syscall {
    /// Construct new system call of target program.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        command
    }

    /// Run child process to completion behind a progress spinner.
    ///
    /// Returns captured output of child on success.
    ///
    /// # Errors
    ///
    /// - Return [`SyscallError::Spawn`] if child cannot be started.
    /// - Return [`SyscallError::Failed`] if child exits unsuccessfully.
    #[instrument(skip(self, message), fields(program = ?self.program), level = "debug")]
    pub async fn run_with_spinner(&self, message: impl Into<String>) -> Result<String> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.yellow} {elapsed:>4} {msg}")?
                .tick_chars("-\\|/ "),
        );
        bar.set_message(message.into());

        let child = self.command().spawn().map_err(|err| SyscallError::Spawn {
            source: err,
            program: self.program.clone(),
        })?;
        debug!("spawned {:?} {:?}", self.program, self.args);

        let output = child.wait_with_output();
        tokio::pin!(output);
        let mut ticker = time::interval(TICK);
        let output = loop {
            tokio::select! {
                output = &mut output => break output,
                _ = ticker.tick() => bar.tick(),
            }
        };
        bar.finish_and_clear();

        let output = output.map_err(|err| SyscallError::Spawn {
            source: err,
            program: self.program.clone(),
        })?;
        let message = compose_message(&output.stdout, &output.stderr);
        if !output.status.success() {
            return Err(SyscallError::Failed {
                program: self.program.clone(),
                status: output.status,
                message: tail(&message, 20),
            });
        }

        Ok(message)
    }

    /// Run child process to completion attached to the terminal.
    ///
    /// # Errors
    ///
    /// - Return [`SyscallError::Spawn`] if child cannot be started.
    /// - Return [`SyscallError::Failed`] if child exits unsuccessfully.
    #[instrument(skip(self), fields(program = ?self.program), level = "debug")]
    pub async fn run_interactive(&self) -> Result<()> {
        let mut command = self.command();
        command
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        debug!("spawn {:?} {:?}", self.program, self.args);

        let status = command.status().await.map_err(|err| SyscallError::Spawn {
            source: err,
            program: self.program.clone(),
        })?;
        if !status.success() {
            return Err(SyscallError::Failed {
                program: self.program.clone(),
                status,
                message: String::new(),
            });
        }

        Ok(())
    }
}

fn compose_message(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        if !message.is_empty() && !message.ends_with('\n') {
            message.push('\n');
        }
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message)
}

fn tail(message: &str, lines: usize) -> String {
    let all = message.lines().collect::<Vec<_>>();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

/// External process error types.
#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    /// Child process cannot be started or waited on.
    #[error("failed to run {program:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        program: OsString,
    },

    /// Child process exited unsuccessfully.
    #[error("command {program:?} failed with {status}:\n{message}")]
    Failed {
        program: OsString,
        status: ExitStatus,
        message: String,
    },

    /// Style template cannot be set for progress spinner.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = SyscallError> = std::result::Result<T, E>;

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn run_captures_output() -> anyhow::Result<()> {
        let result = Syscall::new("sh")
            .args(["-c", "echo hello; echo oops >&2"])
            .run_with_spinner("saying hello")
            .await?;
        assert_eq!(result, "stdout: hello\nstderr: oops");

        Ok(())
    }

    #[tokio::test]
    async fn run_propagates_failure() {
        let result = Syscall::new("sh")
            .args(["-c", "echo broken >&2; exit 3"])
            .run_with_spinner("failing")
            .await;

        match result {
            Err(SyscallError::Failed { status, message, .. }) => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(message, "stderr: broken");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_reports_missing_program() {
        let result = Syscall::new("dotsmith-no-such-program")
            .run_with_spinner("nothing")
            .await;
        assert!(matches!(result, Err(SyscallError::Spawn { .. })));
    }

    #[tokio::test]
    async fn run_honors_env_and_dir() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let result = Syscall::new("sh")
            .args(["-c", "printf '%s ' \"$GREETING\"; pwd -P"])
            .env("GREETING", "hi")
            .current_dir(dir.path())
            .run_with_spinner("env")
            .await?;
        let expect = format!("stdout: hi {}", dir.path().canonicalize()?.display());
        assert_eq!(result, expect);

        Ok(())
    }

    #[tokio::test]
    async fn run_interactive_propagates_status() -> anyhow::Result<()> {
        Syscall::new("sh").args(["-c", "exit 0"]).run_interactive().await?;

        let result = Syscall::new("sh")
            .args(["-c", "exit 4"])
            .run_interactive()
            .await;
        match result {
            Err(SyscallError::Failed { status, message, .. }) => {
                assert_eq!(status.code(), Some(4));
                assert!(message.is_empty());
            }
            other => panic!("expected failure, got {other:?}"),
        }

        Ok(())
    }

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail("a", 5), "a");
    }
}
