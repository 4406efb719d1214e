// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Setup workflows.
//!
//! Tie deployment targets and configuration blocks together into the two
//! workflows dotsmith offers: the git prompt setup, and the vim setup. Both
//! run on a caller-provided [`Deployer`], so the caller decides how sources
//! are fetched and how the operator gets asked.
//!
//! A workflow either completes, or ends with the operator declining. A
//! declined workflow is not an error, it yields the steps left for the
//! operator to perform by hand.

use crate::{
    config::{self, SetupDefinition},
    deploy::{DeployError, Deployed, Deployer, DeploymentTarget, TargetKind},
    fetch::Fetcher,
    prompt::{self, Confirmation},
    rcfile::{BlockOutcome, ConfigBlock, RcError, RcFile, RcPolicy},
};

use std::fmt::Write as _;
use tracing::{info, instrument, warn};

/// How a workflow ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every step was carried out, or was already in place.
    Completed,

    /// Operator declined, leaving manual steps behind.
    Declined { instructions: String },
}

/// Git completion and prompt setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSetup {
    completion: DeploymentTarget,
    prompt: DeploymentTarget,
    rc: RcFile,
}

impl GitSetup {
    /// Construct new git setup.
    pub fn new(completion: DeploymentTarget, prompt: DeploymentTarget, rc: RcFile) -> Self {
        Self {
            completion,
            prompt,
            rc,
        }
    }

    /// Construct git setup from setup definition.
    ///
    /// # Errors
    ///
    /// - Return [`config::ConfigError`] if a default path cannot be resolved.
    pub fn from_definition(definition: &SetupDefinition) -> config::Result<Self> {
        let git = &definition.git;
        Ok(Self::new(
            DeploymentTarget::new(
                TargetKind::GitCompletion,
                git.completion_url(),
                git.completion_path()?,
            ),
            DeploymentTarget::new(TargetKind::GitPrompt, git.prompt_url(), git.prompt_path()?),
            RcFile::new(definition.settings.rc_file()?),
        ))
    }

    /// Block that sources both scripts from the resource file.
    pub fn block(&self) -> ConfigBlock {
        ConfigBlock::git_prompt(self.completion.destination(), self.prompt.destination())
    }

    /// Deploy both scripts, then hook them into the resource file.
    ///
    /// The block is only appended once both scripts are in place.
    ///
    /// # Errors
    ///
    /// - Return [`WorkflowError::Incomplete`] if any script failed to land.
    /// - Return [`WorkflowError::Deploy`] if deployment failed outright.
    /// - Return [`WorkflowError::Rc`] if resource file cannot be updated.
    #[instrument(skip(self, deployer), level = "debug")]
    pub async fn run<F, C>(&self, deployer: &mut Deployer<'_, F, C>) -> Result<Outcome>
    where
        F: Fetcher,
        C: Confirmation,
    {
        let targets = [self.completion.clone(), self.prompt.clone()];
        let report = deployer.deploy_all(targets.clone()).await?;

        if report.is_aborted() {
            return Ok(Outcome::Declined {
                instructions: instructions(&targets, Some((&self.rc, &self.block()))),
            });
        }

        let failed = report.failures();
        if failed > 0 {
            return Err(WorkflowError::Incomplete {
                failed,
                total: targets.len(),
            });
        }

        let block = self.block();
        let options = deployer.options();
        let outcome = if options.force || options.interactive {
            self.rc
                .ensure_block(&block, RcPolicy::Confirm, options.force, deployer.confirmation())?
        } else {
            let mut decline = |_: &str| -> prompt::Result<bool> { Ok(false) };
            self.rc
                .ensure_block(&block, RcPolicy::Confirm, false, &mut decline)?
        };

        if outcome == BlockOutcome::Declined {
            return Ok(Outcome::Declined {
                instructions: instructions(&[], Some((&self.rc, &block))),
            });
        }

        for record in report.backups() {
            info!(
                "previous {:?} kept at {:?}",
                record.original.display(),
                record.backup.display()
            );
        }
        info!("git prompt ready, open a new shell or source {:?}", self.rc.path().display());

        Ok(Outcome::Completed)
    }
}

/// Vim configuration setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VimSetup {
    vimrc: DeploymentTarget,
}

impl VimSetup {
    pub fn new(vimrc: DeploymentTarget) -> Self {
        Self { vimrc }
    }

    /// Construct vim setup from setup definition.
    ///
    /// # Errors
    ///
    /// - Return [`config::ConfigError`] if default path cannot be resolved.
    pub fn from_definition(definition: &SetupDefinition) -> config::Result<Self> {
        let vim = &definition.vim;
        Ok(Self::new(DeploymentTarget::new(
            TargetKind::VimConfig,
            vim.vimrc_url(),
            vim.vimrc_path()?,
        )))
    }

    /// Deploy vim configuration.
    ///
    /// # Errors
    ///
    /// - Return [`WorkflowError::Deploy`] if deployment failed.
    #[instrument(skip(self, deployer), level = "debug")]
    pub async fn run<F, C>(&self, deployer: &mut Deployer<'_, F, C>) -> Result<Outcome>
    where
        F: Fetcher,
        C: Confirmation,
    {
        match deployer.deploy(&self.vimrc).await? {
            Deployed::Aborted => Ok(Outcome::Declined {
                instructions: instructions(std::slice::from_ref(&self.vimrc), None),
            }),
            Deployed::Skipped => {
                warn!("kept existing {:?}", self.vimrc.destination().display());
                Ok(Outcome::Completed)
            }
            Deployed::Placed { backup } => {
                if let Some(record) = backup {
                    info!(
                        "previous {:?} kept at {:?}",
                        record.original.display(),
                        record.backup.display()
                    );
                }
                info!("vim configuration ready");
                Ok(Outcome::Completed)
            }
        }
    }
}

fn instructions(targets: &[DeploymentTarget], block: Option<(&RcFile, &ConfigBlock)>) -> String {
    let mut text = String::from("To finish the setup by hand:\n");
    for target in targets {
        let _ = writeln!(
            text,
            "  download {} to {}",
            target.source(),
            target.destination().display()
        );
    }
    if let Some((rc, block)) = block {
        let _ = writeln!(text, "  add the following to {}:\n", rc.path().display());
        text.push_str(block.to_string().as_str());
    }

    text
}

/// Workflow error types.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Some targets failed to deploy.
    #[error("{failed} of {total} files failed to deploy, resource file left untouched")]
    Incomplete { failed: usize, total: usize },

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Rc(#[from] RcError),
}

/// Friendly result alias :3
pub type Result<T, E = WorkflowError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        deploy::{backup::RunStamp, policy::DeployOptions},
        fetch::FetchError,
    };
    use pretty_assertions::assert_eq;
    use std::{fs, path::Path};

    struct MemoryFetcher;

    impl Fetcher for MemoryFetcher {
        async fn fetch(&self, url: &str, dest: &Path) -> crate::fetch::Result<()> {
            if url.ends_with("404") {
                return Err(FetchError::NoDownloader);
            }
            fs::write(dest, format!("# from {url}\n")).map_err(|err| FetchError::Store {
                source: err,
                url: url.into(),
            })
        }
    }

    fn git_setup(root: &Path, completion_url: &str) -> GitSetup {
        GitSetup::new(
            DeploymentTarget::new(
                TargetKind::GitCompletion,
                completion_url,
                root.join(".git-completion.bash"),
            ),
            DeploymentTarget::new(
                TargetKind::GitPrompt,
                "https://x/prompt",
                root.join(".git-prompt.sh"),
            ),
            RcFile::new(root.join(".bashrc")),
        )
    }

    fn stamp() -> RunStamp {
        use chrono::{Local, TimeZone};
        RunStamp::from_time(Local.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap())
    }

    #[tokio::test]
    async fn non_interactive_run_does_not_create_rc_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let setup = git_setup(dir.path(), "https://x/completion");
        let never = |_: &str| -> prompt::Result<bool> { panic!("must not ask") };
        let mut deployer = Deployer::new(&MemoryFetcher, never, DeployOptions::default(), stamp());

        let outcome = setup.run(&mut deployer).await?;

        match outcome {
            Outcome::Declined { instructions } => {
                assert!(instructions.contains(&setup.block().to_string()));
            }
            other => panic!("expected declined outcome, got {other:?}"),
        }
        assert!(dir.path().join(".git-prompt.sh").exists());
        assert!(!dir.path().join(".bashrc").exists());

        Ok(())
    }

    #[tokio::test]
    async fn failed_script_keeps_rc_file_untouched() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join(".bashrc"), "alias ll='ls -l'\n")?;
        let setup = git_setup(dir.path(), "https://x/404");
        let never = |_: &str| -> prompt::Result<bool> { panic!("must not ask") };
        let options = DeployOptions {
            force: true,
            interactive: false,
        };
        let mut deployer = Deployer::new(&MemoryFetcher, never, options, stamp());

        let result = setup.run(&mut deployer).await;

        assert!(matches!(
            result,
            Err(WorkflowError::Incomplete {
                failed: 1,
                total: 2
            })
        ));
        assert_eq!(
            fs::read_to_string(dir.path().join(".bashrc"))?,
            "alias ll='ls -l'\n"
        );

        Ok(())
    }

    #[tokio::test]
    async fn declined_vimrc_yields_instructions() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let vimrc = dir.path().join(".vimrc");
        fs::write(&vimrc, "syntax on\n")?;
        let setup = VimSetup::new(DeploymentTarget::new(
            TargetKind::VimConfig,
            "https://x/vimrc",
            &vimrc,
        ));
        let decline = |_: &str| -> prompt::Result<bool> { Ok(false) };
        let options = DeployOptions {
            force: false,
            interactive: true,
        };
        let mut deployer = Deployer::new(&MemoryFetcher, decline, options, stamp());

        let outcome = setup.run(&mut deployer).await?;

        assert_eq!(
            outcome,
            Outcome::Declined {
                instructions: format!(
                    "To finish the setup by hand:\n  download https://x/vimrc to {}\n",
                    vimrc.display()
                )
            }
        );
        assert_eq!(fs::read_to_string(&vimrc)?, "syntax on\n");

        Ok(())
    }
}
