// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Operator confirmation.
//!
//! Every destructive action that is not forced must be confirmed by the
//! operator first. The workflows never talk to the terminal directly, they
//! ask a [`Confirmation`] capability instead. Any closure from prompt text to
//! boolean is a valid capability, which keeps the decision logic testable
//! without a real terminal.

use inquire::{Confirm, InquireError};
use tracing::{debug, instrument};

/// Ask the operator a yes/no question.
pub trait Confirmation {
    /// Ask question, returning true if the operator agreed.
    ///
    /// # Errors
    ///
    /// - Return [`PromptError::Interrupted`] if the operator hit Ctrl-C.
    /// - Return [`PromptError::Inquire`] if the terminal cannot be used.
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

impl<F> Confirmation for F
where
    F: FnMut(&str) -> Result<bool>,
{
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        self(prompt)
    }
}

/// Confirmation through an interactive terminal prompt.
///
/// Defaults to "no". Escaping the prompt counts as declining.
#[derive(Debug, Default, Clone, Copy)]
pub struct InquireConfirmation;

impl InquireConfirmation {
    /// Construct new terminal confirmation.
    pub fn new() -> Self {
        Self
    }
}

impl Confirmation for InquireConfirmation {
    #[instrument(skip(self), level = "debug")]
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        match Confirm::new(prompt).with_default(false).prompt() {
            Ok(answer) => Ok(answer),
            Err(InquireError::OperationCanceled) => {
                debug!("prompt canceled, treating as no");
                Ok(false)
            }
            Err(InquireError::OperationInterrupted) => Err(PromptError::Interrupted),
            Err(error) => Err(PromptError::Inquire(error)),
        }
    }
}

/// Confirmation error types.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// Operator interrupted the prompt.
    #[error("interrupted by operator")]
    Interrupted,

    /// Terminal prompt failed.
    #[error(transparent)]
    Inquire(#[from] InquireError),
}

/// Friendly result alias :3
pub type Result<T, E = PromptError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn closures_act_as_confirmation() -> anyhow::Result<()> {
        let mut asked = Vec::new();
        let mut confirm = |prompt: &str| -> Result<bool> {
            asked.push(prompt.to_owned());
            Ok(prompt.starts_with("yes"))
        };

        assert!(confirm.confirm("yes please")?);
        assert!(!confirm.confirm("no thanks")?);
        assert_eq!(asked, vec!["yes please", "no thanks"]);

        Ok(())
    }
}
