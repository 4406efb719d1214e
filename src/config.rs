// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for the configuration file that dotsmith reads to find
//! out where assets come from, and where they should land. Every field is
//! optional, such that an empty file (or no file at all) yields the built-in
//! defaults.
//!
//! # General Layout
//!
//! The configuration file is composed of three tables: settings, git, and
//! vim. The settings table holds values shared by every workflow, e.g., the
//! shell resource file to append configuration blocks to. The git and vim
//! tables describe the assets each workflow deploys.
//!
//! All path fields undergo shell expansion when loaded, so `$HOME` and `~`
//! can be used freely.

use crate::path::home_dir;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

const GIT_COMPLETION_URL: &str =
    "https://raw.githubusercontent.com/git/git/v2.43.0/contrib/completion/git-completion.bash";
const GIT_PROMPT_URL: &str =
    "https://raw.githubusercontent.com/git/git/v2.43.0/contrib/completion/git-prompt.sh";
const VIMRC_URL: &str = "https://raw.githubusercontent.com/amix/vimrc/master/vimrcs/basic.vim";

/// Setup definition layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SetupDefinition {
    /// Settings shared by all workflows.
    #[serde(default)]
    pub settings: Settings,

    /// Git prompt workflow assets.
    #[serde(default)]
    pub git: GitAssets,

    /// Vim workflow assets.
    #[serde(default)]
    pub vim: VimAssets,
}

impl SetupDefinition {
    /// Load setup definition from file.
    ///
    /// A missing file yields the default definition if and only if `required`
    /// is false. Explicitly requested files must exist.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file is not valid.
    pub fn load(path: impl AsRef<Path>, required: bool) -> Result<Self> {
        let path = path.as_ref();
        if !required && !path.exists() {
            debug!("no configuration at {:?}, using defaults", path.display());
            return Ok(Self::default());
        }

        let data = read_to_string(path).map_err(|err| ConfigError::Read {
            source: err,
            path: path.to_path_buf(),
        })?;

        data.parse()
    }
}

impl FromStr for SetupDefinition {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut definition: SetupDefinition =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        let settings = &mut definition.settings;
        expand_opt(&mut settings.rc_file)?;
        expand_opt(&mut settings.prefix)?;
        expand_opt(&mut definition.git.completion_path)?;
        expand_opt(&mut definition.git.prompt_path)?;
        expand_opt(&mut definition.vim.vimrc_path)?;

        Ok(definition)
    }
}

impl Display for SetupDefinition {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Settings shared by all workflows.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Shell resource file to append configuration blocks to.
    pub rc_file: Option<PathBuf>,

    /// User-local prefix that source builds install into.
    pub prefix: Option<PathBuf>,
}

impl Settings {
    /// Shell resource file, defaulting to `~/.bashrc`.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::NoWayHome`] if home cannot be determined.
    pub fn rc_file(&self) -> Result<PathBuf> {
        or_home(&self.rc_file, ".bashrc")
    }

    /// Install prefix, defaulting to `~/.local`.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::NoWayHome`] if home cannot be determined.
    pub fn prefix(&self) -> Result<PathBuf> {
        or_home(&self.prefix, ".local")
    }
}

/// Git completion and prompt script locations.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct GitAssets {
    pub completion_url: Option<String>,
    pub prompt_url: Option<String>,
    pub completion_path: Option<PathBuf>,
    pub prompt_path: Option<PathBuf>,
}

impl GitAssets {
    pub fn completion_url(&self) -> &str {
        self.completion_url.as_deref().unwrap_or(GIT_COMPLETION_URL)
    }

    pub fn prompt_url(&self) -> &str {
        self.prompt_url.as_deref().unwrap_or(GIT_PROMPT_URL)
    }

    pub fn completion_path(&self) -> Result<PathBuf> {
        or_home(&self.completion_path, ".git-completion.bash")
    }

    pub fn prompt_path(&self) -> Result<PathBuf> {
        or_home(&self.prompt_path, ".git-prompt.sh")
    }
}

/// Vim configuration and source build settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct VimAssets {
    pub vimrc_url: Option<String>,
    pub vimrc_path: Option<PathBuf>,

    /// Vim tag to build, or "latest".
    pub version: Option<String>,

    /// Pinned ncurses release to build vim against.
    pub ncurses_version: Option<String>,
}

impl VimAssets {
    pub fn vimrc_url(&self) -> &str {
        self.vimrc_url.as_deref().unwrap_or(VIMRC_URL)
    }

    pub fn vimrc_path(&self) -> Result<PathBuf> {
        or_home(&self.vimrc_path, ".vimrc")
    }
}

fn or_home(value: &Option<PathBuf>, default: &str) -> Result<PathBuf> {
    match value {
        Some(path) => Ok(path.clone()),
        None => Ok(home_dir()?.join(default)),
    }
}

fn expand_opt(value: &mut Option<PathBuf>) -> Result<()> {
    if let Some(path) = value.as_mut() {
        *path = PathBuf::from(
            shellexpand::full(path.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        );
    }

    Ok(())
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Failed to determine default path.
    #[error(transparent)]
    NoWayHome(#[from] crate::path::NoWayHome),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("BLAH", "/home/blah")])]
    fn deserialize_setup_definition() -> anyhow::Result<()> {
        let result: SetupDefinition = r#"
            [settings]
            rc_file = "$BLAH/.bashrc"
            prefix = "$BLAH/opt"

            [git]
            prompt_url = "https://blah.org/git-prompt.sh"
            prompt_path = "$BLAH/.config/git-prompt.sh"

            [vim]
            version = "v9.1.0000"
        "#
        .parse()?;

        let expect = SetupDefinition {
            settings: Settings {
                rc_file: Some("/home/blah/.bashrc".into()),
                prefix: Some("/home/blah/opt".into()),
            },
            git: GitAssets {
                prompt_url: Some("https://blah.org/git-prompt.sh".into()),
                prompt_path: Some("/home/blah/.config/git-prompt.sh".into()),
                ..Default::default()
            },
            vim: VimAssets {
                version: Some("v9.1.0000".into()),
                ..Default::default()
            },
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[sealed_test(env = [("HOME", "/home/blah")])]
    fn empty_definition_falls_back_to_defaults() -> anyhow::Result<()> {
        let result: SetupDefinition = "".parse()?;

        assert_eq!(result.settings.rc_file()?, PathBuf::from("/home/blah/.bashrc"));
        assert_eq!(result.settings.prefix()?, PathBuf::from("/home/blah/.local"));
        assert_eq!(
            result.git.completion_path()?,
            PathBuf::from("/home/blah/.git-completion.bash")
        );
        assert_eq!(result.git.prompt_path()?, PathBuf::from("/home/blah/.git-prompt.sh"));
        assert_eq!(result.vim.vimrc_path()?, PathBuf::from("/home/blah/.vimrc"));
        assert_eq!(result.git.prompt_url(), GIT_PROMPT_URL);
        assert_eq!(result.vim.vimrc_url(), VIMRC_URL);

        Ok(())
    }

    #[sealed_test]
    fn load_missing_file() -> anyhow::Result<()> {
        let optional = SetupDefinition::load("nope.toml", false)?;
        assert_eq!(optional, SetupDefinition::default());

        let required = SetupDefinition::load("nope.toml", true);
        assert!(matches!(required, Err(ConfigError::Read { .. })));

        Ok(())
    }

    #[test]
    fn serialized_definition_parses_back() -> anyhow::Result<()> {
        let definition = SetupDefinition {
            settings: Settings {
                rc_file: Some("/home/blah/.bashrc".into()),
                prefix: None,
            },
            git: GitAssets::default(),
            vim: VimAssets {
                ncurses_version: Some("6.4".into()),
                ..Default::default()
            },
        };
        let text = definition.to_string();

        assert!(text.contains(r#"rc_file = "/home/blah/.bashrc""#));
        assert!(text.contains(r#"ncurses_version = "6.4""#));
        assert_eq!(text.parse::<SetupDefinition>()?, definition);

        Ok(())
    }
}
