// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Source build recipes.
//!
//! A recipe names a package, where its release archives live, and how its
//! build gets configured. Archive locations are templates where `{version}`
//! gets replaced by the resolved version.

use std::{
    convert::Infallible,
    fmt::{Display, Formatter, Result as FmtResult},
    path::Path,
    str::FromStr,
};

const NCURSES_ARCHIVE: &str =
    "https://invisible-island.net/archives/ncurses/ncurses-{version}.tar.gz";
const VIM_ARCHIVE: &str = "https://github.com/vim/vim/archive/refs/tags/{version}.tar.gz";
const VIM_TAGS: &str = "https://api.github.com/repos/vim/vim/tags";

/// Default pinned ncurses release.
pub const NCURSES_VERSION: &str = "6.4";

/// Version to build.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    /// Newest tag reported by the recipe's tag listing.
    #[default]
    Latest,

    /// Exact version.
    Pinned(String),
}

impl FromStr for VersionSpec {
    type Err = Infallible;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let data = data.trim();
        if data.is_empty() || data.eq_ignore_ascii_case("latest") {
            Ok(Self::Latest)
        } else {
            Ok(Self::Pinned(data.to_owned()))
        }
    }
}

impl Display for VersionSpec {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Latest => fmt.write_str("latest"),
            Self::Pinned(version) => fmt.write_str(version),
        }
    }
}

/// How to build one package from source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    name: String,
    version: VersionSpec,
    archive: String,
    tags_url: Option<String>,
    configure_args: Vec<String>,
    env: Vec<(String, String)>,
}

impl Recipe {
    /// Construct new recipe.
    pub fn new(
        name: impl Into<String>,
        version: VersionSpec,
        archive: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            archive: archive.into(),
            tags_url: None,
            configure_args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Recipe for ncurses installed into `prefix`.
    pub fn ncurses(version: impl Into<String>, prefix: &Path) -> Self {
        Self::new("ncurses", VersionSpec::Pinned(version.into()), NCURSES_ARCHIVE)
            .configure_args([
                format!("--prefix={}", prefix.display()),
                "--with-shared".into(),
                "--without-debug".into(),
                "--without-ada".into(),
                "--enable-overwrite".into(),
            ])
    }

    /// Recipe for vim linked against ncurses in `prefix`.
    pub fn vim(version: VersionSpec, prefix: &Path) -> Self {
        let prefix = prefix.display();
        Self::new("vim", version, VIM_ARCHIVE)
            .tags_url(VIM_TAGS)
            .configure_args([
                format!("--prefix={prefix}"),
                "--with-features=huge".into(),
                "--enable-multibyte".into(),
                "--with-tlib=ncurses".into(),
                "--without-x".into(),
                "--disable-gui".into(),
            ])
            .env("CPPFLAGS", format!("-I{prefix}/include"))
            .env("LDFLAGS", format!("-L{prefix}/lib -Wl,-rpath,{prefix}/lib"))
    }

    /// Use tag listing to resolve [`VersionSpec::Latest`].
    pub fn tags_url(mut self, url: impl Into<String>) -> Self {
        self.tags_url = Some(url.into());
        self
    }

    pub fn configure_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.configure_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn version(&self) -> &VersionSpec {
        &self.version
    }

    pub fn tags(&self) -> Option<&str> {
        self.tags_url.as_deref()
    }

    pub fn configure(&self) -> &[String] {
        self.configure_args.as_slice()
    }

    pub fn envs(&self) -> &[(String, String)] {
        self.env.as_slice()
    }

    /// Archive location of target version.
    pub fn archive_url(&self, version: &str) -> String {
        self.archive.replace("{version}", version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case("latest", VersionSpec::Latest; "latest keyword")]
    #[test_case("LATEST", VersionSpec::Latest; "keyword ignores case")]
    #[test_case("", VersionSpec::Latest; "empty")]
    #[test_case("v9.1.0000", VersionSpec::Pinned("v9.1.0000".into()); "pinned tag")]
    #[test]
    fn parse_version_spec(input: &str, expect: VersionSpec) {
        let result: VersionSpec = input.parse().unwrap();
        assert_eq!(result, expect);
    }

    #[test]
    fn vim_recipe_targets_prefix() {
        let recipe = Recipe::vim(VersionSpec::Latest, Path::new("/home/blah/.local"));

        assert_eq!(
            recipe.archive_url("v9.1.0000"),
            "https://github.com/vim/vim/archive/refs/tags/v9.1.0000.tar.gz"
        );
        assert_eq!(recipe.tags(), Some(VIM_TAGS));
        assert!(recipe
            .configure()
            .contains(&"--prefix=/home/blah/.local".to_string()));
        assert!(recipe
            .envs()
            .contains(&("CPPFLAGS".to_string(), "-I/home/blah/.local/include".to_string())));
    }

    #[test]
    fn ncurses_recipe_is_pinned() {
        let recipe = Recipe::ncurses(NCURSES_VERSION, Path::new("/opt"));

        assert_eq!(recipe.version(), &VersionSpec::Pinned("6.4".into()));
        assert_eq!(recipe.tags(), None);
        assert_eq!(
            recipe.archive_url("6.4"),
            "https://invisible-island.net/archives/ncurses/ncurses-6.4.tar.gz"
        );
    }
}
