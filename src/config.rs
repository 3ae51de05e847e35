// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the optional publisher configuration file. Release
//! pipelines usually publish to the same site with the same base URL every
//! time, so those settings can live in a TOML file instead of being repeated
//! on every invocation. Per-release values like commit or build identifier
//! overrides are command line only. File I/O is left to the caller.
//!
//! # General Layout
//!
//! ```toml
//! artifacts = "build/artifacts"
//! site = "$HOME/pages"
//! base_url = "https://user.github.io/repo"
//! retention_days = 30
//! repo_root = "~/src/firmware"
//! allow_slashes = false
//! ```
//!
//! Every key is optional. Path valued keys are shell expanded.

use crate::{path::expand_path, publish::PublishOptions};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Publisher settings read from configuration file.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PublishConfig {
    /// Directory searched recursively for firmware binaries.
    pub artifacts: Option<PathBuf>,

    /// Static hosting work tree.
    pub site: Option<PathBuf>,

    /// Public base URL of static hosting.
    pub base_url: Option<String>,

    /// Prune builds older than this many days. Zero or less disables
    /// pruning.
    pub retention_days: Option<i64>,

    /// Source repository to read commit metadata from.
    pub repo_root: Option<PathBuf>,

    /// Allow `/` in build identifiers.
    pub allow_slashes: Option<bool>,
}

impl PublishConfig {
    /// Layer `overrides` on top of this configuration.
    ///
    /// Every setting present in `overrides` wins.
    pub fn merge(self, overrides: PublishConfig) -> Self {
        Self {
            artifacts: overrides.artifacts.or(self.artifacts),
            site: overrides.site.or(self.site),
            base_url: overrides.base_url.or(self.base_url),
            retention_days: overrides.retention_days.or(self.retention_days),
            repo_root: overrides.repo_root.or(self.repo_root),
            allow_slashes: overrides.allow_slashes.or(self.allow_slashes),
        }
    }

    /// Resolve final settings of a publish run.
    ///
    /// Retention defaults to zero (no pruning), repository root to the
    /// current directory, and slashes to being disallowed. Negative retention
    /// also disables pruning.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Missing`] if artifact root, site, or base URL
    ///   are not set.
    pub fn resolve(
        self,
        commit: Option<String>,
        build_id: Option<String>,
    ) -> Result<(PathBuf, PublishOptions)> {
        let site = self.site.ok_or(ConfigError::Missing("site"))?;
        let options = PublishOptions {
            artifacts: self.artifacts.ok_or(ConfigError::Missing("artifacts"))?,
            base_url: self.base_url.ok_or(ConfigError::Missing("base_url"))?,
            retention_days: self
                .retention_days
                .map(|days| u32::try_from(days.max(0)).unwrap_or(u32::MAX))
                .unwrap_or(0),
            repo_root: self.repo_root.unwrap_or_else(|| PathBuf::from(".")),
            commit,
            build_id,
            allow_slashes: self.allow_slashes.unwrap_or(false),
        };

        Ok((site, options))
    }
}

impl FromStr for PublishConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: PublishConfig = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        for path in [
            &mut config.artifacts,
            &mut config.site,
            &mut config.repo_root,
        ]
        .into_iter()
        .flatten()
        {
            *path = expand_path(path.to_string_lossy())?;
        }

        Ok(config)
    }
}

impl Display for PublishConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] crate::path::ExpandError),

    /// Required setting is absent from both command line and file.
    #[error("missing required setting {0:?}")]
    Missing(&'static str),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    #[sealed_test(env = [("PAGES", "/srv/pages")])]
    fn deserialize_publish_config() -> anyhow::Result<()> {
        let result: PublishConfig = r#"
            artifacts = "build/artifacts"
            site = "$PAGES/site"
            base_url = "https://user.github.io/repo"
            retention_days = 30
            allow_slashes = true
        "#
        .parse()?;

        let expect = PublishConfig {
            artifacts: Some("build/artifacts".into()),
            site: Some("/srv/pages/site".into()),
            base_url: Some("https://user.github.io/repo".into()),
            retention_days: Some(30),
            repo_root: None,
            allow_slashes: Some(true),
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn reject_unknown_keys() {
        let result = "retention = 3".parse::<PublishConfig>();
        assert!(matches!(result, Err(ConfigError::Deserialize(_))));
    }

    #[test]
    fn serialize_publish_config() {
        let result = PublishConfig {
            artifacts: Some("artifacts".into()),
            site: Some("site".into()),
            base_url: Some("https://host".into()),
            retention_days: Some(7),
            repo_root: None,
            allow_slashes: None,
        }
        .to_string();

        let expect = indoc! {r#"
            artifacts = "artifacts"
            site = "site"
            base_url = "https://host"
            retention_days = 7
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn command_line_overrides_file() -> anyhow::Result<()> {
        let file = PublishConfig {
            artifacts: Some("file-artifacts".into()),
            site: Some("file-site".into()),
            base_url: Some("https://file".into()),
            retention_days: Some(30),
            repo_root: None,
            allow_slashes: Some(true),
        };
        let cli = PublishConfig {
            site: Some("cli-site".into()),
            retention_days: Some(0),
            ..Default::default()
        };

        let (site, options) = file.merge(cli).resolve(Some("abc".into()), None)?;
        assert_eq!(site, PathBuf::from("cli-site"));
        assert_eq!(
            options,
            PublishOptions {
                artifacts: "file-artifacts".into(),
                base_url: "https://file".into(),
                retention_days: 0,
                repo_root: ".".into(),
                commit: Some("abc".into()),
                build_id: None,
                allow_slashes: true,
            }
        );

        Ok(())
    }

    #[test]
    fn resolve_requires_base_url() {
        let config = PublishConfig {
            artifacts: Some("artifacts".into()),
            site: Some("site".into()),
            ..Default::default()
        };

        assert!(matches!(
            config.resolve(None, None),
            Err(ConfigError::Missing("base_url"))
        ));
    }

    #[test_case(-1, 0; "negative disables")]
    #[test_case(0, 0; "zero disables")]
    #[test_case(30, 30; "positive kept")]
    #[test_case(i64::MAX, u32::MAX; "huge saturates")]
    #[test]
    fn resolve_clamps_retention_days(days: i64, expect: u32) {
        let config = PublishConfig {
            artifacts: Some("artifacts".into()),
            site: Some("site".into()),
            base_url: Some("https://host".into()),
            retention_days: Some(days),
            ..Default::default()
        };

        let options = config.resolve(None, None).map(|(_, options)| options);
        self::assert_eq!(options.map(|options| options.retention_days).ok(), Some(expect));
    }
}
