// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use ota_publish::{
    config::PublishConfig,
    publish::{publish, PublishError},
    vcs::Git2History,
};

use anyhow::{Context, Result};
use clap::Parser;
use std::{fs::read_to_string, path::PathBuf, process::exit};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, fmt::writer::MakeWriterExt, prelude::*, EnvFilter};

/// Publish OTA binaries to a static hosting work tree, prune old builds, and
/// rebuild manifests.
#[derive(Debug, Clone, Parser)]
#[command(about, long_about, version)]
struct Cli {
    /// Path to downloaded artifacts (searched recursively for *.bin).
    #[arg(long, value_name = "dir")]
    pub artifacts: Option<PathBuf>,

    /// Path to static hosting work tree.
    #[arg(long, value_name = "dir")]
    pub site: Option<PathBuf>,

    /// Public base URL, e.g., https://user.github.io/repo.
    #[arg(long, value_name = "url")]
    pub base_url: Option<String>,

    /// Prune builds older than this many days (0 or less disables pruning).
    #[arg(long, value_name = "days", allow_negative_numbers = true)]
    pub retention_days: Option<i64>,

    /// Source repository to read commit metadata from [default: .].
    #[arg(long, value_name = "dir")]
    pub repo_root: Option<PathBuf>,

    /// Commit to publish instead of HEAD.
    #[arg(long, value_name = "sha")]
    pub commit_sha: Option<String>,

    /// Build identifier to use instead of describing the commit.
    #[arg(long, value_name = "id")]
    pub build_id: Option<String>,

    /// Allow '/' in build identifier to create nested build directories.
    #[arg(long)]
    pub allow_slashes: bool,

    /// TOML file providing defaults for the settings above.
    #[arg(short, long, value_name = "file")]
    pub config: Option<PathBuf>,
}

impl Cli {
    fn run(self) -> Result<()> {
        let file = match &self.config {
            Some(path) => read_to_string(path)
                .with_context(|| format!("failed to read config file {:?}", path.display()))?
                .parse::<PublishConfig>()
                .with_context(|| format!("invalid config file {:?}", path.display()))?,
            None => PublishConfig::default(),
        };

        let overrides = PublishConfig {
            artifacts: self.artifacts,
            site: self.site,
            base_url: self.base_url,
            retention_days: self.retention_days,
            repo_root: self.repo_root,
            allow_slashes: self.allow_slashes.then_some(true),
        };
        let (site, options) = file
            .merge(overrides)
            .resolve(self.commit_sha, self.build_id)?;

        let report = publish(&site, &Git2History::new(), &options)?;
        if !report.pruned.pruned.is_empty() {
            info!("Pruned {} expired builds", report.pruned.pruned.len());
        }

        Ok(())
    }
}

fn main() {
    // INVARIANT: Diagnostics go to stderr, progress goes to stdout.
    let writer = std::io::stderr
        .with_max_level(Level::WARN)
        .or_else(std::io::stdout);
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time()
        .with_writer(writer);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        let code = error
            .downcast_ref::<PublishError>()
            .map(PublishError::exit_code)
            .unwrap_or(1);
        exit(code);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}
