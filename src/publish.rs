// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Release publishing pipeline.
//!
//! One publish run walks through a fixed sequence of stages:
//!
//! ```text
//! Start -> IdentityResolved -> ArtifactsCollected -> Staged -> ManifestWritten
//!       -> [Pruned] -> IndexRebuilt -> Done
//! ```
//!
//! Nothing in the catalog is touched before staging begins, so a failure to
//! resolve the commit or to find any artifact leaves the site exactly as it
//! was. A failure while staging may leave a partially copied build directory
//! behind. Publishing the same build again heals it.

use crate::{
    artifact::{collect_artifacts, ArtifactError},
    catalog::{manifest::BuildManifest, prune::PruneReport, Catalog, CatalogError},
    identity::{resolve_identity, Identity, IdentityError, IdentityRequest},
    vcs::VersionControl,
};

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Stage of a publish run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Nothing done yet.
    Start,

    /// Commit and build identifier are known.
    IdentityResolved,

    /// At least one artifact was found.
    ArtifactsCollected,

    /// Artifacts are copied into the build directory.
    Staged,

    /// Build manifest and latest pointer are written.
    ManifestWritten,

    /// Expired builds are deleted. Skipped when retention is disabled.
    Pruned,

    /// Global manifest reflects every surviving build.
    IndexRebuilt,

    /// Run finished.
    Done,
}

/// Settings of one publish run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    /// Directory searched recursively for firmware binaries.
    pub artifacts: PathBuf,

    /// Public base URL that the site is served from.
    pub base_url: String,

    /// Age in days after which builds are pruned. Zero disables pruning.
    pub retention_days: u32,

    /// Source repository consulted for commit and label.
    pub repo_root: PathBuf,

    /// Publish this commit instead of `HEAD`.
    pub commit: Option<String>,

    /// Use this label instead of describing the commit.
    pub build_id: Option<String>,

    /// Keep `/` in build identifiers to nest build directories.
    pub allow_slashes: bool,
}

/// Summary of a finished publish run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// Identity the build was published under.
    pub identity: Identity,

    /// Build manifest that was written.
    pub manifest: BuildManifest,

    /// Outcome of pruning.
    pub pruned: PruneReport,

    /// Number of entries in rebuilt global manifest.
    pub indexed: usize,
}

/// Publish artifacts into a catalog.
#[derive(Debug)]
pub struct Publisher<'a, V>
where
    V: VersionControl,
{
    catalog: &'a Catalog,
    vcs: &'a V,
}

impl<'a, V> Publisher<'a, V>
where
    V: VersionControl,
{
    /// Construct new publisher over catalog.
    pub fn new(catalog: &'a Catalog, vcs: &'a V) -> Self {
        Self { catalog, vcs }
    }

    /// Run every stage of a publish.
    ///
    /// # Errors
    ///
    /// - Return [`PublishError::Identity`] if commit cannot be resolved.
    /// - Return [`PublishError::NoArtifacts`] if no firmware binary exists
    ///   under artifact root.
    /// - Return [`PublishError::Artifact`] if artifact root cannot be
    ///   searched.
    /// - Return [`PublishError::Catalog`] if staging or indexing fails.
    pub fn publish(&self, options: &PublishOptions) -> Result<PublishReport> {
        let mut stage = Stage::Start;
        debug!("publish stage {stage:?}");

        let request = IdentityRequest {
            repo_root: options.repo_root.as_path(),
            commit: options.commit.as_deref(),
            build_id: options.build_id.as_deref(),
            allow_slashes: options.allow_slashes,
        };
        let identity = resolve_identity(self.vcs, &request)?;
        advance(&mut stage, Stage::IdentityResolved);

        let artifacts = collect_artifacts(&options.artifacts)?;
        if artifacts.is_empty() {
            return Err(PublishError::NoArtifacts {
                root: options.artifacts.clone(),
            });
        }
        advance(&mut stage, Stage::ArtifactsCollected);

        let files = self
            .catalog
            .stage_files(&identity, &artifacts, &options.base_url)?;
        advance(&mut stage, Stage::Staged);

        let manifest = BuildManifest::new(&identity, Utc::now(), files);
        self.catalog.write_manifests(&identity.id, &manifest)?;
        advance(&mut stage, Stage::ManifestWritten);

        let pruned = self
            .catalog
            .prune(self.vcs, options.retention_days, Utc::now())?;
        if options.retention_days > 0 {
            if !pruned.failed.is_empty() {
                warn!("{} expired builds could not be pruned", pruned.failed.len());
            }
            advance(&mut stage, Stage::Pruned);
        }

        let indexed = self.catalog.rebuild_index()?.len();
        advance(&mut stage, Stage::IndexRebuilt);

        info!("Done.");
        advance(&mut stage, Stage::Done);

        Ok(PublishReport {
            identity,
            manifest,
            pruned,
            indexed,
        })
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!("publish stage {stage:?} -> {next:?}");
    *stage = next;
}

/// Publish error types.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Release identity cannot be resolved.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Nothing to publish.
    #[error("no .bin files found under {:?}", root.display())]
    NoArtifacts { root: PathBuf },

    /// Artifact root cannot be searched.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Catalog cannot be updated.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl PublishError {
    /// Process exit code to report this error with.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Identity(_) => 2,
            Self::NoArtifacts { .. } | Self::Artifact(_) | Self::Catalog(_) => 1,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = PublishError> = std::result::Result<T, E>;

/// Convenience wrapper to publish into site directory in one call.
///
/// # Errors
///
/// - Return [`PublishError`] under the same conditions as
///   [`Publisher::publish`].
pub fn publish(
    site: impl AsRef<Path>,
    vcs: &impl VersionControl,
    options: &PublishOptions,
) -> Result<PublishReport> {
    let catalog = Catalog::new(site.as_ref());
    Publisher::new(&catalog, vcs).publish(options)
}
