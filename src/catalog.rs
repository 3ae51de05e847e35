// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Catalog of published builds.
//!
//! The __catalog__ is the static-hosting work tree that a separate deployment
//! step publishes. It holds every released build under its own directory
//! alongside two root-level documents that clients query.
//!
//! # Catalog Layout
//!
//! ```text
//! <site>/manifest.json                  global manifest, newest build first
//! <site>/latest.json                    copy of most recently published build manifest
//! <site>/ota/<build-id>/manifest.json   build manifest
//! <site>/ota/<build-id>/*.bin           staged binaries
//! ```
//!
//! A directory under `ota/` is a build directory if and only if it directly
//! contains a `manifest.json`. Build identifiers may nest when slashes are
//! allowed, so build directories can sit at any depth.
//!
//! # Concurrency
//!
//! The catalog is assumed to be owned by one publisher at a time. No locking
//! is performed, so overlapping runs against the same site must be
//! serialized by the caller.

pub mod index;
pub mod manifest;
pub mod prune;

use crate::{
    artifact::{sha256_file, ArtifactError, ARTIFACT_EXTENSION},
    catalog::manifest::{write_json, ArtifactRecord, BuildManifest, ManifestError},
    identity::{BuildId, Identity},
    path::url_join,
};

use chrono::{DateTime, Utc};
use glob::{glob, Pattern};
use std::{
    collections::BTreeMap,
    fs::{copy, metadata, read_dir, remove_file, File},
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Directory under site root holding per-build directories.
pub const OTA_DIR: &str = "ota";

/// File name of build manifests and of the global manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

/// File name of latest pointer.
pub const LATEST_FILE: &str = "latest.json";

/// Handle to an on-disk catalog.
///
/// Scoped to one publisher invocation. All paths the publisher touches are
/// derived from the site root held here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    root: PathBuf,
}

impl Catalog {
    /// Construct new catalog handle rooted at site directory.
    ///
    /// Nothing is created on disk until something is staged.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Site root directory.
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Directory holding all build directories.
    pub fn ota_dir(&self) -> PathBuf {
        self.root.join(OTA_DIR)
    }

    /// Directory of a given build.
    pub fn build_dir(&self, id: &BuildId) -> PathBuf {
        self.ota_dir().join(id)
    }

    /// Path to latest pointer.
    pub fn latest_path(&self) -> PathBuf {
        self.root.join(LATEST_FILE)
    }

    /// Path to global manifest.
    pub fn index_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// List every build manifest currently in the catalog.
    ///
    /// Entries that cannot be traversed are skipped with a warning.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::Pattern`] if site root cannot be turned into
    ///   a search pattern.
    pub fn manifest_paths(&self) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}/{OTA_DIR}/**/{MANIFEST_FILE}",
            Pattern::escape(self.root.to_string_lossy().as_ref())
        );

        let mut paths = Vec::new();
        for entry in glob(&pattern)? {
            match entry {
                Ok(path) if path.is_file() => paths.push(path),
                Ok(_) => continue,
                Err(error) => warn!("skipping unreadable catalog entry: {error}"),
            }
        }

        Ok(paths)
    }

    /// Stage artifacts as a build, and write its manifest plus latest pointer.
    ///
    /// Shorthand for [`Catalog::stage_files`] followed by
    /// [`Catalog::write_manifests`].
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError`] under the same conditions as the two steps.
    pub fn stage(
        &self,
        identity: &Identity,
        artifacts: &[PathBuf],
        base_url: &str,
        published: DateTime<Utc>,
    ) -> Result<BuildManifest> {
        let files = self.stage_files(identity, artifacts, base_url)?;
        let manifest = BuildManifest::new(identity, published, files);
        self.write_manifests(&identity.id, &manifest)?;

        Ok(manifest)
    }

    /// Copy artifacts into build directory and describe the staged copies.
    ///
    /// Republishing an existing build identifier replaces that build in
    /// place: same named files are overwritten, and binaries left over from
    /// the previous publish that are not part of `artifacts` are removed.
    /// Artifacts sharing a base name collapse into one staged file. Records
    /// are sorted by name.
    ///
    /// Digests are computed from the staged copies, so the manifest certifies
    /// what was actually published.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::CreateDir`] if build directory cannot be
    ///   created.
    /// - Return [`CatalogError::Copy`] if an artifact cannot be staged.
    /// - Return [`CatalogError::RemoveStale`] if a leftover binary cannot be
    ///   removed.
    /// - Return [`CatalogError::Hash`] if a staged file cannot be hashed.
    #[instrument(skip(self, identity, artifacts), level = "debug")]
    pub fn stage_files(
        &self,
        identity: &Identity,
        artifacts: &[PathBuf],
        base_url: &str,
    ) -> Result<Vec<ArtifactRecord>> {
        let dest = self.build_dir(&identity.id);
        mkdirp::mkdirp(&dest).map_err(|source| CatalogError::CreateDir {
            source,
            path: dest.clone(),
        })?;

        // INVARIANT: Last artifact wins when base names collide.
        let mut sources = artifacts.to_vec();
        sources.sort();
        let staged = sources
            .iter()
            .filter_map(|path| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                Some((name, path.as_path()))
            })
            .collect::<BTreeMap<_, _>>();

        self.remove_stale(&dest, &staged)?;

        for (name, source) in &staged {
            let target = dest.join(name);
            copy_preserving_mtime(source, &target)?;
            info!("Copied {} -> {}", source.display(), target.display());
        }

        let mut files = Vec::with_capacity(staged.len());
        for name in staged.keys() {
            files.push(ArtifactRecord {
                name: name.clone(),
                url: url_join([base_url, OTA_DIR, identity.id.as_str(), name.as_str()]),
                sha256: sha256_file(dest.join(name))?,
            });
        }

        Ok(files)
    }

    /// Write build manifest into its build directory and as latest pointer.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::Manifest`] if either document cannot be
    ///   written.
    pub fn write_manifests(&self, id: &BuildId, manifest: &BuildManifest) -> Result<()> {
        write_json(self.build_dir(id).join(MANIFEST_FILE), manifest)?;
        write_json(self.latest_path(), manifest)?;

        Ok(())
    }

    fn remove_stale(&self, dest: &Path, staged: &BTreeMap<String, &Path>) -> Result<()> {
        let entries = read_dir(dest).map_err(|source| CatalogError::RemoveStale {
            source,
            path: dest.to_path_buf(),
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            let is_binary = path.is_file()
                && path.extension().is_some_and(|ext| ext == ARTIFACT_EXTENSION);
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_binary && !staged.contains_key(&name) {
                remove_file(&path).map_err(|source| CatalogError::RemoveStale {
                    source,
                    path: path.clone(),
                })?;
                info!("Removed stale {}", path.display());
            }
        }

        Ok(())
    }
}

fn copy_preserving_mtime(source: &Path, target: &Path) -> Result<()> {
    let copy_error = |source_error| CatalogError::Copy {
        source: source_error,
        from: source.to_path_buf(),
        to: target.to_path_buf(),
    };

    copy(source, target).map_err(copy_error)?;
    let modified = metadata(source)
        .and_then(|meta| meta.modified())
        .map_err(copy_error)?;
    File::options()
        .write(true)
        .open(target)
        .and_then(|file| file.set_modified(modified))
        .map_err(copy_error)?;

    Ok(())
}

/// Catalog manipulation error types.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Build directory cannot be created.
    #[error("failed to create build directory at {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Artifact cannot be copied into build directory.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Leftover binary of previous publish cannot be removed.
    #[error("failed to remove stale file at {:?}", path.display())]
    RemoveStale {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Staged artifact cannot be hashed.
    #[error(transparent)]
    Hash(#[from] ArtifactError),

    /// Manifest cannot be persisted.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Site root does not form a valid search pattern.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}

/// Friendly result alias :3
pub type Result<T, E = CatalogError> = std::result::Result<T, E>;
