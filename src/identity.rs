// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Build identity resolution.
//!
//! Every release lands in the catalog under a __build identifier__. The
//! identifier is derived from a descriptive label of the released commit,
//! e.g., `v1.2.3`, `v1.2.3-4-gabc1234-dirty`, or a bare abbreviated hash, and
//! is sanitized so it can be used as both a directory name and a URL path
//! fragment.

use crate::vcs::{VcsError, VersionControl};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::Path,
};
use tracing::{info, warn};

/// Identifier used when sanitization leaves nothing behind.
pub const UNTAGGED: &str = "untagged";

/// Filesystem and URL safe name of one release.
///
/// # Invariant
///
/// - Never empty.
/// - Only contains ASCII alphanumerics, `.`, `_`, `-`, and `/` when slashes
///   were explicitly allowed.
/// - Never contains `..`, never starts or ends with `/`.
/// - Never `.`, and no `/` separated segment is `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildId(String);

impl BuildId {
    /// Sanitize raw descriptive label into build identifier.
    ///
    /// Runs of disallowed characters collapse into a single `-`, and
    /// leading or trailing `-` are trimmed. Any `..` is neutralized so the
    /// identifier can never walk out of the catalog. With `allow_slashes`
    /// set, `/` is kept so identifiers can nest, with repeated slashes
    /// collapsed and `.` segments dropped. A bare `.` is never an
    /// identifier.
    pub fn sanitize(raw: impl AsRef<str>, allow_slashes: bool) -> Self {
        let keep = |c: char| {
            c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') || (allow_slashes && c == '/')
        };

        let mut slug = String::with_capacity(raw.as_ref().len());
        let mut in_run = false;
        for c in raw.as_ref().chars() {
            if keep(c) {
                slug.push(c);
                in_run = false;
            } else if !in_run {
                slug.push('-');
                in_run = true;
            }
        }

        let slug = slug.trim_matches('-').replace("..", "-");

        // INVARIANT: No segment may name the directory it sits in.
        let slug = slug
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect::<Vec<_>>()
            .join("/");

        if slug.is_empty() {
            return Self(UNTAGGED.into());
        }

        Self(slug)
    }

    /// Treat build identifier as string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for BuildId {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

impl AsRef<Path> for BuildId {
    fn as_ref(&self) -> &Path {
        Path::new(self.as_str())
    }
}

/// Resolved identity of the release being published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Full commit identifier.
    pub commit: String,

    /// Raw descriptive label before sanitization.
    pub describe: String,

    /// Sanitized build identifier.
    pub id: BuildId,
}

/// Inputs to identity resolution.
#[derive(Debug, Clone, Copy)]
pub struct IdentityRequest<'a> {
    /// Repository to consult.
    pub repo_root: &'a Path,

    /// Use this commit identifier instead of resolving `HEAD`.
    pub commit: Option<&'a str>,

    /// Use this label instead of describing the commit.
    pub build_id: Option<&'a str>,

    /// Keep `/` in the build identifier.
    pub allow_slashes: bool,
}

impl<'a> IdentityRequest<'a> {
    /// Construct request that resolves `HEAD` and describes it.
    pub fn new(repo_root: &'a Path) -> Self {
        Self {
            repo_root,
            commit: None,
            build_id: None,
            allow_slashes: false,
        }
    }
}

/// Resolve identity of release without touching the filesystem.
///
/// # Errors
///
/// - Return [`IdentityError::Commit`] if no commit override was given and
///   `HEAD` cannot be resolved.
pub fn resolve_identity(vcs: &impl VersionControl, request: &IdentityRequest<'_>) -> Result<Identity> {
    let commit = match request.commit {
        Some(commit) => commit.to_string(),
        None => vcs
            .resolve_ref(request.repo_root, "HEAD")
            .map_err(IdentityError::Commit)?,
    };

    let describe = match request.build_id {
        Some(label) => label.to_string(),
        None => match vcs.describe(request.repo_root, &commit) {
            Ok(label) => label,
            Err(error) => {
                warn!("{error}, using commit {commit:?} as label");
                commit.clone()
            }
        },
    };

    let id = BuildId::sanitize(&describe, request.allow_slashes);
    info!("resolved build {id} from {describe:?} at {commit}");

    Ok(Identity {
        commit,
        describe,
        id,
    })
}

/// Identity resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Commit identifier cannot be resolved.
    #[error("could not resolve commit")]
    Commit(#[source] VcsError),
}

/// Friendly result alias :3
pub type Result<T, E = IdentityError> = std::result::Result<T, E>;
