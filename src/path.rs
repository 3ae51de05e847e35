// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Expand user supplied paths, and join public URL fragments for files that
//! get staged into the catalog.

use std::path::PathBuf;

/// Expand `~` and environment variables in a user supplied path.
///
/// # Errors
///
/// - Return [`ExpandError`] if a referenced environment variable is not set.
pub fn expand_path(path: impl AsRef<str>) -> Result<PathBuf> {
    shellexpand::full(path.as_ref())
        .map(|expanded| PathBuf::from(expanded.into_owned()))
        .map_err(|source| ExpandError {
            path: path.as_ref().to_string(),
            source,
        })
}

/// Join URL fragments with exactly one `/` between each of them.
///
/// Leading and trailing slashes of every fragment are stripped before
/// joining, so `https://host/repo/` and `/ota/` produce
/// `https://host/repo/ota`. Empty fragments are skipped.
pub fn url_join<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts
        .into_iter()
        .map(|part| part.as_ref().trim_matches('/').to_string())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Path expansion failed.
#[derive(Debug, thiserror::Error)]
#[error("cannot expand path {path:?}")]
pub struct ExpandError {
    path: String,
    #[source]
    source: shellexpand::LookupError<std::env::VarError>,
}

/// Friendly result alias :3
pub type Result<T, E = ExpandError> = std::result::Result<T, E>;
