// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Artifact discovery and content hashing.

use glob::{glob, Pattern};
use sha2::{Digest, Sha256};
use std::{
    fs::File,
    io::{ErrorKind, Read},
    path::{Path, PathBuf},
};
use tracing::debug;

/// File extension of publishable firmware binaries.
pub const ARTIFACT_EXTENSION: &str = "bin";

const CHUNK_SIZE: usize = 1024 * 1024;

/// Recursively find every firmware binary under `root`.
///
/// Order of returned paths is unspecified. An empty result is not an error
/// here, the caller decides whether nothing to publish is fatal.
///
/// # Errors
///
/// - Return [`ArtifactError::Pattern`] if `root` cannot be turned into a
///   search pattern.
/// - Return [`ArtifactError::Walk`] if a directory under `root` cannot be
///   read.
pub fn collect_artifacts(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    let pattern = format!(
        "{}/**/*.{ARTIFACT_EXTENSION}",
        Pattern::escape(root.to_string_lossy().as_ref())
    );

    let mut artifacts = Vec::new();
    for entry in glob(&pattern).map_err(ArtifactError::Pattern)? {
        let path = entry.map_err(ArtifactError::Walk)?;
        if path.is_file() {
            debug!("found artifact {:?}", path.display());
            artifacts.push(path);
        }
    }

    Ok(artifacts)
}

/// Compute lowercase hex SHA-256 digest of file content.
///
/// File is streamed in bounded chunks, so memory use does not grow with file
/// size.
///
/// # Errors
///
/// - Return [`ArtifactError::Read`] if file cannot be opened or read.
pub fn sha256_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let read_error = |source| ArtifactError::Read {
        source,
        path: path.to_path_buf(),
    };

    let mut file = File::open(path).map_err(read_error)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let count = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(count) => count,
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(error) => return Err(read_error(error)),
        };
        hasher.update(&buffer[..count]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Artifact handling error types.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Artifact root does not form a valid search pattern.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// Directory under artifact root cannot be traversed.
    #[error(transparent)]
    Walk(#[from] glob::GlobError),

    /// Artifact cannot be read.
    #[error("failed to read artifact at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ArtifactError> = std::result::Result<T, E>;
