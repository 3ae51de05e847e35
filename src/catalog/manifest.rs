// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Manifest layout.
//!
//! Specify the layout of the JSON documents that describe published builds,
//! and how they are read from and written to disk.
//!
//! # Build Manifest Layout
//!
//! ```json
//! {
//!   "commit": "<full commit identifier>",
//!   "describe": "<raw descriptive label>",
//!   "id": "<build identifier>",
//!   "date": "YYYY-MM-DDTHH:MM:SSZ",
//!   "files": [
//!     { "name": "firmware.bin", "url": "<base>/ota/<id>/firmware.bin", "sha256": "<hex>" }
//!   ]
//! }
//! ```
//!
//! The latest pointer is a verbatim copy of the newest build manifest, and
//! the global manifest is an array of build manifests.

use crate::identity::Identity;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::{read_to_string, rename, write},
    path::{Path, PathBuf},
};

/// Format of every date stored in a manifest.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One published binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Base file name.
    pub name: String,

    /// Absolute public URL.
    pub url: String,

    /// Lowercase hex SHA-256 digest of staged copy.
    pub sha256: String,
}

/// Description of one published build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    /// Resolved commit identifier.
    pub commit: String,

    /// Raw descriptive label before sanitization.
    pub describe: String,

    /// Build identifier.
    pub id: String,

    /// Publish time in UTC.
    pub date: String,

    /// Staged files ordered by name.
    pub files: Vec<ArtifactRecord>,
}

impl BuildManifest {
    /// Construct new build manifest for resolved identity.
    pub fn new(identity: &Identity, published: DateTime<Utc>, files: Vec<ArtifactRecord>) -> Self {
        Self {
            commit: identity.commit.clone(),
            describe: identity.describe.clone(),
            id: identity.id.to_string(),
            date: format_date(published),
            files,
        }
    }

    /// Load build manifest from file.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Read`] if file cannot be read.
    /// - Return [`ManifestError::Parse`] if file is not a build manifest.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path)
    }

    /// Publish time as parsed timestamp.
    pub fn published(&self) -> Option<DateTime<Utc>> {
        parse_date(&self.date)
    }
}

/// Format timestamp the way manifests store it.
pub fn format_date(date: DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse manifest date leniently.
///
/// Accepts RFC 3339 timestamps with `Z` or an explicit offset, and naive
/// `YYYY-MM-DDTHH:MM:SS` timestamps which are taken to be UTC.
pub fn parse_date(date: &str) -> Option<DateTime<Utc>> {
    let date = date.trim();
    DateTime::parse_from_rfc3339(date)
        .map(|date| date.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S%.f").map(|date| date.and_utc()))
        .ok()
}

/// Read and deserialize JSON document.
///
/// # Errors
///
/// - Return [`ManifestError::Read`] if file cannot be read.
/// - Return [`ManifestError::Parse`] if content does not deserialize into `T`.
pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = read_to_string(path).map_err(|source| ManifestError::Read {
        source,
        path: path.to_path_buf(),
    })?;

    serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

/// Serialize JSON document and write it to file.
///
/// Output is pretty printed with a trailing newline. Missing parent
/// directories are created. Content is written to a sibling temporary file
/// first and renamed into place, so readers never see a torn document.
///
/// # Errors
///
/// - Return [`ManifestError::Serialize`] if value cannot be serialized.
/// - Return [`ManifestError::Write`] if file cannot be written.
pub fn write_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    let write_error = |source| ManifestError::Write {
        source,
        path: path.to_path_buf(),
    };

    let mut content = serde_json::to_string_pretty(value).map_err(ManifestError::Serialize)?;
    content.push('\n');

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        mkdirp::mkdirp(parent).map_err(write_error)?;
    }

    let temp_path = path.with_extension("json.tmp");
    write(&temp_path, content).map_err(write_error)?;
    rename(&temp_path, path).map_err(write_error)?;

    Ok(())
}

/// Manifest persistence error types.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Manifest cannot be read.
    #[error("failed to read manifest at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest content is malformed.
    #[error("failed to parse manifest at {:?}", path.display())]
    Parse {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Manifest cannot be serialized.
    #[error(transparent)]
    Serialize(serde_json::Error),

    /// Manifest cannot be written.
    #[error("failed to write manifest at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ManifestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::BuildId;
    use chrono::TimeZone;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    fn sample() -> BuildManifest {
        let identity = Identity {
            commit: "abc1234".into(),
            describe: "v1.2.3".into(),
            id: BuildId::sanitize("v1.2.3", false),
        };
        let published = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        BuildManifest::new(
            &identity,
            published,
            vec![ArtifactRecord {
                name: "firmware.bin".into(),
                url: "https://host/ota/v1.2.3/firmware.bin".into(),
                sha256: "58bb119c35513a451d24dc20ef0e9031ec85b35bfc919d263e7e5d9868909cb5".into(),
            }],
        )
    }

    #[sealed_test]
    fn write_json_pretty_prints_build_manifest() -> anyhow::Result<()> {
        write_json("site/ota/v1.2.3/manifest.json", &sample())?;

        let result = read_to_string("site/ota/v1.2.3/manifest.json")?;
        let expect = indoc! {r#"
            {
              "commit": "abc1234",
              "describe": "v1.2.3",
              "id": "v1.2.3",
              "date": "2025-03-04T05:06:07Z",
              "files": [
                {
                  "name": "firmware.bin",
                  "url": "https://host/ota/v1.2.3/firmware.bin",
                  "sha256": "58bb119c35513a451d24dc20ef0e9031ec85b35bfc919d263e7e5d9868909cb5"
                }
              ]
            }
        "#};
        assert_eq!(result, expect);
        assert!(!Path::new("site/ota/v1.2.3/manifest.json.tmp").exists());
        assert_eq!(BuildManifest::load("site/ota/v1.2.3/manifest.json")?, sample());

        Ok(())
    }

    #[sealed_test]
    fn load_rejects_malformed_manifest() -> anyhow::Result<()> {
        write("broken.json", "{ \"commit\": ")?;
        assert!(matches!(
            BuildManifest::load("broken.json"),
            Err(ManifestError::Parse { .. })
        ));
        assert!(matches!(
            BuildManifest::load("missing.json"),
            Err(ManifestError::Read { .. })
        ));

        Ok(())
    }

    #[test]
    fn parse_date_accepts_iso_variants() {
        let expect = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(parse_date("2025-03-04T05:06:07Z"), Some(expect));
        assert_eq!(parse_date("2025-03-04T07:06:07+02:00"), Some(expect));
        assert_eq!(parse_date("2025-03-04T05:06:07"), Some(expect));
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn published_round_trips_through_format() {
        let manifest = sample();
        assert_eq!(manifest.published().map(format_date), Some(manifest.date));
    }
}
