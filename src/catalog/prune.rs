// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Age based retention of published builds.
//!
//! # Effective Age
//!
//! The age of a build directory is resolved by trying each source below in
//! order, first answer wins:
//!
//! 1. The `date` field of the build manifest.
//! 2. Time of the last commit touching the build directory, if the site is
//!    itself a version controlled work tree.
//! 3. Modification time of the build directory.
//!
//! Manifests written before dates were recorded, or sites that are not kept
//! under version control, still get a usable age this way.
//!
//! # Failure Handling
//!
//! Pruning is housekeeping. A build directory whose age cannot be determined
//! is kept, and a directory that cannot be deleted is reported and skipped.
//! Neither stops the remaining directories from being processed.

use crate::{
    catalog::{
        manifest::{parse_date, read_json},
        Catalog, Result,
    },
    vcs::VersionControl,
};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::{
    fs::{metadata, remove_dir_all},
    io,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};
use tracing::{debug, info, instrument, warn};

/// Source that determined effective age of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeSource {
    /// Date recorded in build manifest.
    ManifestDate,

    /// Last commit touching build directory in site history.
    CommitTime,

    /// Filesystem modification time of build directory.
    ModifiedTime,
}

/// Effective age of a build directory as unix timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildAge {
    /// Where the timestamp came from.
    pub source: AgeSource,

    /// Unix timestamp in seconds.
    pub timestamp: i64,
}

/// Everything an age resolver may consult about one build directory.
pub struct AgeProbe<'a> {
    /// Site root, used as repository for history lookups.
    pub site: &'a Path,

    /// Build directory being aged.
    pub build_dir: &'a Path,

    /// Build manifest inside build directory.
    pub manifest: &'a Path,

    /// Version control collaborator.
    pub vcs: &'a dyn VersionControl,
}

type AgeResolver = fn(&AgeProbe<'_>) -> Option<i64>;

const AGE_RESOLVERS: [(AgeSource, AgeResolver); 3] = [
    (AgeSource::ManifestDate, manifest_date),
    (AgeSource::CommitTime, commit_time),
    (AgeSource::ModifiedTime, modified_time),
];

/// Resolve effective age of build directory.
pub fn effective_age(probe: &AgeProbe<'_>) -> Option<BuildAge> {
    AGE_RESOLVERS.iter().find_map(|(source, resolve)| {
        resolve(probe).map(|timestamp| BuildAge {
            source: *source,
            timestamp,
        })
    })
}

/// Timestamp from `date` field of build manifest.
pub fn manifest_date(probe: &AgeProbe<'_>) -> Option<i64> {
    // INVARIANT: Only the date matters, so older manifest schemas still count.
    let manifest: Value = read_json(probe.manifest).ok()?;
    let date = manifest.get("date")?.as_str()?;
    parse_date(date).map(|date| date.timestamp())
}

/// Timestamp of last commit touching build directory in site history.
pub fn commit_time(probe: &AgeProbe<'_>) -> Option<i64> {
    probe.vcs.last_commit_time(probe.site, probe.build_dir)
}

/// Modification time of build directory.
pub fn modified_time(probe: &AgeProbe<'_>) -> Option<i64> {
    let modified = metadata(probe.build_dir).ok()?.modified().ok()?;
    let seconds = match modified.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_secs()).ok()?,
        Err(before) => -i64::try_from(before.duration().as_secs()).ok()?,
    };

    Some(seconds)
}

/// Outcome of a pruning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Number of build directories examined.
    pub scanned: usize,

    /// Build directories deleted.
    pub pruned: Vec<PathBuf>,

    /// Build directories that could not be deleted.
    pub failed: Vec<PathBuf>,
}

/// Deletes one expired build directory.
pub type RemoveDir = fn(&Path) -> io::Result<()>;

impl Catalog {
    /// Delete every build older than `retention_days`.
    ///
    /// A build is expired when its effective age is strictly older than
    /// `now` minus `retention_days`. Zero retention days disables pruning,
    /// and a retention period reaching past the earliest representable date
    /// expires nothing.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::Pattern`](crate::catalog::CatalogError::Pattern)
    ///   if build directories cannot be searched for. Every per-directory
    ///   failure is absorbed into the returned report instead.
    pub fn prune(
        &self,
        vcs: &dyn VersionControl,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> Result<PruneReport> {
        self.prune_with(vcs, retention_days, now, |dir| remove_dir_all(dir))
    }

    /// Same as [`Catalog::prune`], deleting expired builds through `remove`.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::Pattern`](crate::catalog::CatalogError::Pattern)
    ///   if build directories cannot be searched for.
    #[instrument(skip(self, vcs, remove), level = "debug")]
    pub fn prune_with(
        &self,
        vcs: &dyn VersionControl,
        retention_days: u32,
        now: DateTime<Utc>,
        remove: RemoveDir,
    ) -> Result<PruneReport> {
        let mut report = PruneReport::default();
        if retention_days == 0 {
            debug!("pruning disabled");
            return Ok(report);
        }

        let Some(cutoff) = Duration::try_days(i64::from(retention_days))
            .and_then(|retention| now.checked_sub_signed(retention))
            .map(|cutoff| cutoff.timestamp())
        else {
            debug!("retention of {retention_days} days predates every build");
            return Ok(report);
        };

        for manifest in self.manifest_paths()? {
            let Some(build_dir) = manifest.parent() else {
                continue;
            };

            // INVARIANT: Nested builds vanish along with a pruned parent.
            if !build_dir.exists() {
                continue;
            }
            report.scanned += 1;

            let probe = AgeProbe {
                site: self.root(),
                build_dir,
                manifest: &manifest,
                vcs,
            };
            let Some(age) = effective_age(&probe) else {
                warn!("cannot determine age of {}, keeping it", build_dir.display());
                continue;
            };
            debug!("{} aged by {:?} at {}", build_dir.display(), age.source, age.timestamp);

            if age.timestamp >= cutoff {
                continue;
            }

            match remove(build_dir) {
                Ok(()) => {
                    info!("Pruning expired: {}", build_dir.display());
                    report.pruned.push(build_dir.to_path_buf());
                }
                Err(error) => {
                    warn!("failed to prune {}: {error}", build_dir.display());
                    report.failed.push(build_dir.to_path_buf());
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::{Result as VcsResult, VcsError};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{
        collections::HashMap,
        fs::{create_dir_all, write, File},
        time::{Duration as StdDuration, SystemTime},
    };

    #[derive(Default)]
    struct FakeHistory {
        times: HashMap<PathBuf, i64>,
    }

    impl VersionControl for FakeHistory {
        fn resolve_ref(&self, _repo: &Path, reference: &str) -> VcsResult<String> {
            Err(VcsError::Resolve {
                source: git2::Error::from_str("unsupported"),
                reference: reference.to_string(),
            })
        }

        fn describe(&self, _repo: &Path, commit: &str) -> VcsResult<String> {
            Ok(commit.to_string())
        }

        fn last_commit_time(&self, _repo: &Path, path: &Path) -> Option<i64> {
            self.times.get(path).copied()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn build(dir: &str, manifest: &str) -> anyhow::Result<()> {
        create_dir_all(dir)?;
        write(format!("{dir}/firmware.bin"), "AA")?;
        write(format!("{dir}/manifest.json"), manifest)?;
        Ok(())
    }

    fn set_dir_mtime(dir: &str, when: SystemTime) -> anyhow::Result<()> {
        File::open(dir)?.set_modified(when)?;
        Ok(())
    }

    #[sealed_test]
    fn manifest_date_wins_over_other_sources() -> anyhow::Result<()> {
        build("site/ota/v1", r#"{ "date": "2025-05-01T00:00:00Z" }"#)?;
        let history = FakeHistory {
            times: HashMap::from([(PathBuf::from("site/ota/v1"), 1)]),
        };
        let probe = AgeProbe {
            site: Path::new("site"),
            build_dir: Path::new("site/ota/v1"),
            manifest: Path::new("site/ota/v1/manifest.json"),
            vcs: &history,
        };

        let expect = BuildAge {
            source: AgeSource::ManifestDate,
            timestamp: Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap().timestamp(),
        };
        assert_eq!(effective_age(&probe), Some(expect));

        Ok(())
    }

    #[sealed_test]
    fn commit_time_used_without_manifest_date() -> anyhow::Result<()> {
        build("site/ota/v1", r#"{ "id": "v1" }"#)?;
        let history = FakeHistory {
            times: HashMap::from([(PathBuf::from("site/ota/v1"), 1_500_000_000)]),
        };
        let probe = AgeProbe {
            site: Path::new("site"),
            build_dir: Path::new("site/ota/v1"),
            manifest: Path::new("site/ota/v1/manifest.json"),
            vcs: &history,
        };

        let expect = BuildAge {
            source: AgeSource::CommitTime,
            timestamp: 1_500_000_000,
        };
        assert_eq!(effective_age(&probe), Some(expect));

        Ok(())
    }

    #[sealed_test]
    fn modified_time_used_as_last_resort() -> anyhow::Result<()> {
        build("site/ota/v1", "not json at all")?;
        let when = SystemTime::UNIX_EPOCH + StdDuration::from_secs(1_400_000_000);
        set_dir_mtime("site/ota/v1", when)?;
        let history = FakeHistory::default();
        let probe = AgeProbe {
            site: Path::new("site"),
            build_dir: Path::new("site/ota/v1"),
            manifest: Path::new("site/ota/v1/manifest.json"),
            vcs: &history,
        };

        let expect = BuildAge {
            source: AgeSource::ModifiedTime,
            timestamp: 1_400_000_000,
        };
        assert_eq!(effective_age(&probe), Some(expect));

        Ok(())
    }

    #[sealed_test]
    fn prune_removes_only_expired_builds() -> anyhow::Result<()> {
        build("site/ota/old", r#"{ "date": "2025-01-01T00:00:00Z" }"#)?;
        build("site/ota/fresh", r#"{ "date": "2025-05-25T00:00:00Z" }"#)?;
        build("site/ota/by-history", r#"{ "id": "by-history" }"#)?;
        build("site/ota/by-mtime", r#"{ "id": "by-mtime" }"#)?;
        set_dir_mtime(
            "site/ota/by-mtime",
            SystemTime::UNIX_EPOCH + StdDuration::from_secs(1_000_000_000),
        )?;
        let history = FakeHistory {
            times: HashMap::from([(PathBuf::from("site/ota/by-history"), 1_000_000_000)]),
        };

        let report = Catalog::new("site").prune(&history, 30, now())?;

        assert_eq!(report.scanned, 4);
        assert!(report.failed.is_empty());
        assert!(!Path::new("site/ota/old").exists());
        assert!(!Path::new("site/ota/by-history").exists());
        assert!(!Path::new("site/ota/by-mtime").exists());
        assert!(Path::new("site/ota/fresh/firmware.bin").exists());

        Ok(())
    }

    #[sealed_test]
    fn prune_keeps_build_exactly_at_cutoff() -> anyhow::Result<()> {
        build("site/ota/edge", r#"{ "date": "2025-05-02T00:00:00Z" }"#)?;

        let report = Catalog::new("site").prune(&FakeHistory::default(), 30, now())?;

        assert_eq!(report.pruned, Vec::<PathBuf>::new());
        assert!(Path::new("site/ota/edge").exists());

        Ok(())
    }

    #[sealed_test]
    fn prune_disabled_with_zero_days() -> anyhow::Result<()> {
        build("site/ota/ancient", r#"{ "date": "1999-01-01T00:00:00Z" }"#)?;

        let report = Catalog::new("site").prune(&FakeHistory::default(), 0, now())?;

        assert_eq!(report, PruneReport::default());
        assert!(Path::new("site/ota/ancient").exists());

        Ok(())
    }

    #[sealed_test]
    fn prune_handles_nested_builds() -> anyhow::Result<()> {
        build("site/ota/release", r#"{ "date": "2020-01-01T00:00:00Z" }"#)?;
        build("site/ota/release/v2", r#"{ "date": "2025-05-30T00:00:00Z" }"#)?;

        let report = Catalog::new("site").prune(&FakeHistory::default(), 30, now())?;

        assert_eq!(report.pruned, vec![PathBuf::from("site/ota/release")]);
        assert!(!Path::new("site/ota/release").exists());

        Ok(())
    }

    #[sealed_test]
    fn prune_keeps_everything_when_retention_predates_calendar() -> anyhow::Result<()> {
        build("site/ota/ancient", r#"{ "date": "1970-01-01T00:00:00Z" }"#)?;

        let report = Catalog::new("site").prune(&FakeHistory::default(), u32::MAX, now())?;

        assert_eq!(report, PruneReport::default());
        assert!(Path::new("site/ota/ancient").exists());

        Ok(())
    }

    fn remove_unless_locked(dir: &Path) -> io::Result<()> {
        if dir.ends_with("locked") {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
        }
        remove_dir_all(dir)
    }

    #[sealed_test]
    fn prune_reports_builds_it_cannot_delete() -> anyhow::Result<()> {
        build("site/ota/locked", r#"{ "date": "2024-01-01T00:00:00Z" }"#)?;
        build("site/ota/old", r#"{ "date": "2024-01-02T00:00:00Z" }"#)?;
        build("site/ota/fresh", r#"{ "date": "2025-05-30T00:00:00Z" }"#)?;
        let catalog = Catalog::new("site");

        let report = catalog.prune_with(&FakeHistory::default(), 30, now(), remove_unless_locked)?;

        assert_eq!(report.scanned, 3);
        assert_eq!(report.failed, vec![PathBuf::from("site/ota/locked")]);
        assert_eq!(report.pruned, vec![PathBuf::from("site/ota/old")]);
        assert!(Path::new("site/ota/locked/manifest.json").exists());
        assert!(!Path::new("site/ota/old").exists());

        let dates = catalog
            .rebuild_index()?
            .iter()
            .filter_map(|entry| entry.get("date")?.as_str().map(str::to_string))
            .collect::<Vec<_>>();
        assert_eq!(dates, vec!["2025-05-30T00:00:00Z", "2024-01-01T00:00:00Z"]);

        Ok(())
    }
}
