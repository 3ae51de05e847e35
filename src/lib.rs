// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Publish firmware OTA binaries into a static hosting catalog.
//!
//! A release run takes the binaries produced by a firmware build, stages them
//! into a static hosting work tree under a directory named after the
//! released commit, records SHA-256 digests in a per-build manifest, points
//! `latest.json` at that manifest, prunes builds past their retention period,
//! and rebuilds the global `manifest.json` that lists every surviving build.
//!
//! Committing and pushing the work tree is left to a separate deployment
//! step.
//!
//! # See Also
//!
//! 1. [`publish`] for the pipeline itself.
//! 2. [`catalog`] for the on-disk layout.

pub mod artifact;
pub mod catalog;
pub mod config;
pub mod identity;
pub mod path;
pub mod publish;
pub mod vcs;

pub use catalog::Catalog;
pub use identity::{BuildId, Identity};
pub use publish::{PublishError, PublishOptions, Publisher};
pub use vcs::{Git2History, VersionControl};
