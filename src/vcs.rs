// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control collaborator.
//!
//! The publisher only ever asks three questions of version control: which
//! commit does a reference name, what is a friendly label for that commit, and
//! when was a given path last touched by a commit. These questions are modeled
//! by the [`VersionControl`] trait so the rest of the publisher never needs to
//! know whether answers come from libgit2 or from an in-memory fake.
//!
//! Repositories are always addressed by a path, which is resolved the same way
//! `git -C <path>` does it, i.e., by searching upward for the enclosing
//! repository.

use git2::{
    DescribeFormatOptions, DescribeOptions, DiffOptions, Repository, Sort, StatusOptions,
};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Suffix appended to descriptive labels of a dirty work tree.
pub const DIRTY_SUFFIX: &str = "-dirty";

/// Layer of indirection for version control queries.
pub trait VersionControl {
    /// Resolve reference like "HEAD" into a full commit identifier.
    fn resolve_ref(&self, repo: &Path, reference: &str) -> Result<String>;

    /// Produce a human readable label for a commit.
    ///
    /// Labels prefer tags, fall back to the abbreviated commit hash, and carry
    /// [`DIRTY_SUFFIX`] when the commit is the checked out HEAD of a work tree
    /// with uncommitted changes.
    fn describe(&self, repo: &Path, commit: &str) -> Result<String>;

    /// Unix timestamp of the last commit touching `path`.
    ///
    /// Absence is not an error. It just means that history cannot answer.
    fn last_commit_time(&self, repo: &Path, path: &Path) -> Option<i64>;
}

/// Version control queries through libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2History;

impl Git2History {
    /// Construct new libgit2 backed collaborator.
    pub fn new() -> Self {
        Self
    }

    fn discover(repo: &Path) -> Result<Repository> {
        Repository::discover(repo).map_err(|source| VcsError::Discover {
            source,
            path: repo.to_path_buf(),
        })
    }
}

impl VersionControl for Git2History {
    #[instrument(skip(self), level = "debug")]
    fn resolve_ref(&self, repo: &Path, reference: &str) -> Result<String> {
        let repository = Self::discover(repo)?;
        let commit = repository
            .revparse_single(reference)
            .and_then(|object| object.peel_to_commit())
            .map_err(|source| VcsError::Resolve {
                source,
                reference: reference.to_string(),
            })?;

        Ok(commit.id().to_string())
    }

    #[instrument(skip(self), level = "debug")]
    fn describe(&self, repo: &Path, commit: &str) -> Result<String> {
        let repository = Self::discover(repo)?;
        let target = repository
            .revparse_single(commit)
            .and_then(|object| object.peel_to_commit())
            .map_err(|source| VcsError::Resolve {
                source,
                reference: commit.to_string(),
            })?;

        let mut options = DescribeOptions::new();
        options.describe_tags().show_commit_oid_as_fallback(true);
        let mut format = DescribeFormatOptions::new();
        format.abbreviated_size(7);

        // INVARIANT: Only the checked out commit can be dirty.
        let head = repository
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
            .map(|head| head.id());
        let label = if head == Some(target.id()) && is_dirty(&repository) {
            format.dirty_suffix(DIRTY_SUFFIX);
            repository
                .describe(&options)
                .and_then(|describe| describe.format(Some(&format)))
        } else {
            target
                .as_object()
                .describe(&options)
                .and_then(|describe| describe.format(Some(&format)))
        };

        label.map_err(|source| VcsError::Describe {
            source,
            commit: commit.to_string(),
        })
    }

    #[instrument(skip(self), level = "debug")]
    fn last_commit_time(&self, repo: &Path, path: &Path) -> Option<i64> {
        let repository = Repository::discover(repo).ok()?;
        let workdir = repository.workdir()?.canonicalize().ok()?;
        let target = path.canonicalize().ok()?;
        let relative = target.strip_prefix(&workdir).ok()?;
        let pathspec = relative.to_string_lossy().replace('\\', "/");

        let mut walk = repository.revwalk().ok()?;
        walk.push_head().ok()?;
        walk.set_sorting(Sort::TIME).ok()?;

        for oid in walk {
            let commit = repository.find_commit(oid.ok()?).ok()?;
            let tree = commit.tree().ok()?;

            // INVARIANT: A commit touches a path if it differs from every parent under it.
            let touched = if commit.parent_count() == 0 {
                differs(&repository, None, &tree, &pathspec)
            } else {
                commit.parents().all(|parent| match parent.tree() {
                    Ok(parent_tree) => differs(&repository, Some(&parent_tree), &tree, &pathspec),
                    Err(_) => false,
                })
            };

            if touched {
                debug!("{pathspec:?} last touched by {}", commit.id());
                return Some(commit.time().seconds());
            }
        }

        None
    }
}

fn differs(
    repository: &Repository,
    old: Option<&git2::Tree<'_>>,
    new: &git2::Tree<'_>,
    pathspec: &str,
) -> bool {
    let mut options = DiffOptions::new();
    options.pathspec(pathspec);
    repository
        .diff_tree_to_tree(old, Some(new), Some(&mut options))
        .map(|diff| diff.deltas().next().is_some())
        .unwrap_or(false)
}

fn is_dirty(repository: &Repository) -> bool {
    let mut options = StatusOptions::new();
    options.include_untracked(false).include_ignored(false);
    repository
        .statuses(Some(&mut options))
        .map(|statuses| !statuses.is_empty())
        .unwrap_or(false)
}

/// Version control error types.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// No repository encloses target path.
    #[error("no repository found at {:?}", path.display())]
    Discover {
        #[source]
        source: git2::Error,
        path: PathBuf,
    },

    /// Reference does not name a commit.
    #[error("cannot resolve {reference:?} to a commit")]
    Resolve {
        #[source]
        source: git2::Error,
        reference: String,
    },

    /// Commit cannot be described.
    #[error("cannot describe commit {commit:?}")]
    Describe {
        #[source]
        source: git2::Error,
        commit: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = VcsError> = std::result::Result<T, E>;
