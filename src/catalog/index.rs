// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Global manifest rebuilding.
//!
//! The global manifest is never patched. It is rebuilt from whatever build
//! manifests are on disk, so it always reflects the catalog after staging
//! and pruning. Entries are kept as raw JSON objects so fields of older
//! manifest layouts survive the rebuild.

use crate::catalog::{
    manifest::{read_json, write_json},
    Catalog, Result,
};

use serde_json::{Map, Value};
use std::cmp::Reverse;
use tracing::{instrument, warn};

impl Catalog {
    /// Rebuild global manifest from every build manifest in the catalog.
    ///
    /// Entries are sorted newest first by their `date` string, which orders
    /// chronologically because dates share one zero padded layout. Entries
    /// without a date sort last. Ties keep discovery order. Unreadable or
    /// malformed build manifests are skipped.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::Pattern`](crate::catalog::CatalogError::Pattern)
    ///   if build manifests cannot be searched for.
    /// - Return [`CatalogError::Manifest`](crate::catalog::CatalogError::Manifest)
    ///   if global manifest cannot be written.
    #[instrument(skip(self), level = "debug")]
    pub fn rebuild_index(&self) -> Result<Vec<Map<String, Value>>> {
        let mut entries = Vec::new();
        for path in self.manifest_paths()? {
            match read_json::<Map<String, Value>>(&path) {
                Ok(entry) => entries.push(entry),
                Err(error) => warn!("skipping build manifest: {error}"),
            }
        }

        entries.sort_by_key(|entry| {
            Reverse(
                entry
                    .get("date")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            )
        });
        write_json(self.index_path(), &entries)?;

        Ok(entries)
    }
}
