//! Document deletion.
//!
//! Removes a document's triad and copied upload from whichever partition of
//! the scope holds it, then tombstones it in the catalogs. Unknown ids are
//! not an error: deletion reports `false` and touches nothing.

use campus_index_core::models::{Scope, SearchMode};
use globset::{Glob, GlobMatcher};
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::partition::Partition;

impl Engine {
    /// Delete `document_id` from `scope`. Returns true iff any file was
    /// removed.
    pub async fn delete(&self, document_id: &str, scope: &Scope) -> Result<bool> {
        if Uuid::parse_str(document_id).is_err() {
            debug!(document_id, "not a document id, nothing to delete");
            return Ok(false);
        }

        let matcher = Glob::new(&format!("{}_*", document_id))
            .map_err(|e| Error::InvalidScope(e.to_string()))?
            .compile_matcher();

        let mut globals: Vec<Catalog> = Vec::new();
        for partition in self.resolver.partitions_for(scope, SearchMode::All)? {
            if !partition.exists() {
                continue;
            }
            let removed = self.store.remove(&partition, document_id)?
                + remove_matching(&partition, &matcher)?;
            if removed == 0 {
                continue;
            }
            debug!(document_id, partition = %partition.key, removed, "removed document files");
            self.catalogs.partition(&partition).remove(document_id)?;

            let global = self.catalogs.global_for(partition.kind);
            if !globals.iter().any(|g| g.path() == global.path()) {
                globals.push(global);
            }
        }

        for global in &globals {
            global.remove(document_id)?;
        }

        let deleted = !globals.is_empty();
        if deleted {
            info!(document_id, "deleted document");
        }
        Ok(deleted)
    }
}

/// Remove files in the partition directory whose names match `matcher`.
fn remove_matching(partition: &Partition, matcher: &GlobMatcher) -> Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(&partition.path)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if matcher.is_match(entry.file_name()) {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
