//! Per-document artifact triads.
//!
//! Each indexed document owns three files inside its partition:
//!
//! ```text
//! passages_<id>.json   ordered passages, row i ↔ chunk_index i
//! index_<id>.vec       FlatIndex bytes (see campus_index_core::index)
//! metadata_<id>.json   DocumentRecord, written last
//! ```
//!
//! Files are written to a temporary name and renamed into place. The
//! metadata file acts as the commit marker: a triad without it is never
//! served. Loading cross-checks all three files and reports any disagreement
//! as [`Error::ArtifactInconsistent`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use campus_index_core::index::FlatIndex;
use campus_index_core::models::{ArtifactPaths, DocumentRecord, Passage};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::partition::Partition;

/// A fully loaded and verified document.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub record: DocumentRecord,
    pub passages: Vec<Passage>,
    pub index: FlatIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentIndexStore;

impl DocumentIndexStore {
    pub fn new() -> Self {
        Self
    }

    /// Where a document's artifacts live. `source_name` is the already
    /// sanitised file name of the uploaded original.
    pub fn artifact_paths(
        &self,
        partition: &Partition,
        document_id: &str,
        source_name: &str,
    ) -> ArtifactPaths {
        ArtifactPaths {
            index: partition.path.join(format!("index_{}.vec", document_id)),
            passages: partition.path.join(format!("passages_{}.json", document_id)),
            metadata: partition.path.join(format!("metadata_{}.json", document_id)),
            source: partition
                .path
                .join(format!("{}_{}", document_id, source_name)),
        }
    }

    /// Write the triad for `record` and return the record with its index
    /// facts (`chunk_count`, dimension, metric, checksum) filled in.
    ///
    /// `record.artifacts` must already point into `partition`. On error every
    /// file this call wrote is removed again.
    pub fn persist(
        &self,
        partition: &Partition,
        mut record: DocumentRecord,
        passages: &[Passage],
        embeddings: &[Vec<f32>],
    ) -> Result<DocumentRecord> {
        let id = record.document_id.clone();
        if passages.len() != embeddings.len() {
            return Err(Error::inconsistent(
                &id,
                format!(
                    "{} passages but {} embeddings",
                    passages.len(),
                    embeddings.len()
                ),
            ));
        }

        let index = FlatIndex::build(partition.metric(), embeddings)
            .map_err(|e| Error::index(&id, e))?;
        let passages_json = serde_json::to_vec_pretty(passages)?;

        record.chunk_count = passages.len();
        record.embedding_dimension = index.dimension();
        record.metric = index.metric();
        record.passages_sha256 = sha256_hex(&passages_json);
        let metadata_json = serde_json::to_vec_pretty(&record)?;

        let paths = record.artifacts.clone();
        let index_bytes = index.to_bytes();
        let mut written: Vec<&Path> = Vec::with_capacity(3);
        let steps = [
            (paths.passages.as_path(), passages_json.as_slice()),
            (paths.index.as_path(), index_bytes.as_slice()),
            (paths.metadata.as_path(), metadata_json.as_slice()),
        ];
        for (path, bytes) in steps {
            if let Err(e) = write_atomic(path, bytes) {
                for done in &written {
                    remove_if_exists(done);
                }
                return Err(e.into());
            }
            written.push(path);
        }

        debug!(
            document_id = %id,
            partition = %partition.key,
            chunks = record.chunk_count,
            dims = record.embedding_dimension,
            "persisted document artifacts"
        );
        Ok(record)
    }

    /// Load and verify a document's triad.
    pub fn load(&self, partition: &Partition, document_id: &str) -> Result<LoadedDocument> {
        let paths = self.artifact_paths(partition, document_id, "");
        let files = [
            ("metadata", &paths.metadata),
            ("passages", &paths.passages),
            ("index", &paths.index),
        ];
        let missing: Vec<&str> = files
            .iter()
            .filter(|(_, p)| !p.exists())
            .map(|(name, _)| *name)
            .collect();
        // Removal deletes metadata first, so a triad without it is either
        // mid-delete or was never committed.
        if missing.contains(&"metadata") {
            return Err(not_found(document_id));
        }
        if !missing.is_empty() {
            if !paths.metadata.exists() {
                return Err(not_found(document_id));
            }
            return Err(Error::inconsistent(
                document_id,
                format!("missing {} artifact(s)", missing.join(", ")),
            ));
        }

        let metadata_bytes = read_artifact(document_id, &paths.metadata)?;
        let passages_bytes = read_artifact(document_id, &paths.passages)?;
        let index_bytes = read_artifact(document_id, &paths.index)?;

        let record: DocumentRecord = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| Error::inconsistent(document_id, format!("metadata: {}", e)))?;
        let passages: Vec<Passage> = serde_json::from_slice(&passages_bytes)
            .map_err(|e| Error::inconsistent(document_id, format!("passages: {}", e)))?;
        let index = FlatIndex::from_bytes(&index_bytes).map_err(|e| Error::index(document_id, e))?;

        verify(partition, document_id, &record, &passages, &passages_bytes, &index)?;

        Ok(LoadedDocument {
            record,
            passages,
            index,
        })
    }

    /// Delete whichever triad files exist, metadata first. Returns how many
    /// were removed.
    pub fn remove(&self, partition: &Partition, document_id: &str) -> Result<usize> {
        let paths = self.artifact_paths(partition, document_id, "");
        let mut removed = 0;
        for path in [&paths.metadata, &paths.index, &paths.passages] {
            match std::fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

fn verify(
    partition: &Partition,
    document_id: &str,
    record: &DocumentRecord,
    passages: &[Passage],
    passages_bytes: &[u8],
    index: &FlatIndex,
) -> Result<()> {
    let fail = |reason: String| Err(Error::inconsistent(document_id, reason));

    if record.document_id != document_id {
        return fail(format!("metadata belongs to {}", record.document_id));
    }
    if index.len() != passages.len() || passages.len() != record.chunk_count {
        return fail(format!(
            "index has {} rows, {} passages, metadata says {}",
            index.len(),
            passages.len(),
            record.chunk_count
        ));
    }
    if index.dimension() != record.embedding_dimension {
        return fail(format!(
            "index dimension {} != recorded {}",
            index.dimension(),
            record.embedding_dimension
        ));
    }
    if index.metric() != record.metric || index.metric() != partition.metric() {
        return fail(format!(
            "index metric {:?} does not match partition {}",
            index.metric(),
            partition.key
        ));
    }
    if sha256_hex(passages_bytes) != record.passages_sha256 {
        return fail("passages checksum mismatch".to_string());
    }
    if let Some((pos, p)) = passages
        .iter()
        .enumerate()
        .find(|(pos, p)| p.chunk_index != *pos)
    {
        return fail(format!(
            "passage at position {} has chunk_index {}",
            pos, p.chunk_index
        ));
    }
    Ok(())
}

fn not_found(document_id: &str) -> Error {
    Error::NotFound {
        kind: "document",
        name: document_id.to_string(),
    }
}

/// Read one artifact. A file that disappeared since the existence check
/// means the document is being deleted.
fn read_artifact(document_id: &str, path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            not_found(document_id)
        } else {
            Error::inconsistent(document_id, format!("{}: {}", path.display(), e))
        }
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

/// Write `bytes` next to `path` and rename into place.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = temp_path(path);
    if let Err(e) = std::fs::write(&tmp, bytes) {
        remove_if_exists(&tmp);
        return Err(e);
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        remove_if_exists(&tmp);
        return Err(e);
    }
    Ok(())
}

pub(crate) fn remove_if_exists(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to clean up file");
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_index_core::chunk::passage_hash;
    use campus_index_core::index::Metric;
    use campus_index_core::models::{PartitionKind, Scope, Uploader};
    use chrono::Utc;
    use tempfile::TempDir;

    use crate::partition::PartitionResolver;

    fn passages(n: usize) -> Vec<Passage> {
        (0..n)
            .map(|i| {
                let text = format!("passage number {}", i);
                Passage {
                    chunk_index: i,
                    hash: passage_hash(&text),
                    text,
                }
            })
            .collect()
    }

    fn embeddings(n: usize) -> Vec<Vec<f32>> {
        (0..n).map(|i| vec![i as f32, 1.0, 0.5]).collect()
    }

    fn record(store: &DocumentIndexStore, partition: &Partition, id: &str) -> DocumentRecord {
        let now = Utc::now();
        DocumentRecord {
            document_id: id.to_string(),
            title: "Timetable".to_string(),
            original_filename: "timetable.txt".to_string(),
            file_type: "txt".to_string(),
            scope: Scope::department("Computer Science"),
            partition: partition.key.clone(),
            storage_type: partition.kind,
            event_type: None,
            uploader: Uploader::new("u1", "faculty"),
            uploaded_at: now,
            created_at: now,
            chunk_count: 0,
            embedding_dimension: 0,
            metric: Metric::L2,
            model: "test".to_string(),
            text_length: 0,
            passages_sha256: String::new(),
            artifacts: store.artifact_paths(partition, id, "timetable.txt"),
        }
    }

    fn setup(scope: Scope) -> (TempDir, Partition) {
        let tmp = TempDir::new().unwrap();
        let partition = PartitionResolver::new(tmp.path()).resolve(&scope).unwrap();
        (tmp, partition)
    }

    #[test]
    fn persist_then_load_round_trip() {
        let (_tmp, partition) = setup(Scope::department("Computer Science"));
        let store = DocumentIndexStore::new();
        let rec = store
            .persist(&partition, record(&store, &partition, "doc-1"), &passages(4), &embeddings(4))
            .unwrap();
        assert_eq!(rec.chunk_count, 4);
        assert_eq!(rec.embedding_dimension, 3);

        let loaded = store.load(&partition, "doc-1").unwrap();
        assert_eq!(loaded.passages.len(), 4);
        assert_eq!(loaded.index.len(), 4);
        assert_eq!(loaded.record.chunk_count, 4);
        assert_eq!(loaded.record, rec);
    }

    #[test]
    fn department_events_store_normalised_rows() {
        let (_tmp, partition) = setup(Scope::department_event("Civil"));
        assert_eq!(partition.kind, PartitionKind::DepartmentEvent);
        let store = DocumentIndexStore::new();
        let rec = store
            .persist(&partition, record(&store, &partition, "ev"), &passages(2), &embeddings(2))
            .unwrap();
        assert_eq!(rec.metric, Metric::InnerProduct);

        let loaded = store.load(&partition, "ev").unwrap();
        let row = loaded.index.row(1).unwrap();
        let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn load_missing_document_is_not_found() {
        let (_tmp, partition) = setup(Scope::department("Physics"));
        let err = DocumentIndexStore::new().load(&partition, "nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn partial_triad_is_inconsistent() {
        let (_tmp, partition) = setup(Scope::department("Physics"));
        let store = DocumentIndexStore::new();
        let rec = store
            .persist(&partition, record(&store, &partition, "d"), &passages(2), &embeddings(2))
            .unwrap();
        std::fs::remove_file(&rec.artifacts.index).unwrap();

        let err = store.load(&partition, "d").unwrap_err();
        assert!(matches!(err, Error::ArtifactInconsistent { .. }));
    }

    #[test]
    fn triad_without_metadata_is_not_found() {
        let (_tmp, partition) = setup(Scope::department("Physics"));
        let store = DocumentIndexStore::new();
        let rec = store
            .persist(&partition, record(&store, &partition, "d"), &passages(2), &embeddings(2))
            .unwrap();
        // Where a concurrent delete stands after its first removal.
        std::fs::remove_file(&rec.artifacts.metadata).unwrap();
        assert!(rec.artifacts.index.exists());

        let err = store.load(&partition, "d").unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {}", err);
    }

    #[test]
    fn tampered_passages_are_inconsistent() {
        let (_tmp, partition) = setup(Scope::department("Physics"));
        let store = DocumentIndexStore::new();
        let rec = store
            .persist(&partition, record(&store, &partition, "d"), &passages(2), &embeddings(2))
            .unwrap();
        let mut tampered = passages(2);
        tampered[1].text = "rewritten".to_string();
        std::fs::write(
            &rec.artifacts.passages,
            serde_json::to_vec_pretty(&tampered).unwrap(),
        )
        .unwrap();

        let err = store.load(&partition, "d").unwrap_err();
        assert!(matches!(err, Error::ArtifactInconsistent { .. }));
    }

    #[test]
    fn corrupt_index_is_inconsistent() {
        let (_tmp, partition) = setup(Scope::department("Physics"));
        let store = DocumentIndexStore::new();
        let rec = store
            .persist(&partition, record(&store, &partition, "d"), &passages(2), &embeddings(2))
            .unwrap();
        std::fs::write(&rec.artifacts.index, b"garbage").unwrap();

        assert!(matches!(
            store.load(&partition, "d"),
            Err(Error::ArtifactInconsistent { .. })
        ));
    }

    #[test]
    fn mismatched_inputs_write_nothing() {
        let (_tmp, partition) = setup(Scope::department("Physics"));
        let store = DocumentIndexStore::new();
        let rec = record(&store, &partition, "d");
        let paths = rec.artifacts.clone();
        assert!(store
            .persist(&partition, rec, &passages(3), &embeddings(2))
            .is_err());
        assert!(!paths.metadata.exists());
        assert!(!paths.passages.exists());
        assert!(!paths.index.exists());
    }

    #[test]
    fn remove_counts_deleted_files() {
        let (_tmp, partition) = setup(Scope::department("Physics"));
        let store = DocumentIndexStore::new();
        store
            .persist(&partition, record(&store, &partition, "d"), &passages(1), &embeddings(1))
            .unwrap();
        assert_eq!(store.remove(&partition, "d").unwrap(), 3);
        assert_eq!(store.remove(&partition, "d").unwrap(), 0);
        assert!(store.load(&partition, "d").unwrap_err().is_not_found());
    }
}
