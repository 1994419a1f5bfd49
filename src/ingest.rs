//! Ingestion pipeline.
//!
//! One upload flows through: format detection → partition resolution →
//! source copy → text extraction → chunking → batched embedding → triad
//! persistence → catalog append. Nothing reaches a catalog unless every
//! earlier step succeeded, and a failed upload leaves no files behind.

use std::path::{Path, PathBuf};

use campus_index_core::chunk::split_text;
use campus_index_core::embedding::{validate_batch, EmbedError};
use campus_index_core::models::{DocumentRecord, Passage, Scope, Uploader};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::{Engine, DEFAULT_COLLEGE_EVENT_TYPE, DEFAULT_DEPARTMENT_EVENT_TYPE};
use crate::error::{Error, IngestStage, Result};
use crate::extract::FileType;
use crate::partition::Partition;
use crate::store::remove_if_exists;

/// One document upload.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// File to read the upload from.
    pub source: PathBuf,
    /// Name the uploader gave the file; drives format detection.
    pub original_filename: String,
    pub title: String,
    pub scope: Scope,
    pub uploader: Uploader,
    /// Event category, only meaningful for event scopes.
    pub event_type: Option<String>,
}

impl IngestRequest {
    /// A request whose file name and title are taken from `source`.
    pub fn new(source: impl Into<PathBuf>, scope: Scope, uploader: Uploader) -> Self {
        let source = source.into();
        let original_filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let title = source
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            source,
            original_filename,
            title,
            scope,
            uploader,
            event_type: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_filename(mut self, name: impl Into<String>) -> Self {
        self.original_filename = name.into();
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }
}

impl Engine {
    /// Index one document and return its catalog record.
    pub async fn ingest(&self, request: IngestRequest) -> Result<DocumentRecord> {
        let file_type = FileType::from_filename(&request.original_filename).ok_or_else(|| {
            let ext = Path::new(&request.original_filename)
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| request.original_filename.clone());
            Error::UnsupportedFormat(ext)
        })?;

        let document_id = Uuid::new_v4().to_string();
        let partition = self.resolver.resolve(&request.scope)?;
        let artifacts = self.store.artifact_paths(
            &partition,
            &document_id,
            &sanitize_filename(&request.original_filename),
        );

        std::fs::copy(&request.source, &artifacts.source)
            .map_err(|e| Error::ingest(IngestStage::Copy, e))?;
        debug!(document_id = %document_id, path = %artifacts.source.display(), "copied upload");
        let source_copy = artifacts.source.clone();

        let now = Utc::now();
        let title = if request.title.trim().is_empty() {
            request.original_filename.clone()
        } else {
            request.title.trim().to_string()
        };
        let event_type = match &request.scope {
            Scope::CollegeEvent => Some(
                request
                    .event_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_COLLEGE_EVENT_TYPE.to_string()),
            ),
            Scope::DepartmentEvent { .. } => Some(
                request
                    .event_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DEPARTMENT_EVENT_TYPE.to_string()),
            ),
            _ => None,
        };
        let record = DocumentRecord {
            document_id: document_id.clone(),
            title,
            original_filename: request.original_filename.clone(),
            file_type: file_type.as_str().to_string(),
            scope: request.scope.clone(),
            partition: partition.key.clone(),
            storage_type: partition.kind,
            event_type,
            uploader: request.uploader.clone(),
            uploaded_at: now,
            created_at: now,
            chunk_count: 0,
            embedding_dimension: 0,
            metric: partition.metric(),
            model: self.embedder.model_name().to_string(),
            text_length: 0,
            passages_sha256: String::new(),
            artifacts,
        };

        match self.index_upload(&partition, file_type, record).await {
            Ok(record) => {
                info!(
                    document_id = %record.document_id,
                    partition = %record.partition,
                    chunks = record.chunk_count,
                    "ingested document"
                );
                Ok(record)
            }
            Err(e) => {
                warn!(document_id = %document_id, error = %e, "ingestion failed, cleaning up");
                remove_if_exists(&source_copy);
                if let Err(cleanup) = self.store.remove(&partition, &document_id) {
                    warn!(document_id = %document_id, error = %cleanup, "failed to remove partial artifacts");
                }
                Err(e)
            }
        }
    }

    /// Everything after the source copy. Any error here leaves cleanup to
    /// the caller.
    async fn index_upload(
        &self,
        partition: &Partition,
        file_type: FileType,
        mut record: DocumentRecord,
    ) -> Result<DocumentRecord> {
        let text = self
            .extractor
            .extract(&record.artifacts.source, file_type)
            .map_err(|e| Error::ingest(IngestStage::Extract, e))?;
        if text.trim().is_empty() {
            return Err(Error::EmptyContent {
                filename: record.original_filename.clone(),
            });
        }
        record.text_length = text.chars().count();

        let passages: Vec<Passage> = split_text(&text, &self.config.chunking.params());
        if passages.is_empty() {
            return Err(Error::NoChunks {
                filename: record.original_filename.clone(),
            });
        }

        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| Error::ingest(IngestStage::Embed, e))?;
        let dims = validate_batch(&embeddings, passages.len())?;
        let expected = self.embedder.dims();
        if expected > 0 && dims != expected {
            return Err(EmbedError::DimensionMismatch {
                expected,
                actual: dims,
            }
            .into());
        }

        let record = self
            .store
            .persist(partition, record, &passages, &embeddings)
            .map_err(|e| Error::ingest(IngestStage::Persist, e))?;

        self.publish(partition, &record)
            .map_err(|e| Error::ingest(IngestStage::Catalog, e))?;
        Ok(record)
    }

    /// Append to the partition catalog, then the global one. A failed global
    /// append tombstones the partition entry again.
    fn publish(&self, partition: &Partition, record: &DocumentRecord) -> Result<()> {
        let local = self.catalogs.partition(partition);
        local.append(record)?;
        if let Err(e) = self.catalogs.global_for(partition.kind).append(record) {
            if let Err(undo) = local.remove(&record.document_id) {
                warn!(document_id = %record.document_id, error = %undo, "failed to roll back catalog entry");
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Reduce an uploaded file name to a safe single path component.
pub fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_basename() {
        assert_eq!(sanitize_filename("../../etc/passwd.txt"), "passwd.txt");
        assert_eq!(sanitize_filename("Lab Manual (v2).pdf"), "Lab_Manual__v2_.pdf");
        assert_eq!(sanitize_filename(".."), "upload");
        assert_eq!(sanitize_filename(""), "upload");
    }

    #[test]
    fn request_defaults_from_path() {
        let req = IngestRequest::new(
            "/tmp/uploads/timetable.docx",
            Scope::department("Civil"),
            Uploader::new("u1", "faculty"),
        );
        assert_eq!(req.original_filename, "timetable.docx");
        assert_eq!(req.title, "timetable");
        assert!(req.event_type.is_none());

        let req = req.with_title("Spring timetable").with_event_type("exam");
        assert_eq!(req.title, "Spring timetable");
        assert_eq!(req.event_type.as_deref(), Some("exam"));
    }
}
