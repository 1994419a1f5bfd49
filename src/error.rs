//! Error taxonomy for the engine.

use std::fmt;

use campus_index_core::embedding::EmbedError;
use campus_index_core::index::IndexError;
use campus_index_core::rank::RankError;
use thiserror::Error;

use crate::extract::ExtractError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Ingestion step a wrapped failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Copy,
    Extract,
    Embed,
    Persist,
    Catalog,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IngestStage::Copy => "copy",
            IngestStage::Extract => "extract",
            IngestStage::Embed => "embed",
            IngestStage::Persist => "persist",
            IngestStage::Catalog => "catalog",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("no text could be extracted from {filename}")]
    EmptyContent { filename: String },

    #[error("no passages survived chunking for {filename}")]
    NoChunks { filename: String },

    #[error(transparent)]
    Embedding(#[from] EmbedError),

    #[error("ingestion failed during {stage}: {source}")]
    IngestionFailed {
        stage: IngestStage,
        #[source]
        source: Box<Error>,
    },

    #[error("artifacts for document {document_id} are inconsistent: {reason}")]
    ArtifactInconsistent { document_id: String, reason: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Rank(#[from] RankError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn ingest(stage: IngestStage, source: impl Into<Error>) -> Self {
        Error::IngestionFailed {
            stage,
            source: Box::new(source.into()),
        }
    }

    pub(crate) fn inconsistent(document_id: &str, reason: impl fmt::Display) -> Self {
        Error::ArtifactInconsistent {
            document_id: document_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn index(document_id: &str, err: IndexError) -> Self {
        Self::inconsistent(document_id, err)
    }

    /// True for missing-document errors, which queries skip silently.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// The innermost error, looking through ingest-stage wrapping.
    pub fn root(&self) -> &Error {
        match self {
            Error::IngestionFailed { source, .. } => source.root(),
            other => other,
        }
    }
}
