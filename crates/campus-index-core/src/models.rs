//! Core data models used throughout campus-index.
//!
//! These types describe where a document lives (its [`Scope`] and
//! [`PartitionKind`]), what was indexed for it ([`Passage`],
//! [`DocumentRecord`]) and what a query hands back ([`ScoredPassage`]).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::index::Metric;
use crate::rank::Score;

/// Logical address of a document: which organisational scope owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    /// A department's general document pool.
    Department { department: String },
    /// Course material for one subject inside a department.
    Subject { department: String, subject: String },
    /// College-wide events, shared by every uploader.
    CollegeEvent,
    /// Events announced by a single department.
    DepartmentEvent { department: String },
}

impl Scope {
    pub fn department(department: impl Into<String>) -> Self {
        Scope::Department {
            department: department.into(),
        }
    }

    pub fn subject(department: impl Into<String>, subject: impl Into<String>) -> Self {
        Scope::Subject {
            department: department.into(),
            subject: subject.into(),
        }
    }

    pub fn department_event(department: impl Into<String>) -> Self {
        Scope::DepartmentEvent {
            department: department.into(),
        }
    }

    /// The partition kind documents of this scope are stored in.
    pub fn kind(&self) -> PartitionKind {
        match self {
            Scope::Department { .. } => PartitionKind::Department,
            Scope::Subject { .. } => PartitionKind::Subject,
            Scope::CollegeEvent => PartitionKind::CollegeEvent,
            Scope::DepartmentEvent { .. } => PartitionKind::DepartmentEvent,
        }
    }

    pub fn department_name(&self) -> Option<&str> {
        match self {
            Scope::Department { department }
            | Scope::Subject { department, .. }
            | Scope::DepartmentEvent { department } => Some(department),
            Scope::CollegeEvent => None,
        }
    }

    pub fn subject_name(&self) -> Option<&str> {
        match self {
            Scope::Subject { subject, .. } => Some(subject),
            _ => None,
        }
    }

    /// True for college and department event scopes.
    pub fn is_event(&self) -> bool {
        self.kind().is_event()
    }
}

/// Physical partition family. Determines the index metric and therefore the
/// ranking policy used when searching the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionKind {
    Department,
    Subject,
    CollegeEvent,
    DepartmentEvent,
}

impl PartitionKind {
    pub fn is_event(self) -> bool {
        matches!(
            self,
            PartitionKind::CollegeEvent | PartitionKind::DepartmentEvent
        )
    }

    /// Department events are indexed for inner-product similarity; every other
    /// partition uses squared L2 distance.
    pub fn metric(self) -> Metric {
        match self {
            PartitionKind::DepartmentEvent => Metric::InnerProduct,
            _ => Metric::L2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PartitionKind::Department => "department",
            PartitionKind::Subject => "subject",
            PartitionKind::CollegeEvent => "college_event",
            PartitionKind::DepartmentEvent => "department_event",
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which partitions of a department a query fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Department partition plus every subject partition beneath it.
    #[default]
    All,
    /// Only the department's general partition.
    General,
    /// Same fan-out as `All`.
    Department,
    /// Exactly one subject partition.
    Subject,
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(SearchMode::All),
            "general" => Ok(SearchMode::General),
            "department" => Ok(SearchMode::Department),
            "subject" => Ok(SearchMode::Subject),
            other => Err(format!(
                "unknown search mode: '{}'. Use all, general, department, or subject.",
                other
            )),
        }
    }
}

/// Who uploaded a document. Both fields are opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uploader {
    pub user_id: String,
    pub role: String,
}

impl Uploader {
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: role.into(),
        }
    }
}

/// One chunk of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    /// Row of this passage in the document's embedding index.
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// Locations of a document's artifacts inside its partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub index: PathBuf,
    pub passages: PathBuf,
    pub metadata: PathBuf,
    /// The copied original upload.
    pub source: PathBuf,
}

/// Denormalised summary of an indexed document. This is the unit stored in
/// catalogs and in each document's metadata artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub title: String,
    pub original_filename: String,
    pub file_type: String,
    pub scope: Scope,
    /// Sanitised partition key, relative to the storage root.
    pub partition: String,
    pub storage_type: PartitionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    pub uploader: Uploader,
    pub uploaded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub chunk_count: usize,
    pub embedding_dimension: usize,
    pub metric: Metric,
    pub model: String,
    pub text_length: usize,
    pub passages_sha256: String,
    pub artifacts: ArtifactPaths,
}

/// A passage returned from a federated query, tagged with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub score: Score,
    pub title: String,
    pub department: Option<String>,
    pub subject: Option<String>,
    pub storage_type: PartitionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
}
