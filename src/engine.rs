//! The engine facade: one value wiring every component together.
//!
//! The write path ([`Engine::ingest`]), read path ([`Engine::query`]) and
//! [`Engine::delete`] are implemented in their own modules; this module
//! holds construction and catalog browsing.

use std::collections::BTreeMap;
use std::sync::Arc;

use campus_index_core::embedding::EmbeddingProvider;
use campus_index_core::models::{DocumentRecord, PartitionKind, Scope};
use serde::Serialize;

use crate::catalog::Catalogs;
use crate::config::Config;
use crate::embedding::create_provider;
use crate::error::{Error, Result};
use crate::extract::{DefaultExtractor, TextExtractor};
use crate::partition::{PartitionResolver, CATALOG_DIR};
use crate::store::DocumentIndexStore;

/// Event type recorded for events uploaded without one.
pub const DEFAULT_COLLEGE_EVENT_TYPE: &str = "general";
pub const DEFAULT_DEPARTMENT_EVENT_TYPE: &str = "department";

pub struct Engine {
    pub(crate) config: Config,
    pub(crate) resolver: PartitionResolver,
    pub(crate) store: DocumentIndexStore,
    pub(crate) catalogs: Catalogs,
    pub(crate) embedder: Arc<dyn EmbeddingProvider>,
    pub(crate) extractor: Arc<dyn TextExtractor>,
}

/// A subject partition and how many documents it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectSummary {
    pub subject: String,
    pub document_count: usize,
}

impl Engine {
    pub fn new(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        let root = config.storage.root.clone();
        Self {
            resolver: PartitionResolver::new(&root),
            store: DocumentIndexStore::new(),
            catalogs: Catalogs::new(&root, config.catalog.compact_after),
            config,
            embedder,
            extractor,
        }
    }

    /// Build an engine with the configured embedding provider and the
    /// default text extractor.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let embedder = create_provider(&config.embedding)?;
        Ok(Self::new(config, embedder, Arc::new(DefaultExtractor)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &PartitionResolver {
        &self.resolver
    }

    pub fn catalogs(&self) -> &Catalogs {
        &self.catalogs
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    /// Create the storage root and global catalog directory.
    pub fn init(&self) -> Result<()> {
        std::fs::create_dir_all(self.resolver.root().join(CATALOG_DIR))?;
        Ok(())
    }

    /// Documents stored directly in `scope`'s partition, newest first.
    pub fn list_documents(&self, scope: &Scope) -> Result<Vec<DocumentRecord>> {
        let partition = self.resolver.locate(scope)?;
        Ok(newest_first(self.catalogs.partition(&partition).records()?))
    }

    /// Every department and subject document, newest first.
    pub fn list_all_documents(&self) -> Result<Vec<DocumentRecord>> {
        Ok(newest_first(self.catalogs.documents().records()?))
    }

    pub fn list_subjects(&self, department: &str) -> Result<Vec<SubjectSummary>> {
        self.resolver
            .subject_partitions(department)?
            .into_iter()
            .map(|partition| {
                let records = self.catalogs.partition(&partition).records()?;
                // Prefer the name as uploaded; the directory key is sanitised.
                let subject = records
                    .iter()
                    .find_map(|r| r.scope.subject_name())
                    .or_else(|| partition.key.rsplit('/').next())
                    .unwrap_or_default()
                    .to_string();
                Ok(SubjectSummary {
                    subject,
                    document_count: records.len(),
                })
            })
            .collect()
    }

    /// Events grouped by event type, newest first within each group.
    ///
    /// `DepartmentEvent` with a department lists that department's events;
    /// without one it lists every department's events.
    pub fn list_events(
        &self,
        kind: PartitionKind,
        department: Option<&str>,
    ) -> Result<BTreeMap<String, Vec<DocumentRecord>>> {
        let records = match (kind, department) {
            (PartitionKind::CollegeEvent, _) => self.catalogs.college_events().records()?,
            (PartitionKind::DepartmentEvent, Some(dept)) => {
                let partition = self.resolver.locate(&Scope::department_event(dept))?;
                self.catalogs.partition(&partition).records()?
            }
            (PartitionKind::DepartmentEvent, None) => {
                self.catalogs.department_events().records()?
            }
            (other, _) => {
                return Err(Error::InvalidScope(format!(
                    "{} partitions do not hold events",
                    other
                )))
            }
        };

        let fallback = match kind {
            PartitionKind::CollegeEvent => DEFAULT_COLLEGE_EVENT_TYPE,
            _ => DEFAULT_DEPARTMENT_EVENT_TYPE,
        };
        let mut grouped: BTreeMap<String, Vec<DocumentRecord>> = BTreeMap::new();
        for record in newest_first(records) {
            let key = record
                .event_type
                .clone()
                .unwrap_or_else(|| fallback.to_string());
            grouped.entry(key).or_default().push(record);
        }
        Ok(grouped)
    }
}

fn newest_first(mut records: Vec<DocumentRecord>) -> Vec<DocumentRecord> {
    records.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
    records
}
