//! Append-only document catalogs.
//!
//! A catalog is a JSON-lines log of `add` and `remove` entries. Replaying the
//! log (later entries win) yields the live set of [`DocumentRecord`]s. Every
//! partition has its own `catalog.jsonl`; three global logs under `_catalog/`
//! index department/subject uploads, college events and department events.
//!
//! Writers to the same file are serialised by an in-process mutex, and each
//! entry is a single `O_APPEND` write. Logs are compacted (rewritten with live
//! records only) once they grow past the configured line count.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use campus_index_core::models::{DocumentRecord, PartitionKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::partition::{Partition, CATALOG_DIR};
use crate::store::write_atomic;

pub const PARTITION_CATALOG: &str = "catalog.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum CatalogEntry {
    Add {
        record: DocumentRecord,
    },
    Remove {
        document_id: String,
        removed_at: DateTime<Utc>,
    },
}

/// Registry of catalog files and their write locks.
#[derive(Debug)]
pub struct Catalogs {
    root: PathBuf,
    compact_after: usize,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl Catalogs {
    pub fn new(root: impl Into<PathBuf>, compact_after: usize) -> Self {
        Self {
            root: root.into(),
            compact_after,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The catalog stored inside a partition directory.
    pub fn partition(&self, partition: &Partition) -> Catalog {
        self.open(partition.path.join(PARTITION_CATALOG))
    }

    /// Global catalog of department and subject documents.
    pub fn documents(&self) -> Catalog {
        self.global("documents.jsonl")
    }

    pub fn college_events(&self) -> Catalog {
        self.global("college-events.jsonl")
    }

    pub fn department_events(&self) -> Catalog {
        self.global("department-events.jsonl")
    }

    /// The global catalog a document of `kind` is listed in.
    pub fn global_for(&self, kind: PartitionKind) -> Catalog {
        match kind {
            PartitionKind::Department | PartitionKind::Subject => self.documents(),
            PartitionKind::CollegeEvent => self.college_events(),
            PartitionKind::DepartmentEvent => self.department_events(),
        }
    }

    /// Every catalog log currently on disk: the global logs first, then each
    /// partition's, in path order.
    pub fn all(&self) -> Result<Vec<Catalog>> {
        let mut catalogs: Vec<Catalog> = [
            self.documents(),
            self.college_events(),
            self.department_events(),
        ]
        .into_iter()
        .filter(|c| c.path.exists())
        .collect();

        if !self.root.is_dir() {
            return Ok(catalogs);
        }
        for entry in WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(3)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if entry.file_type().is_file() && entry.file_name() == PARTITION_CATALOG {
                catalogs.push(self.open(entry.into_path()));
            }
        }
        Ok(catalogs)
    }

    fn global(&self, file: &str) -> Catalog {
        self.open(self.root.join(CATALOG_DIR).join(file))
    }

    fn open(&self, path: PathBuf) -> Catalog {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(path.clone()).or_default())
        };
        Catalog {
            path,
            lock,
            compact_after: self.compact_after,
        }
    }
}

/// Handle to one catalog log.
#[derive(Debug, Clone)]
pub struct Catalog {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
    compact_after: usize,
}

impl Catalog {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn append(&self, record: &DocumentRecord) -> Result<()> {
        self.write_entry(&CatalogEntry::Add {
            record: record.clone(),
        })
    }

    /// Record a tombstone for `document_id`.
    pub fn remove(&self, document_id: &str) -> Result<()> {
        self.write_entry(&CatalogEntry::Remove {
            document_id: document_id.to_string(),
            removed_at: Utc::now(),
        })
    }

    /// Live records in append order. A missing log is an empty catalog.
    pub fn records(&self) -> Result<Vec<DocumentRecord>> {
        let _guard = self.guard();
        Ok(replay(&self.read_entries()?))
    }

    pub fn get(&self, document_id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self
            .records()?
            .into_iter()
            .find(|r| r.document_id == document_id))
    }

    /// Rewrite the log with one `add` entry per live record. Returns the
    /// number of live records.
    pub fn compact(&self) -> Result<usize> {
        let _guard = self.guard();
        self.compact_locked()
    }

    fn write_entry(&self, entry: &CatalogEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.guard();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        drop(file);

        if self.compact_after > 0 && self.line_count()? > self.compact_after {
            self.compact_locked()?;
        }
        Ok(())
    }

    fn compact_locked(&self) -> Result<usize> {
        let records = replay(&self.read_entries()?);
        let mut out = String::new();
        for record in &records {
            out.push_str(&serde_json::to_string(&CatalogEntry::Add {
                record: record.clone(),
            })?);
            out.push('\n');
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_atomic(&self.path, out.as_bytes())?;
        info!(path = %self.path.display(), live = records.len(), "compacted catalog");
        Ok(records.len())
    }

    fn line_count(&self) -> Result<usize> {
        match std::fs::File::open(&self.path) {
            Ok(file) => Ok(BufReader::new(file).lines().count()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn read_entries(&self) -> Result<Vec<CatalogEntry>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CatalogEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = i + 1,
                    error = %e,
                    "skipping unreadable catalog entry"
                ),
            }
        }
        debug!(path = %self.path.display(), entries = entries.len(), "read catalog");
        Ok(entries)
    }
}

fn replay(entries: &[CatalogEntry]) -> Vec<DocumentRecord> {
    let mut live: Vec<DocumentRecord> = Vec::new();
    for entry in entries {
        match entry {
            CatalogEntry::Add { record } => {
                live.retain(|r| r.document_id != record.document_id);
                live.push(record.clone());
            }
            CatalogEntry::Remove { document_id, .. } => {
                live.retain(|r| &r.document_id != document_id);
            }
        }
    }
    live
}
