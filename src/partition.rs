//! Mapping from organisational scopes to partition directories.
//!
//! Every scope resolves to exactly one directory under the storage root:
//!
//! | Scope | Partition key |
//! |-------|---------------|
//! | `Department { "Computer Science" }` | `ComputerScience` |
//! | `Subject { "Computer Science", "Data Structures" }` | `ComputerScience/DataStructures` |
//! | `CollegeEvent` | `college-events` |
//! | `DepartmentEvent { "Civil Engineering" }` | `department-events/civil_engineering` |
//!
//! Keys are a pure function of the scope. The resolver creates directories
//! but never deletes them.

use std::path::{Path, PathBuf};

use campus_index_core::index::Metric;
use campus_index_core::models::{PartitionKind, Scope, SearchMode};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

pub const COLLEGE_EVENTS: &str = "college-events";
pub const DEPARTMENT_EVENTS: &str = "department-events";
pub const CATALOG_DIR: &str = "_catalog";

const RESERVED: [&str; 3] = [COLLEGE_EVENTS, DEPARTMENT_EVENTS, CATALOG_DIR];

/// A resolved partition directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Path relative to the storage root, always `/`-separated.
    pub key: String,
    pub kind: PartitionKind,
    pub path: PathBuf,
}

impl Partition {
    pub fn metric(&self) -> Metric {
        self.kind.metric()
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }
}

#[derive(Debug, Clone)]
pub struct PartitionResolver {
    root: PathBuf,
}

impl PartitionResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compute the partition for `scope` without touching the filesystem.
    pub fn locate(&self, scope: &Scope) -> Result<Partition> {
        let (key, kind) = match scope {
            Scope::Department { department } => {
                (department_segment(department)?, PartitionKind::Department)
            }
            Scope::Subject {
                department,
                subject,
            } => (
                format!(
                    "{}/{}",
                    department_segment(department)?,
                    subject_segment(subject)?
                ),
                PartitionKind::Subject,
            ),
            Scope::CollegeEvent => (COLLEGE_EVENTS.to_string(), PartitionKind::CollegeEvent),
            Scope::DepartmentEvent { department } => (
                format!("{}/{}", DEPARTMENT_EVENTS, event_segment(department)?),
                PartitionKind::DepartmentEvent,
            ),
        };
        Ok(self.partition(key, kind))
    }

    /// Compute the partition for `scope` and create its directory.
    pub fn resolve(&self, scope: &Scope) -> Result<Partition> {
        let partition = self.locate(scope)?;
        std::fs::create_dir_all(&partition.path)?;
        debug!(key = %partition.key, "resolved partition");
        Ok(partition)
    }

    /// Partitions a query (or a deletion) over `scope` fans out to.
    ///
    /// Event scopes always map to their single partition. For department and
    /// subject scopes the search mode decides: `Subject` searches one subject
    /// partition, `General` only the department's own partition, and
    /// `Department`/`All` the department plus every subject partition found on
    /// disk. Partitions that do not exist yet are still returned; they simply
    /// hold no documents.
    pub fn partitions_for(&self, scope: &Scope, mode: SearchMode) -> Result<Vec<Partition>> {
        match scope {
            Scope::CollegeEvent | Scope::DepartmentEvent { .. } => Ok(vec![self.locate(scope)?]),
            Scope::Department { department } | Scope::Subject { department, .. } => match mode {
                SearchMode::Subject => match scope.subject_name() {
                    Some(_) => Ok(vec![self.locate(scope)?]),
                    None => Err(Error::InvalidScope(
                        "subject search mode requires a subject".to_string(),
                    )),
                },
                SearchMode::General => Ok(vec![self.locate(&Scope::department(department))?]),
                SearchMode::Department | SearchMode::All => {
                    let mut partitions = vec![self.locate(&Scope::department(department))?];
                    partitions.extend(self.subject_partitions(department)?);
                    Ok(partitions)
                }
            },
        }
    }

    /// Subject partitions currently present under a department, sorted by key.
    pub fn subject_partitions(&self, department: &str) -> Result<Vec<Partition>> {
        let dept_key = department_segment(department)?;
        let dept_path = self.root.join(&dept_key);
        if !dept_path.is_dir() {
            return Ok(Vec::new());
        }

        let mut partitions = Vec::new();
        for entry in WalkDir::new(&dept_path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            partitions.push(self.partition(
                format!("{}/{}", dept_key, name),
                PartitionKind::Subject,
            ));
        }
        Ok(partitions)
    }

    fn partition(&self, key: String, kind: PartitionKind) -> Partition {
        let path = key.split('/').fold(self.root.clone(), |p, s| p.join(s));
        Partition { key, kind, path }
    }
}

/// Department segment: spaces removed, path separators replaced, case kept.
pub fn department_segment(name: &str) -> Result<String> {
    let segment = name.replace(' ', "").replace(['/', '\\'], "_");
    check_segment(name, &segment)?;
    if RESERVED.contains(&segment.as_str()) {
        return Err(Error::InvalidScope(format!(
            "'{}' is a reserved partition name",
            name
        )));
    }
    Ok(segment)
}

/// Subject segment, sanitised like a department name.
pub fn subject_segment(name: &str) -> Result<String> {
    let segment = name.replace(' ', "").replace(['/', '\\'], "_");
    check_segment(name, &segment)?;
    Ok(segment)
}

/// Department-event segment: spaces, hyphens and separators become `_`, lower-cased.
pub fn event_segment(name: &str) -> Result<String> {
    let segment = name
        .trim()
        .replace([' ', '-', '/', '\\'], "_")
        .to_lowercase();
    check_segment(name, &segment)?;
    Ok(segment)
}

fn check_segment(original: &str, segment: &str) -> Result<()> {
    if segment.is_empty() || segment == "." || segment == ".." {
        return Err(Error::InvalidScope(format!(
            "'{}' does not name a usable partition",
            original
        )));
    }
    Ok(())
}
