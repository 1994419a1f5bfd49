//! # campus-index
//!
//! Document indexing and federated retrieval for a college's knowledge base.
//!
//! Uploaded PDF, Word and text files are extracted, split into overlapping
//! passages, embedded, and stored as a per-document artifact triad inside a
//! partition chosen by the upload's scope. Queries embed once, fan out over
//! every partition the scope reaches, and merge the hits into one ranked list.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────────────┐
//! │  Upload  │──▶│ Extract+Chunk│──▶│ Partition directory   │
//! │ pdf/docx │   │    +Embed    │   │ passages/index/meta   │
//! └──────────┘   └──────────────┘   └──────────┬───────────┘
//!                                              │ catalog.jsonl
//!                      ┌───────────────────────┤
//!                      ▼                       ▼
//!                 ┌──────────┐          ┌─────────────┐
//!                 │  Query   │          │  _catalog/  │
//!                 │ fan-out  │          │ global logs │
//!                 └──────────┘          └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cidx init
//! cidx ingest syllabus.pdf --kind subject --department Physics --subject Optics
//! cidx search "lens equation" --department Physics
//! cidx list events --college
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Engine error type |
//! | [`extract`] | PDF, Word and text extraction |
//! | [`embedding`] | Embedding provider implementations |
//! | [`partition`] | Scope to partition directory mapping |
//! | [`store`] | Per-document artifact persistence |
//! | [`catalog`] | Append-only document catalogs |
//! | [`engine`] | Engine facade and catalog browsing |
//! | [`ingest`] | Upload pipeline |
//! | [`query`] | Federated retrieval |
//! | [`context`] | Prompt context assembly |
//! | [`delete`] | Document removal |

pub mod catalog;
pub mod config;
pub mod context;
pub mod delete;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod partition;
pub mod query;
pub mod store;

pub use campus_index_core::models::{
    DocumentRecord, PartitionKind, ScoredPassage, Scope, SearchMode, Uploader,
};
pub use engine::Engine;
pub use error::{Error, Result};
pub use ingest::IngestRequest;
