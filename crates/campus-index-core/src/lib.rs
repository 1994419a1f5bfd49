//! # campus-index core
//!
//! Pure, I/O-free logic shared by the campus-index engine: the data model,
//! the sentence chunker, the embedding provider trait, the flat similarity
//! index and the ranking policies used to merge federated results.
//!
//! Nothing in this crate touches the filesystem or the network. Storage,
//! extraction and provider implementations live in the `campus-index`
//! application crate.

pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
pub mod rank;
