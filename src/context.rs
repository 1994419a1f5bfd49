//! Assembling ranked passages into prompt context with citations.

use campus_index_core::models::ScoredPassage;
use campus_index_core::rank::Score;
use serde::{Deserialize, Serialize};

/// One cited source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: String,
    pub title: String,
    pub chunk_index: usize,
    pub score: Score,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RetrievalContext {
    /// Text of the best passages, separated by blank lines.
    pub context: String,
    /// Every ranked result, in rank order.
    pub sources: Vec<SourceRef>,
}

pub fn build_context(results: &[ScoredPassage], max_passages: usize) -> RetrievalContext {
    let context = results
        .iter()
        .take(max_passages)
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let sources = results
        .iter()
        .map(|r| SourceRef {
            document_id: r.document_id.clone(),
            title: r.title.clone(),
            chunk_index: r.chunk_index,
            score: r.score,
        })
        .collect();
    RetrievalContext { context, sources }
}
