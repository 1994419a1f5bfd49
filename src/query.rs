//! Federated retrieval across partitions.
//!
//! A query is embedded once, searched against every live document in every
//! partition its scope and mode fan out to, filtered by the metric-specific
//! threshold, and merged into one ranked list.
//!
//! Documents are found through each partition's catalog rather than by
//! scanning the directory. A document whose artifacts are missing or corrupt
//! is skipped with a warning; it never fails the whole query.

use campus_index_core::embedding::embed_query;
use campus_index_core::models::{ScoredPassage, Scope, SearchMode};
use campus_index_core::rank::{merge_ranked, RankingPolicy, Score};
use tracing::{debug, warn};

use crate::context::{build_context, RetrievalContext};
use crate::engine::Engine;
use crate::error::Result;
use crate::partition::Partition;
use crate::store::LoadedDocument;

impl Engine {
    /// Ranked passages for `text` within `scope`, at most `top_k` of them.
    ///
    /// Blank queries, `top_k == 0`, and scopes with no documents return an
    /// empty list without calling the embedding provider.
    pub async fn query(
        &self,
        text: &str,
        scope: &Scope,
        mode: SearchMode,
        top_k: usize,
    ) -> Result<Vec<ScoredPassage>> {
        if text.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let partitions = self.resolver.partitions_for(scope, mode)?;
        let mut targets = Vec::new();
        for partition in &partitions {
            if !partition.exists() {
                continue;
            }
            for record in self.catalogs.partition(partition).records()? {
                targets.push((partition, record.document_id));
            }
        }
        if targets.is_empty() {
            debug!(?scope, ?mode, "no documents to search");
            return Ok(Vec::new());
        }

        let policy = match partitions.first() {
            Some(p) => RankingPolicy::for_metric(p.metric()),
            None => return Ok(Vec::new()),
        };
        let thresholds = self.config.retrieval.thresholds();
        let query_vector = embed_query(self.embedder.as_ref(), text).await?;

        let mut candidates = Vec::new();
        for (partition, document_id) in targets {
            let doc = match self.store.load(partition, &document_id) {
                Ok(doc) => doc,
                Err(e) if e.is_not_found() => {
                    debug!(document_id = %document_id, "document vanished, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(document_id = %document_id, partition = %partition.key, error = %e, "skipping unreadable document");
                    continue;
                }
            };

            let hits = match doc.index.search(&query_vector, top_k) {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(document_id = %document_id, error = %e, "skipping document");
                    continue;
                }
            };
            let before = candidates.len();
            candidates.extend(
                hits.into_iter()
                    .filter(|hit| policy.admits(hit.score, &thresholds))
                    .filter_map(|hit| scored_passage(partition, &doc, hit.row, hit.score)),
            );
            debug!(
                document_id = %document_id,
                kept = candidates.len() - before,
                "searched document"
            );
        }

        Ok(merge_ranked(policy, candidates, top_k)?)
    }

    /// Query with the configured `top_k`.
    pub async fn search(
        &self,
        text: &str,
        scope: &Scope,
        mode: SearchMode,
    ) -> Result<Vec<ScoredPassage>> {
        self.query(text, scope, mode, self.config.retrieval.top_k)
            .await
    }

    /// Query and assemble the top passages into prompt context.
    pub async fn retrieve_context(
        &self,
        text: &str,
        scope: &Scope,
        mode: SearchMode,
    ) -> Result<RetrievalContext> {
        let results = self.search(text, scope, mode).await?;
        Ok(build_context(
            &results,
            self.config.retrieval.context_passages,
        ))
    }
}

fn scored_passage(
    partition: &Partition,
    doc: &LoadedDocument,
    row: usize,
    score: Score,
) -> Option<ScoredPassage> {
    let passage = doc.passages.get(row)?;
    let record = &doc.record;
    Some(ScoredPassage {
        document_id: record.document_id.clone(),
        chunk_index: passage.chunk_index,
        text: passage.text.clone(),
        score,
        title: record.title.clone(),
        department: record.scope.department_name().map(str::to_string),
        subject: record.scope.subject_name().map(str::to_string),
        storage_type: partition.kind,
        event_type: record.event_type.clone(),
    })
}
