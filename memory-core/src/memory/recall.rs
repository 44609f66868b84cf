//! `recall` / `recall_entity`.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::safeguards::IdentityKey;
use crate::storage::SearchFilter;
use crate::types::{MemoryEntry, RecallHit, RecallOutcome, RetrievalMethod, SourceType};

use super::MemoryService;

/// Parameters accepted by [`MemoryService::recall`] .
#[derive(Debug, Clone)]
pub struct RecallParams {
    /// Natural-language query.
    pub query: String,
    /// Session this recall is attributed to, for safeguard bookkeeping.
    pub session_id: String,
    /// Turn this recall is attributed to, for token-budget bookkeeping.
    pub turn_id: String,
    /// Maximum number of results to return.
    pub limit: usize,
    /// Minimum final score a result must reach to be returned.
    pub min_relevance: f32,
    /// Candidates must carry all of these tags.
    pub tags: Option<Vec<String>>,
    /// Candidates must have `created_at >= after`.
    pub after: Option<DateTime<Utc>>,
    /// Candidates must have `created_at <= before`.
    pub before: Option<DateTime<Utc>>,
    /// Restrict to these source types.
    pub sources: Option<Vec<SourceType>>,
    /// Whether to run graph expansion.
    pub graph_expansion: bool,
}

impl RecallParams {
    /// Construct params with the default settings (`limit=5`,
    /// `min_relevance=0.3`, `graph_expansion=true`).
    #[must_use]
    pub fn new(query: impl Into<String>, session_id: impl Into<String>, turn_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
            turn_id: turn_id.into(),
            limit: 5,
            min_relevance: 0.3,
            tags: None,
            after: None,
            before: None,
            sources: None,
            graph_expansion: true,
        }
    }
}

struct Candidate {
    memory: MemoryEntry,
    vector_score: f32,
    text_score: f32,
    graph_score: f32,
    method: RetrievalMethod,
}

impl MemoryService {
    /// Run the full hybrid recall pipeline.
    pub async fn recall(&self, params: RecallParams) -> Result<RecallOutcome> {
        if params.limit == 0 {
            return Ok(RecallOutcome::Results(Vec::new()));
        }

        if let Some(reason) = self.safeguards.pre_gate(&params.query, &params.session_id) {
            return Ok(RecallOutcome::Skipped(reason));
        }

        if let Some(cached_ids) = self.query_cache.lookup(&params.query).await {
            let hits = self.hits_for_cached_ids(&cached_ids, &params).await?;
            if !hits.is_empty() {
                return self.finish_recall(params, hits).await;
            }
        }

        let (after, before) = self.resolve_temporal_range(&params);
        let filter = SearchFilter {
            tags: params.tags.clone(),
            after,
            before,
            scope: None,
            workspace_id: None,
            source_type: None,
        };

        let mut candidates: HashMap<Uuid, Candidate> = HashMap::new();

        let query_embedding = self.embedder.embed_text(&params.query).await;
        let candidate_pool = params.limit * self.config.search.candidate_multiplier;

        if let Ok(vector) = &query_embedding {
            if let Ok(hits) = self.vectors.search(vector, candidate_pool, &filter).await {
                self.merge_vector_hits(hits, &mut candidates).await;
            }
        }

        let variants = self.expander.expand(&params.query).await;
        for variant in &variants {
            if let Ok(hits) = self.text.search(variant, candidate_pool).await {
                self.merge_text_hits(hits, &mut candidates).await;
            }
        }

        if params.graph_expansion && self.config.graph.expansion_enabled {
            self.merge_graph_candidates(&params, candidate_pool, &mut candidates)
                .await;
        }

        let hits = self.finalize_candidates(candidates, &params).await?;
        self.finish_recall(params, hits).await
    }

    /// Direct entity-anchored recall: memories linked to `entity_name`
    /// within `hops`, most-connected first.
    pub async fn recall_entity(&self, entity_name: &str, hops: u32, limit: usize) -> Result<Vec<MemoryEntry>> {
        let connected = self.graph.find_connected(entity_name, hops).await?;
        let entity_ids: Vec<Uuid> = connected.iter().map(|c| c.entity.id).collect();
        let memory_ids = self.graph.memories_for_entities(&entity_ids).await?;
        let mut out = Vec::with_capacity(limit.min(memory_ids.len()));
        for id in memory_ids.into_iter().take(limit) {
            if let Some(entry) = self.resolve_to_leaf(id).await? {
                out.push(entry);
            }
        }
        Ok(out)
    }

    async fn hits_for_cached_ids(&self, ids: &[Uuid], params: &RecallParams) -> Result<Vec<RecallHit>> {
        let mut hits = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = self.resolve_to_leaf(*id).await? {
                if !passes_filters(&entry, params) {
                    continue;
                }
                hits.push(RecallHit {
                    memory: entry,
                    similarity_score: 1.0,
                    retrieval_time_ms: 0,
                    retrieval_method: RetrievalMethod::Hybrid,
                });
            }
        }
        Ok(hits)
    }

    async fn merge_vector_hits(
        &self,
        hits: Vec<crate::storage::ScoredId>,
        candidates: &mut HashMap<Uuid, Candidate>,
    ) {
        let normalized = min_max_normalize(hits.iter().map(|h| h.score).collect());
        for (scored, norm_score) in hits.into_iter().zip(normalized) {
            if let Ok(Some(entry)) = self.records.get(scored.id).await {
                let candidate = candidates.entry(scored.id).or_insert_with(|| Candidate {
                    memory: entry,
                    vector_score: 0.0,
                    text_score: 0.0,
                    graph_score: 0.0,
                    method: RetrievalMethod::Vector,
                });
                candidate.vector_score = candidate.vector_score.max(norm_score);
            }
        }
    }

    async fn merge_text_hits(
        &self,
        hits: Vec<crate::storage::ScoredId>,
        candidates: &mut HashMap<Uuid, Candidate>,
    ) {
        let normalized = min_max_normalize(hits.iter().map(|h| h.score).collect());
        for (scored, norm_score) in hits.into_iter().zip(normalized) {
            if let Ok(Some(entry)) = self.records.get(scored.id).await {
                let candidate = candidates.entry(scored.id).or_insert_with(|| Candidate {
                    memory: entry,
                    vector_score: 0.0,
                    text_score: 0.0,
                    graph_score: 0.0,
                    method: RetrievalMethod::Vector,
                });
                candidate.text_score = candidate.text_score.max(norm_score);
                if candidate.vector_score > 0.0 {
                    candidate.method = RetrievalMethod::Hybrid;
                }
            }
        }
    }

    async fn merge_graph_candidates(
        &self,
        params: &RecallParams,
        candidate_pool: usize,
        candidates: &mut HashMap<Uuid, Candidate>,
    ) {
        let extraction = self.extractor.extract(&params.query, Uuid::nil());
        if extraction.entities.is_empty() {
            return;
        }
        let buffer_cap = (params.limit * self.config.graph.buffer).min(candidate_pool.max(1) * 10);
        let mut added = 0usize;
        for entity in &extraction.entities {
            if added >= buffer_cap {
                break;
            }
            let Ok(connected) = self.graph.find_connected(&entity.name, 2).await else {
                continue;
            };
            for c in &connected {
                if added >= buffer_cap {
                    break;
                }
                let Ok(memory_ids) = self.graph.memories_for_entities(&[c.entity.id]).await else {
                    continue;
                };
                let score = if c.depth <= 1 {
                    self.config.graph.one_hop_score
                } else {
                    self.config.graph.two_hop_score
                };
                for memory_id in memory_ids {
                    if added >= buffer_cap {
                        break;
                    }
                    if let Ok(Some(entry)) = self.records.get(memory_id).await {
                        let candidate = candidates.entry(memory_id).or_insert_with(|| Candidate {
                            memory: entry,
                            vector_score: 0.0,
                            text_score: 0.0,
                            graph_score: 0.0,
                            method: RetrievalMethod::Graph,
                        });
                        candidate.graph_score = candidate.graph_score.max(score);
                        added += 1;
                    }
                }
            }
        }
    }

    async fn finalize_candidates(
        &self,
        candidates: HashMap<Uuid, Candidate>,
        params: &RecallParams,
    ) -> Result<Vec<RecallHit>> {
        let vector_weight = self.config.search.vector_weight;
        let text_weight = self.config.search.text_weight;

        let mut by_leaf: HashMap<Uuid, RecallHit> = HashMap::new();

        for candidate in candidates.into_values() {
            if !passes_filters(&candidate.memory, params) {
                continue;
            }
            let hybrid = vector_weight * candidate.vector_score + text_weight * candidate.text_score;
            let final_score = hybrid.max(candidate.graph_score);

            let Some(leaf) = self.resolve_to_leaf(candidate.memory.id).await? else {
                continue;
            };
            let entry = by_leaf.entry(leaf.id).or_insert_with(|| RecallHit {
                memory: leaf,
                similarity_score: 0.0,
                retrieval_time_ms: 0,
                retrieval_method: candidate.method,
            });
            if final_score > entry.similarity_score {
                entry.similarity_score = final_score;
                entry.retrieval_method = candidate.method;
            }
        }

        let mut hits: Vec<RecallHit> = by_leaf.into_values().collect();
        hits = self.rerank(hits);
        hits = self.feedback.rerank(&params.query, hits);

        hits.retain(|h| h.similarity_score >= params.min_relevance);
        hits.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.memory.id.cmp(&b.memory.id))
        });
        hits.truncate(params.limit);
        Ok(hits)
    }

    /// Heuristic recency-decay + tag-boost rerank, applied before the
    /// feedback-weighted rerank.
    fn rerank(&self, mut hits: Vec<RecallHit>) -> Vec<RecallHit> {
        let now = Utc::now();
        for hit in &mut hits {
            let age_days = (now - hit.memory.updated_at).num_seconds().max(0) as f32 / 86_400.0;
            let recency_decay = 1.0 / (1.0 + age_days / 30.0);
            let tag_boost = if hit.memory.tags.is_empty() { 1.0 } else { 1.05 };
            hit.similarity_score = (hit.similarity_score * 0.9 + recency_decay * 0.1) * tag_boost;
        }
        hits.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.memory.id.cmp(&b.memory.id))
        });
        hits
    }

    /// Walk the correction chain forward to its leaf (no outgoing
    /// `supersedes` edge).
    async fn resolve_to_leaf(&self, id: Uuid) -> Result<Option<MemoryEntry>> {
        let mut current = id;
        for _ in 0..10_000 {
            let Some(child) = self.records.find_superseding(current).await? else {
                return self.records.get(current).await;
            };
            current = child;
        }
        Err(Error::CorrectionCycle(id))
    }

    /// If `after`/`before` aren't given, look for a small set of relative
    /// date phrases in the query and narrow the range accordingly.
    fn resolve_temporal_range(
        &self,
        params: &RecallParams,
    ) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        if params.after.is_some() || params.before.is_some() {
            return (params.after, params.before);
        }
        let lower = params.query.to_lowercase();
        let now = Utc::now();
        if lower.contains("today") {
            (Some(now - Duration::hours(24)), None)
        } else if lower.contains("yesterday") {
            (Some(now - Duration::hours(48)), Some(now - Duration::hours(24)))
        } else if lower.contains("last week") {
            (Some(now - Duration::days(14)), Some(now - Duration::days(7)))
        } else if lower.contains("this month") {
            (Some(now - Duration::days(30)), None)
        } else {
            (None, None)
        }
    }

    async fn finish_recall(&self, params: RecallParams, hits: Vec<RecallHit>) -> Result<RecallOutcome> {
        let fact_ids: Vec<Uuid> = hits.iter().map(|h| h.memory.id).collect();

        let accepted = self.safeguards.post_gate(&params.session_id, &params.turn_id, hits, |hit| {
            IdentityKey::from_snippet(&hit.memory.id.to_string(), &hit.memory.content)
        });

        if !accepted.is_empty() {
            self.query_cache.record_success(&params.query, &fact_ids).await;
        }
        self.feedback
            .record_retrieval(&params.session_id, &params.query, &fact_ids);

        Ok(RecallOutcome::Results(accepted))
    }
}

fn passes_filters(entry: &MemoryEntry, params: &RecallParams) -> bool {
    if let Some(sources) = &params.sources {
        if !sources.contains(&entry.source_type) {
            return false;
        }
    }
    if let Some(tags) = &params.tags {
        if !tags.iter().all(|t| entry.tags.contains(t)) {
            return false;
        }
    }
    true
}

/// Min-max normalize `scores` to `[0, 1]`. An all-equal input maps to 1.0
/// everywhere (no information to rank by) rather than dividing by zero.
fn min_max_normalize(scores: Vec<f32>) -> Vec<f32> {
    if scores.is_empty() {
        return scores;
    }
    let min = scores.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if range <= f32::EPSILON {
        return scores.iter().map(|_| 1.0).collect();
    }
    scores.iter().map(|s| (s - min) / range).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_normalize_scales_to_unit_range() {
        let out = min_max_normalize(vec![1.0, 2.0, 3.0]);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn min_max_normalize_handles_equal_scores() {
        let out = min_max_normalize(vec![2.0, 2.0]);
        assert_eq!(out, vec![1.0, 1.0]);
    }

    #[test]
    fn min_max_normalize_handles_empty() {
        assert!(min_max_normalize(vec![]).is_empty());
    }
}
