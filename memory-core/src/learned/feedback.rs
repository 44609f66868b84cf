//! Feedback tracker.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::storage::LearnedStatePersistence;
use crate::types::{FeedbackWeight, LearnedConfig, RecallHit};

/// Hash used to key feedback weights by normalized query.
#[must_use]
pub fn query_hash(normalized_query: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    normalized_query.hash(&mut hasher);
    hasher.finish()
}

struct RetrievalEvent {
    query_hash: u64,
    fact_ids: Vec<Uuid>,
}

/// Tracks the most recent retrieval per session and adjusts per-fact
/// weights based on whether results were used.
pub struct FeedbackTracker {
    persistence: Option<Arc<dyn LearnedStatePersistence>>,
    last_retrieval: RwLock<HashMap<String, RetrievalEvent>>,
    weights: RwLock<HashMap<(u64, Uuid), f32>>,
    reinforce: f32,
    penalize: f32,
    lambda: f32,
}

impl FeedbackTracker {
    /// Construct a tracker, optionally backed by durable weight persistence.
    #[must_use]
    pub fn new(persistence: Option<Arc<dyn LearnedStatePersistence>>, config: LearnedConfig) -> Self {
        Self {
            persistence,
            last_retrieval: RwLock::new(HashMap::new()),
            weights: RwLock::new(HashMap::new()),
            reinforce: config.feedback_reinforce,
            penalize: config.feedback_penalize,
            lambda: config.feedback_lambda,
        }
    }

    /// Record that `session` retrieved `fact_ids` for `query`.
    pub fn record_retrieval(&self, session: &str, query: &str, fact_ids: &[Uuid]) {
        let hash = query_hash(&crate::learned::cache::normalize(query));
        self.last_retrieval.write().insert(
            session.to_string(),
            RetrievalEvent {
                query_hash: hash,
                fact_ids: fact_ids.to_vec(),
            },
        );
    }

    /// Record which facts from the most recent retrieval in `session` were
    /// actually used; reinforces used facts, penalizes ignored ones.
    pub async fn record_usage(&self, session: &str, used_fact_ids: &[Uuid]) {
        let event = {
            let map = self.last_retrieval.read();
            map.get(session).map(|e| (e.query_hash, e.fact_ids.clone()))
        };
        let Some((hash, retrieved)) = event else {
            return;
        };
        for fact_id in &retrieved {
            let delta = if used_fact_ids.contains(fact_id) {
                self.reinforce
            } else {
                -self.penalize
            };
            let new_weight = {
                let mut weights = self.weights.write();
                let entry = weights.entry((hash, *fact_id)).or_insert(0.0);
                *entry += delta;
                *entry
            };
            if let Some(persistence) = &self.persistence {
                let weight = FeedbackWeight {
                    query_hash: hash,
                    fact_id: *fact_id,
                    weight: new_weight,
                    updated_at: Utc::now(),
                };
                if let Err(e) = persistence.put_feedback_weight(&weight).await {
                    tracing::warn!(error = %e, "feedback weight persistence failed, continuing in-memory-only");
                }
            }
        }
    }

    /// Stable rerank by `base_score + lambda * tanh(weight)`. With no known
    /// weight, the contribution is zero and order is preserved.
    #[must_use]
    pub fn rerank(&self, query: &str, mut results: Vec<RecallHit>) -> Vec<RecallHit> {
        let hash = query_hash(&crate::learned::cache::normalize(query));
        let weights = self.weights.read();
        let scored: Vec<(f32, RecallHit)> = results
            .drain(..)
            .map(|hit| {
                let weight = weights.get(&(hash, hit.memory.id)).copied().unwrap_or(0.0);
                let adjusted = hit.similarity_score + self.lambda * weight.tanh();
                (adjusted, hit)
            })
            .collect();
        let mut indexed: Vec<(usize, f32, RecallHit)> = scored
            .into_iter()
            .enumerate()
            .map(|(i, (score, hit))| (i, score, hit))
            .collect();
        indexed.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        indexed.into_iter().map(|(_, _, hit)| hit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemoryEntry, RetrievalMethod, Scope, SourceType};
    use chrono::Utc;

    fn hit(score: f32) -> RecallHit {
        RecallHit {
            memory: MemoryEntry {
                id: Uuid::new_v4(),
                content: "x".to_string(),
                embedding: None,
                source_instance: "test".to_string(),
                source_type: SourceType::Deliberate,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                tags: Default::default(),
                context: None,
                confidence: 1.0,
                supersedes: None,
                scope: Scope::Personal,
                workspace_id: None,
                user_id: None,
                model_id: None,
            },
            similarity_score: score,
            retrieval_time_ms: 0,
            retrieval_method: RetrievalMethod::Vector,
        }
    }

    #[test]
    fn rerank_with_no_weights_preserves_order() {
        let tracker = FeedbackTracker::new(None, LearnedConfig::default());
        let results = vec![hit(0.9), hit(0.5), hit(0.3)];
        let ids: Vec<Uuid> = results.iter().map(|h| h.memory.id).collect();
        let reranked = tracker.rerank("some query", results);
        let reranked_ids: Vec<Uuid> = reranked.iter().map(|h| h.memory.id).collect();
        assert_eq!(ids, reranked_ids);
    }

    #[tokio::test]
    async fn reinforced_fact_moves_up_in_rerank() {
        let tracker = FeedbackTracker::new(None, LearnedConfig::default());
        let a = hit(0.5);
        let b = hit(0.51);
        let a_id = a.memory.id;
        let b_id = b.memory.id;
        tracker.record_retrieval("s1", "query", &[a_id, b_id]);
        tracker.record_usage("s1", &[a_id]).await;
        let reranked = tracker.rerank("query", vec![a, b]);
        assert_eq!(reranked[0].memory.id, a_id);
    }
}
