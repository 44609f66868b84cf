//! Query cache.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::storage::LearnedStatePersistence;
use crate::types::{LearnedConfig, QueryCacheEntry};

/// Normalize `q` per the pipeline order: lowercase, strip non-alphanumerics except
/// whitespace, collapse whitespace.
#[must_use]
pub fn normalize(q: &str) -> String {
    let mut out = String::with_capacity(q.len());
    let mut last_was_space = false;
    for ch in q.to_lowercase().chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
            last_was_space = false;
        } else if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        }
        // other punctuation is dropped entirely, not turned into whitespace
    }
    out.trim().to_string()
}

/// Caches `normalized_query -> [fact_ids]`, served only once a query has
/// succeeded `min_successes` times.
pub struct QueryCache {
    persistence: Option<Arc<dyn LearnedStatePersistence>>,
    in_memory: RwLock<std::collections::HashMap<String, QueryCacheEntry>>,
    min_successes: u32,
}

impl QueryCache {
    /// Construct a cache, optionally backed by durable persistence. When
    /// `persistence` is `None` (or fails), the cache degrades to
    /// in-memory-only operation (learned-layer persistence errors
    /// never surface to the caller).
    #[must_use]
    pub fn new(persistence: Option<Arc<dyn LearnedStatePersistence>>, config: LearnedConfig) -> Self {
        Self {
            persistence,
            in_memory: RwLock::new(std::collections::HashMap::new()),
            min_successes: config.query_cache_min_successes,
        }
    }

    /// Return cached fact ids for `query` iff an entry exists and has met
    /// the minimum success count.
    pub async fn lookup(&self, query: &str) -> Option<Vec<Uuid>> {
        let key = normalize(query);
        if let Some(entry) = self.in_memory.read().get(&key).cloned() {
            if entry.success_count >= self.min_successes {
                return Some(entry.fact_ids);
            }
            return None;
        }
        if let Some(persistence) = &self.persistence {
            match persistence.get_cache_entry(&key).await {
                Ok(Some(entry)) if entry.success_count >= self.min_successes => {
                    let fact_ids = entry.fact_ids.clone();
                    self.in_memory.write().insert(key, entry);
                    return Some(fact_ids);
                }
                Ok(_) => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "query cache persistence read failed, degrading to in-memory");
                    return None;
                }
            }
        }
        None
    }

    /// Record a successful recall: merge `fact_ids` into the existing entry
    /// (each id's cumulative hit count is incremented, then the retained
    /// list is re-sorted by count descending and capped at 10), bump
    /// `success_count`, and refresh `last_success_at`.
    pub async fn record_success(&self, query: &str, fact_ids: &[Uuid]) {
        let key = normalize(query);
        let mut map = self.in_memory.write();
        let entry = map.entry(key.clone()).or_insert_with(|| QueryCacheEntry {
            normalized_query: key.clone(),
            fact_ids: Vec::new(),
            fact_counts: std::collections::HashMap::new(),
            success_count: 0,
            last_success_at: Utc::now(),
        });
        merge_fact_ids(&mut entry.fact_ids, &mut entry.fact_counts, fact_ids);
        entry.success_count += 1;
        entry.last_success_at = Utc::now();
        let snapshot = entry.clone();
        drop(map);

        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.put_cache_entry(&snapshot).await {
                tracing::warn!(error = %e, "query cache persistence write failed, continuing in-memory-only");
            }
        }
    }

    /// Drop every entry whose fact list contains `fact_id`: invalidated
    /// when a referenced fact's path is corrected or forgotten.
    pub async fn invalidate_path(&self, fact_id: Uuid) {
        self.in_memory
            .write()
            .retain(|_, entry| !entry.fact_ids.contains(&fact_id));
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.invalidate_path(fact_id).await {
                tracing::warn!(error = %e, "query cache invalidation persistence failed");
            }
        }
    }
}

/// Merge `new_ids` into `existing`, incrementing each id's cumulative hit
/// count in `counts`, then re-sorting `existing` by count descending
/// (stable, so ties keep first-seen order) and truncating to the top 10.
/// Counts for ids dropped by the cap are pruned along with them.
fn merge_fact_ids(existing: &mut Vec<Uuid>, counts: &mut std::collections::HashMap<Uuid, u32>, new_ids: &[Uuid]) {
    for id in new_ids {
        *counts.entry(*id).or_insert(0) += 1;
        if !existing.contains(id) {
            existing.push(*id);
        }
    }
    existing.sort_by(|a, b| {
        let ca = counts.get(a).copied().unwrap_or(0);
        let cb = counts.get(b).copied().unwrap_or(0);
        cb.cmp(&ca)
    });
    existing.truncate(10);
    counts.retain(|id, _| existing.contains(id));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_collapses_whitespace() {
        assert_eq!(normalize("What's   my TIMEZONE?!"), "whats my timezone");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("Where do I live??");
        assert_eq!(normalize(&once), once);
    }

    #[tokio::test]
    async fn lookup_misses_before_min_successes() {
        let cache = QueryCache::new(None, LearnedConfig::default());
        let fact = Uuid::new_v4();
        cache.record_success("my timezone", &[fact]).await;
        cache.record_success("my timezone", &[fact]).await;
        assert!(cache.lookup("my timezone").await.is_none());
    }

    #[tokio::test]
    async fn lookup_hits_after_min_successes() {
        let cache = QueryCache::new(None, LearnedConfig::default());
        let fact = Uuid::new_v4();
        for _ in 0..3 {
            cache.record_success("my timezone", &[fact]).await;
        }
        assert_eq!(cache.lookup("my timezone").await, Some(vec![fact]));
    }

    #[tokio::test]
    async fn record_success_retains_most_frequent_ten() {
        let cache = QueryCache::new(None, LearnedConfig::default());
        let ids: Vec<Uuid> = (0..12).map(|_| Uuid::new_v4()).collect();

        for _ in 0..5 {
            cache.record_success("popular query", &[ids[0]]).await;
        }
        for _ in 0..4 {
            cache.record_success("popular query", &[ids[1]]).await;
        }
        for id in &ids[2..12] {
            cache.record_success("popular query", &[*id]).await;
        }

        let cached = cache.lookup("popular query").await.expect("cached");
        assert_eq!(cached.len(), 10);
        assert_eq!(cached[0], ids[0], "highest-frequency id must rank first");
        assert_eq!(cached[1], ids[1], "second-highest-frequency id must rank second");
        assert!(
            !cached.contains(&ids[10]) || !cached.contains(&ids[11]),
            "at least one of the two latest single-hit ids must be evicted by the top-10 cap"
        );
    }

    #[tokio::test]
    async fn invalidate_path_drops_matching_entries() {
        let cache = QueryCache::new(None, LearnedConfig::default());
        let fact = Uuid::new_v4();
        for _ in 0..3 {
            cache.record_success("my timezone", &[fact]).await;
        }
        cache.invalidate_path(fact).await;
        assert!(cache.lookup("my timezone").await.is_none());
    }
}
