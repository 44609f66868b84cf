//! Configuration surface. Plain, `serde`-derived, `Default`
//! value structs; loading them from env/files is a caller concern, out of
//! scope for this crate.

use serde::{Deserialize, Serialize};

/// Embedding adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Name reported by the configured embedding provider.
    pub model_name: String,
    /// Fixed embedding dimensionality. Vectors of any other length are
    /// rejected at write time.
    pub dimensions: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            model_name: "hash-shingle-v1".to_string(),
            dimensions: 256,
        }
    }
}

/// Hybrid recall weighting and pool sizing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Weight applied to the normalized vector score in the hybrid merge.
    pub vector_weight: f32,
    /// Weight applied to the normalized BM25 score in the hybrid merge.
    pub text_weight: f32,
    /// Candidate pool size multiplier applied to `limit` for each branch.
    pub candidate_multiplier: usize,
    /// Pool size multiplier applied to `limit` before reranking.
    pub rerank_pool_multiplier: usize,
    /// Whether entity extraction on the query itself is deferred until
    /// graph expansion is actually requested.
    pub lazy_entity_extraction: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            vector_weight: 0.6,
            text_weight: 0.4,
            candidate_multiplier: 4,
            rerank_pool_multiplier: 2,
            lazy_entity_extraction: true,
        }
    }
}

/// Graph expansion configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Whether graph expansion runs by default.
    pub expansion_enabled: bool,
    /// Score assigned to memories reached at 1 hop.
    pub one_hop_score: f32,
    /// Score assigned to memories reached at 2 hops.
    pub two_hop_score: f32,
    /// Multiplier applied to `limit` to cap the expansion pool.
    pub buffer: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            expansion_enabled: true,
            one_hop_score: 0.85,
            two_hop_score: 0.70,
            buffer: 6,
        }
    }
}

/// Dedup engine configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Minimum cosine similarity to classify a near-duplicate.
    pub threshold: f32,
    /// How many recent entries to hash-match against for exact duplicates.
    pub recent_window: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: 0.92,
            recent_window: 10_000,
        }
    }
}

/// Safeguard stack configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SafeguardConfig {
    /// Token budget for a single recall.
    pub per_recall_cap: u32,
    /// Token budget for a turn (possibly several recalls).
    pub per_turn_cap: u32,
    /// Token budget for a whole session.
    pub per_session_cap: u32,
    /// Maximum tokens retained per result snippet before truncation.
    pub max_tokens_per_snippet: u32,
    /// Consecutive empty recalls before the circuit breaker trips.
    pub circuit_breaker_max_empty: u32,
    /// Cooldown, in milliseconds, before a tripped breaker resets.
    pub circuit_breaker_cooldown_ms: u64,
    /// Minimum normalized query length to avoid a smart-trigger skip.
    pub smart_trigger_min_query_length: usize,
    /// Whether an emoji-only query is smart-trigger skipped.
    pub smart_trigger_skip_emoji_only: bool,
    /// Session-dedup suppression window, in milliseconds.
    pub session_dedup_cooldown_ms: u64,
    /// Maximum number of sessions tracked by session dedup (LRU-bounded).
    pub session_dedup_max_sessions: usize,
    /// Maximum tracked turns before count-based cleanup.
    pub turn_tracking_max_count: usize,
    /// Maximum turn age, in milliseconds, before time-based cleanup.
    pub turn_max_age_ms: u64,
}

impl Default for SafeguardConfig {
    fn default() -> Self {
        Self {
            per_recall_cap: 500,
            per_turn_cap: 750,
            per_session_cap: 5_000,
            max_tokens_per_snippet: 100,
            circuit_breaker_max_empty: 5,
            circuit_breaker_cooldown_ms: 5 * 60 * 1000,
            smart_trigger_min_query_length: 2,
            smart_trigger_skip_emoji_only: true,
            session_dedup_cooldown_ms: 5 * 60 * 1000,
            session_dedup_max_sessions: 10_000,
            turn_tracking_max_count: 200,
            turn_max_age_ms: 30 * 60 * 1000,
        }
    }
}

/// Learned-retrieval layer configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LearnedConfig {
    /// Minimum `success_count` before a cache entry is served.
    pub query_cache_min_successes: u32,
    /// Maximum expansion variants returned by the query expander.
    pub expander_max_variants: usize,
    /// Feedback weight delta applied when a fact is used.
    pub feedback_reinforce: f32,
    /// Feedback weight delta applied when a fact is ignored.
    pub feedback_penalize: f32,
    /// Blend factor applied to `tanh(weight)` in rerank.
    pub feedback_lambda: f32,
    /// Maximum learned expansions retained per normalized query.
    pub learned_expansion_recency_cap: usize,
}

impl Default for LearnedConfig {
    fn default() -> Self {
        Self {
            query_cache_min_successes: 3,
            expander_max_variants: 8,
            feedback_reinforce: 1.0,
            feedback_penalize: 0.25,
            feedback_lambda: 0.1,
            learned_expansion_recency_cap: 5,
        }
    }
}

/// Aggregate configuration for a [`crate::memory::MemoryService`] instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Embedding adapter configuration.
    pub memory: MemoryConfig,
    /// Hybrid recall configuration.
    pub search: SearchConfig,
    /// Graph expansion configuration.
    pub graph: GraphConfig,
    /// Dedup engine configuration.
    pub dedup: DedupConfig,
    /// Safeguard stack configuration.
    pub safeguards: SafeguardConfig,
    /// Learned-retrieval layer configuration.
    pub learned: LearnedConfig,
}
