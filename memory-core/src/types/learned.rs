//! Learned-retrieval state data model (component I).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cached mapping from a normalized query to the fact ids it resolved to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryCacheEntry {
    /// Normalized query text.
    pub normalized_query: String,
    /// Fact ids this query has resolved to, most-frequent first, capped at 10.
    pub fact_ids: Vec<Uuid>,
    /// Cumulative hit count for each id currently retained in `fact_ids`,
    /// used to re-rank on the next merge. Counts for ids dropped by the
    /// top-10 cap are dropped with them.
    #[serde(default)]
    pub fact_counts: HashMap<Uuid, u32>,
    /// Number of times this query has succeeded.
    pub success_count: u32,
    /// Last time this entry recorded a success.
    pub last_success_at: DateTime<Utc>,
}

/// A learned relevance adjustment for one `(query_hash, fact_id)` pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeedbackWeight {
    /// Hash of the normalized query this weight applies to.
    pub query_hash: u64,
    /// The fact (memory) this weight applies to.
    pub fact_id: Uuid,
    /// Positive = reinforced by use, negative = penalized for being ignored.
    pub weight: f32,
    /// Last time this weight was adjusted.
    pub updated_at: DateTime<Utc>,
}

/// Source of a learned query expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionSource {
    /// Curated manually.
    Manual,
    /// Learned from prior successful queries.
    Learned,
    /// Produced by an LLM-based expander.
    Llm,
}

/// A `(query_normalized, variant)` expansion persisted for reuse, with a
/// recency cap enforced by the learned-state store (last N per query).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedExpansion {
    /// Normalized query this expansion was learned for.
    pub query_normalized: String,
    /// The expanded query variant.
    pub variant: String,
    /// When this expansion was recorded.
    pub created_at: DateTime<Utc>,
}

/// A pattern anchoring a fact to a recognizable phrase, for fast lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactAnchor {
    /// The anchored fact (memory) id.
    pub fact_id: Uuid,
    /// The anchor phrase/pattern.
    pub anchor_pattern: String,
    /// Where the anchor pattern came from.
    pub source: ExpansionSource,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}
