//! Storage-agnostic persistence contracts (components B, C, D, K).
//!
//! Concrete backends (`memory-storage-turso` for B/C/D, `memory-storage-redb`
//! for the learned-state half of K) implement these traits; `memory-core`
//! never depends on a specific database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{
    ConnectedEntity, Entity, FactAnchor, FeedbackWeight, LearnedExpansion, MemoryEntityLink,
    MemoryEntry, QueryCacheEntry, Relationship, SessionChunk, SessionChunkHit, TemporalFact,
};

/// Filters applicable to a vector or full-text search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Candidate must carry all of these tags.
    pub tags: Option<Vec<String>>,
    /// Candidate's `created_at` must be `>= after`.
    pub after: Option<DateTime<Utc>>,
    /// Candidate's `created_at` must be `<= before`.
    pub before: Option<DateTime<Utc>>,
    /// Candidate scope, as a string matching [`crate::types::Scope`]'s serde form.
    pub scope: Option<String>,
    /// Candidate workspace id.
    pub workspace_id: Option<String>,
    /// Candidate source type, as a string matching [`crate::types::SourceType`]'s serde form.
    pub source_type: Option<String>,
}

/// A `(id, score)` hit from [`VectorStore::search`].
#[derive(Debug, Clone)]
pub struct ScoredId {
    /// The matching memory id.
    pub id: Uuid,
    /// Cosine similarity (vector store) or normalized BM25 score (FTS store).
    pub score: f32,
}

/// Persists `(id, vector, metadata)` and serves cosine-similarity top-k
/// (component B).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the vector and filterable metadata for `id`.
    async fn upsert(
        &self,
        id: Uuid,
        vector: &[f32],
        tags: &[String],
        created_at: DateTime<Utc>,
        scope: &str,
        workspace_id: Option<&str>,
        source_type: &str,
    ) -> Result<()>;

    /// Remove any stored vector for `id`.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Cosine-similarity top-`k` search against `vector`, subject to `filter`.
    async fn search(&self, vector: &[f32], k: usize, filter: &SearchFilter) -> Result<Vec<ScoredId>>;

    /// Fetch the stored vector for `id`, if any.
    async fn get(&self, id: Uuid) -> Result<Option<Vec<f32>>>;
}

/// Persists `(id, content)` and serves BM25 top-k (component C).
#[async_trait]
pub trait FullTextStore: Send + Sync {
    /// Insert or replace the indexed content for `id`.
    async fn upsert(&self, id: Uuid, content: &str) -> Result<()>;

    /// Remove any stored content for `id`.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// BM25 top-`k` search for `query`. Implementations phrase-quote
    /// punctuation so exact substrings (emails, code) match.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredId>>;
}

/// Persists entities, relationships, memory↔entity links, and temporal
/// facts; serves multi-hop traversal (component D).
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Insert or update an entity, matched by its identity key.
    async fn upsert_entity(&self, entity: &Entity) -> Result<Uuid>;

    /// Insert a relationship edge.
    async fn upsert_relationship(&self, relationship: &Relationship) -> Result<()>;

    /// Link a memory to an entity it mentions.
    async fn link_memory_entity(&self, link: &MemoryEntityLink) -> Result<()>;

    /// Insert a temporal fact extracted from a memory.
    async fn upsert_temporal_fact(&self, fact: &TemporalFact) -> Result<()>;

    /// BFS outward from `entity_name` up to `max_hops`, ties broken by
    /// smallest depth then lexicographic name.
    async fn find_connected(&self, entity_name: &str, max_hops: u32) -> Result<Vec<ConnectedEntity>>;

    /// Memory ids linked to any of `entity_ids`, ordered by multiplicity of
    /// matching entities desc, then recency.
    async fn memories_for_entities(&self, entity_ids: &[Uuid]) -> Result<Vec<Uuid>>;

    /// Remove all links, relationships, and temporal facts referencing
    /// `memory_id`; delete any entity left with no remaining links or edges.
    async fn cleanup(&self, memory_id: Uuid) -> Result<()>;

    /// Temporal facts for `memory_id`, most recently added first.
    async fn temporal_facts_for(&self, memory_id: Uuid) -> Result<Vec<TemporalFact>>;

    /// Memory ids whose temporal facts overlap `[after, before]`.
    async fn memories_in_range(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Uuid>>;
}

/// Persists session transcript chunks (component H's durable half).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace a chunk.
    async fn upsert_chunk(&self, chunk: &SessionChunk) -> Result<()>;

    /// Cosine-similarity top-`k` search within `session_id`, with pagination.
    async fn search(
        &self,
        session_id: &str,
        vector: &[f32],
        k: usize,
        offset: usize,
    ) -> Result<Vec<SessionChunkHit>>;

    /// Chunks with `chunk_index > since_index`, in index order.
    async fn chunks_since(&self, session_id: &str, since_index: u32) -> Result<Vec<SessionChunk>>;

    /// Delete all chunks older than `cutoff`.
    async fn expire_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Persists learned-retrieval state: query cache, feedback weights,
/// learned expansions, fact anchors, and the audit log (component K's
/// cache half).
#[async_trait]
pub trait LearnedStatePersistence: Send + Sync {
    /// Load a cached entry for `normalized_query`, if any.
    async fn get_cache_entry(&self, normalized_query: &str) -> Result<Option<QueryCacheEntry>>;

    /// Persist/replace a cache entry.
    async fn put_cache_entry(&self, entry: &QueryCacheEntry) -> Result<()>;

    /// Drop every cache entry whose fact list contains `fact_id`.
    async fn invalidate_path(&self, fact_id: Uuid) -> Result<()>;

    /// Load the feedback weight for `(query_hash, fact_id)`, if any.
    async fn get_feedback_weight(&self, query_hash: u64, fact_id: Uuid) -> Result<Option<f32>>;

    /// Persist/replace a feedback weight.
    async fn put_feedback_weight(&self, weight: &FeedbackWeight) -> Result<()>;

    /// Learned expansions for `query_normalized`, most recent first.
    async fn learned_expansions(&self, query_normalized: &str) -> Result<Vec<LearnedExpansion>>;

    /// Persist a learned expansion, trimming to the recency cap.
    async fn put_learned_expansion(&self, expansion: &LearnedExpansion, cap: usize) -> Result<()>;

    /// Fact anchors matching `pattern` exactly.
    async fn fact_anchors_for(&self, pattern: &str) -> Result<Vec<FactAnchor>>;

    /// Persist a fact anchor.
    async fn put_fact_anchor(&self, anchor: &FactAnchor) -> Result<()>;

    /// Append an audit log entry. Failures here never propagate to callers
    /// of the learned layer: they downgrade to a warning.
    async fn append_audit_log(&self, event: &str, detail: &str) -> Result<()>;
}

/// Persists the canonical [`MemoryEntry`] record (content, provenance,
/// correction chain) that the vector/text/graph stores index. This is the
/// durable source of truth `get`, `export`, and correction-chain resolution
/// read from.
#[async_trait]
pub trait MemoryRecordStore: Send + Sync {
    /// Insert or replace a record.
    async fn put(&self, entry: &MemoryEntry) -> Result<()>;

    /// Fetch a record by id.
    async fn get(&self, id: Uuid) -> Result<Option<MemoryEntry>>;

    /// Delete a record by id.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// The id of the record that supersedes `id` directly, if any.
    async fn find_superseding(&self, id: Uuid) -> Result<Option<Uuid>>;

    /// Every record in the store, in no particular cross-backend-guaranteed
    /// order (export preserves whatever order is returned here, so
    /// re-exporting an unchanged store stays deterministic).
    async fn all(&self) -> Result<Vec<MemoryEntry>>;

    /// Total record count.
    async fn count(&self) -> Result<usize>;
}
