//! Result/outcome types returned by [`crate::memory::MemoryService`] operations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entry::MemoryEntry;

/// Outcome of `remember`/`correct`. Dedup-rejection is a tagged variant, not
/// an error ("not an error; no retries needed").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreResult {
    /// Whether a new memory was written.
    pub success: bool,
    /// Id of the newly written memory, if `success`.
    pub memory_id: Option<Uuid>,
    /// Id of the pre-existing memory this one duplicates, if rejected.
    pub duplicate_of: Option<Uuid>,
}

impl StoreResult {
    /// A successful write.
    #[must_use]
    pub fn ok(memory_id: Uuid) -> Self {
        Self {
            success: true,
            memory_id: Some(memory_id),
            duplicate_of: None,
        }
    }

    /// A dedup rejection against `existing`.
    #[must_use]
    pub fn duplicate(existing: Uuid) -> Self {
        Self {
            success: false,
            memory_id: None,
            duplicate_of: Some(existing),
        }
    }
}

/// How a recall result was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    /// Found by vector similarity alone.
    Vector,
    /// Found by the vector+keyword hybrid merge.
    Hybrid,
    /// Found via graph expansion.
    Graph,
    /// Found via direct entity recall (`recall_entity`).
    Entity,
}

/// One ranked recall hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallHit {
    /// The resolved memory (correction-chain leaf, if the candidate had one).
    pub memory: MemoryEntry,
    /// Final blended/reranked score.
    pub similarity_score: f32,
    /// Wall-clock time spent producing this hit's branch, in milliseconds.
    pub retrieval_time_ms: u64,
    /// How this hit was found.
    pub retrieval_method: RetrievalMethod,
}

/// Why a recall returned no results without doing retrieval work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The smart trigger classified the query as not needing recall.
    SmartTrigger,
    /// The circuit breaker is open for this session.
    CircuitBreaker,
}

/// The full outcome of a `recall` call, including safeguard-suppression,
/// which is represented as a tagged result, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RecallOutcome {
    /// Results were produced (possibly empty after filtering).
    Results(Vec<RecallHit>),
    /// A safeguard suppressed retrieval entirely before touching storage.
    Skipped(SkipReason),
}

impl RecallOutcome {
    /// The hits, or an empty vec if skipped.
    #[must_use]
    pub fn hits(&self) -> &[RecallHit] {
        match self {
            RecallOutcome::Results(hits) => hits,
            RecallOutcome::Skipped(_) => &[],
        }
    }
}
