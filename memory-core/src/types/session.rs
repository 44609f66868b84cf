//! Session transcript chunking data model (component H).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One embedded window of a conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionChunk {
    /// The conversation/session this chunk belongs to.
    pub session_id: String,
    /// Position of this chunk within the session, zero-based.
    pub chunk_index: u32,
    /// Chunk text.
    pub text: String,
    /// Unit-normalized embedding of `text`.
    pub embedding: Option<Vec<f32>>,
    /// Token count estimate for this chunk.
    pub tokens: u32,
    /// First conversation turn covered by this chunk.
    pub start_turn: u32,
    /// Last conversation turn covered by this chunk (inclusive).
    pub end_turn: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A `(id, score)` hit from a session chunk search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionChunkHit {
    /// The matching chunk.
    pub chunk: SessionChunk,
    /// Cosine similarity of the chunk's embedding to the query.
    pub score: f32,
}
