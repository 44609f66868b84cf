//! Session transcript chunking and search (component H).

use std::sync::Arc;

use chrono::Utc;

use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::storage::SessionStore;
use crate::types::{SessionChunk, SessionChunkHit};

/// Fixed token-window size for transcript chunking.
const CHUNK_TOKEN_WINDOW: usize = 200;
/// Overlap, in tokens, between consecutive chunks.
const CHUNK_TOKEN_OVERLAP: usize = 40;

/// Chunks conversation transcripts, embeds each chunk, stores them, and
/// serves similarity search with pagination and incremental sync.
pub struct SessionIndex {
    store: Arc<dyn SessionStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SessionIndex {
    /// Construct a session index over the given store and embedding
    /// provider.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// Chunk `turns` (one string per conversation turn) into overlapping
    /// fixed-size windows, embed each, and persist them starting at
    /// `chunk_index_offset`.
    pub async fn ingest(
        &self,
        session_id: &str,
        turns: &[String],
        chunk_index_offset: u32,
    ) -> Result<usize> {
        let windows = chunk_turns(turns, CHUNK_TOKEN_WINDOW, CHUNK_TOKEN_OVERLAP);
        let mut stored = 0;
        for (i, window) in windows.into_iter().enumerate() {
            let embedding = self.embedder.embed_text(&window.text).await.ok();
            let chunk = SessionChunk {
                session_id: session_id.to_string(),
                chunk_index: chunk_index_offset + i as u32,
                text: window.text,
                embedding,
                tokens: crate::safeguards::truncate::estimate_tokens(&window.text),
                start_turn: window.start_turn,
                end_turn: window.end_turn,
                created_at: Utc::now(),
            };
            self.store.upsert_chunk(&chunk).await?;
            stored += 1;
        }
        Ok(stored)
    }

    /// Similarity search within `session_id`, paginated via `(offset, limit)`.
    pub async fn search(
        &self,
        session_id: &str,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SessionChunkHit>> {
        let vector = self.embedder.embed_text(query).await.map_err(crate::error::Error::Embedding)?;
        self.store.search(session_id, &vector, limit, offset).await
    }

    /// Chunks added since `since_index`, for incremental sync.
    pub async fn chunks_since(&self, session_id: &str, since_index: u32) -> Result<Vec<SessionChunk>> {
        self.store.chunks_since(session_id, since_index).await
    }
}

struct Window {
    text: String,
    start_turn: u32,
    end_turn: u32,
}

/// Split `turns` into overlapping windows of at most `window_tokens`
/// estimated tokens, stepping by `window_tokens - overlap_tokens`.
fn chunk_turns(turns: &[String], window_tokens: usize, overlap_tokens: usize) -> Vec<Window> {
    if turns.is_empty() {
        return Vec::new();
    }
    let step = window_tokens.saturating_sub(overlap_tokens).max(1);
    let mut windows = Vec::new();
    let mut start = 0usize;
    while start < turns.len() {
        let mut text = String::new();
        let mut tokens = 0usize;
        let mut end = start;
        while end < turns.len() && tokens < window_tokens {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&turns[end]);
            tokens += crate::safeguards::truncate::estimate_tokens(&turns[end]) as usize;
            end += 1;
        }
        windows.push(Window {
            text,
            start_turn: start as u32,
            end_turn: (end.saturating_sub(1)) as u32,
        });
        if end >= turns.len() {
            break;
        }
        start += step.min(end - start).max(1);
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_turns_covers_all_input() {
        let turns: Vec<String> = (0..50).map(|i| format!("turn number {i} content here")).collect();
        let windows = chunk_turns(&turns, 50, 10);
        assert!(!windows.is_empty());
        assert_eq!(windows.last().unwrap().end_turn, 49);
    }

    #[test]
    fn chunk_turns_empty_input_yields_no_windows() {
        assert!(chunk_turns(&[], 50, 10).is_empty());
    }
}
