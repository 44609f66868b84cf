//! The memory record model: `MemoryEntry` and its correction-chain fields.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hard cap on stored content, in bytes ("reject > ~64 KB").
pub const MAX_CONTENT_BYTES: usize = 64 * 1024;

/// How a memory entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// The agent's user stated it directly.
    UserExplicit,
    /// The agent chose to remember it deliberately.
    Deliberate,
    /// Captured automatically from conversation without explicit intent.
    AutoCapture,
    /// Written by `correct` to supersede an earlier memory.
    Correction,
}

/// Visibility/attribution scope of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Visible only to the owning user.
    Personal,
    /// Visible across a workspace.
    Shared,
    /// Scoped to a specific model/agent instance.
    ModelSpecific,
}

/// The unit of stored knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Opaque unique identifier.
    pub id: Uuid,
    /// Non-empty text, bounded to [`MAX_CONTENT_BYTES`].
    pub content: String,
    /// Unit-normalized embedding, `None` if embedding failed at capture time.
    pub embedding: Option<Vec<f32>>,
    /// Identifier of the agent instance that wrote this memory.
    pub source_instance: String,
    /// How the memory was captured.
    pub source_type: SourceType,
    /// Creation timestamp. Monotonic per record: `created_at <= updated_at`.
    pub created_at: DateTime<Utc>,
    /// Last-modified timestamp.
    pub updated_at: DateTime<Utc>,
    /// Short free-form labels.
    pub tags: BTreeSet<String>,
    /// Optional free-text provenance note.
    pub context: Option<String>,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Id of the memory this one corrects, if any.
    pub supersedes: Option<Uuid>,
    /// Visibility scope.
    pub scope: Scope,
    /// Workspace attribution.
    pub workspace_id: Option<String>,
    /// User attribution.
    pub user_id: Option<String>,
    /// Model/agent attribution.
    pub model_id: Option<String>,
}

impl MemoryEntry {
    /// Normalized content used for exact dedup hash matching and Jaccard
    /// comparison: lowercase, whitespace-collapsed, punctuation-stripped.
    #[must_use]
    pub fn normalized_content(&self) -> String {
        normalize_for_dedup(&self.content)
    }
}

/// Lowercase, whitespace-collapse, and strip punctuation from `text`.
#[must_use]
pub fn normalize_for_dedup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for ch in text.to_lowercase().chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
            last_was_space = false;
        } else if ch.is_whitespace() && !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_and_strips() {
        assert_eq!(
            normalize_for_dedup("  Hello,   World!! "),
            "hello world"
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_for_dedup("Auth-service uses JWT!!");
        let twice = normalize_for_dedup(&once);
        assert_eq!(once, twice);
    }
}
