//! `remember` / `remember_batch` / `correct` / `forget` / `get`.

use std::collections::BTreeSet;
use std::collections::HashSet;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::storage::SearchFilter;
use crate::types::{MemoryEntry, Scope, SourceType, StoreResult, MAX_CONTENT_BYTES};

use super::{MemoryService, DEFAULT_BATCH_CHUNK_SIZE};

/// Maximum ancestor hops walked when guarding against a corrupted
/// correction chain (the correction-chain state machine: "cycles are rejected at
/// write time").
const MAX_CHAIN_WALK: usize = 10_000;

impl MemoryService {
    /// Remember a new memory. Validates, dedups (unless `skip_dedup`),
    /// embeds, writes to the vector/text/graph stores, and extracts
    /// entities/relationships.
    pub async fn remember(
        &self,
        content: &str,
        source_type: SourceType,
        tags: Option<BTreeSet<String>>,
        context: Option<String>,
        skip_dedup: bool,
    ) -> Result<StoreResult> {
        self.remember_scoped(
            content,
            source_type,
            tags,
            context,
            skip_dedup,
            Scope::Personal,
            None,
            None,
            None,
            None,
        )
        .await
    }

    /// Full form of `remember` carrying tenancy/attribution and an explicit
    /// `supersedes` pointer, used internally by `correct`.
    #[allow(clippy::too_many_arguments)]
    pub(super) async fn remember_scoped(
        &self,
        content: &str,
        source_type: SourceType,
        tags: Option<BTreeSet<String>>,
        context: Option<String>,
        skip_dedup: bool,
        scope: Scope,
        workspace_id: Option<String>,
        user_id: Option<String>,
        model_id: Option<String>,
        supersedes: Option<Uuid>,
    ) -> Result<StoreResult> {
        validate_content(content)?;

        if !skip_dedup {
            if let Some(existing) = self.dedup.exact_match(content) {
                return Ok(StoreResult::duplicate(existing));
            }
        }

        let embedding = self.embedder.embed_text(content).await;
        let embedding = match embedding {
            Ok(v) => Some(v),
            Err(e) => return Err(Error::Embedding(e)),
        };

        if !skip_dedup {
            if let Some(vector) = &embedding {
                let top = self
                    .vectors
                    .search(vector, 5, &SearchFilter::default())
                    .await?;
                if let Some(best) = top.first() {
                    if let Some(candidate_vector) = self.vectors.get(best.id).await? {
                        if let Some(dup) =
                            self.dedup
                                .near_duplicate(content, vector, best.id, &candidate_vector)
                        {
                            return Ok(StoreResult::duplicate(dup));
                        }
                    }
                }
            }
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        let entry = MemoryEntry {
            id,
            content: content.to_string(),
            embedding: embedding.clone(),
            source_instance: self.instance_id.clone(),
            source_type,
            created_at: now,
            updated_at: now,
            tags: tags.unwrap_or_default(),
            context,
            confidence: 1.0,
            supersedes,
            scope,
            workspace_id,
            user_id,
            model_id,
        };

        if let Err(e) = self.write_all_stores(&entry).await {
            self.rollback(&entry).await;
            return Err(e);
        }

        self.dedup.record(id, content);
        Ok(StoreResult::ok(id))
    }

    async fn write_all_stores(&self, entry: &MemoryEntry) -> Result<()> {
        self.records.put(entry).await?;

        if let Some(vector) = &entry.embedding {
            self.vectors
                .upsert(
                    entry.id,
                    vector,
                    &entry.tags.iter().cloned().collect::<Vec<_>>(),
                    entry.created_at,
                    scope_str(entry.scope),
                    entry.workspace_id.as_deref(),
                    source_type_str(entry.source_type),
                )
                .await?;
        }
        self.text.upsert(entry.id, &entry.content).await?;

        let extraction = self.extractor.extract(&entry.content, entry.id);
        for entity in &extraction.entities {
            let entity_id = self.graph.upsert_entity(entity).await?;
            self.graph
                .link_memory_entity(&crate::types::MemoryEntityLink {
                    memory_id: entry.id,
                    entity_id,
                    provenance: "extraction".to_string(),
                })
                .await?;
        }
        for relationship in &extraction.relationships {
            self.graph.upsert_relationship(relationship).await?;
        }

        Ok(())
    }

    /// Best-effort rollback after a partial write failure.
    async fn rollback(&self, entry: &MemoryEntry) {
        let _ = self.vectors.delete(entry.id).await;
        let _ = self.text.delete(entry.id).await;
        let _ = self.graph.cleanup(entry.id).await;
        let _ = self.records.delete(entry.id).await;
    }

    /// Fan out up to `chunk_size` concurrent writes; results preserve input
    /// order regardless of completion order.
    pub async fn remember_batch(
        &self,
        items: Vec<(String, SourceType, Option<BTreeSet<String>>, Option<String>, bool)>,
        chunk_size: Option<usize>,
    ) -> Vec<Result<StoreResult>> {
        let chunk_size = chunk_size.unwrap_or(DEFAULT_BATCH_CHUNK_SIZE).max(1);
        let mut results: Vec<Option<Result<StoreResult>>> = (0..items.len()).map(|_| None).collect();

        for chunk in items.into_iter().enumerate().collect::<Vec<_>>().chunks(chunk_size) {
            let futures = chunk.iter().map(|(idx, (content, source_type, tags, context, skip_dedup))| {
                let idx = *idx;
                let content = content.clone();
                let source_type = *source_type;
                let tags = tags.clone();
                let context = context.clone();
                let skip_dedup = *skip_dedup;
                async move {
                    let result = self
                        .remember(&content, source_type, tags, context, skip_dedup)
                        .await;
                    (idx, result)
                }
            });
            let outcomes = futures::future::join_all(futures).await;
            for (idx, result) in outcomes {
                results[idx] = Some(result);
            }
        }

        results.into_iter().map(|r| r.expect("every index filled")).collect()
    }

    /// Create a new memory superseding `original_id`. The original is not
    /// deleted; recall surfaces only the chain's leaf.
    pub async fn correct(
        &self,
        original_id: Uuid,
        corrected_content: &str,
        context: Option<String>,
    ) -> Result<StoreResult> {
        let original = self
            .records
            .get(original_id)
            .await?
            .ok_or(Error::NotFound(original_id))?;

        self.guard_against_cycle(original_id).await?;

        let result = self
            .remember_scoped(
                corrected_content,
                SourceType::Correction,
                None,
                context,
                true,
                original.scope,
                original.workspace_id.clone(),
                original.user_id.clone(),
                original.model_id.clone(),
                Some(original_id),
            )
            .await?;

        if let Some(new_id) = result.memory_id {
            self.query_cache.invalidate_path(original_id).await;
            self.query_cache.invalidate_path(new_id).await;
        }

        Ok(result)
    }

    /// Walk the ancestor chain from `id` to guard against a corrupted cycle.
    /// Concurrent-correction races are resolved by last-writer-wins at
    /// recall time, not here: this only rejects an already-cyclic chain.
    async fn guard_against_cycle(&self, id: Uuid) -> Result<()> {
        let mut seen = HashSet::new();
        let mut current = id;
        seen.insert(current);
        for _ in 0..MAX_CHAIN_WALK {
            let Some(entry) = self.records.get(current).await? else {
                return Ok(());
            };
            let Some(parent) = entry.supersedes else {
                return Ok(());
            };
            if !seen.insert(parent) {
                return Err(Error::CorrectionCycle(id));
            }
            current = parent;
        }
        Err(Error::CorrectionCycle(id))
    }

    /// Delete a memory from the vector/text/graph stores. The correction
    /// chain is preserved: children that supersede `id` remain valid.
    pub async fn forget(&self, id: Uuid) -> Result<bool> {
        let Some(_entry) = self.records.get(id).await? else {
            return Ok(false);
        };
        self.vectors.delete(id).await?;
        self.text.delete(id).await?;
        self.graph.cleanup(id).await?;
        self.records.delete(id).await?;
        self.query_cache.invalidate_path(id).await;
        Ok(true)
    }

    /// Fetch a memory by id, or `None` if it doesn't exist.
    pub async fn get(&self, id: Uuid) -> Result<Option<MemoryEntry>> {
        self.records.get(id).await
    }
}

fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(Error::Validation("content must not be empty or whitespace".to_string()));
    }
    if content.len() > MAX_CONTENT_BYTES {
        return Err(Error::Validation(format!(
            "content exceeds {MAX_CONTENT_BYTES} bytes"
        )));
    }
    Ok(())
}

fn scope_str(scope: Scope) -> &'static str {
    match scope {
        Scope::Personal => "personal",
        Scope::Shared => "shared",
        Scope::ModelSpecific => "model_specific",
    }
}

fn source_type_str(source_type: SourceType) -> &'static str {
    match source_type {
        SourceType::UserExplicit => "user_explicit",
        SourceType::Deliberate => "deliberate",
        SourceType::AutoCapture => "auto_capture",
        SourceType::Correction => "correction",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_content() {
        assert!(validate_content("   ").is_err());
    }

    #[test]
    fn rejects_oversize_content() {
        let big = "x".repeat(MAX_CONTENT_BYTES + 1);
        assert!(validate_content(&big).is_err());
    }

    #[test]
    fn accepts_normal_content() {
        assert!(validate_content("Auth service uses JWT").is_ok());
    }
}
