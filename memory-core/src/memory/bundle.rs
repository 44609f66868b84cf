//! `export` / `import` / `stats` / `health`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Entity, MemoryEntry, Relationship};

use super::MemoryService;

/// Embedding portability metadata carried in a bundle manifest and
/// `stats()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleEmbeddingMeta {
    /// Embedding model name.
    pub model_name: String,
    /// Embedding dimensionality.
    pub dimensions: usize,
    /// Provider identifier.
    pub provider: String,
}

/// A bundle's self-describing manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Semver schema version of the bundle format.
    pub schema_version: String,
    /// Embedding metadata used to decide `auto` import strategy.
    pub embedding: BundleEmbeddingMeta,
}

/// A self-describing export container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    /// Manifest.
    pub manifest: BundleManifest,
    /// Memory records.
    pub entries: Vec<MemoryEntry>,
    /// Entities, keyed by memory id that mentions them.
    pub entities_by_memory: HashMap<Uuid, Vec<Entity>>,
    /// Relationships, keyed by provenance memory id.
    pub relationships_by_memory: HashMap<Uuid, Vec<Relationship>>,
}

/// Import vector-handling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStrategy {
    /// Import vectors as-is.
    Keep,
    /// Discard vectors; caller must re-embed.
    Drop,
    /// Keep iff `(model_name, dimensions)` match the importing store,
    /// otherwise drop.
    Auto,
}

/// Aggregate counts returned by `stats()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Total memory count.
    pub total_memories: usize,
    /// Count grouped by source type label.
    pub by_source_type: HashMap<String, usize>,
    /// Count grouped by tag.
    pub by_tag: HashMap<String, usize>,
    /// Embedding portability metadata.
    pub embedding: BundleEmbeddingMeta,
}

/// Liveness/readiness summary returned by `health()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `"ok"` or a degraded-state label.
    pub status: String,
    /// This service instance's id.
    pub instance_id: String,
    /// Current memory count.
    pub memory_count: usize,
}

impl MemoryService {
    /// Export memories (optionally filtered by `ids`) as a self-describing
    /// bundle, including their entities and relationships.
    pub async fn export(&self, ids: Option<&[Uuid]>) -> Result<Bundle> {
        let all = self.records.all().await?;
        let entries: Vec<MemoryEntry> = match ids {
            Some(ids) => all.into_iter().filter(|e| ids.contains(&e.id)).collect(),
            None => all,
        };

        let mut entities_by_memory = HashMap::new();
        let mut relationships_by_memory = HashMap::new();
        for entry in &entries {
            let extraction = self.extractor.extract(&entry.content, entry.id);
            entities_by_memory.insert(entry.id, extraction.entities);
            relationships_by_memory.insert(entry.id, extraction.relationships);
        }

        Ok(Bundle {
            manifest: BundleManifest {
                schema_version: "1.0.0".to_string(),
                embedding: self.embedding_meta(),
            },
            entries,
            entities_by_memory,
            relationships_by_memory,
        })
    }

    /// Import a bundle using the given vector-handling strategy. Dimension
    /// mismatches under `Keep` are rejected before any write.
    pub async fn import(&self, bundle: Bundle, strategy: ImportStrategy) -> Result<usize> {
        let target_meta = self.embedding_meta();
        let keep_vectors = match strategy {
            ImportStrategy::Keep => true,
            ImportStrategy::Drop => false,
            ImportStrategy::Auto => bundle.manifest.embedding == target_meta,
        };

        if strategy == ImportStrategy::Keep && bundle.manifest.embedding.dimensions != target_meta.dimensions {
            return Err(Error::DimensionMismatch {
                expected: target_meta.dimensions,
                actual: bundle.manifest.embedding.dimensions,
            });
        }

        let mut imported = 0;
        for mut entry in bundle.entries {
            if !keep_vectors {
                entry.embedding = None;
            } else if let Some(vector) = &entry.embedding {
                if vector.len() != target_meta.dimensions {
                    return Err(Error::DimensionMismatch {
                        expected: target_meta.dimensions,
                        actual: vector.len(),
                    });
                }
            }

            if entry.embedding.is_none() {
                if let Ok(vector) = self.embedder.embed_text(&entry.content).await {
                    entry.embedding = Some(vector);
                }
            }

            self.records.put(&entry).await?;
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

            if let Some(entities) = bundle.entities_by_memory.get(&entry.id) {
                for entity in entities {
                    let entity_id = self.graph.upsert_entity(entity).await?;
                    self.graph
                        .link_memory_entity(&crate::types::MemoryEntityLink {
                            memory_id: entry.id,
                            entity_id,
                            provenance: "import".to_string(),
                        })
                        .await?;
                }
            }
            if let Some(relationships) = bundle.relationships_by_memory.get(&entry.id) {
                for relationship in relationships {
                    self.graph.upsert_relationship(relationship).await?;
                }
            }

            imported += 1;
        }

        Ok(imported)
    }

    /// Aggregate memory counts and embedding metadata.
    pub async fn stats(&self) -> Result<ServiceStats> {
        let all = self.records.all().await?;
        let mut by_source_type: HashMap<String, usize> = HashMap::new();
        let mut by_tag: HashMap<String, usize> = HashMap::new();
        for entry in &all {
            *by_source_type
                .entry(source_type_str(entry.source_type).to_string())
                .or_insert(0) += 1;
            for tag in &entry.tags {
                *by_tag.entry(tag.clone()).or_insert(0) += 1;
            }
        }
        Ok(ServiceStats {
            total_memories: all.len(),
            by_source_type,
            by_tag,
            embedding: self.embedding_meta(),
        })
    }

    /// Liveness/readiness summary.
    pub async fn health(&self) -> Result<HealthStatus> {
        let count = self.records.count().await?;
        Ok(HealthStatus {
            status: "ok".to_string(),
            instance_id: self.instance_id.clone(),
            memory_count: count,
        })
    }
}

fn scope_str(scope: crate::types::Scope) -> &'static str {
    match scope {
        crate::types::Scope::Personal => "personal",
        crate::types::Scope::Shared => "shared",
        crate::types::Scope::ModelSpecific => "model_specific",
    }
}

fn source_type_str(source_type: crate::types::SourceType) -> &'static str {
    match source_type {
        crate::types::SourceType::UserExplicit => "user_explicit",
        crate::types::SourceType::Deliberate => "deliberate",
        crate::types::SourceType::AutoCapture => "auto_capture",
        crate::types::SourceType::Correction => "correction",
    }
}
