//! `memory_core::storage` trait implementations backed by SQL tables
//! (components B, C, D, H, and the durable half of K).

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use libsql::{params, Row};
use memory_core::embeddings::cosine_similarity;
use memory_core::storage::{
    FullTextStore, GraphStore, MemoryRecordStore, ScoredId, SearchFilter, SessionStore, VectorStore,
};
use memory_core::types::{
    ConnectedEntity, Entity, EntityType, MemoryEntityLink, MemoryEntry, Relationship, Scope,
    SessionChunk, SessionChunkHit, SourceType, TemporalFact,
};
use memory_core::{Error, Result};
use tracing::debug;
use uuid::Uuid;

use crate::TursoStorage;

fn to_ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| Error::Store(format!("invalid timestamp: {secs}")))
}

fn scope_str(scope: Scope) -> &'static str {
    match scope {
        Scope::Personal => "personal",
        Scope::Shared => "shared",
        Scope::ModelSpecific => "model_specific",
    }
}

fn scope_from_str(s: &str) -> Scope {
    match s {
        "shared" => Scope::Shared,
        "model_specific" => Scope::ModelSpecific,
        _ => Scope::Personal,
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

fn source_type_from_str(s: &str) -> SourceType {
    match s {
        "user_explicit" => SourceType::UserExplicit,
        "auto_capture" => SourceType::AutoCapture,
        "correction" => SourceType::Correction,
        _ => SourceType::Deliberate,
    }
}

fn entity_type_str(t: EntityType) -> &'static str {
    match t {
        EntityType::Person => "PERSON",
        EntityType::Org => "ORG",
        EntityType::Gpe => "GPE",
        EntityType::Tech => "TECH",
        EntityType::Service => "SERVICE",
        EntityType::Date => "DATE",
        EntityType::Other => "OTHER",
    }
}

fn entity_type_from_str(s: &str) -> EntityType {
    match s {
        "PERSON" => EntityType::Person,
        "ORG" => EntityType::Org,
        "GPE" => EntityType::Gpe,
        "TECH" => EntityType::Tech,
        "SERVICE" => EntityType::Service,
        "DATE" => EntityType::Date,
        _ => EntityType::Other,
    }
}

/// Flattens [`Entity::identity_key`] into the `entities.identity_key` column.
fn entity_identity_key(entity: &Entity) -> String {
    let (workspace_id, name, entity_type) = entity.identity_key();
    format!(
        "{}\u{1}{}\u{1}{}",
        workspace_id.unwrap_or_default(),
        name,
        entity_type_str(entity_type)
    )
}

/// Phrase-quote tokens containing punctuation so exact substrings (emails,
/// code) match literally instead of tripping FTS5's query syntax.
fn quote_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|tok| {
            if tok.chars().all(|c| c.is_alphanumeric()) {
                tok.to_string()
            } else {
                format!("\"{}\"", tok.replace('"', "\"\""))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn row_to_memory_entry(row: &Row) -> Result<MemoryEntry> {
    let id_str: String = row.get(0).map_err(|e| Error::Store(e.to_string()))?;
    let content: String = row.get(1).map_err(|e| Error::Store(e.to_string()))?;
    let source_instance: String = row.get(2).map_err(|e| Error::Store(e.to_string()))?;
    let source_type_str_v: String = row.get(3).map_err(|e| Error::Store(e.to_string()))?;
    let created_at: i64 = row.get(4).map_err(|e| Error::Store(e.to_string()))?;
    let updated_at: i64 = row.get(5).map_err(|e| Error::Store(e.to_string()))?;
    let tags_json: String = row.get(6).map_err(|e| Error::Store(e.to_string()))?;
    let context: Option<String> = row.get(7).map_err(|e| Error::Store(e.to_string()))?;
    let confidence: f64 = row.get(8).map_err(|e| Error::Store(e.to_string()))?;
    let supersedes: Option<String> = row.get(9).map_err(|e| Error::Store(e.to_string()))?;
    let scope_str_v: String = row.get(10).map_err(|e| Error::Store(e.to_string()))?;
    let workspace_id: Option<String> = row.get(11).map_err(|e| Error::Store(e.to_string()))?;
    let user_id: Option<String> = row.get(12).map_err(|e| Error::Store(e.to_string()))?;
    let model_id: Option<String> = row.get(13).map_err(|e| Error::Store(e.to_string()))?;
    let embedding_json: Option<String> = row.get(14).map_err(|e| Error::Store(e.to_string()))?;

    let tags = serde_json::from_str(&tags_json).map_err(Error::Serialization)?;
    let embedding = embedding_json
        .map(|json| serde_json::from_str::<Vec<f32>>(&json))
        .transpose()
        .map_err(Error::Serialization)?;

    Ok(MemoryEntry {
        id: Uuid::parse_str(&id_str).map_err(|e| Error::Store(e.to_string()))?,
        content,
        embedding,
        source_instance,
        source_type: source_type_from_str(&source_type_str_v),
        created_at: from_ts(created_at)?,
        updated_at: from_ts(updated_at)?,
        tags,
        context,
        confidence: confidence as f32,
        supersedes: supersedes
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| Error::Store(e.to_string()))?,
        scope: scope_from_str(&scope_str_v),
        workspace_id,
        user_id,
        model_id,
    })
}

#[async_trait]
impl MemoryRecordStore for TursoStorage {
    async fn put(&self, entry: &MemoryEntry) -> Result<()> {
        let conn = self.get_connection().await?;
        let tags_json = serde_json::to_string(&entry.tags).map_err(Error::Serialization)?;
        let embedding_json = entry
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(Error::Serialization)?;

        conn.execute(
            r#"
            INSERT INTO memories (
                id, content, source_instance, source_type, created_at, updated_at,
                tags, context, confidence, supersedes, scope, workspace_id, user_id,
                model_id, embedding
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                source_instance = excluded.source_instance,
                source_type = excluded.source_type,
                updated_at = excluded.updated_at,
                tags = excluded.tags,
                context = excluded.context,
                confidence = excluded.confidence,
                supersedes = excluded.supersedes,
                scope = excluded.scope,
                workspace_id = excluded.workspace_id,
                user_id = excluded.user_id,
                model_id = excluded.model_id,
                embedding = excluded.embedding
            "#,
            params![
                entry.id.to_string(),
                entry.content.clone(),
                entry.source_instance.clone(),
                source_type_str(entry.source_type),
                to_ts(entry.created_at),
                to_ts(entry.updated_at),
                tags_json,
                entry.context.clone(),
                f64::from(entry.confidence),
                entry.supersedes.map(|id| id.to_string()),
                scope_str(entry.scope),
                entry.workspace_id.clone(),
                entry.user_id.clone(),
                entry.model_id.clone(),
                embedding_json,
            ],
        )
        .await
        .map_err(|e| Error::Store(format!("failed to put memory record: {e}")))?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<MemoryEntry>> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT id, content, source_instance, source_type, created_at, updated_at,
                       tags, context, confidence, supersedes, scope, workspace_id, user_id,
                       model_id, embedding
                FROM memories WHERE id = ?
                "#,
                params![id.to_string()],
            )
            .await
            .map_err(|e| Error::Store(format!("failed to query memory record: {e}")))?;

        match rows.next().await.map_err(|e| Error::Store(e.to_string()))? {
            Some(row) => Ok(Some(row_to_memory_entry(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let conn = self.get_connection().await?;
        conn.execute("DELETE FROM memories WHERE id = ?", params![id.to_string()])
            .await
            .map_err(|e| Error::Store(format!("failed to delete memory record: {e}")))?;
        Ok(())
    }

    async fn find_superseding(&self, id: Uuid) -> Result<Option<Uuid>> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query(
                "SELECT id FROM memories WHERE supersedes = ?",
                params![id.to_string()],
            )
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        match rows.next().await.map_err(|e| Error::Store(e.to_string()))? {
            Some(row) => {
                let id_str: String = row.get(0).map_err(|e| Error::Store(e.to_string()))?;
                Ok(Some(Uuid::parse_str(&id_str).map_err(|e| Error::Store(e.to_string()))?))
            }
            None => Ok(None),
        }
    }

    async fn all(&self) -> Result<Vec<MemoryEntry>> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT id, content, source_instance, source_type, created_at, updated_at,
                       tags, context, confidence, supersedes, scope, workspace_id, user_id,
                       model_id, embedding
                FROM memories ORDER BY created_at ASC
                "#,
                (),
            )
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Store(e.to_string()))? {
            out.push(row_to_memory_entry(&row)?);
        }
        Ok(out)
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM memories", ())
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        let row = rows
            .next()
            .await
            .map_err(|e| Error::Store(e.to_string()))?
            .ok_or_else(|| Error::Store("COUNT(*) returned no row".to_string()))?;
        let count: i64 = row.get(0).map_err(|e| Error::Store(e.to_string()))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl VectorStore for TursoStorage {
    async fn upsert(
        &self,
        id: Uuid,
        vector: &[f32],
        tags: &[String],
        created_at: DateTime<Utc>,
        scope: &str,
        workspace_id: Option<&str>,
        source_type: &str,
    ) -> Result<()> {
        let conn = self.get_connection().await?;
        let vector_json = serde_json::to_string(vector).map_err(Error::Serialization)?;
        let tags_json = serde_json::to_string(tags).map_err(Error::Serialization)?;

        conn.execute(
            r#"
            INSERT INTO memory_vectors (id, vector, tags, created_at, scope, workspace_id, source_type)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                vector = excluded.vector,
                tags = excluded.tags,
                created_at = excluded.created_at,
                scope = excluded.scope,
                workspace_id = excluded.workspace_id,
                source_type = excluded.source_type
            "#,
            params![
                id.to_string(),
                vector_json,
                tags_json,
                to_ts(created_at),
                scope.to_string(),
                workspace_id.map(str::to_string),
                source_type.to_string(),
            ],
        )
        .await
        .map_err(|e| Error::Store(format!("failed to upsert vector: {e}")))?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let conn = self.get_connection().await?;
        conn.execute("DELETE FROM memory_vectors WHERE id = ?", params![id.to_string()])
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize, filter: &SearchFilter) -> Result<Vec<ScoredId>> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query(
                "SELECT id, vector, tags, created_at, scope, workspace_id, source_type FROM memory_vectors",
                (),
            )
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        let mut scored: Vec<ScoredId> = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Store(e.to_string()))? {
            let id_str: String = row.get(0).map_err(|e| Error::Store(e.to_string()))?;
            let vector_json: String = row.get(1).map_err(|e| Error::Store(e.to_string()))?;
            let tags_json: String = row.get(2).map_err(|e| Error::Store(e.to_string()))?;
            let created_at: i64 = row.get(3).map_err(|e| Error::Store(e.to_string()))?;
            let scope: String = row.get(4).map_err(|e| Error::Store(e.to_string()))?;
            let workspace_id: Option<String> = row.get(5).map_err(|e| Error::Store(e.to_string()))?;
            let source_type: String = row.get(6).map_err(|e| Error::Store(e.to_string()))?;

            let row_tags: Vec<String> = serde_json::from_str(&tags_json).map_err(Error::Serialization)?;
            if let Some(wanted) = &filter.tags {
                if !wanted.iter().all(|t| row_tags.contains(t)) {
                    continue;
                }
            }
            let row_created_at = from_ts(created_at)?;
            if let Some(after) = filter.after {
                if row_created_at < after {
                    continue;
                }
            }
            if let Some(before) = filter.before {
                if row_created_at > before {
                    continue;
                }
            }
            if let Some(wanted_scope) = &filter.scope {
                if &scope != wanted_scope {
                    continue;
                }
            }
            if let Some(wanted_workspace) = &filter.workspace_id {
                if workspace_id.as_deref() != Some(wanted_workspace.as_str()) {
                    continue;
                }
            }
            if let Some(wanted_source) = &filter.source_type {
                if &source_type != wanted_source {
                    continue;
                }
            }

            let row_vector: Vec<f32> = serde_json::from_str(&vector_json).map_err(Error::Serialization)?;
            let score = cosine_similarity(vector, &row_vector);
            scored.push(ScoredId {
                id: Uuid::parse_str(&id_str).map_err(|e| Error::Store(e.to_string()))?,
                score,
            });
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Vec<f32>>> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query("SELECT vector FROM memory_vectors WHERE id = ?", params![id.to_string()])
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        match rows.next().await.map_err(|e| Error::Store(e.to_string()))? {
            Some(row) => {
                let vector_json: String = row.get(0).map_err(|e| Error::Store(e.to_string()))?;
                Ok(Some(
                    serde_json::from_str(&vector_json).map_err(Error::Serialization)?,
                ))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl FullTextStore for TursoStorage {
    async fn upsert(&self, id: Uuid, content: &str) -> Result<()> {
        let conn = self.get_connection().await?;
        conn.execute(
            "DELETE FROM memories_fts WHERE memory_id = ?",
            params![id.to_string()],
        )
        .await
        .map_err(|e| Error::Store(e.to_string()))?;
        conn.execute(
            "INSERT INTO memories_fts (memory_id, content) VALUES (?, ?)",
            params![id.to_string(), content.to_string()],
        )
        .await
        .map_err(|e| Error::Store(format!("failed to index content: {e}")))?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let conn = self.get_connection().await?;
        conn.execute(
            "DELETE FROM memories_fts WHERE memory_id = ?",
            params![id.to_string()],
        )
        .await
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredId>> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.get_connection().await?;
        let quoted = quote_fts_query(trimmed);
        let rows = conn
            .query(
                r#"
                SELECT memory_id, bm25(memories_fts) AS rank
                FROM memories_fts WHERE memories_fts MATCH ?
                ORDER BY rank LIMIT ?
                "#,
                params![quoted, k as i64],
            )
            .await;

        let mut rows = match rows {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "fts query failed, likely malformed match syntax");
                return Ok(Vec::new());
            }
        };

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Store(e.to_string()))? {
            let id_str: String = row.get(0).map_err(|e| Error::Store(e.to_string()))?;
            let rank: f64 = row.get(1).map_err(|e| Error::Store(e.to_string()))?;
            out.push(ScoredId {
                id: Uuid::parse_str(&id_str).map_err(|e| Error::Store(e.to_string()))?,
                // sqlite's bm25() is smaller-is-better (often negative); invert so
                // higher is better, matching VectorStore's convention.
                score: -(rank as f32),
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl GraphStore for TursoStorage {
    async fn upsert_entity(&self, entity: &Entity) -> Result<Uuid> {
        let conn = self.get_connection().await?;
        let _guard = self.write_lock.lock().await;
        let identity_key = entity_identity_key(entity);

        let mut rows = conn
            .query(
                "SELECT id FROM entities WHERE identity_key = ?",
                params![identity_key.clone()],
            )
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        if let Some(row) = rows.next().await.map_err(|e| Error::Store(e.to_string()))? {
            let id_str: String = row.get(0).map_err(|e| Error::Store(e.to_string()))?;
            return Uuid::parse_str(&id_str).map_err(|e| Error::Store(e.to_string()));
        }
        drop(rows);

        conn.execute(
            r#"
            INSERT INTO entities (id, name, display_name, entity_type, workspace_id, identity_key)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                entity.id.to_string(),
                entity.name.clone(),
                entity.display_name.clone(),
                entity_type_str(entity.entity_type).to_string(),
                entity.workspace_id.clone(),
                identity_key,
            ],
        )
        .await
        .map_err(|e| Error::Store(format!("failed to insert entity: {e}")))?;
        Ok(entity.id)
    }

    async fn upsert_relationship(&self, relationship: &Relationship) -> Result<()> {
        let conn = self.get_connection().await?;
        let _guard = self.write_lock.lock().await;
        conn.execute(
            r#"
            INSERT INTO relationships (
                id, source_entity_id, relation_type, target_entity_id,
                provenance_memory_id, confidence
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                relationship.id.to_string(),
                relationship.source_entity_id.to_string(),
                relationship.relation_type.clone(),
                relationship.target_entity_id.to_string(),
                relationship.provenance_memory_id.to_string(),
                f64::from(relationship.confidence),
            ],
        )
        .await
        .map_err(|e| Error::Store(format!("failed to insert relationship: {e}")))?;
        Ok(())
    }

    async fn link_memory_entity(&self, link: &MemoryEntityLink) -> Result<()> {
        let conn = self.get_connection().await?;
        let _guard = self.write_lock.lock().await;
        conn.execute(
            r#"
            INSERT INTO memory_entity_links (memory_id, entity_id, provenance)
            VALUES (?, ?, ?)
            ON CONFLICT(memory_id, entity_id) DO UPDATE SET provenance = excluded.provenance
            "#,
            params![
                link.memory_id.to_string(),
                link.entity_id.to_string(),
                link.provenance.clone(),
            ],
        )
        .await
        .map_err(|e| Error::Store(format!("failed to link memory to entity: {e}")))?;
        Ok(())
    }

    async fn upsert_temporal_fact(&self, fact: &TemporalFact) -> Result<()> {
        let conn = self.get_connection().await?;
        let _guard = self.write_lock.lock().await;
        conn.execute(
            r#"
            INSERT INTO temporal_facts (memory_id, date_start, date_end, label)
            VALUES (?, ?, ?, ?)
            "#,
            params![
                fact.memory_id.to_string(),
                to_ts(fact.date_start),
                fact.date_end.map(to_ts),
                fact.label.clone(),
            ],
        )
        .await
        .map_err(|e| Error::Store(format!("failed to insert temporal fact: {e}")))?;
        Ok(())
    }

    async fn find_connected(&self, entity_name: &str, max_hops: u32) -> Result<Vec<ConnectedEntity>> {
        let conn = self.get_connection().await?;
        let lower = entity_name.to_lowercase();

        let mut seed_rows = conn
            .query(
                "SELECT id FROM entities WHERE name = ?",
                params![lower.clone()],
            )
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        let mut frontier: VecDeque<Uuid> = VecDeque::new();
        let mut visited: HashSet<Uuid> = HashSet::new();
        while let Some(row) = seed_rows.next().await.map_err(|e| Error::Store(e.to_string()))? {
            let id_str: String = row.get(0).map_err(|e| Error::Store(e.to_string()))?;
            let id = Uuid::parse_str(&id_str).map_err(|e| Error::Store(e.to_string()))?;
            visited.insert(id);
            frontier.push_back(id);
        }
        drop(seed_rows);

        let mut out: Vec<ConnectedEntity> = Vec::new();
        let mut depth = 0u32;
        let mut current_layer: Vec<Uuid> = frontier.into_iter().collect();

        while depth < max_hops && !current_layer.is_empty() {
            depth += 1;
            let mut next_layer_ids: HashSet<Uuid> = HashSet::new();

            for &eid in &current_layer {
                let mut rel_rows = conn
                    .query(
                        "SELECT target_entity_id FROM relationships WHERE source_entity_id = ? \
                         UNION SELECT source_entity_id FROM relationships WHERE target_entity_id = ?",
                        params![eid.to_string(), eid.to_string()],
                    )
                    .await
                    .map_err(|e| Error::Store(e.to_string()))?;
                while let Some(row) = rel_rows.next().await.map_err(|e| Error::Store(e.to_string()))? {
                    let other_str: String = row.get(0).map_err(|e| Error::Store(e.to_string()))?;
                    let other = Uuid::parse_str(&other_str).map_err(|e| Error::Store(e.to_string()))?;
                    if visited.insert(other) {
                        next_layer_ids.insert(other);
                    }
                }
            }

            for &id in &next_layer_ids {
                let mut rows = conn
                    .query(
                        "SELECT id, name, display_name, entity_type, workspace_id FROM entities WHERE id = ?",
                        params![id.to_string()],
                    )
                    .await
                    .map_err(|e| Error::Store(e.to_string()))?;
                if let Some(row) = rows.next().await.map_err(|e| Error::Store(e.to_string()))? {
                    out.push(ConnectedEntity {
                        entity: row_to_entity(&row)?,
                        depth,
                    });
                }
            }

            current_layer = next_layer_ids.into_iter().collect();
        }

        out.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.entity.name.cmp(&b.entity.name)));
        Ok(out)
    }

    async fn memories_for_entities(&self, entity_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.get_connection().await?;
        let placeholders = std::iter::repeat("?").take(entity_ids.len()).collect::<Vec<_>>().join(",");
        let sql = format!(
            r#"
            SELECT l.memory_id, COUNT(*) as matches, MAX(m.created_at) as latest
            FROM memory_entity_links l
            JOIN memories m ON m.id = l.memory_id
            WHERE l.entity_id IN ({placeholders})
            GROUP BY l.memory_id
            ORDER BY matches DESC, latest DESC
            "#
        );
        let args: Vec<String> = entity_ids.iter().map(Uuid::to_string).collect();
        let mut rows = conn
            .query(&sql, libsql::params_from_iter(args))
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Store(e.to_string()))? {
            let id_str: String = row.get(0).map_err(|e| Error::Store(e.to_string()))?;
            out.push(Uuid::parse_str(&id_str).map_err(|e| Error::Store(e.to_string()))?);
        }
        Ok(out)
    }

    async fn cleanup(&self, memory_id: Uuid) -> Result<()> {
        let conn = self.get_connection().await?;
        let _guard = self.write_lock.lock().await;
        let id_str = memory_id.to_string();

        let mut entity_rows = conn
            .query(
                "SELECT entity_id FROM memory_entity_links WHERE memory_id = ?",
                params![id_str.clone()],
            )
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        let mut touched_entities: Vec<String> = Vec::new();
        while let Some(row) = entity_rows.next().await.map_err(|e| Error::Store(e.to_string()))? {
            touched_entities.push(row.get(0).map_err(|e| Error::Store(e.to_string()))?);
        }
        drop(entity_rows);

        conn.execute(
            "DELETE FROM memory_entity_links WHERE memory_id = ?",
            params![id_str.clone()],
        )
        .await
        .map_err(|e| Error::Store(e.to_string()))?;
        conn.execute(
            "DELETE FROM relationships WHERE provenance_memory_id = ?",
            params![id_str.clone()],
        )
        .await
        .map_err(|e| Error::Store(e.to_string()))?;
        conn.execute(
            "DELETE FROM temporal_facts WHERE memory_id = ?",
            params![id_str.clone()],
        )
        .await
        .map_err(|e| Error::Store(e.to_string()))?;

        for entity_id in touched_entities {
            let mut rows = conn
                .query(
                    r#"
                    SELECT
                        (SELECT COUNT(*) FROM memory_entity_links WHERE entity_id = ?) +
                        (SELECT COUNT(*) FROM relationships WHERE source_entity_id = ? OR target_entity_id = ?)
                    "#,
                    params![entity_id.clone(), entity_id.clone(), entity_id.clone()],
                )
                .await
                .map_err(|e| Error::Store(e.to_string()))?;
            if let Some(row) = rows.next().await.map_err(|e| Error::Store(e.to_string()))? {
                let remaining: i64 = row.get(0).map_err(|e| Error::Store(e.to_string()))?;
                if remaining == 0 {
                    conn.execute("DELETE FROM entities WHERE id = ?", params![entity_id])
                        .await
                        .map_err(|e| Error::Store(e.to_string()))?;
                }
            }
        }

        Ok(())
    }

    async fn temporal_facts_for(&self, memory_id: Uuid) -> Result<Vec<TemporalFact>> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query(
                "SELECT memory_id, date_start, date_end, label FROM temporal_facts \
                 WHERE memory_id = ? ORDER BY id DESC",
                params![memory_id.to_string()],
            )
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Store(e.to_string()))? {
            out.push(row_to_temporal_fact(&row)?);
        }
        Ok(out)
    }

    async fn memories_in_range(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Uuid>> {
        let conn = self.get_connection().await?;
        let mut sql = String::from("SELECT DISTINCT memory_id FROM temporal_facts WHERE 1=1");
        let mut binds: Vec<i64> = Vec::new();
        if let Some(after) = after {
            sql.push_str(" AND (date_end IS NULL OR date_end >= ?)");
            binds.push(to_ts(after));
        }
        if let Some(before) = before {
            sql.push_str(" AND date_start <= ?");
            binds.push(to_ts(before));
        }
        let mut rows = conn
            .query(&sql, libsql::params_from_iter(binds))
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Store(e.to_string()))? {
            let id_str: String = row.get(0).map_err(|e| Error::Store(e.to_string()))?;
            out.push(Uuid::parse_str(&id_str).map_err(|e| Error::Store(e.to_string()))?);
        }
        Ok(out)
    }
}

fn row_to_entity(row: &Row) -> Result<Entity> {
    let id_str: String = row.get(0).map_err(|e| Error::Store(e.to_string()))?;
    let name: String = row.get(1).map_err(|e| Error::Store(e.to_string()))?;
    let display_name: String = row.get(2).map_err(|e| Error::Store(e.to_string()))?;
    let entity_type: String = row.get(3).map_err(|e| Error::Store(e.to_string()))?;
    let workspace_id: Option<String> = row.get(4).map_err(|e| Error::Store(e.to_string()))?;
    Ok(Entity {
        id: Uuid::parse_str(&id_str).map_err(|e| Error::Store(e.to_string()))?,
        name,
        display_name,
        entity_type: entity_type_from_str(&entity_type),
        workspace_id,
    })
}

fn row_to_temporal_fact(row: &Row) -> Result<TemporalFact> {
    let memory_id: String = row.get(0).map_err(|e| Error::Store(e.to_string()))?;
    let date_start: i64 = row.get(1).map_err(|e| Error::Store(e.to_string()))?;
    let date_end: Option<i64> = row.get(2).map_err(|e| Error::Store(e.to_string()))?;
    let label: String = row.get(3).map_err(|e| Error::Store(e.to_string()))?;
    Ok(TemporalFact {
        memory_id: Uuid::parse_str(&memory_id).map_err(|e| Error::Store(e.to_string()))?,
        date_start: from_ts(date_start)?,
        date_end: date_end.map(from_ts).transpose()?,
        label,
    })
}

#[async_trait]
impl SessionStore for TursoStorage {
    async fn upsert_chunk(&self, chunk: &SessionChunk) -> Result<()> {
        let conn = self.get_connection().await?;
        let vector_json = chunk
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(Error::Serialization)?;

        conn.execute(
            r#"
            INSERT INTO session_chunks (
                session_id, chunk_index, text, vector, tokens, start_turn, end_turn, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id, chunk_index) DO UPDATE SET
                text = excluded.text,
                vector = excluded.vector,
                tokens = excluded.tokens,
                start_turn = excluded.start_turn,
                end_turn = excluded.end_turn,
                created_at = excluded.created_at
            "#,
            params![
                chunk.session_id.clone(),
                chunk.chunk_index,
                chunk.text.clone(),
                vector_json,
                chunk.tokens,
                chunk.start_turn,
                chunk.end_turn,
                to_ts(chunk.created_at),
            ],
        )
        .await
        .map_err(|e| Error::Store(format!("failed to upsert session chunk: {e}")))?;
        Ok(())
    }

    async fn search(
        &self,
        session_id: &str,
        vector: &[f32],
        k: usize,
        offset: usize,
    ) -> Result<Vec<SessionChunkHit>> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT session_id, chunk_index, text, vector, tokens, start_turn, end_turn, created_at
                FROM session_chunks WHERE session_id = ?
                "#,
                params![session_id.to_string()],
            )
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        let mut hits: Vec<SessionChunkHit> = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Store(e.to_string()))? {
            let chunk = row_to_session_chunk(&row)?;
            let Some(chunk_vector) = &chunk.embedding else {
                continue;
            };
            let score = cosine_similarity(vector, chunk_vector);
            hits.push(SessionChunkHit { chunk, score });
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(hits.into_iter().skip(offset).take(k).collect())
    }

    async fn chunks_since(&self, session_id: &str, since_index: u32) -> Result<Vec<SessionChunk>> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT session_id, chunk_index, text, vector, tokens, start_turn, end_turn, created_at
                FROM session_chunks WHERE session_id = ? AND chunk_index > ?
                ORDER BY chunk_index ASC
                "#,
                params![session_id.to_string(), since_index],
            )
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Store(e.to_string()))? {
            out.push(row_to_session_chunk(&row)?);
        }
        Ok(out)
    }

    async fn expire_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.get_connection().await?;
        let affected = conn
            .execute("DELETE FROM session_chunks WHERE created_at < ?", params![to_ts(cutoff)])
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        Ok(affected as usize)
    }
}

fn row_to_session_chunk(row: &Row) -> Result<SessionChunk> {
    let session_id: String = row.get(0).map_err(|e| Error::Store(e.to_string()))?;
    let chunk_index: u32 = row.get(1).map_err(|e| Error::Store(e.to_string()))?;
    let text: String = row.get(2).map_err(|e| Error::Store(e.to_string()))?;
    let vector_json: Option<String> = row.get(3).map_err(|e| Error::Store(e.to_string()))?;
    let tokens: u32 = row.get(4).map_err(|e| Error::Store(e.to_string()))?;
    let start_turn: u32 = row.get(5).map_err(|e| Error::Store(e.to_string()))?;
    let end_turn: u32 = row.get(6).map_err(|e| Error::Store(e.to_string()))?;
    let created_at: i64 = row.get(7).map_err(|e| Error::Store(e.to_string()))?;

    let embedding = vector_json
        .map(|json| serde_json::from_str::<Vec<f32>>(&json))
        .transpose()
        .map_err(Error::Serialization)?;

    Ok(SessionChunk {
        session_id,
        chunk_index,
        text,
        embedding,
        tokens,
        start_turn,
        end_turn,
        created_at: from_ts(created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;
    use std::collections::BTreeSet;

    async fn memory_storage() -> TursoStorage {
        let db = Builder::new_local(":memory:").build().await.expect("build in-memory db");
        let storage = TursoStorage::from_database(db).expect("wrap db");
        storage.initialize_schema().await.expect("initialize schema");
        storage
    }

    fn sample_entry(content: &str) -> MemoryEntry {
        let now = Utc::now();
        MemoryEntry {
            id: Uuid::new_v4(),
            content: content.to_string(),
            embedding: Some(vec![1.0, 0.0, 0.0]),
            source_instance: "agent-1".to_string(),
            source_type: SourceType::Deliberate,
            created_at: now,
            updated_at: now,
            tags: BTreeSet::new(),
            context: None,
            confidence: 1.0,
            supersedes: None,
            scope: Scope::Personal,
            workspace_id: None,
            user_id: None,
            model_id: None,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips_content() {
        let storage = memory_storage().await;
        let entry = sample_entry("Auth service uses JWT with RS256");
        MemoryRecordStore::put(&storage, &entry).await.expect("put");
        let fetched = MemoryRecordStore::get(&storage, entry.id).await.expect("get").expect("present");
        assert_eq!(fetched.content, entry.content);
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let storage = memory_storage().await;
        let entry = sample_entry("ephemeral");
        MemoryRecordStore::put(&storage, &entry).await.expect("put");
        MemoryRecordStore::delete(&storage, entry.id).await.expect("delete");
        assert!(MemoryRecordStore::get(&storage, entry.id).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn find_superseding_follows_chain() {
        let storage = memory_storage().await;
        let original = sample_entry("Joe's timezone is Eastern");
        MemoryRecordStore::put(&storage, &original).await.expect("put original");
        let mut correction = sample_entry("Joe's timezone is Mountain");
        correction.supersedes = Some(original.id);
        MemoryRecordStore::put(&storage, &correction).await.expect("put correction");

        let found = MemoryRecordStore::find_superseding(&storage, original.id)
            .await
            .expect("query");
        assert_eq!(found, Some(correction.id));
    }

    #[tokio::test]
    async fn vector_search_ranks_by_cosine_similarity() {
        let storage = memory_storage().await;
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let now = Utc::now();
        VectorStore::upsert(&storage, a, &[1.0, 0.0], &[], now, "personal", None, "deliberate")
            .await
            .expect("upsert a");
        VectorStore::upsert(&storage, b, &[0.0, 1.0], &[], now, "personal", None, "deliberate")
            .await
            .expect("upsert b");

        let hits = VectorStore::search(&storage, &[1.0, 0.0], 2, &SearchFilter::default())
            .await
            .expect("search");
        assert_eq!(hits[0].id, a);
    }

    #[tokio::test]
    async fn fts_search_finds_exact_substring_with_punctuation() {
        let storage = memory_storage().await;
        let id = Uuid::new_v4();
        FullTextStore::upsert(&storage, id, "contact us at support@example.com for help")
            .await
            .expect("index");
        let hits = FullTextStore::search(&storage, "support@example.com", 5)
            .await
            .expect("search");
        assert!(hits.iter().any(|h| h.id == id));
    }

    #[tokio::test]
    async fn graph_find_connected_walks_one_hop() {
        let storage = memory_storage().await;
        let auth = Entity {
            id: Uuid::new_v4(),
            name: "auth-service".to_string(),
            display_name: "auth-service".to_string(),
            entity_type: EntityType::Service,
            workspace_id: None,
        };
        let pg = Entity {
            id: Uuid::new_v4(),
            name: "postgresql".to_string(),
            display_name: "PostgreSQL".to_string(),
            entity_type: EntityType::Tech,
            workspace_id: None,
        };
        let auth_id = GraphStore::upsert_entity(&storage, &auth).await.expect("upsert auth");
        let pg_id = GraphStore::upsert_entity(&storage, &pg).await.expect("upsert pg");
        GraphStore::upsert_relationship(
            &storage,
            &Relationship {
                id: Uuid::new_v4(),
                source_entity_id: auth_id,
                relation_type: "uses".to_string(),
                target_entity_id: pg_id,
                provenance_memory_id: Uuid::new_v4(),
                confidence: 0.9,
            },
        )
        .await
        .expect("upsert relationship");

        let connected = GraphStore::find_connected(&storage, "auth-service", 2)
            .await
            .expect("find connected");
        assert_eq!(connected.len(), 1);
        assert_eq!(connected[0].entity.name, "postgresql");
        assert_eq!(connected[0].depth, 1);
    }

    #[tokio::test]
    async fn cleanup_removes_links_and_orphan_entities() {
        let storage = memory_storage().await;
        let memory_id = Uuid::new_v4();
        let entity = Entity {
            id: Uuid::new_v4(),
            name: "lone-service".to_string(),
            display_name: "lone-service".to_string(),
            entity_type: EntityType::Service,
            workspace_id: None,
        };
        let entity_id = GraphStore::upsert_entity(&storage, &entity).await.expect("upsert");
        GraphStore::link_memory_entity(
            &storage,
            &MemoryEntityLink {
                memory_id,
                entity_id,
                provenance: "extraction".to_string(),
            },
        )
        .await
        .expect("link");

        GraphStore::cleanup(&storage, memory_id).await.expect("cleanup");

        let connected = GraphStore::memories_for_entities(&storage, &[entity_id])
            .await
            .expect("query");
        assert!(connected.is_empty());
    }
}
