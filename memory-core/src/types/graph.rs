//! Entity/relationship graph data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The type of a named entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    /// A person's name.
    Person,
    /// An organization.
    Org,
    /// A geopolitical entity (place).
    Gpe,
    /// A technology or language.
    Tech,
    /// A named service/product.
    Service,
    /// A date or date expression.
    Date,
    /// Anything not covered above.
    Other,
}

/// A named thing referenced in memories.
///
/// Equality is by `(workspace_id, name, entity_type)`, not by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Opaque unique identifier.
    pub id: Uuid,
    /// Canonical lowercased form, used for equality and lookup.
    pub name: String,
    /// Human-presentable form.
    pub display_name: String,
    /// Entity type.
    pub entity_type: EntityType,
    /// Workspace this entity was extracted within.
    pub workspace_id: Option<String>,
}

impl Entity {
    /// The `(workspace_id, name, entity_type)` identity key.
    #[must_use]
    pub fn identity_key(&self) -> (Option<String>, String, EntityType) {
        (self.workspace_id.clone(), self.name.clone(), self.entity_type)
    }
}

/// A directed typed edge between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    /// Opaque unique identifier.
    pub id: Uuid,
    /// Source entity.
    pub source_entity_id: Uuid,
    /// Relation label: a closed-set type or a free-form verb lemma.
    pub relation_type: String,
    /// Target entity.
    pub target_entity_id: Uuid,
    /// The memory this relationship was extracted from.
    pub provenance_memory_id: Uuid,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Many-to-many association between a memory and an entity it mentions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntityLink {
    /// The memory.
    pub memory_id: Uuid,
    /// The entity mentioned.
    pub entity_id: Uuid,
    /// How the link was established (e.g. `"regex"`, `"heuristic_ner"`).
    pub provenance: String,
}

/// A `(memory_id, date_start, date_end?, label)` tuple for date-range recall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalFact {
    /// The memory this fact was extracted from.
    pub memory_id: Uuid,
    /// Start of the date range.
    pub date_start: DateTime<Utc>,
    /// End of the date range, if bounded.
    pub date_end: Option<DateTime<Utc>>,
    /// Human-readable label for the range (e.g. `"Q3 2024"`).
    pub label: String,
}

/// An entity reached during multi-hop graph traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedEntity {
    /// The entity reached.
    pub entity: Entity,
    /// BFS depth from the seed entity (1-hop, 2-hop, ...).
    pub depth: u32,
}
