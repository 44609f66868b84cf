//! SQL DDL for the durable stores: memory records, vectors, entities,
//! relationships, memory↔entity links, temporal facts, and session chunks.

/// The canonical memory record (component K's durable half).
pub const CREATE_MEMORIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY NOT NULL,
    content TEXT NOT NULL,
    source_instance TEXT NOT NULL,
    source_type TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    context TEXT,
    confidence REAL NOT NULL DEFAULT 1.0,
    supersedes TEXT,
    scope TEXT NOT NULL,
    workspace_id TEXT,
    user_id TEXT,
    model_id TEXT,
    embedding TEXT
)
"#;

pub const CREATE_MEMORIES_SUPERSEDES_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_memories_supersedes ON memories(supersedes)
"#;

pub const CREATE_MEMORIES_CREATED_AT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_memories_created_at ON memories(created_at DESC)
"#;

/// Component B: one row per memory with an embedding.
pub const CREATE_VECTORS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS memory_vectors (
    id TEXT PRIMARY KEY NOT NULL,
    vector TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL,
    scope TEXT NOT NULL,
    workspace_id TEXT,
    source_type TEXT NOT NULL
)
"#;

/// Component D: entities and relationships.
pub const CREATE_ENTITIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    display_name TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    workspace_id TEXT,
    identity_key TEXT NOT NULL UNIQUE
)
"#;

pub const CREATE_ENTITIES_NAME_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name)
"#;

pub const CREATE_RELATIONSHIPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS relationships (
    id TEXT PRIMARY KEY NOT NULL,
    source_entity_id TEXT NOT NULL,
    relation_type TEXT NOT NULL,
    target_entity_id TEXT NOT NULL,
    provenance_memory_id TEXT NOT NULL,
    confidence REAL NOT NULL
)
"#;

pub const CREATE_RELATIONSHIPS_SOURCE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_entity_id)
"#;

pub const CREATE_RELATIONSHIPS_TARGET_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_entity_id)
"#;

pub const CREATE_RELATIONSHIPS_PROVENANCE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_relationships_provenance ON relationships(provenance_memory_id)
"#;

pub const CREATE_MEMORY_ENTITY_LINKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS memory_entity_links (
    memory_id TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    provenance TEXT NOT NULL,
    PRIMARY KEY (memory_id, entity_id)
)
"#;

pub const CREATE_MEMORY_ENTITY_LINKS_ENTITY_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_memory_entity_links_entity ON memory_entity_links(entity_id)
"#;

pub const CREATE_TEMPORAL_FACTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS temporal_facts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    memory_id TEXT NOT NULL,
    date_start INTEGER NOT NULL,
    date_end INTEGER,
    label TEXT NOT NULL
)
"#;

pub const CREATE_TEMPORAL_FACTS_MEMORY_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_temporal_facts_memory ON temporal_facts(memory_id)
"#;

pub const CREATE_TEMPORAL_FACTS_RANGE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_temporal_facts_range ON temporal_facts(date_start, date_end)
"#;

/// Component H's durable half: session transcript chunks.
pub const CREATE_SESSION_CHUNKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS session_chunks (
    session_id TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    text TEXT NOT NULL,
    vector TEXT,
    tokens INTEGER NOT NULL,
    start_turn INTEGER NOT NULL,
    end_turn INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (session_id, chunk_index)
)
"#;

pub const CREATE_SESSION_CHUNKS_CREATED_AT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_session_chunks_created_at ON session_chunks(created_at)
"#;
