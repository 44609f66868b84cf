//! FTS5 virtual table for component C (full-text/keyword search).
//!
//! `FullTextStore` is its own trait a backend can satisfy independently of
//! `MemoryRecordStore` (a different backend might index full text in
//! Elasticsearch). So this table is written explicitly by
//! `FullTextStore::upsert`/`delete` rather than kept in sync via triggers
//! off `memories`.

/// `memory_id` is UNINDEXED so it's available for joins without being
/// tokenized. Tokenizer: porter unicode61, for stemming and Unicode-aware
/// tokenization.
pub const CREATE_MEMORIES_FTS_TABLE: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    memory_id UNINDEXED,
    content,
    tokenize='porter unicode61'
)
"#;

#[allow(dead_code)]
pub const DROP_FTS5_SCHEMA: &str = r#"
DROP TABLE IF EXISTS memories_fts;
"#;
