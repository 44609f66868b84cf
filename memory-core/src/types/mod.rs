//! Shared data model and configuration surface.

mod config;
mod entry;
mod graph;
mod learned;
mod result;
mod session;

pub use config::{
    DedupConfig, GraphConfig, LearnedConfig, MemoryConfig, SafeguardConfig, SearchConfig,
    ServiceConfig,
};
pub use entry::{normalize_for_dedup, MemoryEntry, Scope, SourceType, MAX_CONTENT_BYTES};
pub use graph::{ConnectedEntity, Entity, EntityType, MemoryEntityLink, Relationship, TemporalFact};
pub use learned::{ExpansionSource, FactAnchor, FeedbackWeight, LearnedExpansion, QueryCacheEntry};
pub use result::{RecallHit, RecallOutcome, RetrievalMethod, SkipReason, StoreResult};
pub use session::{SessionChunk, SessionChunkHit};
