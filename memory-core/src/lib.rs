//! Core retrieval engine for a shared long-term memory service for AI
//! agents: the memory record model with correction chains, the hybrid
//! vector+keyword recall pipeline, the entity/relationship graph store,
//! and the learned-retrieval client layer with its safeguard stack.
//!
//! This crate is storage-agnostic: concrete backends implement the async
//! traits in [`storage`] (`memory-storage-turso` for the durable vector,
//! full-text, and graph stores; `memory-storage-redb` for the learned-state
//! cache). Callers wire a [`memory::MemoryService`] together from whichever
//! backends and an [`embeddings::EmbeddingProvider`] they choose.
//!
//! ```no_run
//! use std::sync::Arc;
//! use memory_core::embeddings::HashEmbeddingProvider;
//! use memory_core::memory::{MemoryService, RecallParams};
//! use memory_core::types::{ServiceConfig, SourceType};
//!
//! # async fn example(
//! #     records: Arc<dyn memory_core::storage::MemoryRecordStore>,
//! #     vectors: Arc<dyn memory_core::storage::VectorStore>,
//! #     text: Arc<dyn memory_core::storage::FullTextStore>,
//! #     graph: Arc<dyn memory_core::storage::GraphStore>,
//! # ) -> memory_core::error::Result<()> {
//! let embedder = Arc::new(HashEmbeddingProvider::new(256));
//! let service = MemoryService::new(
//!     records, vectors, text, graph, embedder, None, ServiceConfig::default(), "agent-1",
//! );
//!
//! service
//!     .remember("Auth service uses JWT with RS256", SourceType::Deliberate, None, None, false)
//!     .await?;
//!
//! let outcome = service
//!     .recall(RecallParams::new("How does authentication work?", "session-1", "turn-1"))
//!     .await?;
//! let _ = outcome.hits();
//! # Ok(())
//! # }
//! ```

pub mod dedup;
pub mod embeddings;
pub mod error;
pub mod extraction;
pub mod learned;
pub mod memory;
pub mod safeguards;
pub mod session;
pub mod storage;
pub mod types;

pub use error::{Error, Result};
