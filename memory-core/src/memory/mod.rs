//! Memory service (component G): orchestrates remember / correct
//! / forget / recall over the embedding adapter, stores, dedup engine,
//! entity extractor, learned-retrieval layer, and safeguard stack.

mod bundle;
mod capture;
mod recall;

pub use bundle::{Bundle, BundleEmbeddingMeta, BundleManifest, HealthStatus, ImportStrategy, ServiceStats};
pub use recall::RecallParams;

use std::sync::Arc;

use crate::dedup::DedupEngine;
use crate::embeddings::EmbeddingProvider;
use crate::extraction::EntityExtractor;
use crate::learned::{FeedbackTracker, QueryCache, QueryExpander};
use crate::safeguards::Safeguards;
use crate::storage::{FullTextStore, GraphStore, LearnedStatePersistence, MemoryRecordStore, VectorStore};
use crate::types::ServiceConfig;

/// Number of concurrent writes `remember_batch` fans out at once, unless
/// overridden by the caller.
pub const DEFAULT_BATCH_CHUNK_SIZE: usize = 50;

/// Orchestrates the whole retrieval engine over pluggable storage
/// backends. Cheaply `Clone`-able: all shared state lives behind `Arc`.
#[derive(Clone)]
pub struct MemoryService {
    pub(crate) records: Arc<dyn MemoryRecordStore>,
    pub(crate) vectors: Arc<dyn VectorStore>,
    pub(crate) text: Arc<dyn FullTextStore>,
    pub(crate) graph: Arc<dyn GraphStore>,
    pub(crate) embedder: Arc<dyn EmbeddingProvider>,
    pub(crate) dedup: Arc<DedupEngine>,
    pub(crate) extractor: EntityExtractor,
    pub(crate) query_cache: Arc<QueryCache>,
    pub(crate) expander: Arc<QueryExpander>,
    pub(crate) feedback: Arc<FeedbackTracker>,
    pub(crate) safeguards: Arc<Safeguards>,
    pub(crate) config: ServiceConfig,
    pub(crate) instance_id: String,
}

impl MemoryService {
    /// Construct a memory service over the given storage backends.
    /// `learned_persistence` is optional; when absent (or when it errors at
    /// runtime) the learned-retrieval layer degrades to in-memory-only
    /// operation,.
    #[must_use]
    pub fn new(
        records: Arc<dyn MemoryRecordStore>,
        vectors: Arc<dyn VectorStore>,
        text: Arc<dyn FullTextStore>,
        graph: Arc<dyn GraphStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        learned_persistence: Option<Arc<dyn LearnedStatePersistence>>,
        config: ServiceConfig,
        instance_id: impl Into<String>,
    ) -> Self {
        let dedup = Arc::new(DedupEngine::new(config.dedup));
        let query_cache = Arc::new(QueryCache::new(learned_persistence.clone(), config.learned));
        let expander = Arc::new(QueryExpander::new(learned_persistence.clone(), config.learned));
        let feedback = Arc::new(FeedbackTracker::new(learned_persistence, config.learned));
        let safeguards = Arc::new(Safeguards::new(config.safeguards));

        Self {
            records,
            vectors,
            text,
            graph,
            embedder,
            dedup,
            extractor: EntityExtractor::new(),
            query_cache,
            expander,
            feedback,
            safeguards,
            config,
            instance_id: instance_id.into(),
        }
    }

    /// The embedding adapter's model name, dimensions, and provider id, for
    /// `stats()` and bundle manifests.
    #[must_use]
    pub fn embedding_meta(&self) -> bundle::BundleEmbeddingMeta {
        bundle::BundleEmbeddingMeta {
            model_name: self.embedder.model_name().to_string(),
            dimensions: self.embedder.dimensions(),
            provider: self.embedder.provider().to_string(),
        }
    }
}
