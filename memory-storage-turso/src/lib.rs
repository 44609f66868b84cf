#![allow(clippy::expect_used)]

//! # Memory Storage - Turso
//!
//! Turso/libSQL storage backend for durable persistence of memory records,
//! vectors, the entity/relationship graph, and session transcript chunks.
//!
//! This crate provides:
//! - Connection management for Turso/libSQL databases
//! - SQL schema creation and migration
//! - `memory_core::storage` trait implementations backed by SQL tables
//! - An FTS5 virtual table for keyword search
//! - Retry logic for transient write failures
//!
//! ## Example
//!
//! ```no_run
//! use memory_storage_turso::TursoStorage;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let storage = TursoStorage::new("libsql://localhost:8080", "token").await?;
//! storage.initialize_schema().await?;
//! # Ok(())
//! # }
//! ```

use libsql::{Builder, Connection, Database};
use memory_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub mod pool;
mod fts5_schema;
mod schema;
mod storage;

pub use pool::{ConnectionPool, PoolConfig, PoolStatistics};

/// Turso storage backend for durable persistence.
pub struct TursoStorage {
    db: Arc<Database>,
    pool: Option<Arc<ConnectionPool>>,
    config: TursoConfig,
    /// Serializes graph-store writes across entities, relationships, links,
    /// and temporal facts so a multi-statement upsert can't interleave with
    /// another writer's cleanup pass.
    write_lock: tokio::sync::Mutex<()>,
}

/// Configuration for Turso storage.
#[derive(Debug, Clone)]
pub struct TursoConfig {
    /// Maximum retry attempts for failed write operations.
    pub max_retries: u32,
    /// Base delay for exponential backoff (milliseconds).
    pub retry_base_delay_ms: u64,
    /// Maximum delay for exponential backoff (milliseconds).
    pub retry_max_delay_ms: u64,
    /// Enable connection pooling.
    pub enable_pooling: bool,
}

impl Default for TursoConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 5000,
            enable_pooling: true,
        }
    }
}

impl TursoStorage {
    /// Create a new Turso storage instance.
    ///
    /// # Arguments
    ///
    /// * `url` - Database URL (only `libsql://`, `file:`, or `:memory:` protocols allowed)
    /// * `token` - Authentication token (required for `libsql://`, empty for local files)
    ///
    /// # Security
    ///
    /// Remote connections must use `libsql://` with a non-empty token; HTTP/HTTPS
    /// protocols are rejected. Local `file:` and `:memory:` databases need no token.
    pub async fn new(url: &str, token: &str) -> Result<Self> {
        Self::with_config(url, token, TursoConfig::default()).await
    }

    /// Create a Turso storage instance from an existing `Database`, useful for
    /// tests against a local file-based database.
    pub fn from_database(db: libsql::Database) -> Result<Self> {
        Ok(Self {
            db: Arc::new(db),
            pool: None,
            config: TursoConfig::default(),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Create a new Turso storage instance with custom configuration.
    pub async fn with_config(url: &str, token: &str, config: TursoConfig) -> Result<Self> {
        info!("Connecting to Turso database at {}", url);

        if !url.starts_with("libsql://") && !url.starts_with("file:") && !url.starts_with(":memory:") {
            return Err(Error::Configuration(format!(
                "insecure database URL: {url}. Only libsql://, file:, or :memory: protocols are allowed"
            )));
        }
        if url.starts_with("libsql://") && token.trim().is_empty() {
            return Err(Error::Configuration(
                "authentication token required for remote Turso connections".to_string(),
            ));
        }

        let db = if url.starts_with("libsql://") {
            Builder::new_remote(url.to_string(), token.to_string())
                .build()
                .await
                .map_err(|e| Error::Store(format!("failed to connect to Turso: {e}")))?
        } else {
            let path = url.strip_prefix("file:").unwrap_or(url);
            Builder::new_local(path)
                .build()
                .await
                .map_err(|e| Error::Store(format!("failed to connect to Turso: {e}")))?
        };
        let db = Arc::new(db);

        let pool = if config.enable_pooling {
            let pool_config = PoolConfig::default();
            info!("connection pool enabled with {} max connections", pool_config.max_connections);
            Some(Arc::new(ConnectionPool::new(Arc::clone(&db), pool_config).await?))
        } else {
            info!("connection pooling disabled");
            None
        };

        info!("successfully connected to Turso database");
        Ok(Self {
            db,
            pool,
            config,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Create or migrate every table, index, and FTS5 virtual table. Safe to
    /// call multiple times.
    pub async fn initialize_schema(&self) -> Result<()> {
        info!("initializing Turso database schema");
        let conn = self.get_connection().await?;

        for sql in [
            schema::CREATE_MEMORIES_TABLE,
            schema::CREATE_MEMORIES_SUPERSEDES_INDEX,
            schema::CREATE_MEMORIES_CREATED_AT_INDEX,
            schema::CREATE_VECTORS_TABLE,
            schema::CREATE_ENTITIES_TABLE,
            schema::CREATE_ENTITIES_NAME_INDEX,
            schema::CREATE_RELATIONSHIPS_TABLE,
            schema::CREATE_RELATIONSHIPS_SOURCE_INDEX,
            schema::CREATE_RELATIONSHIPS_TARGET_INDEX,
            schema::CREATE_RELATIONSHIPS_PROVENANCE_INDEX,
            schema::CREATE_MEMORY_ENTITY_LINKS_TABLE,
            schema::CREATE_MEMORY_ENTITY_LINKS_ENTITY_INDEX,
            schema::CREATE_TEMPORAL_FACTS_TABLE,
            schema::CREATE_TEMPORAL_FACTS_MEMORY_INDEX,
            schema::CREATE_TEMPORAL_FACTS_RANGE_INDEX,
            schema::CREATE_SESSION_CHUNKS_TABLE,
            schema::CREATE_SESSION_CHUNKS_CREATED_AT_INDEX,
            fts5_schema::CREATE_MEMORIES_FTS_TABLE,
        ] {
            self.execute_with_retry(&conn, sql).await?;
        }

        info!("schema initialization complete");
        Ok(())
    }

    /// Get a database connection. Pooled when pooling is enabled, otherwise a
    /// fresh direct connection.
    async fn get_connection(&self) -> Result<Connection> {
        if let Some(ref pool) = self.pool {
            let pooled_conn = pool.get().await?;
            pooled_conn.into_inner()
        } else {
            self.db
                .connect()
                .map_err(|e| Error::Store(format!("failed to get connection: {e}")))
        }
    }

    /// Execute a SQL statement with exponential-backoff retry.
    async fn execute_with_retry(&self, conn: &Connection, sql: &str) -> Result<()> {
        let mut attempts = 0;
        let mut delay = Duration::from_millis(self.config.retry_base_delay_ms);

        loop {
            match conn.execute(sql, ()).await {
                Ok(_) => {
                    if attempts > 0 {
                        debug!("SQL succeeded after {} retries", attempts);
                    }
                    return Ok(());
                }
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.config.max_retries {
                        error!("SQL failed after {} attempts: {}", attempts, e);
                        return Err(Error::Store(format!(
                            "SQL execution failed after {attempts} retries: {e}"
                        )));
                    }
                    warn!("SQL attempt {} failed: {}, retrying...", attempts, e);
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_millis(self.config.retry_max_delay_ms));
                }
            }
        }
    }

    /// Verify database connectivity.
    pub async fn health_check(&self) -> Result<bool> {
        let conn = self.get_connection().await?;
        match conn.query("SELECT 1", ()).await {
            Ok(_) => Ok(true),
            Err(e) => {
                error!("health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> TursoStorage {
        let db = Builder::new_local(":memory:").build().await.expect("build in-memory db");
        let storage = TursoStorage::from_database(db).expect("wrap db");
        storage.initialize_schema().await.expect("initialize schema");
        storage
    }

    #[tokio::test]
    async fn initializes_schema_idempotently() {
        let storage = memory_db().await;
        storage.initialize_schema().await.expect("second init is a no-op");
    }

    #[tokio::test]
    async fn health_check_reports_ok() {
        let storage = memory_db().await;
        assert!(storage.health_check().await.expect("health check"));
    }

    #[tokio::test]
    async fn rejects_insecure_url() {
        let result = TursoStorage::new("http://example.com", "token").await;
        assert!(result.is_err());
    }
}
