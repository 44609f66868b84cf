//! # Memory Storage - redb
//!
//! redb embedded database backing the learned-retrieval cache layer
//! (component K's cache half): the query cache, feedback weights, learned
//! query expansions, fact anchors, and the audit log.
//!
//! This crate provides:
//! - An embedded, file-backed key-value store with no external service
//! - Async wrappers around redb's synchronous transactions
//! - Postcard serialization for compact on-disk values
//!
//! ## Example
//!
//! ```no_run
//! use memory_storage_redb::RedbStorage;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let storage = RedbStorage::new(Path::new("./learned.redb")).await?;
//! # Ok(())
//! # }
//! ```

mod persistence;

use memory_core::{Error, Result};
use redb::{Database, ReadableTableMetadata, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const QUERY_CACHE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("query_cache");
const FEEDBACK_WEIGHTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("feedback_weights");
const LEARNED_EXPANSIONS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("learned_expansions");
const FACT_ANCHORS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("fact_anchors");
const AUDIT_LOG_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("audit_log");

/// Timeout for a single redb operation.
const DB_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a blocking redb transaction on the blocking thread pool, bounded by
/// [`DB_OPERATION_TIMEOUT`].
async fn with_db_timeout<T, F>(operation: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(DB_OPERATION_TIMEOUT, tokio::task::spawn_blocking(operation)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(Error::Store(format!("redb task join error: {join_err}"))),
        Err(_) => Err(Error::Store(format!(
            "redb operation timed out after {DB_OPERATION_TIMEOUT:?}"
        ))),
    }
}

/// redb-backed store for learned-retrieval state.
pub struct RedbStorage {
    pub(crate) db: Arc<Database>,
}

impl RedbStorage {
    /// Open (creating if absent) a redb database at `path`.
    pub async fn new(path: &Path) -> Result<Self> {
        info!("opening redb database at {}", path.display());
        let path_buf = path.to_path_buf();
        let db = with_db_timeout(move || {
            Database::create(&path_buf)
                .map_err(|e| Error::Store(format!("failed to create redb database: {e}")))
        })
        .await?;

        let storage = Self { db: Arc::new(db) };
        storage.initialize_tables().await?;
        info!("redb database ready");
        Ok(storage)
    }

    async fn initialize_tables(&self) -> Result<()> {
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Store(format!("failed to begin write transaction: {e}")))?;
            {
                write_txn
                    .open_table(QUERY_CACHE_TABLE)
                    .map_err(|e| Error::Store(format!("failed to open query_cache table: {e}")))?;
                write_txn
                    .open_table(FEEDBACK_WEIGHTS_TABLE)
                    .map_err(|e| Error::Store(format!("failed to open feedback_weights table: {e}")))?;
                write_txn.open_table(LEARNED_EXPANSIONS_TABLE).map_err(|e| {
                    Error::Store(format!("failed to open learned_expansions table: {e}"))
                })?;
                write_txn
                    .open_table(FACT_ANCHORS_TABLE)
                    .map_err(|e| Error::Store(format!("failed to open fact_anchors table: {e}")))?;
                write_txn
                    .open_table(AUDIT_LOG_TABLE)
                    .map_err(|e| Error::Store(format!("failed to open audit_log table: {e}")))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::Store(format!("failed to commit transaction: {e}")))?;
            Ok(())
        })
        .await?;
        info!("initialized redb tables");
        Ok(())
    }

    /// Verify the database is reachable.
    pub async fn health_check(&self) -> Result<bool> {
        let db = Arc::clone(&self.db);
        with_db_timeout(move || match db.begin_read() {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        })
        .await
    }

    /// Total entries across all learned-state tables, for diagnostics.
    pub async fn record_count(&self) -> Result<usize> {
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| Error::Store(format!("failed to begin read transaction: {e}")))?;
            let mut total = 0usize;
            for table_def in [
                QUERY_CACHE_TABLE,
                FEEDBACK_WEIGHTS_TABLE,
                LEARNED_EXPANSIONS_TABLE,
                FACT_ANCHORS_TABLE,
                AUDIT_LOG_TABLE,
            ] {
                let table = read_txn
                    .open_table(table_def)
                    .map_err(|e| Error::Store(format!("failed to open table: {e}")))?;
                total += table
                    .len()
                    .map_err(|e| Error::Store(format!("failed to count table: {e}")))? as usize;
            }
            Ok(total)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_storage() -> (RedbStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("learned.redb");
        let storage = RedbStorage::new(&path).await.expect("open storage");
        (storage, dir)
    }

    #[tokio::test]
    async fn opens_and_initializes_tables_idempotently() {
        let (storage, _dir) = temp_storage().await;
        storage.initialize_tables().await.expect("second init is a no-op");
        assert_eq!(storage.record_count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn health_check_reports_ok() {
        let (storage, _dir) = temp_storage().await;
        assert!(storage.health_check().await.expect("health check"));
    }
}
