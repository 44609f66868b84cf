//! [`LearnedStatePersistence`] implementation over redb tables.
//!
//! Each table is a single-column B-tree keyed on a string built so that
//! related rows (e.g. every expansion learned for one query, every anchor
//! for one pattern) sort together and can be retrieved with a prefix
//! `range` scan — redb has no secondary indexes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use memory_core::storage::LearnedStatePersistence;
use memory_core::types::{FactAnchor, FeedbackWeight, LearnedExpansion, QueryCacheEntry};
use memory_core::{Error, Result};
use redb::{ReadableTable, ReadableTableMetadata};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    with_db_timeout, RedbStorage, AUDIT_LOG_TABLE, FACT_ANCHORS_TABLE, FEEDBACK_WEIGHTS_TABLE,
    LEARNED_EXPANSIONS_TABLE, QUERY_CACHE_TABLE,
};

/// Separator between the grouping prefix and the disambiguating suffix of a
/// composite key. Chosen because it never appears in a normalized query,
/// UUID, or RFC3339 timestamp.
const SEP: char = '\u{0}';

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    postcard::to_allocvec(value).map_err(|e| Error::Store(format!("postcard encode failed: {e}")))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    postcard::from_bytes(bytes).map_err(|e| Error::Store(format!("postcard decode failed: {e}")))
}

fn prefix_range(prefix: &str) -> (String, String) {
    (format!("{prefix}{SEP}"), format!("{prefix}\u{1}"))
}

#[derive(Debug, Serialize, Deserialize)]
struct AuditLogRecord {
    event: String,
    detail: String,
    recorded_at: DateTime<Utc>,
}

#[async_trait]
impl LearnedStatePersistence for RedbStorage {
    async fn get_cache_entry(&self, normalized_query: &str) -> Result<Option<QueryCacheEntry>> {
        let db = Arc::clone(&self.db);
        let key = normalized_query.to_string();
        with_db_timeout(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| Error::Store(format!("begin read: {e}")))?;
            let table = read_txn
                .open_table(QUERY_CACHE_TABLE)
                .map_err(|e| Error::Store(format!("open query_cache: {e}")))?;
            match table
                .get(key.as_str())
                .map_err(|e| Error::Store(format!("get query_cache: {e}")))?
            {
                Some(value) => Ok(Some(decode(value.value())?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn put_cache_entry(&self, entry: &QueryCacheEntry) -> Result<()> {
        let db = Arc::clone(&self.db);
        let key = entry.normalized_query.clone();
        let value = encode(entry)?;
        with_db_timeout(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Store(format!("begin write: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(QUERY_CACHE_TABLE)
                    .map_err(|e| Error::Store(format!("open query_cache: {e}")))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(|e| Error::Store(format!("insert query_cache: {e}")))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::Store(format!("commit: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn invalidate_path(&self, fact_id: Uuid) -> Result<()> {
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Store(format!("begin write: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(QUERY_CACHE_TABLE)
                    .map_err(|e| Error::Store(format!("open query_cache: {e}")))?;

                let stale_keys: Vec<String> = table
                    .iter()
                    .map_err(|e| Error::Store(format!("iterate query_cache: {e}")))?
                    .filter_map(|item| item.ok())
                    .filter_map(|(k, v)| {
                        let entry: QueryCacheEntry = decode(v.value()).ok()?;
                        entry.fact_ids.contains(&fact_id).then(|| k.value().to_string())
                    })
                    .collect();

                for key in stale_keys {
                    table
                        .remove(key.as_str())
                        .map_err(|e| Error::Store(format!("remove query_cache entry: {e}")))?;
                }
            }
            write_txn
                .commit()
                .map_err(|e| Error::Store(format!("commit: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn get_feedback_weight(&self, query_hash: u64, fact_id: Uuid) -> Result<Option<f32>> {
        let db = Arc::clone(&self.db);
        let key = feedback_key(query_hash, fact_id);
        with_db_timeout(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| Error::Store(format!("begin read: {e}")))?;
            let table = read_txn
                .open_table(FEEDBACK_WEIGHTS_TABLE)
                .map_err(|e| Error::Store(format!("open feedback_weights: {e}")))?;
            match table
                .get(key.as_str())
                .map_err(|e| Error::Store(format!("get feedback_weights: {e}")))?
            {
                Some(value) => {
                    let weight: FeedbackWeight = decode(value.value())?;
                    Ok(Some(weight.weight))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn put_feedback_weight(&self, weight: &FeedbackWeight) -> Result<()> {
        let db = Arc::clone(&self.db);
        let key = feedback_key(weight.query_hash, weight.fact_id);
        let value = encode(weight)?;
        with_db_timeout(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Store(format!("begin write: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(FEEDBACK_WEIGHTS_TABLE)
                    .map_err(|e| Error::Store(format!("open feedback_weights: {e}")))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(|e| Error::Store(format!("insert feedback_weights: {e}")))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::Store(format!("commit: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn learned_expansions(&self, query_normalized: &str) -> Result<Vec<LearnedExpansion>> {
        let db = Arc::clone(&self.db);
        let (start, end) = prefix_range(query_normalized);
        with_db_timeout(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| Error::Store(format!("begin read: {e}")))?;
            let table = read_txn
                .open_table(LEARNED_EXPANSIONS_TABLE)
                .map_err(|e| Error::Store(format!("open learned_expansions: {e}")))?;

            let mut out: Vec<LearnedExpansion> = table
                .range(start.as_str()..end.as_str())
                .map_err(|e| Error::Store(format!("range learned_expansions: {e}")))?
                .filter_map(|item| item.ok())
                .map(|(_k, v)| decode(v.value()))
                .collect::<Result<Vec<_>>>()?;

            // Keys embed an RFC3339 timestamp, so ascending key order is
            // ascending recency; reverse for most-recent-first.
            out.reverse();
            Ok(out)
        })
        .await
    }

    async fn put_learned_expansion(&self, expansion: &LearnedExpansion, cap: usize) -> Result<()> {
        let db = Arc::clone(&self.db);
        let key = expansion_key(&expansion.query_normalized, expansion.created_at, &expansion.variant);
        let value = encode(expansion)?;
        let (start, end) = prefix_range(&expansion.query_normalized);

        with_db_timeout(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Store(format!("begin write: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(LEARNED_EXPANSIONS_TABLE)
                    .map_err(|e| Error::Store(format!("open learned_expansions: {e}")))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(|e| Error::Store(format!("insert learned_expansions: {e}")))?;

                let mut keys: Vec<String> = table
                    .range(start.as_str()..end.as_str())
                    .map_err(|e| Error::Store(format!("range learned_expansions: {e}")))?
                    .filter_map(|item| item.ok())
                    .map(|(k, _v)| k.value().to_string())
                    .collect();
                keys.sort();

                if keys.len() > cap {
                    for stale in &keys[..keys.len() - cap] {
                        table
                            .remove(stale.as_str())
                            .map_err(|e| Error::Store(format!("trim learned_expansions: {e}")))?;
                    }
                }
            }
            write_txn
                .commit()
                .map_err(|e| Error::Store(format!("commit: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn fact_anchors_for(&self, pattern: &str) -> Result<Vec<FactAnchor>> {
        let db = Arc::clone(&self.db);
        let (start, end) = prefix_range(pattern);
        with_db_timeout(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| Error::Store(format!("begin read: {e}")))?;
            let table = read_txn
                .open_table(FACT_ANCHORS_TABLE)
                .map_err(|e| Error::Store(format!("open fact_anchors: {e}")))?;
            table
                .range(start.as_str()..end.as_str())
                .map_err(|e| Error::Store(format!("range fact_anchors: {e}")))?
                .filter_map(|item| item.ok())
                .map(|(_k, v)| decode(v.value()))
                .collect()
        })
        .await
    }

    async fn put_fact_anchor(&self, anchor: &FactAnchor) -> Result<()> {
        let db = Arc::clone(&self.db);
        let key = format!("{}{SEP}{}", anchor.anchor_pattern, anchor.fact_id);
        let value = encode(anchor)?;
        with_db_timeout(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Store(format!("begin write: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(FACT_ANCHORS_TABLE)
                    .map_err(|e| Error::Store(format!("open fact_anchors: {e}")))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(|e| Error::Store(format!("insert fact_anchors: {e}")))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::Store(format!("commit: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn append_audit_log(&self, event: &str, detail: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let record = AuditLogRecord {
            event: event.to_string(),
            detail: detail.to_string(),
            recorded_at: Utc::now(),
        };
        with_db_timeout(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Store(format!("begin write: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(AUDIT_LOG_TABLE)
                    .map_err(|e| Error::Store(format!("open audit_log: {e}")))?;
                // The write transaction serializes this read-then-insert, so
                // len() is a safe monotonic sequence number.
                let seq = table
                    .len()
                    .map_err(|e| Error::Store(format!("len audit_log: {e}")))?;
                let key = format!("{seq:020}");
                let value = encode(&record)?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(|e| Error::Store(format!("insert audit_log: {e}")))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::Store(format!("commit: {e}")))?;
            Ok(())
        })
        .await
    }
}

fn feedback_key(query_hash: u64, fact_id: Uuid) -> String {
    format!("{query_hash:020}{SEP}{fact_id}")
}

fn expansion_key(query_normalized: &str, created_at: DateTime<Utc>, variant: &str) -> String {
    format!("{query_normalized}{SEP}{}{SEP}{variant}", created_at.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn temp_storage() -> (RedbStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("learned.redb");
        let storage = RedbStorage::new(&path).await.expect("open storage");
        (storage, dir)
    }

    #[tokio::test]
    async fn cache_entry_round_trips() {
        let (storage, _dir) = temp_storage().await;
        let entry = QueryCacheEntry {
            normalized_query: "what database do we use".to_string(),
            fact_ids: vec![Uuid::new_v4()],
            fact_counts: std::collections::HashMap::new(),
            success_count: 3,
            last_success_at: Utc::now(),
        };
        storage.put_cache_entry(&entry).await.expect("put");
        let fetched = storage
            .get_cache_entry(&entry.normalized_query)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(fetched.fact_ids, entry.fact_ids);
    }

    #[tokio::test]
    async fn invalidate_path_drops_matching_entries_only() {
        let (storage, _dir) = temp_storage().await;
        let target = Uuid::new_v4();
        let other = Uuid::new_v4();

        storage
            .put_cache_entry(&QueryCacheEntry {
                normalized_query: "query a".to_string(),
                fact_ids: vec![target],
                fact_counts: std::collections::HashMap::new(),
                success_count: 3,
                last_success_at: Utc::now(),
            })
            .await
            .expect("put a");
        storage
            .put_cache_entry(&QueryCacheEntry {
                normalized_query: "query b".to_string(),
                fact_ids: vec![other],
                fact_counts: std::collections::HashMap::new(),
                success_count: 3,
                last_success_at: Utc::now(),
            })
            .await
            .expect("put b");

        storage.invalidate_path(target).await.expect("invalidate");

        assert!(storage.get_cache_entry("query a").await.expect("get a").is_none());
        assert!(storage.get_cache_entry("query b").await.expect("get b").is_some());
    }

    #[tokio::test]
    async fn learned_expansions_are_capped_and_ordered_most_recent_first() {
        let (storage, _dir) = temp_storage().await;
        let query = "deploy the service";
        for i in 0..5 {
            let expansion = LearnedExpansion {
                query_normalized: query.to_string(),
                variant: format!("variant {i}"),
                created_at: Utc::now() + chrono::Duration::seconds(i),
            };
            storage.put_learned_expansion(&expansion, 3).await.expect("put expansion");
        }

        let expansions = storage.learned_expansions(query).await.expect("list");
        assert_eq!(expansions.len(), 3);
        assert_eq!(expansions[0].variant, "variant 4");
    }

    #[tokio::test]
    async fn fact_anchors_for_pattern_returns_all_matches() {
        let (storage, _dir) = temp_storage().await;
        let pattern = "on-call rotation";
        let anchor_a = FactAnchor {
            fact_id: Uuid::new_v4(),
            anchor_pattern: pattern.to_string(),
            source: memory_core::types::ExpansionSource::Manual,
            confidence: 0.9,
        };
        let anchor_b = FactAnchor {
            fact_id: Uuid::new_v4(),
            anchor_pattern: pattern.to_string(),
            source: memory_core::types::ExpansionSource::Learned,
            confidence: 0.7,
        };
        storage.put_fact_anchor(&anchor_a).await.expect("put a");
        storage.put_fact_anchor(&anchor_b).await.expect("put b");

        let anchors = storage.fact_anchors_for(pattern).await.expect("query");
        assert_eq!(anchors.len(), 2);
    }

    #[tokio::test]
    async fn feedback_weight_round_trips() {
        let (storage, _dir) = temp_storage().await;
        let weight = FeedbackWeight {
            query_hash: 42,
            fact_id: Uuid::new_v4(),
            weight: 0.3,
            updated_at: Utc::now(),
        };
        storage.put_feedback_weight(&weight).await.expect("put");
        let fetched = storage
            .get_feedback_weight(weight.query_hash, weight.fact_id)
            .await
            .expect("get")
            .expect("present");
        assert!((fetched - weight.weight).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn append_audit_log_does_not_error() {
        let (storage, _dir) = temp_storage().await;
        storage
            .append_audit_log("cache_invalidated", "fact superseded")
            .await
            .expect("append");
    }
}
