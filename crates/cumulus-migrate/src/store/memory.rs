//! In-memory collection store, used for dry runs and tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::record::{NaturalKey, PostgresCollectionRecord};
use crate::store::CollectionStore;

#[derive(Debug, Default)]
struct Rows {
    next_id: i64,
    by_key: BTreeMap<NaturalKey, (i64, PostgresCollectionRecord)>,
}

/// Collection store backed by an ordered map.
///
/// Enforces the same `(name, version)` uniqueness as the PostgreSQL table.
#[derive(Debug, Default)]
pub struct MemoryCollectionStore {
    rows: Mutex<Rows>,
}

impl MemoryCollectionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.rows.lock().await.by_key.len()
    }

    /// True when no rows are stored.
    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.by_key.is_empty()
    }

    /// Returns a copy of the row stored under `key`.
    pub async fn get(&self, key: &NaturalKey) -> Option<(i64, PostgresCollectionRecord)> {
        self.rows.lock().await.by_key.get(key).cloned()
    }

    /// Returns all rows ordered by natural key.
    pub async fn rows(&self) -> Vec<(i64, PostgresCollectionRecord)> {
        self.rows.lock().await.by_key.values().cloned().collect()
    }
}

#[async_trait]
impl CollectionStore for MemoryCollectionStore {
    fn store_type(&self) -> &'static str {
        "memory"
    }

    async fn find_by_natural_key(&self, key: &NaturalKey) -> Result<Option<i64>> {
        Ok(self.rows.lock().await.by_key.get(key).map(|(id, _)| *id))
    }

    async fn insert(&self, record: &PostgresCollectionRecord) -> Result<i64> {
        let mut rows = self.rows.lock().await;
        let key = record.natural_key();
        if rows.by_key.contains_key(&key) {
            return Err(Error::RecordAlreadyMigrated(format!(
                "Collection {} was already migrated, skipping",
                key
            )));
        }

        rows.next_id += 1;
        let id = rows.next_id;
        rows.by_key.insert(key, (id, record.clone()));
        Ok(id)
    }
}
