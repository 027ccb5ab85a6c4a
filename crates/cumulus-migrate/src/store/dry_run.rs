//! Read-through store for dry runs.

use async_trait::async_trait;

use crate::error::Result;
use crate::record::{NaturalKey, PostgresCollectionRecord};
use crate::store::memory::MemoryCollectionStore;
use crate::store::CollectionStore;

/// Answers lookups from the real destination but never writes to it.
///
/// Inserts are staged in memory, so a record repeated within one dry run is
/// still reported as skipped. Without a destination every lookup starts from
/// an empty table.
pub struct DryRunStore<'a> {
    destination: Option<&'a dyn CollectionStore>,
    staged: MemoryCollectionStore,
}

impl<'a> DryRunStore<'a> {
    /// Wraps `destination` (if any) for a dry run.
    pub fn new(destination: Option<&'a dyn CollectionStore>) -> Self {
        Self {
            destination,
            staged: MemoryCollectionStore::new(),
        }
    }

    /// Number of rows the run would have inserted.
    pub async fn staged_len(&self) -> usize {
        self.staged.len().await
    }
}

#[async_trait]
impl CollectionStore for DryRunStore<'_> {
    fn store_type(&self) -> &'static str {
        "dry-run"
    }

    async fn find_by_natural_key(&self, key: &NaturalKey) -> Result<Option<i64>> {
        if let Some(id) = self.staged.find_by_natural_key(key).await? {
            return Ok(Some(id));
        }
        match self.destination {
            Some(destination) => destination.find_by_natural_key(key).await,
            None => Ok(None),
        }
    }

    async fn insert(&self, record: &PostgresCollectionRecord) -> Result<i64> {
        self.staged.insert(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::translate_collection;
    use chrono::Utc;
    use serde_json::json;

    fn row(name: &str) -> PostgresCollectionRecord {
        let record = json!({
            "name": name,
            "version": "006",
            "granuleId": "^.*$",
            "granuleIdExtraction": "(.*)",
            "sampleFileName": "sample.hdf",
            "files": []
        });
        translate_collection(record.as_object().unwrap(), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_dry_run_sees_existing_rows() {
        let destination = MemoryCollectionStore::new();
        destination.insert(&row("MOD09GQ")).await.unwrap();
        let store = DryRunStore::new(Some(&destination));

        let found = store
            .find_by_natural_key(&NaturalKey::new("MOD09GQ", "006"))
            .await
            .unwrap();

        assert_eq!(found, Some(1));
    }

    #[tokio::test]
    async fn test_dry_run_never_writes_destination() {
        let destination = MemoryCollectionStore::new();
        let store = DryRunStore::new(Some(&destination));

        store.insert(&row("MOD11A1")).await.unwrap();

        assert!(destination.is_empty().await);
        assert_eq!(store.staged_len().await, 1);
        assert!(store
            .find_by_natural_key(&NaturalKey::new("MOD11A1", "006"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_dry_run_without_destination() {
        let store = DryRunStore::new(None);
        store.insert(&row("a")).await.unwrap();

        assert!(store.insert(&row("a")).await.unwrap_err().is_already_migrated());
    }
}
