//! Destination stores for migrated collections.

pub mod dry_run;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::record::{NaturalKey, PostgresCollectionRecord};

/// Default destination table.
pub const DEFAULT_TABLE: &str = "collections";

/// A relational-style store holding migrated collections.
///
/// The driver only ever needs two operations: a natural-key lookup and a
/// single-row insert.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Short name used in log lines.
    fn store_type(&self) -> &'static str;

    /// Returns the `cumulus_id` of the row with this natural key, if any.
    async fn find_by_natural_key(&self, key: &NaturalKey) -> Result<Option<i64>>;

    /// Inserts one row and returns its new `cumulus_id`.
    ///
    /// Implementations must reject a second row for the same natural key with
    /// [`Error::RecordAlreadyMigrated`].
    async fn insert(&self, record: &PostgresCollectionRecord) -> Result<i64>;
}

/// Validates a (optionally schema-qualified) SQL table name.
///
/// Table names are interpolated into statements, so only plain identifiers
/// are accepted.
pub fn validate_table_name(table: &str) -> Result<()> {
    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() > 2 {
        return Err(Error::Config(format!(
            "Table name '{}' has too many qualifiers",
            table
        )));
    }

    for part in parts {
        let mut chars = part.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_start || !valid_rest || part.len() > 63 {
            return Err(Error::Config(format!(
                "Invalid table name '{}': use letters, digits and underscores",
                table
            )));
        }
    }

    Ok(())
}
