//! Collection translation: DynamoDB shape to PostgreSQL row.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::record::{
    ApiCollectionRecord, NaturalKey, PostgresCollectionRecord, SourceRecord,
};
use crate::store::CollectionStore;

/// Maps an API collection record onto a `collections` row.
///
/// Absent optional fields get their defaults: `duplicate_handling` is
/// `error`, `meta` is `{}`, `tags` is `[]`, and both timestamps are `now`.
///
/// # Errors
///
/// Returns [`Error::Translation`] for timestamps chrono cannot represent.
pub fn translate_api_collection(
    record: ApiCollectionRecord,
    now: DateTime<Utc>,
) -> Result<PostgresCollectionRecord> {
    let created_at = millis_or(record.created_at, "createdAt", now)?;
    let updated_at = millis_or(record.updated_at, "updatedAt", now)?;

    Ok(PostgresCollectionRecord {
        name: record.name,
        version: record.version,
        sample_file_name: record.sample_file_name,
        granule_id_validation_regex: record.granule_id,
        granule_id_extraction_regex: record.granule_id_extraction,
        files: Value::Array(record.files),
        process: record.process,
        url_path: record.url_path,
        duplicate_handling: record.duplicate_handling.unwrap_or_default(),
        report_to_ems: record.report_to_ems,
        ignore_files_config_for_discovery: record.ignore_files_config_for_discovery,
        meta: Value::Object(record.meta.unwrap_or_else(Map::new)),
        tags: record.tags.unwrap_or_default(),
        created_at,
        updated_at,
    })
}

/// Translates a raw source record.
///
/// # Errors
///
/// Returns [`Error::Translation`] if the record does not fit the allow-list.
pub fn translate_collection(
    record: &SourceRecord,
    now: DateTime<Utc>,
) -> Result<PostgresCollectionRecord> {
    translate_api_collection(ApiCollectionRecord::from_source(record)?, now)
}

fn millis_or(value: Option<i64>, field: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    match value {
        None => Ok(now),
        Some(ms) => DateTime::from_timestamp_millis(ms).ok_or_else(|| {
            Error::Translation(format!("{} value {} is out of range", field, ms))
        }),
    }
}

/// Migrates one collection record into `store`.
///
/// Returns the new row's `cumulus_id`. Performs exactly one insert on
/// success and none otherwise.
///
/// # Errors
///
/// - [`Error::RecordAlreadyMigrated`] if the natural key is already present.
/// - [`Error::Translation`] if the record cannot be mapped.
/// - Any store error from the lookup or insert.
pub async fn migrate_collection_record(
    record: &SourceRecord,
    store: &dyn CollectionStore,
    now: DateTime<Utc>,
) -> Result<i64> {
    let key = NaturalKey::from_record(record)?;

    if store.find_by_natural_key(&key).await?.is_some() {
        return Err(Error::RecordAlreadyMigrated(format!(
            "Collection {} was already migrated, skipping",
            key
        )));
    }

    let row = translate_collection(record, now)?;
    let cumulus_id = store.insert(&row).await?;
    debug!("Inserted collection {} as cumulus_id {}", key, cumulus_id);

    Ok(cumulus_id)
}
