//! PostgreSQL collection store.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::record::{NaturalKey, PostgresCollectionRecord};
use crate::retry::{is_transient_sqlx_error, with_retry, RetryConfig};
use crate::store::{validate_table_name, CollectionStore};

/// Collection store writing to a PostgreSQL table.
#[derive(Debug, Clone)]
pub struct PgCollectionStore {
    pool: PgPool,
    table: String,
}

impl PgCollectionStore {
    /// Connects to `database_url`, retrying transient connection failures.
    ///
    /// # Errors
    ///
    /// Returns an error if the table name is invalid or the pool cannot be
    /// opened after retries. Transient failures surface as
    /// [`Error::Database`]; anything else (bad credentials, unknown database)
    /// as [`Error::DestinationConnection`].
    pub async fn connect(
        database_url: &str,
        table: &str,
        max_connections: u32,
        retry: &RetryConfig,
    ) -> Result<Self> {
        validate_table_name(table)?;

        let pool = with_retry(retry, "connect to PostgreSQL", || async move {
            PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(30))
                .connect(database_url)
                .await
                .map_err(|e| {
                    if is_transient_sqlx_error(&e) {
                        Error::Database(e)
                    } else {
                        Error::DestinationConnection(e.to_string())
                    }
                })
        })
        .await?;

        info!("Connected to PostgreSQL, writing to table '{}'", table);
        Self::from_pool(pool, table)
    }

    /// Wraps an existing pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the table name is invalid.
    pub fn from_pool(pool: PgPool, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    /// Destination table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the destination table and its natural-key constraint if they
    /// do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns a database error if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                cumulus_id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                sample_file_name TEXT NOT NULL,
                granule_id_validation_regex TEXT NOT NULL,
                granule_id_extraction_regex TEXT NOT NULL,
                files JSONB NOT NULL,
                process TEXT,
                url_path TEXT,
                duplicate_handling TEXT NOT NULL DEFAULT 'error'
                    CHECK (duplicate_handling IN ('error', 'skip', 'replace', 'version')),
                report_to_ems BOOLEAN,
                ignore_files_config_for_discovery BOOLEAN,
                meta JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                tags JSONB NOT NULL DEFAULT '[]'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (name, version)
            )
            "#,
            table = self.table
        );

        sqlx::query(&ddl).execute(&self.pool).await?;
        debug!("Ensured table '{}' exists", self.table);
        Ok(())
    }

    /// Number of rows in the destination table.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CollectionStore for PgCollectionStore {
    fn store_type(&self) -> &'static str {
        "postgres"
    }

    async fn find_by_natural_key(&self, key: &NaturalKey) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT cumulus_id FROM {} WHERE name = $1 AND version = $2",
            self.table
        );
        let id: Option<i64> = sqlx::query_scalar(&sql)
            .bind(&key.name)
            .bind(&key.version)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn insert(&self, record: &PostgresCollectionRecord) -> Result<i64> {
        let sql = format!(
            r#"
            INSERT INTO {} (
                name, version, sample_file_name,
                granule_id_validation_regex, granule_id_extraction_regex,
                files, process, url_path, duplicate_handling,
                report_to_ems, ignore_files_config_for_discovery,
                meta, tags, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING cumulus_id
            "#,
            self.table
        );

        let result = sqlx::query_scalar::<_, i64>(&sql)
            .bind(&record.name)
            .bind(&record.version)
            .bind(&record.sample_file_name)
            .bind(&record.granule_id_validation_regex)
            .bind(&record.granule_id_extraction_regex)
            .bind(Json(&record.files))
            .bind(&record.process)
            .bind(&record.url_path)
            .bind(record.duplicate_handling.as_str())
            .bind(record.report_to_ems)
            .bind(record.ignore_files_config_for_discovery)
            .bind(Json(&record.meta))
            .bind(Json(&record.tags))
            .bind(record.created_at)
            .bind(record.updated_at)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(id) => Ok(id),
            // Another writer got there between our lookup and insert.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(Error::RecordAlreadyMigrated(format!(
                    "Collection {} was already migrated, skipping",
                    record.natural_key()
                )))
            }
            Err(e) => Err(Error::Loading(format!(
                "Failed to insert collection {}: {}",
                record.natural_key(),
                e
            ))),
        }
    }
}
