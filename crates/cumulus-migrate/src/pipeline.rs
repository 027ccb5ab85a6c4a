//! Migration pipeline orchestration.

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::config::MigrationConfig;
use crate::connectors::{create_source, RecordSource};
use crate::cursor::RecordCursor;
use crate::error::{Error, Result};
use crate::store::dry_run::DryRunStore;
use crate::store::CollectionStore;
use crate::translate::migrate_collection_record;

/// A record that could not be migrated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRecord {
    /// Collection name, if the record had one.
    pub name: Option<String>,
    /// Collection version, if the record had one.
    pub version: Option<String>,
    /// Error message.
    pub error: String,
}

/// Migration summary.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
    /// Records read from the source.
    pub dynamo_records: u64,
    /// Records inserted.
    pub success: u64,
    /// Records already present in the destination.
    pub skipped: u64,
    /// Records that failed decoding, translation or insertion.
    pub failed: u64,
    /// Details for each failed record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailedRecord>,
    /// Duration in seconds.
    #[serde(default)]
    pub duration_secs: f64,
}

impl MigrationSummary {
    /// Records per second over the whole run.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.dynamo_records as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}

/// Migrates every record the cursor yields into `store`.
///
/// Per-record failures are counted and logged; the loop continues. Errors
/// reading from the source abort the run and are returned unchanged.
///
/// # Errors
///
/// Returns the first source read error.
pub async fn migrate_collections(
    cursor: &mut RecordCursor,
    store: &dyn CollectionStore,
    progress: &ProgressBar,
) -> Result<MigrationSummary> {
    let mut summary = MigrationSummary::default();
    migrate_collections_into(cursor, store, progress, &mut summary).await?;
    Ok(summary)
}

/// Same as [`migrate_collections`], counting into `summary`.
///
/// On a source read error the counts and failures gathered so far stay in
/// `summary`.
///
/// # Errors
///
/// Returns the first source read error.
pub async fn migrate_collections_into(
    cursor: &mut RecordCursor,
    store: &dyn CollectionStore,
    progress: &ProgressBar,
    summary: &mut MigrationSummary,
) -> Result<()> {
    loop {
        let Some(raw) = cursor.peek().await? else {
            break;
        };
        summary.dynamo_records += 1;

        let outcome = match raw.decode() {
            Ok(record) => migrate_collection_record(&record, store, Utc::now()).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(_) => summary.success += 1,
            Err(err) if err.is_already_migrated() => {
                info!("{}", err);
                summary.skipped += 1;
            }
            Err(err) => {
                error!(
                    "Could not create collection record in PostgreSQL for collection {}: {}",
                    raw.describe_key(),
                    err
                );
                summary.failed += 1;
                summary.failures.push(FailedRecord {
                    name: string_field(raw.key_field("name")),
                    version: string_field(raw.key_field("version")),
                    error: err.to_string(),
                });
            }
        }

        progress.inc(1);
        cursor.advance().await?;
    }

    info!(
        "successfully migrated {} collection records",
        summary.success
    );
    Ok(())
}

fn string_field(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

/// Migration pipeline.
pub struct Pipeline {
    config: MigrationConfig,
}

impl Pipeline {
    /// Create a new migration pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: MigrationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Pipeline configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Run the migration pipeline.
    ///
    /// When a source read aborts the run, the failure report (if configured)
    /// still receives the failures collected up to that point.
    ///
    /// # Errors
    ///
    /// Returns an error if the source or destination cannot be opened, a
    /// source page cannot be read, or the failure report cannot be written.
    pub async fn run(&mut self) -> Result<MigrationSummary> {
        info!(
            "Starting collection migration from {} source",
            self.config.source.type_name()
        );

        let source = create_source(&self.config.source)?;
        self.run_with_source(source).await
    }

    async fn run_with_source(&self, mut source: Box<dyn RecordSource>) -> Result<MigrationSummary> {
        let start = Instant::now();
        let options = &self.config.options;

        source.connect().await?;
        let mut cursor = RecordCursor::new(source, options.page_size);
        let progress = create_progress_bar(options.show_progress);
        let mut summary = MigrationSummary::default();

        let result = self.migrate(&mut cursor, &progress, &mut summary).await;

        progress.finish_and_clear();
        if let Err(e) = cursor.close().await {
            warn!(
                "Failed to close {} source: {}",
                self.config.source.type_name(),
                e
            );
        }
        summary.duration_secs = start.elapsed().as_secs_f64();

        if let Err(err) = result {
            error!(
                "Migration aborted after {} records ({} migrated, {} skipped, {} failed): {}",
                summary.dynamo_records, summary.success, summary.skipped, summary.failed, err
            );
            if let Some(path) = &options.failure_report {
                if let Err(report_err) = write_failure_report(path, &summary) {
                    warn!("{}", report_err);
                }
            }
            return Err(err);
        }

        if let Some(path) = &options.failure_report {
            write_failure_report(path, &summary)?;
        }

        info!(
            "Migration complete: {} records, {} migrated, {} skipped, {} failed in {:.2}s",
            summary.dynamo_records,
            summary.success,
            summary.skipped,
            summary.failed,
            summary.duration_secs
        );

        Ok(summary)
    }

    /// Opens the destination and drives the cursor into it. A dry run reads
    /// existing rows from the destination when one is configured and stages
    /// its inserts in memory.
    #[cfg(feature = "postgres")]
    async fn migrate(
        &self,
        cursor: &mut RecordCursor,
        progress: &ProgressBar,
        summary: &mut MigrationSummary,
    ) -> Result<()> {
        let destination = &self.config.destination;
        let dry_run = self.config.options.dry_run;

        let database = match destination.database_url.as_deref() {
            Some(url) if !url.is_empty() => Some(self.open_database(url, !dry_run).await?),
            _ if dry_run => None,
            _ => {
                return Err(Error::Config(
                    "destination database_url is not set".to_string(),
                ))
            }
        };

        let result = match &database {
            Some(store) if !dry_run => migrate_collections_into(cursor, store, progress, summary).await,
            existing => {
                info!(
                    "Dry run mode - not writing to destination{}",
                    if existing.is_some() {
                        " (existing rows are still checked)"
                    } else {
                        ""
                    }
                );
                let store = DryRunStore::new(
                    existing
                        .as_ref()
                        .map(|store| store as &dyn CollectionStore),
                );
                migrate_collections_into(cursor, &store, progress, summary).await
            }
        };

        if let Some(store) = &database {
            store.close().await;
        }
        result
    }

    #[cfg(feature = "postgres")]
    async fn open_database(
        &self,
        url: &str,
        writable: bool,
    ) -> Result<crate::store::postgres::PgCollectionStore> {
        use crate::retry::RetryConfig;
        use crate::store::postgres::PgCollectionStore;

        let destination = &self.config.destination;
        let store = PgCollectionStore::connect(
            url,
            &destination.table,
            destination.max_connections,
            &RetryConfig::default(),
        )
        .await?;

        if writable && destination.ensure_schema {
            if let Err(e) = store.ensure_schema().await {
                store.close().await;
                return Err(e);
            }
        }
        Ok(store)
    }

    #[cfg(not(feature = "postgres"))]
    async fn migrate(
        &self,
        cursor: &mut RecordCursor,
        progress: &ProgressBar,
        summary: &mut MigrationSummary,
    ) -> Result<()> {
        if !self.config.options.dry_run {
            return Err(Error::Config(
                "built without the 'postgres' feature; use dry_run".to_string(),
            ));
        }
        if self.config.destination.database_url.is_some() {
            warn!("Built without the 'postgres' feature; existing rows are not checked");
        }

        info!("Dry run mode - not writing to destination");
        let store = DryRunStore::new(None);
        migrate_collections_into(cursor, &store, progress, summary).await
    }
}

/// Writes the failed records of `summary` to `path` as a JSON array.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_failure_report(path: &Path, summary: &MigrationSummary) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        Error::Config(format!(
            "Failed to create failure report '{}': {}",
            path.display(),
            e
        ))
    })?;
    serde_json::to_writer_pretty(BufWriter::new(file), &summary.failures)?;

    if summary.failures.is_empty() {
        info!("No failed records, wrote empty report to '{}'", path.display());
    } else {
        warn!(
            "Wrote {} failed records to '{}'",
            summary.failures.len(),
            path.display()
        );
    }
    Ok(())
}

fn create_progress_bar(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} collection records ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb
}
