//! Error types for cumulus-migrate.

use thiserror::Error;

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while migrating records.
#[derive(Error, Debug)]
pub enum Error {
    /// The destination already holds a record with the same natural key.
    ///
    /// Expected on re-runs; the driver counts it as skipped.
    #[error("{0}")]
    RecordAlreadyMigrated(String),

    /// A source record could not be mapped to the destination schema.
    #[error("Translation error: {0}")]
    Translation(String),

    /// Writing to the destination failed.
    #[error("Loading error: {0}")]
    Loading(String),

    /// Destination database error.
    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Could not open the destination store.
    #[error("Destination connection error: {0}")]
    DestinationConnection(String),

    /// Source store could not be reached or rejected the request.
    #[error("Source connection error: {0}")]
    SourceConnection(String),

    /// A page read from the source could not be decoded.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Source credentials were refused.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Source throttled the request; value is the suggested wait in seconds.
    #[error("Rate limited, retry after {0}s")]
    RateLimit(u64),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Returns true if this is the "already migrated" condition.
    #[must_use]
    pub fn is_already_migrated(&self) -> bool {
        matches!(self, Self::RecordAlreadyMigrated(_))
    }
}
