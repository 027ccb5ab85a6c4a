//! Source connectors for the legacy collection store.

pub mod attribute_value;
pub mod common;
pub mod dynamodb;
pub mod json_file;
pub mod sigv4;

use async_trait::async_trait;

use crate::error::Result;
use crate::record::RawRecord;

/// One page of records read from a source.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    /// Undecoded records in source order. May be empty even when more pages
    /// follow.
    pub records: Vec<RawRecord>,
    /// Opaque key to resume from; `None` once the collection is exhausted.
    pub next_key: Option<serde_json::Value>,
}

impl RecordPage {
    /// Whether the source has more pages after this one.
    pub fn has_more(&self) -> bool {
        self.next_key.is_some()
    }
}

/// Trait for paginated record sources.
///
/// Implement this trait to read collections from a new kind of store.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Get the source type name.
    fn source_type(&self) -> &'static str;

    /// Connect to the source and validate configuration.
    async fn connect(&mut self) -> Result<()>;

    /// Fetch up to `limit` records, resuming after `start_key`.
    ///
    /// `start_key` is `None` for the first page and otherwise the
    /// `next_key` of the previous page. Items are returned undecoded; only a
    /// failure of the page as a whole is an error here.
    async fn fetch_page(
        &self,
        start_key: Option<serde_json::Value>,
        limit: usize,
    ) -> Result<RecordPage>;

    /// Close the connection and cleanup resources.
    async fn close(&mut self) -> Result<()>;
}

/// Create a record source from configuration.
pub fn create_source(config: &crate::config::SourceConfig) -> Result<Box<dyn RecordSource>> {
    match config {
        crate::config::SourceConfig::DynamoDb(cfg) => {
            Ok(Box::new(dynamodb::DynamoDbConnector::new(cfg.clone())?))
        }
        crate::config::SourceConfig::JsonFile(cfg) => {
            Ok(Box::new(json_file::JsonFileConnector::new(cfg.clone())))
        }
    }
}
