//! JSON file connector for exported collection tables.
//!
//! Accepts a plain JSON array of records, the output of
//! `aws dynamodb scan` (`{"Items": [...]}`), or any nested array addressed by
//! `array_path`. Items may be plain JSON or DynamoDB attribute values.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::info;

use crate::connectors::attribute_value::looks_marshalled;
use crate::connectors::common::MAX_FILE_SIZE;
use crate::connectors::{RecordPage, RecordSource};
use crate::error::{Error, Result};
use crate::record::{ItemEncoding, RawRecord};

/// Encoding of the items in the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFormat {
    /// Decide per item.
    #[default]
    Auto,
    /// Items are plain JSON objects.
    Plain,
    /// Items use DynamoDB attribute-value encoding.
    Dynamodb,
}

/// Configuration for JSON file import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonFileConfig {
    /// Path to the JSON file.
    pub path: PathBuf,
    /// Dotted path to the records array; empty means the root array or a
    /// top-level `Items` array.
    #[serde(default)]
    pub array_path: String,
    /// Item encoding.
    #[serde(default)]
    pub format: RecordFormat,
}

/// JSON file connector.
pub struct JsonFileConnector {
    config: JsonFileConfig,
    data: Vec<Value>,
    connected: bool,
}

impl JsonFileConnector {
    /// Creates a new JSON file connector.
    #[must_use]
    pub fn new(config: JsonFileConfig) -> Self {
        Self {
            config,
            data: Vec::new(),
            connected: false,
        }
    }

    /// Extracts the records array from JSON using the configured path.
    fn extract_array(&self, root: Value) -> Result<Vec<Value>> {
        if self.config.array_path.is_empty() {
            return match root {
                Value::Array(arr) => Ok(arr),
                Value::Object(mut map) => match map.remove("Items") {
                    Some(Value::Array(arr)) => Ok(arr),
                    _ => Err(Error::Extraction(
                        "Root JSON is neither an array nor a scan dump with 'Items'. Specify array_path."
                            .to_string(),
                    )),
                },
                _ => Err(Error::Extraction(
                    "Root JSON is not an array. Specify array_path.".to_string(),
                )),
            };
        }

        let mut current = root;
        for part in self.config.array_path.split('.') {
            current = current
                .get(part)
                .cloned()
                .ok_or_else(|| Error::Extraction(format!("Path '{}' not found", part)))?;
        }
        match current {
            Value::Array(arr) => Ok(arr),
            _ => Err(Error::Extraction(format!(
                "Path '{}' is not an array",
                self.config.array_path
            ))),
        }
    }

    /// Tags one item with its encoding. Decoding is left to the driver.
    fn to_raw(&self, item: &Value) -> RawRecord {
        let encoding = match (self.config.format, item) {
            (RecordFormat::Dynamodb, _) => ItemEncoding::AttributeValue,
            (RecordFormat::Auto, Value::Object(map)) if looks_marshalled(map) => {
                ItemEncoding::AttributeValue
            }
            _ => ItemEncoding::Plain,
        };
        RawRecord::new(item.clone(), encoding)
    }
}

#[async_trait]
impl RecordSource for JsonFileConnector {
    fn source_type(&self) -> &'static str {
        "json_file"
    }

    async fn connect(&mut self) -> Result<()> {
        let file = File::open(&self.config.path).map_err(|e| {
            Error::SourceConnection(format!(
                "Failed to open JSON file '{}': {}",
                self.config.path.display(),
                e
            ))
        })?;

        let size = file.metadata()?.len();
        if size > MAX_FILE_SIZE {
            return Err(Error::SourceConnection(format!(
                "JSON file '{}' is {} bytes, limit is {}",
                self.config.path.display(),
                size,
                MAX_FILE_SIZE
            )));
        }

        let root: Value = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Extraction(format!("Failed to parse JSON: {}", e)))?;

        self.data = self.extract_array(root)?;
        self.connected = true;

        info!(
            "Loaded {} records from '{}'",
            self.data.len(),
            self.config.path.display()
        );
        Ok(())
    }

    async fn fetch_page(&self, start_key: Option<Value>, limit: usize) -> Result<RecordPage> {
        if !self.connected {
            return Err(Error::SourceConnection("Not connected".to_string()));
        }

        let start = match start_key {
            None => 0,
            Some(v) => v
                .as_u64()
                .map(|v| v as usize)
                .ok_or_else(|| Error::Extraction(format!("Invalid page key {}", v)))?,
        };
        let start = start.min(self.data.len());
        let end = (start + limit).min(self.data.len());

        let records = self.data[start..end]
            .iter()
            .map(|item| self.to_raw(item))
            .collect();

        Ok(RecordPage {
            records,
            next_key: if end < self.data.len() {
                Some(serde_json::json!(end))
            } else {
                None
            },
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.data.clear();
        self.connected = false;
        Ok(())
    }
}

#[cfg(test)]
#[path = "json_file_tests.rs"]
mod tests;
