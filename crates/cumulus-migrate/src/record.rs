//! Collection record shapes on both sides of the migration.
//!
//! The source side is a loosely typed JSON object as stored in DynamoDB.
//! [`ApiCollectionRecord`] is the explicit allow-list of fields we carry over;
//! anything not named there is dropped during deserialization.
//! [`PostgresCollectionRecord`] is one row of the `collections` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::connectors::attribute_value::unmarshal_item;
use crate::error::{Error, Result};

/// A record as read from the source store, decoded to plain JSON.
pub type SourceRecord = Map<String, Value>;

/// How the values of a raw item are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemEncoding {
    /// Plain JSON values.
    Plain,
    /// DynamoDB attribute values such as `{"S": "MOD09GQ"}`.
    AttributeValue,
}

/// One item exactly as a source page delivered it.
///
/// Pages carry raw items and the driver decodes them one at a time, so a
/// malformed item fails on its own and the rest of its page still migrates.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    item: Value,
    encoding: ItemEncoding,
}

impl RawRecord {
    /// Wraps an item with the given encoding.
    pub fn new(item: Value, encoding: ItemEncoding) -> Self {
        Self { item, encoding }
    }

    /// A plain JSON item.
    pub fn plain(item: Value) -> Self {
        Self::new(item, ItemEncoding::Plain)
    }

    /// An item in DynamoDB attribute-value encoding.
    pub fn marshalled(item: Value) -> Self {
        Self::new(item, ItemEncoding::AttributeValue)
    }

    /// Encoding of this item.
    pub fn encoding(&self) -> ItemEncoding {
        self.encoding
    }

    /// The undecoded item.
    pub fn item(&self) -> &Value {
        &self.item
    }

    /// Decodes the item into a plain source record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Translation`] when the item is not a JSON object or
    /// one of its attribute values cannot be decoded.
    pub fn decode(&self) -> Result<SourceRecord> {
        let map = self.item.as_object().ok_or_else(|| {
            Error::Translation(format!(
                "Collection record is not a JSON object: {}",
                self.item
            ))
        })?;

        match self.encoding {
            ItemEncoding::Plain => Ok(map.clone()),
            ItemEncoding::AttributeValue => unmarshal_item(map).map_err(|e| match e {
                Error::Extraction(msg) => Error::Translation(format!(
                    "Invalid collection record ({}): {}",
                    self.describe_key(),
                    msg
                )),
                other => other,
            }),
        }
    }

    /// Best-effort read of a key field without decoding the whole item.
    /// String attribute values (`{"S": ...}`) are unwrapped.
    pub fn key_field(&self, field: &str) -> Option<&Value> {
        let value = self.item.get(field)?;
        match self.encoding {
            ItemEncoding::Plain => Some(value),
            ItemEncoding::AttributeValue => value.get("S").or(Some(value)),
        }
    }

    /// Key description for log lines, tolerant of malformed items.
    pub fn describe_key(&self) -> String {
        format!(
            "name {}, version {}",
            show_key_field(self.key_field("name")),
            show_key_field(self.key_field("version"))
        )
    }
}

impl From<SourceRecord> for RawRecord {
    fn from(record: SourceRecord) -> Self {
        Self::plain(Value::Object(record))
    }
}

/// Natural key of a collection: `(name, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    /// Collection short name registered with the CMR.
    pub name: String,
    /// Collection version registered with the CMR.
    pub version: String,
}

impl NaturalKey {
    /// Creates a key from its parts.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Reads the natural key out of a source record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Translation`] when `name` or `version` is missing or
    /// not a string.
    pub fn from_record(record: &SourceRecord) -> Result<Self> {
        let field = |key: &str| -> Result<String> {
            match record.get(key) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(other) => Err(Error::Translation(format!(
                    "Collection field '{}' must be a string, got {}",
                    key, other
                ))),
                None => Err(Error::Translation(format!(
                    "Collection record is missing required field '{}'",
                    key
                ))),
            }
        };

        Ok(Self {
            name: field("name")?,
            version: field("version")?,
        })
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "name {}, version {}", self.name, self.version)
    }
}

/// Best-effort description of a record's key for log lines, including
/// records whose key fields are missing or malformed.
pub fn describe_key(record: &SourceRecord) -> String {
    format!(
        "name {}, version {}",
        show_key_field(record.get("name")),
        show_key_field(record.get("version"))
    )
}

fn show_key_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "<missing>".to_string(),
    }
}

/// How ingest treats a granule that already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateHandling {
    /// Fail the ingest (schema default).
    #[default]
    Error,
    /// Leave the existing granule alone.
    Skip,
    /// Overwrite the existing granule.
    Replace,
    /// Keep both, versioning the older copy.
    Version,
}

impl DuplicateHandling {
    /// Value stored in the `duplicate_handling` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Skip => "skip",
            Self::Replace => "replace",
            Self::Version => "version",
        }
    }
}

impl std::str::FromStr for DuplicateHandling {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "error" => Ok(Self::Error),
            "skip" => Ok(Self::Skip),
            "replace" => Ok(Self::Replace),
            "version" => Ok(Self::Version),
            other => Err(Error::Translation(format!(
                "Unknown duplicateHandling '{}'",
                other
            ))),
        }
    }
}

/// Collection record as the API (and DynamoDB) stores it, restricted to the
/// fields that survive migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCollectionRecord {
    /// Collection short name.
    pub name: String,
    /// Collection version.
    pub version: String,
    /// Granule ID validation regex.
    pub granule_id: String,
    /// Regex extracting the granule ID from a file name.
    pub granule_id_extraction: String,
    /// Example file name matched against the regexes.
    pub sample_file_name: String,
    /// File type definitions, carried through untouched.
    pub files: Vec<Value>,
    /// Workflow process name.
    pub process: Option<String>,
    /// Template for the archive path of granule files.
    #[serde(rename = "url_path")]
    pub url_path: Option<String>,
    /// Duplicate granule policy.
    pub duplicate_handling: Option<DuplicateHandling>,
    /// Whether granules are reported to EMS.
    pub report_to_ems: Option<bool>,
    /// Whether discovery ignores the `files` config.
    pub ignore_files_config_for_discovery: Option<bool>,
    /// Free-form metadata.
    pub meta: Option<Map<String, Value>>,
    /// Free-form tags.
    pub tags: Option<Vec<String>>,
    /// Epoch milliseconds.
    pub created_at: Option<i64>,
    /// Epoch milliseconds.
    pub updated_at: Option<i64>,
}

impl ApiCollectionRecord {
    /// Deserializes the allow-listed fields of a source record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Translation`] when a required field is missing or any
    /// recognised field has the wrong type.
    pub fn from_source(record: &SourceRecord) -> Result<Self> {
        serde_json::from_value(Value::Object(record.clone())).map_err(|e| {
            Error::Translation(format!(
                "Invalid collection record ({}): {}",
                describe_key(record),
                e
            ))
        })
    }

    /// Natural key of this record.
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.name, &self.version)
    }
}

/// One row of the `collections` table, minus the surrogate `cumulus_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostgresCollectionRecord {
    /// Collection short name.
    pub name: String,
    /// Collection version.
    pub version: String,
    /// Example file name.
    pub sample_file_name: String,
    /// From `granuleId`.
    pub granule_id_validation_regex: String,
    /// From `granuleIdExtraction`.
    pub granule_id_extraction_regex: String,
    /// JSONB array of file type definitions.
    pub files: Value,
    /// Workflow process name.
    pub process: Option<String>,
    /// Archive path template.
    pub url_path: Option<String>,
    /// Duplicate granule policy, `error` when the source had none.
    pub duplicate_handling: DuplicateHandling,
    /// Whether granules are reported to EMS.
    pub report_to_ems: Option<bool>,
    /// Whether discovery ignores the `files` config.
    pub ignore_files_config_for_discovery: Option<bool>,
    /// JSONB object, `{}` when the source had none.
    pub meta: Value,
    /// Tags, empty when the source had none.
    pub tags: Vec<String>,
    /// Creation time, migration time when the source had none.
    pub created_at: DateTime<Utc>,
    /// Last update time, migration time when the source had none.
    pub updated_at: DateTime<Utc>,
}

impl PostgresCollectionRecord {
    /// Natural key of this row.
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.name, &self.version)
    }
}
