//! DynamoDB attribute-value JSON to plain JSON.
//!
//! Items on the DynamoDB wire (and in `aws dynamodb scan` dumps) wrap every
//! value in a single-key type descriptor such as `{"S": "abc"}` or
//! `{"N": "42"}`. This module unwraps them the way the DocumentClient does.

use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};
use crate::record::SourceRecord;

const TYPE_TAGS: [&str; 10] = ["S", "N", "B", "BOOL", "NULL", "M", "L", "SS", "NS", "BS"];

/// Unmarshalls a full DynamoDB item into a source record.
///
/// # Errors
///
/// Returns [`Error::Extraction`] on an unknown descriptor or an unparsable
/// number, naming the attribute that failed.
pub fn unmarshal_item(item: &Map<String, Value>) -> Result<SourceRecord> {
    decode_map(item).map_err(Error::Extraction)
}

/// Unmarshalls one attribute value.
///
/// # Errors
///
/// Returns [`Error::Extraction`] on malformed input.
pub fn unmarshal_value(value: &Value) -> Result<Value> {
    decode_value(value).map_err(Error::Extraction)
}

fn decode_map(item: &Map<String, Value>) -> std::result::Result<SourceRecord, String> {
    item.iter()
        .map(|(key, value)| {
            decode_value(value)
                .map(|v| (key.clone(), v))
                .map_err(|e| format!("attribute '{}': {}", key, e))
        })
        .collect()
}

fn decode_value(value: &Value) -> std::result::Result<Value, String> {
    let obj = value
        .as_object()
        .filter(|o| o.len() == 1)
        .ok_or_else(|| format!("not an attribute value: {}", value))?;
    let (tag, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| "empty attribute value".to_string())?;

    match (tag.as_str(), inner) {
        ("S", Value::String(_)) | ("B", Value::String(_)) | ("BOOL", Value::Bool(_)) => {
            Ok(inner.clone())
        }
        ("NULL", _) => Ok(Value::Null),
        ("N", Value::String(n)) => parse_number(n),
        ("M", Value::Object(map)) => decode_map(map).map(Value::Object),
        ("L", Value::Array(items)) => items
            .iter()
            .map(decode_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Value::Array),
        ("SS", Value::Array(items)) | ("BS", Value::Array(items)) => Ok(Value::Array(items.clone())),
        ("NS", Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(n) => parse_number(n),
                other => Err(format!("NS member is not a string: {}", other)),
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Value::Array),
        (tag, inner) => Err(format!(
            "unsupported attribute value {{\"{}\": {}}}",
            tag, inner
        )),
    }
}

fn parse_number(n: &str) -> std::result::Result<Value, String> {
    if let Ok(i) = n.parse::<i64>() {
        return Ok(Value::Number(i.into()));
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| format!("invalid number '{}'", n))
}

/// Heuristic: does every field of `item` look like an attribute value?
pub fn looks_marshalled(item: &Map<String, Value>) -> bool {
    !item.is_empty()
        && item.values().all(|v| {
            v.as_object()
                .is_some_and(|o| o.len() == 1 && o.keys().all(|k| TYPE_TAGS.contains(&k.as_str())))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unmarshal_scalars() {
        assert_eq!(unmarshal_value(&json!({"S": "abc"})).unwrap(), json!("abc"));
        assert_eq!(unmarshal_value(&json!({"N": "42"})).unwrap(), json!(42));
        assert_eq!(unmarshal_value(&json!({"N": "-1.5"})).unwrap(), json!(-1.5));
        assert_eq!(unmarshal_value(&json!({"BOOL": false})).unwrap(), json!(false));
        assert_eq!(unmarshal_value(&json!({"NULL": true})).unwrap(), Value::Null);
    }

    #[test]
    fn test_unmarshal_large_timestamp_stays_integer() {
        let value = unmarshal_value(&json!({"N": "1700000000123"})).unwrap();
        assert_eq!(value.as_i64(), Some(1_700_000_000_123));
    }

    #[test]
    fn test_unmarshal_nested_collection_item() {
        let item = json!({
            "name": {"S": "MOD09GQ"},
            "version": {"S": "006"},
            "files": {"L": [{"M": {"regex": {"S": ".*"}, "bucket": {"S": "protected"}}}]},
            "meta": {"M": {"foo": {"S": "bar"}}},
            "tags": {"SS": ["a", "b"]},
            "createdAt": {"N": "1600000000000"}
        });

        let record = unmarshal_item(item.as_object().unwrap()).unwrap();

        assert_eq!(
            Value::Object(record),
            json!({
                "name": "MOD09GQ",
                "version": "006",
                "files": [{"regex": ".*", "bucket": "protected"}],
                "meta": {"foo": "bar"},
                "tags": ["a", "b"],
                "createdAt": 1_600_000_000_000_i64
            })
        );
    }

    #[test]
    fn test_unmarshal_number_set() {
        assert_eq!(
            unmarshal_value(&json!({"NS": ["1", "2.5"]})).unwrap(),
            json!([1, 2.5])
        );
    }

    #[test]
    fn test_unmarshal_rejects_bad_number() {
        let err = unmarshal_value(&json!({"N": "twelve"})).unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[test]
    fn test_unmarshal_rejects_unknown_tag() {
        assert!(unmarshal_value(&json!({"X": "1"})).is_err());
        assert!(unmarshal_value(&json!("plain")).is_err());
    }

    #[test]
    fn test_unmarshal_item_names_failing_attribute() {
        let item = json!({"createdAt": {"N": "soon"}});
        let err = unmarshal_item(item.as_object().unwrap()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Extraction error: attribute 'createdAt': invalid number 'soon'"
        );
    }

    #[test]
    fn test_unmarshal_nested_error_has_single_prefix() {
        let item = json!({"meta": {"M": {"size": {"N": "big"}}}});
        let err = unmarshal_item(item.as_object().unwrap()).unwrap_err();
        let message = err.to_string();

        assert_eq!(message.matches("Extraction error:").count(), 1);
        assert!(message.ends_with("attribute 'meta': attribute 'size': invalid number 'big'"));
    }

    #[test]
    fn test_looks_marshalled() {
        let marshalled = json!({"name": {"S": "a"}, "version": {"S": "1"}});
        let plain = json!({"name": "a", "meta": {"S": "not really"}});

        assert!(looks_marshalled(marshalled.as_object().unwrap()));
        assert!(!looks_marshalled(plain.as_object().unwrap()));
        assert!(!looks_marshalled(&Map::new()));
    }
}
