//! Tests for the JSON file connector.

use super::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn config_for(file: &NamedTempFile) -> JsonFileConfig {
    JsonFileConfig {
        path: file.path().to_path_buf(),
        array_path: String::new(),
        format: RecordFormat::Auto,
    }
}

#[tokio::test]
async fn test_json_connector_plain_array() {
    let file = write_file(
        r#"[
        {"name": "MOD09GQ", "version": "006", "tags": ["a"]},
        {"name": "MOD11A1", "version": "006"}
    ]"#,
    );

    let mut connector = JsonFileConnector::new(config_for(&file));
    connector.connect().await.unwrap();
    let page = connector.fetch_page(None, 10).await.unwrap();

    assert_eq!(page.records.len(), 2);
    let first = page.records[0].decode().unwrap();
    assert_eq!(first["name"], "MOD09GQ");
    assert_eq!(first["tags"], serde_json::json!(["a"]));
    assert!(!page.has_more());
}

#[tokio::test]
async fn test_json_connector_scan_dump() {
    let file = write_file(
        r#"{"Items": [
        {"name": {"S": "MOD09GQ"}, "version": {"S": "006"}, "createdAt": {"N": "1600000000000"}}
    ], "Count": 1, "ScannedCount": 1}"#,
    );

    let mut connector = JsonFileConnector::new(config_for(&file));
    connector.connect().await.unwrap();
    let page = connector.fetch_page(None, 10).await.unwrap();

    assert_eq!(page.records[0].encoding(), ItemEncoding::AttributeValue);
    let record = page.records[0].decode().unwrap();
    assert_eq!(record["name"], "MOD09GQ");
    assert_eq!(record["createdAt"], 1_600_000_000_000_i64);
}

#[tokio::test]
async fn test_json_connector_defers_bad_items_to_decode() {
    let file = write_file(
        r#"{"Items": [
        {"name": {"S": "a"}, "version": {"S": "1"}},
        {"name": {"S": "b"}, "version": {"S": "1"}, "createdAt": {"N": "bad-value"}},
        42
    ]}"#,
    );
    let mut config = config_for(&file);
    config.format = RecordFormat::Dynamodb;

    let mut connector = JsonFileConnector::new(config);
    connector.connect().await.unwrap();
    let page = connector.fetch_page(None, 10).await.unwrap();

    assert_eq!(page.records.len(), 3);
    assert!(page.records[0].decode().is_ok());
    assert!(matches!(page.records[1].decode(), Err(Error::Translation(_))));
    assert!(matches!(page.records[2].decode(), Err(Error::Translation(_))));
}

#[tokio::test]
async fn test_json_connector_nested_path() {
    let file = write_file(r#"{"export": {"collections": [{"name": "a", "version": "1"}]}}"#);
    let mut config = config_for(&file);
    config.array_path = "export.collections".to_string();

    let mut connector = JsonFileConnector::new(config);
    connector.connect().await.unwrap();
    let page = connector.fetch_page(None, 10).await.unwrap();

    assert_eq!(page.records.len(), 1);
}

#[tokio::test]
async fn test_json_connector_forced_plain_format() {
    let file = write_file(r#"[{"name": {"S": "literal"}}]"#);
    let mut config = config_for(&file);
    config.format = RecordFormat::Plain;

    let mut connector = JsonFileConnector::new(config);
    connector.connect().await.unwrap();
    let page = connector.fetch_page(None, 10).await.unwrap();

    assert_eq!(page.records[0].encoding(), ItemEncoding::Plain);
    assert_eq!(
        page.records[0].decode().unwrap()["name"],
        serde_json::json!({"S": "literal"})
    );
}

#[tokio::test]
async fn test_json_connector_pagination() {
    let items: Vec<_> = (0..25)
        .map(|i| serde_json::json!({"name": format!("c{}", i), "version": "1"}))
        .collect();
    let file = write_file(&serde_json::to_string(&items).unwrap());

    let mut connector = JsonFileConnector::new(config_for(&file));
    connector.connect().await.unwrap();

    let first = connector.fetch_page(None, 10).await.unwrap();
    assert_eq!(first.records.len(), 10);
    assert_eq!(first.next_key, Some(serde_json::json!(10)));

    let second = connector.fetch_page(first.next_key, 10).await.unwrap();
    let third = connector.fetch_page(second.next_key, 10).await.unwrap();
    assert_eq!(third.records.len(), 5);
    assert_eq!(third.records[0].key_field("name"), Some(&serde_json::json!("c20")));
    assert!(!third.has_more());
}

#[tokio::test]
async fn test_json_connector_requires_connect() {
    let file = write_file("[]");
    let connector = JsonFileConnector::new(config_for(&file));

    let result = connector.fetch_page(None, 10).await;
    assert!(matches!(result, Err(Error::SourceConnection(_))));
}

#[tokio::test]
async fn test_json_connector_invalid_json() {
    let file = write_file("not valid json");

    let mut connector = JsonFileConnector::new(config_for(&file));
    let result = connector.connect().await;

    assert!(matches!(result, Err(Error::Extraction(_))));
}

#[tokio::test]
async fn test_json_connector_missing_file() {
    let config = JsonFileConfig {
        path: PathBuf::from("/nonexistent/collections.json"),
        array_path: String::new(),
        format: RecordFormat::Auto,
    };

    let mut connector = JsonFileConnector::new(config);
    assert!(matches!(
        connector.connect().await,
        Err(Error::SourceConnection(_))
    ));
}
