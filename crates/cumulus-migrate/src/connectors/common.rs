//! Common utilities shared across connectors.
//!
//! HTTP client creation, URL validation, and mapping of AWS error responses.

use crate::error::{Error, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Default HTTP timeout for all connectors.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum file size for local imports (100MB).
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Wait suggested for a throttled request that carried no `Retry-After`.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Creates a configured HTTP client with timeout.
#[must_use]
pub fn create_http_client() -> Client {
    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Validates an endpoint URL.
pub fn validate_url(url: &str) -> Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::Config(format!(
            "Invalid URL scheme in '{}'. Allowed: http, https",
            url
        )));
    }

    if url.len() < 10 {
        return Err(Error::Config(format!("Invalid URL format: {}", url)));
    }

    Ok(())
}

/// Error type name from an AWS JSON error body.
///
/// `{"__type": "com.amazonaws.dynamodb.v20120810#ResourceNotFoundException"}`
/// yields `ResourceNotFoundException`.
pub fn aws_error_type(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let raw = parsed.get("__type")?.as_str()?;
    Some(raw.rsplit('#').next().unwrap_or(raw).to_string())
}

/// Maps an AWS error response to a connector error.
///
/// `retry_after` is the parsed `Retry-After` header, if the response had one.
pub fn handle_aws_error(
    status_code: u16,
    body: &str,
    source_name: &str,
    retry_after: Option<u64>,
) -> Error {
    let error_type = aws_error_type(body).unwrap_or_default();

    match (status_code, error_type.as_str()) {
        (_, "ProvisionedThroughputExceededException")
        | (_, "ThrottlingException")
        | (_, "RequestLimitExceeded")
        | (429, _) => Error::RateLimit(retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS)),
        (_, "UnrecognizedClientException")
        | (_, "InvalidSignatureException")
        | (_, "AccessDeniedException")
        | (_, "ExpiredTokenException")
        | (401, _)
        | (403, _) => Error::Authentication(format!("{} auth failed: {}", source_name, body)),
        _ => Error::SourceConnection(format!("{} error {}: {}", source_name, status_code, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aws_error_type() {
        let body = r#"{"__type":"com.amazonaws.dynamodb.v20120810#ResourceNotFoundException","message":"Requested resource not found"}"#;
        assert_eq!(
            aws_error_type(body).as_deref(),
            Some("ResourceNotFoundException")
        );
        assert_eq!(aws_error_type("not json"), None);
    }

    #[test]
    fn test_handle_aws_error_throttling() {
        let body = r#"{"__type":"com.amazonaws.dynamodb.v20120810#ProvisionedThroughputExceededException"}"#;
        assert!(matches!(
            handle_aws_error(400, body, "DynamoDB", None),
            Error::RateLimit(DEFAULT_RETRY_AFTER_SECS)
        ));
    }

    #[test]
    fn test_handle_aws_error_uses_retry_after() {
        assert!(matches!(
            handle_aws_error(429, "", "DynamoDB", Some(12)),
            Error::RateLimit(12)
        ));
    }

    #[test]
    fn test_handle_aws_error_auth() {
        let body = r#"{"__type":"com.amazon.coral.service#UnrecognizedClientException"}"#;
        assert!(matches!(
            handle_aws_error(400, body, "DynamoDB", None),
            Error::Authentication(_)
        ));
        assert!(matches!(
            handle_aws_error(403, "", "DynamoDB", None),
            Error::Authentication(_)
        ));
    }

    #[test]
    fn test_handle_aws_error_other() {
        let err = handle_aws_error(500, "internal error", "DynamoDB", None);
        assert!(matches!(err, Error::SourceConnection(_)));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("http://localhost:8000").is_ok());
        assert!(validate_url("https://dynamodb.us-east-1.amazonaws.com").is_ok());
        assert!(validate_url("ftp://files.example.com").is_err());
        assert!(validate_url("file:///etc/passwd").is_err());
    }
}
