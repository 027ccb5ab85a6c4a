//! DynamoDB source connector.
//!
//! Scans a table page by page over the DynamoDB JSON API, signing every
//! request with SigV4. Works against AWS and against DynamoDB Local via
//! `endpoint`.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::connectors::common::{create_http_client, handle_aws_error, validate_url};
use crate::connectors::sigv4::{sign_post, Credentials, SigningParams};
use crate::connectors::{RecordPage, RecordSource};
use crate::error::{Error, Result};
use crate::record::RawRecord;

const CONTENT_TYPE: &str = "application/x-amz-json-1.0";
const TARGET_PREFIX: &str = "DynamoDB_20120810";

/// Configuration for a DynamoDB table scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamoDbConfig {
    /// Table holding the collection records.
    pub table: String,
    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Endpoint override, e.g. `http://localhost:8000` for DynamoDB Local.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Access key ID. Falls back to the environment in the CLI.
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Secret access key.
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Session token for temporary credentials.
    #[serde(default)]
    pub session_token: Option<String>,
    /// Use strongly consistent reads.
    #[serde(default)]
    pub consistent_read: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl DynamoDbConfig {
    /// Credentials from this config, if both key parts are set.
    pub fn credentials(&self) -> Option<Credentials> {
        Some(Credentials {
            access_key_id: self.access_key_id.clone()?,
            secret_access_key: self.secret_access_key.clone()?,
            session_token: self.session_token.clone(),
        })
    }

    /// Endpoint URL to call.
    pub fn endpoint_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://dynamodb.{}.amazonaws.com", self.region))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ScanRequest<'a> {
    table_name: &'a str,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    exclusive_start_key: Option<Value>,
    consistent_read: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ScanResponse {
    #[serde(default)]
    items: Vec<Value>,
    #[serde(default)]
    last_evaluated_key: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeTableRequest<'a> {
    table_name: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeTableResponse {
    table: TableDescription,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TableDescription {
    #[serde(default)]
    item_count: Option<u64>,
    #[serde(default)]
    table_status: Option<String>,
}

/// DynamoDB scan connector.
pub struct DynamoDbConnector {
    config: DynamoDbConfig,
    client: Client,
    endpoint: Url,
    host: String,
    credentials: Option<Credentials>,
}

impl DynamoDbConnector {
    /// Creates a connector for the configured table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the endpoint is not a valid http(s) URL.
    pub fn new(config: DynamoDbConfig) -> Result<Self> {
        let endpoint_str = config.endpoint_url();
        validate_url(&endpoint_str)?;
        let endpoint = Url::parse(&endpoint_str)
            .map_err(|e| Error::Config(format!("Invalid endpoint '{}': {}", endpoint_str, e)))?;
        let host = Self::host_header(&endpoint)?;
        let credentials = config.credentials();

        Ok(Self {
            config,
            client: create_http_client(),
            endpoint,
            host,
            credentials,
        })
    }

    /// Host header value as reqwest will send it.
    fn host_header(url: &Url) -> Result<String> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::Config(format!("Endpoint '{}' has no host", url)))?;
        Ok(match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }

    /// Makes a signed call to a DynamoDB API action.
    async fn api_request<T: Serialize, R: DeserializeOwned>(
        &self,
        action: &str,
        body: &T,
    ) -> Result<R> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            Error::Authentication("No AWS credentials configured for DynamoDB".to_string())
        })?;

        let payload = serde_json::to_vec(body)?;
        let target = format!("{}.{}", TARGET_PREFIX, action);
        let signed = sign_post(
            credentials,
            &SigningParams {
                region: &self.config.region,
                service: "dynamodb",
                host: &self.host,
                content_type: CONTENT_TYPE,
                target: &target,
            },
            &payload,
            Utc::now(),
        )?;

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", CONTENT_TYPE)
            .header("X-Amz-Target", &target)
            .header("X-Amz-Date", &signed.amz_date)
            .header("Authorization", &signed.authorization);
        if let Some(token) = &signed.security_token {
            request = request.header("X-Amz-Security-Token", token);
        }

        let response = request.body(payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(handle_aws_error(
                status.as_u16(),
                &body,
                "DynamoDB",
                retry_after,
            ));
        }

        response.json().await.map_err(|e| {
            Error::Extraction(format!("Failed to parse DynamoDB {} response: {}", action, e))
        })
    }
}

#[async_trait]
impl RecordSource for DynamoDbConnector {
    fn source_type(&self) -> &'static str {
        "dynamodb"
    }

    async fn connect(&mut self) -> Result<()> {
        let response: DescribeTableResponse = self
            .api_request(
                "DescribeTable",
                &DescribeTableRequest {
                    table_name: &self.config.table,
                },
            )
            .await?;

        info!(
            "Connected to DynamoDB table '{}' (status {}, ~{} items)",
            self.config.table,
            response.table.table_status.as_deref().unwrap_or("unknown"),
            response
                .table
                .item_count
                .map_or("?".to_string(), |c| c.to_string())
        );
        Ok(())
    }

    async fn fetch_page(&self, start_key: Option<Value>, limit: usize) -> Result<RecordPage> {
        let request = ScanRequest {
            table_name: &self.config.table,
            limit,
            exclusive_start_key: start_key,
            consistent_read: self.config.consistent_read,
        };

        let response: ScanResponse = self.api_request("Scan", &request).await?;
        let records: Vec<RawRecord> = response
            .items
            .into_iter()
            .map(RawRecord::marshalled)
            .collect();

        debug!(
            "Scanned {} items from '{}' (more: {})",
            records.len(),
            self.config.table,
            response.last_evaluated_key.is_some()
        );

        Ok(RecordPage {
            records,
            next_key: response.last_evaluated_key,
        })
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "dynamodb_tests.rs"]
mod tests;
