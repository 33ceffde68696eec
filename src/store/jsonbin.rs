//! HTTP client for a JSONBin-style document service.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{DocumentStore, StoreError};

/// Header carrying the store API key.
pub const API_KEY_HEADER: &str = "X-Master-Key";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct BinResponse {
    #[serde(default)]
    record: Value,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    metadata: CreateMetadata,
}

#[derive(Debug, Deserialize)]
struct CreateMetadata {
    id: String,
}

/// Document store backed by the JSONBin HTTP API.
#[derive(Clone)]
pub struct JsonBinStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl JsonBinStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn api_key(&self) -> Result<&str, StoreError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(StoreError::MissingApiKey)
    }

    fn bin_url(&self, bin_id: &str) -> String {
        format!("{}/b/{}", self.base_url, bin_id)
    }
}

/// Map a non-success response onto the store error taxonomy.
async fn check_status(response: Response, bin_id: &str) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(StoreError::RateLimited),
        StatusCode::NOT_FOUND => Err(StoreError::NotFound(bin_id.to_string())),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl DocumentStore for JsonBinStore {
    async fn fetch(&self, bin_id: &str) -> Result<Value, StoreError> {
        let started = Instant::now();
        let response = self
            .client
            .get(self.bin_url(bin_id))
            .header(API_KEY_HEADER, self.api_key()?)
            .send()
            .await?;
        let response = check_status(response, bin_id).await?;
        let body: BinResponse = response.json().await?;

        tracing::debug!(
            bin_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched bin"
        );
        Ok(body.record)
    }

    async fn put(&self, bin_id: &str, record: &Value) -> Result<(), StoreError> {
        let started = Instant::now();
        let response = self
            .client
            .put(self.bin_url(bin_id))
            .header(API_KEY_HEADER, self.api_key()?)
            .json(record)
            .send()
            .await?;
        check_status(response, bin_id).await?;

        tracing::debug!(
            bin_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Updated bin"
        );
        Ok(())
    }

    async fn create(&self, record: &Value) -> Result<String, StoreError> {
        let response = self
            .client
            .post(format!("{}/b", self.base_url))
            .header(API_KEY_HEADER, self.api_key()?)
            .json(record)
            .send()
            .await?;
        let response = check_status(response, "(new)").await?;
        let body: CreateResponse = response.json().await?;

        tracing::info!(bin_id = %body.metadata.id, "Created bin");
        Ok(body.metadata.id)
    }
}
