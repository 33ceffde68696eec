//! Google Drive upload of finished backup files.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};

use super::BackupError;
use crate::config::DriveCredentials;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Metadata of an uploaded file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub web_view_link: Option<String>,
}

/// Destination for backup files beyond the local directory.
#[async_trait]
pub trait BackupUploader: Send + Sync {
    async fn upload(&self, path: &Path, filename: &str) -> Result<UploadedFile, BackupError>;
}

/// Google endpoints, overridable for tests.
#[derive(Debug, Clone)]
pub struct DriveEndpoints {
    pub token_url: String,
    pub upload_url: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            upload_url: "https://www.googleapis.com/upload/drive/v3/files".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct GoogleDriveUploader {
    client: Client,
    credentials: DriveCredentials,
    folder_id: Option<String>,
    endpoints: DriveEndpoints,
}

impl GoogleDriveUploader {
    pub fn new(
        credentials: DriveCredentials,
        folder_id: Option<String>,
        endpoints: DriveEndpoints,
    ) -> Result<Self, BackupError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            credentials,
            folder_id,
            endpoints,
        })
    }

    /// Exchange the refresh token for a short-lived access token.
    async fn access_token(&self) -> Result<String, BackupError> {
        let response = self
            .client
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;
        let token: TokenResponse = check(response, "token refresh").await?.json().await?;
        Ok(token.access_token)
    }
}

async fn check(response: Response, step: &str) -> Result<Response, BackupError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(step, status = status.as_u16(), body = %body, "Drive request rejected");
    Err(BackupError::Drive(format!("{} failed with status {}", step, status)))
}

/// A `multipart/related` body: JSON metadata first, then the file contents.
fn related_body(boundary: &str, metadata: &Value, media: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(media.len() + 512);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Type: application/json\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(media);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[async_trait]
impl BackupUploader for GoogleDriveUploader {
    async fn upload(&self, path: &Path, filename: &str) -> Result<UploadedFile, BackupError> {
        let bytes = tokio::fs::read(path).await?;
        let token = self.access_token().await?;

        // Drive files have a single parent, so the folder is set on creation.
        let mut metadata = json!({ "name": filename });
        if let Some(folder) = &self.folder_id {
            metadata["parents"] = json!([folder]);
        }
        let boundary = format!("backup-{}", uuid::Uuid::new_v4().simple());

        let response = self
            .client
            .post(&self.endpoints.upload_url)
            .query(&[
                ("uploadType", "multipart"),
                ("fields", "id,name,webViewLink"),
            ])
            .bearer_auth(&token)
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(related_body(&boundary, &metadata, &bytes))
            .send()
            .await?;
        let file: UploadedFile = check(response, "upload").await?.json().await?;

        tracing::info!(
            file_id = %file.id,
            name = file.name.as_deref().unwrap_or(filename),
            folder = self.folder_id.as_deref().unwrap_or("root"),
            link = file.web_view_link.as_deref().unwrap_or(""),
            "Uploaded backup to Google Drive"
        );
        Ok(file)
    }
}
