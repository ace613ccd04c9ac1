use std::time::Duration;

use reqwest::{multipart, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{Attachment, Citation};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("backend unreachable: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("backend returned status {0}")]
    Status(StatusCode),
    #[error("malformed backend response: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("backend rejected the request: {0}")]
    Rejected(String),
    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[derive(Serialize)]
struct AskRequest<'a> {
    question: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AskResponse {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub sources: Option<Vec<Citation>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SummaryResponse {
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: Option<String>,
}

/// HTTP client for the retrieval/generation backend
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    upload_path: String,
}

impl BackendClient {
    /// Build a client whose requests give up after `timeout`.
    pub fn new(base_url: &str, upload_path: &str, timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GatewayError::Client)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            upload_path: normalize_path(upload_path),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn upload_url(&self) -> String {
        format!("{}{}", self.base_url, self.upload_path)
    }

    pub async fn ask(&self, question: &str) -> GatewayResult<AskResponse> {
        let url = format!("{}/ask", self.base_url);
        tracing::debug!(%url, "asking backend");

        let response = self
            .client
            .post(&url)
            .json(&AskRequest { question })
            .send()
            .await
            .map_err(GatewayError::Transport)?;

        decode(response).await
    }

    pub async fn upload_document(&self, attachment: &Attachment) -> GatewayResult<UploadResponse> {
        let url = self.upload_url();
        tracing::debug!(%url, name = %attachment.name, bytes = attachment.bytes.len(), "uploading document");

        // Shares the staged buffer; the body is streamed from it
        let part = multipart::Part::stream_with_length(attachment.bytes.clone(), attachment.bytes.len() as u64)
            .file_name(attachment.name.clone())
            .mime_str(&attachment.mime_type)
            .map_err(GatewayError::Transport)?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(GatewayError::Transport)?;

        let body: UploadResponse = decode(response).await?;
        // The backend reports rejected files with a 2xx and an `error` field
        if let Some(error) = body.error {
            return Err(GatewayError::Rejected(error));
        }
        Ok(body)
    }

    pub async fn summarize(&self) -> GatewayResult<SummaryResponse> {
        let url = format!("{}/summarize", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(GatewayError::Transport)?;

        decode(response).await
    }

    pub async fn health(&self) -> GatewayResult<HealthResponse> {
        let url = format!("{}/", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(GatewayError::Transport)?;

        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> GatewayResult<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(GatewayError::Status(status));
    }
    response.json().await.map_err(GatewayError::Decode)
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
