//! HTTP client for the turnstile daemon.
//!
//! Mirrors the daemon's JSON wire types locally so callers do not pull in
//! the inference stack just to talk to a running instance.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("failed to read image file: {0}")]
    ImageRead(#[from] std::io::Error),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid base url: {0}")]
    BaseUrl(String),
}

/// Outcome of an identification attempt, as reported by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Report {
    pub outcome: Outcome,
    /// Kebab-case failure reason, absent on success.
    pub reason: Option<String>,
    pub confidence: Option<f32>,
    pub position: Option<String>,
    pub position_id: Option<String>,
    pub tolerance: f32,
    pub evidence_path: String,
    pub attempt: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerStatus {
    pub version: String,
    pub identities: usize,
    pub tolerance: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttemptRecord {
    pub id: String,
    pub count: u64,
    pub timestamps: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for one daemon instance.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// `base_url` is the daemon's root, e.g. `http://127.0.0.1:8777`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Identify the person in an image file against the claimed `id`.
    pub async fn identify_file(&self, id: &str, image: &Path) -> Result<Report, ClientError> {
        let bytes = std::fs::read(image)?;
        self.identify_bytes(id, &bytes).await
    }

    /// Identify the person in raw image bytes (any format the daemon can
    /// decode, e.g. JPEG or PNG) against the claimed `id`.
    pub async fn identify_bytes(&self, id: &str, image: &[u8]) -> Result<Report, ClientError> {
        debug!(id, bytes = image.len(), "sending identify request");
        let response = self
            .http
            .post(format!("{}/api/identify", self.base_url))
            .json(&serde_json::json!({
                "id": id,
                "image": BASE64.encode(image),
            }))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Fetch daemon version, registry size and tolerance.
    pub async fn status(&self) -> Result<ServerStatus, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/status", self.base_url))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Fetch the attempt history for an identity.
    pub async fn attempts(&self, id: &str) -> Result<AttemptRecord, ClientError> {
        let response = self.http.get(self.attempts_url(id)?).send().await?;
        Self::parse(response).await
    }

    /// Build the attempts URL with `id` percent-encoded as one path segment.
    fn attempts_url(&self, id: &str) -> Result<reqwest::Url, ClientError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ClientError::BaseUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| ClientError::BaseUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["api", "attempts", id]);
        Ok(url)
    }

    async fn parse<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| status.to_string());
        Err(ClientError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
