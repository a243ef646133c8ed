//! External AI service seams
//!
//! The pipeline talks to three collaborators through these traits: a vision
//! model for structure extraction, a text model for descriptions and an image
//! model that may answer asynchronously. Production implementations live in
//! `openai_client` and `replicate_client`; tests substitute fakes.

use async_trait::async_trait;
use thiserror::Error;

use crate::utils::Retryable;

/// Failure talking to an external service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{0} is not configured (missing API key)")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    /// Request accepted but the service reported it could not fulfil it
    #[error("Service reported failure: {0}")]
    Rejected(String),
}

impl Retryable for ServiceError {
    /// Timeouts, connection failures and HTTP 408/429/5xx
    fn is_transient(&self) -> bool {
        match self {
            ServiceError::Timeout(_) | ServiceError::Network(_) => true,
            ServiceError::Api { status, .. } => {
                matches!(*status, 408 | 429) || (500..=599).contains(status)
            }
            ServiceError::NotConfigured(_)
            | ServiceError::Parse(_)
            | ServiceError::Rejected(_) => false,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout(err.to_string())
        } else if err.is_decode() {
            ServiceError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            ServiceError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ServiceError::Network(err.to_string())
        }
    }
}

/// Image plus the instructions and output shape for structure extraction
#[derive(Debug, Clone)]
pub struct ExtractionRequest<'a> {
    pub image: &'a [u8],
    pub content_type: &'a str,
    pub instructions: &'a str,
    /// JSON Schema the response must conform to
    pub output_schema: &'a serde_json::Value,
}

/// Style/length constraints plus the subject for a text completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPrompt {
    pub system: String,
    pub user: String,
}

/// Opaque reference used to poll a pending image prediction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollHandle {
    pub id: String,
    /// Status URL returned by the service
    pub url: String,
}

/// Answer to an image submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSubmission {
    /// Image is ready; carries the image URL
    Ready(String),
    /// Generation continues asynchronously
    Pending(PollHandle),
}

/// Status of a pending image prediction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Queued,
    Processing,
    Succeeded(String),
    Failed(String),
}

/// Vision/LLM service returning the raw structured payload
#[async_trait]
pub trait VisionService: Send + Sync {
    async fn extract_structure(
        &self,
        request: &ExtractionRequest<'_>,
    ) -> Result<String, ServiceError>;
}

/// Text-generation service
#[async_trait]
pub trait TextService: Send + Sync {
    async fn complete(&self, prompt: &TextPrompt) -> Result<String, ServiceError>;
}

/// Image-generation service
#[async_trait]
pub trait ImageService: Send + Sync {
    async fn submit(&self, prompt: &str) -> Result<ImageSubmission, ServiceError>;

    async fn poll(&self, handle: &PollHandle) -> Result<PollStatus, ServiceError>;
}
