//! Replicate predictions client (image service)
//!
//! Submissions ask the API to wait for the result (`Prefer: wait`). When the
//! prediction is not finished in that window the response carries a
//! `urls.get` status URL, which becomes the poll handle.

use async_trait::async_trait;
use menugen_common::config::ProviderConfig;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::services::providers::{
    ImageService, ImageSubmission, PollHandle, PollStatus, ServiceError,
};

const USER_AGENT: &str = concat!("menugen-ai/", env!("CARGO_PKG_VERSION"));
const SUBMIT_TIMEOUT_SECS: u64 = 60;
const POLL_TIMEOUT_SECS: u64 = 30;

/// Prediction object as returned by create and get
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: String,
    /// A single URL or a list of URLs depending on the model
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub urls: Option<PredictionUrls>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionUrls {
    pub get: Option<String>,
}

impl Prediction {
    fn first_output(&self) -> Option<String> {
        match self.output.as_ref()? {
            serde_json::Value::String(url) => Some(url.clone()),
            serde_json::Value::Array(items) => items
                .iter()
                .find_map(|item| item.as_str().map(String::from)),
            _ => None,
        }
    }

    fn error_message(&self) -> String {
        match &self.error {
            Some(serde_json::Value::String(message)) => message.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => format!("prediction {}", self.status),
        }
    }

    fn is_failed(&self) -> bool {
        matches!(self.status.as_str(), "failed" | "canceled" | "aborted")
    }
}

pub struct ReplicateClient {
    http_client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl ReplicateClient {
    /// Without an API key every call fails with `NotConfigured`
    pub fn new(api_key: Option<String>, providers: &ProviderConfig) -> Result<Self, ServiceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: providers.replicate_base_url.trim_end_matches('/').to_string(),
            model: providers.image_model.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str, ServiceError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ServiceError::NotConfigured("Replicate".to_string()))
    }

    async fn read_prediction(response: reqwest::Response) -> Result<Prediction, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ServiceError::Parse(e.to_string()))
    }
}

/// Create-prediction body for a square webp food photo
pub fn build_prediction_request(prompt: &str) -> serde_json::Value {
    json!({
        "input": {
            "prompt": prompt,
            "aspect_ratio": "1:1",
            "num_outputs": 1,
            "num_inference_steps": 28,
            "guidance": 3.5,
            "output_format": "webp",
            "output_quality": 80,
            "go_fast": true
        }
    })
}

/// Interpret a create-prediction response
pub fn submission_from_prediction(prediction: Prediction) -> Result<ImageSubmission, ServiceError> {
    if let Some(url) = prediction.first_output() {
        return Ok(ImageSubmission::Ready(url));
    }
    if prediction.is_failed() {
        return Err(ServiceError::Rejected(prediction.error_message()));
    }
    match prediction.urls.and_then(|urls| urls.get) {
        Some(url) => Ok(ImageSubmission::Pending(PollHandle {
            id: prediction.id,
            url,
        })),
        None => Err(ServiceError::Parse(
            "no output or polling URL available".to_string(),
        )),
    }
}

/// Interpret a get-prediction response
pub fn poll_status_from_prediction(prediction: &Prediction) -> PollStatus {
    match prediction.status.as_str() {
        "starting" => PollStatus::Queued,
        "succeeded" => match prediction.first_output() {
            Some(url) => PollStatus::Succeeded(url),
            None => PollStatus::Failed("prediction succeeded without output".to_string()),
        },
        _ if prediction.is_failed() => PollStatus::Failed(prediction.error_message()),
        _ => PollStatus::Processing,
    }
}

#[async_trait]
impl ImageService for ReplicateClient {
    async fn submit(&self, prompt: &str) -> Result<ImageSubmission, ServiceError> {
        let api_key = self.api_key()?;

        let response = self
            .http_client
            .post(format!("{}/models/{}/predictions", self.base_url, self.model))
            .bearer_auth(api_key)
            .header("Prefer", "wait")
            .timeout(Duration::from_secs(SUBMIT_TIMEOUT_SECS))
            .json(&build_prediction_request(prompt))
            .send()
            .await?;

        let prediction = Self::read_prediction(response).await?;
        tracing::debug!(
            prediction_id = %prediction.id,
            status = %prediction.status,
            "Image prediction submitted"
        );
        submission_from_prediction(prediction)
    }

    async fn poll(&self, handle: &PollHandle) -> Result<PollStatus, ServiceError> {
        let api_key = self.api_key()?;

        let response = self
            .http_client
            .get(&handle.url)
            .bearer_auth(api_key)
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS))
            .send()
            .await?;

        let prediction = Self::read_prediction(response).await?;
        Ok(poll_status_from_prediction(&prediction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(body: &str) -> Prediction {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_request_carries_prompt() {
        let body = build_prediction_request("A photo of pho");
        assert_eq!(body["input"]["prompt"], "A photo of pho");
        assert_eq!(body["input"]["output_format"], "webp");
    }

    #[test]
    fn test_immediate_output_is_ready() {
        let p = prediction(
            r#"{"id": "p1", "status": "succeeded", "output": ["https://img/p1.webp"], "urls": {"get": "https://api/p1"}}"#,
        );
        assert_eq!(
            submission_from_prediction(p).unwrap(),
            ImageSubmission::Ready("https://img/p1.webp".into())
        );
    }

    #[test]
    fn test_unfinished_prediction_gives_poll_handle() {
        let p = prediction(
            r#"{"id": "p2", "status": "processing", "output": null, "urls": {"get": "https://api/p2"}}"#,
        );
        assert_eq!(
            submission_from_prediction(p).unwrap(),
            ImageSubmission::Pending(PollHandle {
                id: "p2".into(),
                url: "https://api/p2".into(),
            })
        );
    }

    #[test]
    fn test_failed_submission_rejected() {
        let p = prediction(r#"{"id": "p3", "status": "failed", "error": "NSFW content detected"}"#);
        assert_eq!(
            submission_from_prediction(p).unwrap_err(),
            ServiceError::Rejected("NSFW content detected".into())
        );

        let p = prediction(r#"{"id": "p4", "status": "starting"}"#);
        assert!(matches!(
            submission_from_prediction(p),
            Err(ServiceError::Parse(_))
        ));
    }

    #[test]
    fn test_poll_status_mapping() {
        let cases = [
            (r#"{"id": "x", "status": "starting"}"#, PollStatus::Queued),
            (r#"{"id": "x", "status": "processing"}"#, PollStatus::Processing),
            (
                r#"{"id": "x", "status": "succeeded", "output": "https://img/x.webp"}"#,
                PollStatus::Succeeded("https://img/x.webp".into()),
            ),
            (
                r#"{"id": "x", "status": "canceled"}"#,
                PollStatus::Failed("prediction canceled".into()),
            ),
            (
                r#"{"id": "x", "status": "failed", "error": {"detail": "oom"}}"#,
                PollStatus::Failed(r#"{"detail":"oom"}"#.into()),
            ),
        ];

        for (body, expected) in cases {
            assert_eq!(poll_status_from_prediction(&prediction(body)), expected);
        }
    }
}
