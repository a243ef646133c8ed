//! OpenAI chat-completions client
//!
//! Implements both the vision service (structure extraction with a
//! `json_schema` response format and the photo sent as a data URL) and the
//! text service (dish descriptions).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use menugen_common::config::ProviderConfig;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::services::providers::{
    ExtractionRequest, ServiceError, TextPrompt, TextService, VisionService,
};

const USER_AGENT: &str = concat!("menugen-ai/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 60;
const EXTRACTION_MAX_TOKENS: u32 = 2000;
const DESCRIPTION_MAX_TOKENS: u32 = 100;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

pub struct OpenAiClient {
    http_client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    vision_model: String,
    text_model: String,
}

impl OpenAiClient {
    /// Without an API key every call fails with `NotConfigured`
    pub fn new(api_key: Option<String>, providers: &ProviderConfig) -> Result<Self, ServiceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: providers.openai_base_url.trim_end_matches('/').to_string(),
            vision_model: providers.vision_model.clone(),
            text_model: providers.text_model.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn chat(&self, body: &serde_json::Value) -> Result<String, ServiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ServiceError::NotConfigured("OpenAI".to_string()))?;

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        parse_chat_content(&body)
    }
}

/// Chat request carrying the menu photo and the enforced output schema
pub fn build_vision_request(model: &str, request: &ExtractionRequest<'_>) -> serde_json::Value {
    let data_url = format!(
        "data:{};base64,{}",
        request.content_type,
        STANDARD.encode(request.image)
    );

    json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": [
                { "type": "text", "text": request.instructions },
                { "type": "image_url", "image_url": { "url": data_url } }
            ]
        }],
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": "menu_structure",
                "strict": false,
                "schema": request.output_schema
            }
        },
        "max_tokens": EXTRACTION_MAX_TOKENS
    })
}

/// Chat request for a short text completion
pub fn build_text_request(model: &str, prompt: &TextPrompt) -> serde_json::Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": prompt.system },
            { "role": "user", "content": prompt.user }
        ],
        "max_tokens": DESCRIPTION_MAX_TOKENS
    })
}

/// Content of the first choice
pub fn parse_chat_content(body: &str) -> Result<String, ServiceError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| ServiceError::Parse(e.to_string()))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ServiceError::Parse("no choices in OpenAI response".to_string()))
}

#[async_trait]
impl VisionService for OpenAiClient {
    async fn extract_structure(
        &self,
        request: &ExtractionRequest<'_>,
    ) -> Result<String, ServiceError> {
        tracing::debug!(
            model = %self.vision_model,
            bytes = request.image.len(),
            "Requesting menu structure extraction"
        );
        let body = build_vision_request(&self.vision_model, request);
        self.chat(&body).await
    }
}

#[async_trait]
impl TextService for OpenAiClient {
    async fn complete(&self, prompt: &TextPrompt) -> Result<String, ServiceError> {
        let body = build_text_request(&self.text_model, prompt);
        self.chat(&body).await
    }
}
