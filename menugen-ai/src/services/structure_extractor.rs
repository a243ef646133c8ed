//! Structure extraction
//!
//! Sends the menu photo to the vision service with an enforced output shape
//! and turns the reply into a validated `MenuDraft`. Every failure on this
//! path (service unreachable after retries, malformed JSON, empty menu,
//! nameless dish) is STRUCTURE_VALIDATION; nothing is written to the store.

use serde_json::json;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::models::{FailureCode, MenuDraft};
use crate::services::providers::{ExtractionRequest, VisionService};
use crate::utils::{retry_transient, RetryPolicy};

/// Instructions sent alongside the image
pub const EXTRACTION_INSTRUCTIONS: &str = "Extract the menu structure from this image. \
Organize dishes into sections in the order they appear. Include dish names and prices \
exactly as printed if visible. Return the data as structured JSON.";

/// JSON Schema the vision service must answer with
pub fn extraction_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "sections": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "dishes": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "name": { "type": "string" },
                                    "price": { "type": "string" }
                                },
                                "required": ["name"]
                            }
                        }
                    },
                    "required": ["name", "dishes"]
                }
            }
        },
        "required": ["sections"]
    })
}

/// Vision-backed extractor
pub struct StructureExtractor {
    vision: Arc<dyn VisionService>,
    retry: RetryPolicy,
    schema: serde_json::Value,
}

impl StructureExtractor {
    pub fn new(vision: Arc<dyn VisionService>, retry: RetryPolicy) -> Self {
        Self {
            vision,
            retry,
            schema: extraction_schema(),
        }
    }

    /// Extract and validate a draft from raw image bytes
    pub async fn extract(
        &self,
        image: &[u8],
        content_type: &str,
    ) -> Result<MenuDraft, PipelineError> {
        let request = ExtractionRequest {
            image,
            content_type,
            instructions: EXTRACTION_INSTRUCTIONS,
            output_schema: &self.schema,
        };

        let raw = retry_transient("extract_structure", &self.retry, || {
            self.vision.extract_structure(&request)
        })
        .await
        .map_err(|e| {
            PipelineError::new(
                FailureCode::StructureValidation,
                format!("Failed to extract menu structure: {}", e),
            )
        })?;

        let draft = parse_draft(&raw)?;

        tracing::debug!(
            sections = draft.sections.len(),
            dishes = draft.dish_count(),
            "Menu structure extracted"
        );

        Ok(draft)
    }
}

/// Parse and validate the vision service's JSON payload
///
/// Tolerates a surrounding Markdown code fence.
pub fn parse_draft(raw: &str) -> Result<MenuDraft, PipelineError> {
    let payload = strip_code_fence(raw);

    let draft: MenuDraft = serde_json::from_str(payload).map_err(|e| {
        PipelineError::new(
            FailureCode::StructureValidation,
            format!("Extraction output is not valid menu JSON: {}", e),
        )
    })?;

    let draft = draft.normalized();
    draft.validate().map_err(|e| {
        PipelineError::new(
            FailureCode::StructureValidation,
            format!("Extraction output rejected: {}", e),
        )
    })?;

    Ok(draft)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
