//! Dish description generation
//!
//! Required enrichment step: a failure here fails the dish.

use std::sync::Arc;

use crate::error::PipelineError;
use crate::models::FailureCode;
use crate::services::providers::{TextPrompt, TextService};
use crate::utils::{retry_transient, RetryPolicy};

const FOOD_WRITER_STYLE: &str = "You are a food writer. Generate a brief, appetizing \
description (1-2 sentences) for the given dish name. Be descriptive but concise.";

/// Prompt asking for a short description of `dish_name`
pub fn description_prompt(dish_name: &str) -> TextPrompt {
    TextPrompt {
        system: FOOD_WRITER_STYLE.to_string(),
        user: format!("Generate a description for this dish: {}", dish_name),
    }
}

pub struct DescriptionGenerator {
    text: Arc<dyn TextService>,
    retry: RetryPolicy,
}

impl DescriptionGenerator {
    pub fn new(text: Arc<dyn TextService>, retry: RetryPolicy) -> Self {
        Self { text, retry }
    }

    /// Generate a description; blank output counts as failure
    pub async fn generate(&self, dish_name: &str) -> Result<String, PipelineError> {
        let prompt = description_prompt(dish_name);

        let text = retry_transient("describe_dish", &self.retry, || self.text.complete(&prompt))
            .await
            .map_err(|e| {
                PipelineError::new(
                    FailureCode::EnrichmentDescription,
                    format!("Failed to generate description: {}", e),
                )
            })?;

        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::new(
                FailureCode::EnrichmentDescription,
                "Failed to generate description: service returned empty text",
            ));
        }

        Ok(text.to_string())
    }
}
