//! Failure taxonomy
//!
//! Menu-level codes (`StructureValidation`, `Persistence`) are terminal for the
//! menu. Enrichment codes stay local to one dish.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Failure classification shared by the API, the pipeline and the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    /// Bad upload shape, size or type; rejected before a menu exists
    Validation,
    /// Extraction output malformed, empty or unobtainable
    StructureValidation,
    /// Atomic write of sections/dishes failed
    Persistence,
    /// Description generation failed; the dish is FAILED
    EnrichmentDescription,
    /// Image generation failed; the dish completes without an image
    EnrichmentImage,
    /// Enrichment was aborted or ran past its wall-clock bound
    EnrichmentAborted,
    /// Unknown menu id
    NotFound,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::Validation => "VALIDATION",
            FailureCode::StructureValidation => "STRUCTURE_VALIDATION",
            FailureCode::Persistence => "PERSISTENCE",
            FailureCode::EnrichmentDescription => "ENRICHMENT_DESCRIPTION",
            FailureCode::EnrichmentImage => "ENRICHMENT_IMAGE",
            FailureCode::EnrichmentAborted => "ENRICHMENT_ABORTED",
            FailureCode::NotFound => "NOT_FOUND",
        }
    }

    /// Whether this code terminates the whole menu
    pub fn is_menu_level(&self) -> bool {
        matches!(
            self,
            FailureCode::StructureValidation | FailureCode::Persistence
        )
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VALIDATION" => Ok(FailureCode::Validation),
            "STRUCTURE_VALIDATION" => Ok(FailureCode::StructureValidation),
            "PERSISTENCE" => Ok(FailureCode::Persistence),
            "ENRICHMENT_DESCRIPTION" => Ok(FailureCode::EnrichmentDescription),
            "ENRICHMENT_IMAGE" => Ok(FailureCode::EnrichmentImage),
            "ENRICHMENT_ABORTED" => Ok(FailureCode::EnrichmentAborted),
            "NOT_FOUND" => Ok(FailureCode::NotFound),
            other => Err(format!("unknown failure code: {}", other)),
        }
    }
}
