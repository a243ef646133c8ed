//! Structured extraction draft
//!
//! Shape returned by the vision service: ordered sections, each with a name
//! and ordered dishes of name / optional raw price text. Nothing here touches
//! the store; a draft either validates as a whole or is rejected.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Reasons a draft is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("extraction returned no sections")]
    NoSections,

    #[error("extraction returned no dishes")]
    NoDishes,

    #[error("dish #{position} in section #{section} has an empty name")]
    EmptyDishName { section: usize, position: usize },
}

/// Whole-menu draft
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuDraft {
    #[serde(default)]
    pub sections: Vec<SectionDraft>,
}

/// One extracted section
///
/// A blank name marks the dishes as ungrouped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dishes: Vec<DishDraft>,
}

/// One extracted dish
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DishDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "price_text")]
    pub price: Option<String>,
}

/// Accept price as string or bare number; models emit both
fn price_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "price must be a string or number, got {}",
            other
        ))),
    }
}

impl MenuDraft {
    /// Total number of dishes across all sections
    pub fn dish_count(&self) -> usize {
        self.sections.iter().map(|s| s.dishes.len()).sum()
    }

    /// Trim names; blank price text becomes None, other price text is kept as-is
    pub fn normalized(mut self) -> Self {
        for section in &mut self.sections {
            section.name = section.name.trim().to_string();
            for dish in &mut section.dishes {
                dish.name = dish.name.trim().to_string();
                dish.price = dish
                    .price
                    .take()
                    .filter(|p| !p.trim().is_empty());
            }
        }
        self
    }

    /// Reject empty payloads and nameless dishes
    pub fn validate(&self) -> Result<(), DraftError> {
        if self.sections.is_empty() {
            return Err(DraftError::NoSections);
        }
        if self.dish_count() == 0 {
            return Err(DraftError::NoDishes);
        }
        for (section_idx, section) in self.sections.iter().enumerate() {
            for (dish_idx, dish) in section.dishes.iter().enumerate() {
                if dish.name.trim().is_empty() {
                    return Err(DraftError::EmptyDishName {
                        section: section_idx,
                        position: dish_idx,
                    });
                }
            }
        }
        Ok(())
    }
}
