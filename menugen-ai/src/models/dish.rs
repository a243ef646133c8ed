//! Section and dish records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Named grouping of dishes, ordered by position within its menu
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: Uuid,
    pub menu_id: Uuid,
    pub name: String,
    /// Zero-based extraction order, unique per menu
    pub position: i64,
}

/// Dish enrichment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DishStatus {
    Pending,
    Complete,
    Failed,
}

impl DishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DishStatus::Pending => "PENDING",
            DishStatus::Complete => "COMPLETE",
            DishStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DishStatus::Pending)
    }
}

impl fmt::Display for DishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DishStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(DishStatus::Pending),
            "COMPLETE" => Ok(DishStatus::Complete),
            "FAILED" => Ok(DishStatus::Failed),
            other => Err(format!("unknown dish status: {}", other)),
        }
    }
}

/// One menu item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dish {
    pub id: Uuid,
    pub menu_id: Uuid,
    /// None = ungrouped
    pub section_id: Option<Uuid>,
    pub name: String,
    pub price_cents: Option<i64>,
    pub currency: String,
    /// Price text as extracted, kept even when it did not parse
    pub raw_price_string: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub status: DishStatus,
    pub failure_reason: Option<String>,
    /// Order within the section
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
