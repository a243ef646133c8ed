//! Menu record and lifecycle state machine
//!
//! PENDING → PROCESSING → COMPLETE
//!     │          │
//!     └──────────┴──────→ FAILED
//!
//! Transitions never regress. COMPLETE and FAILED are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::FailureCode;

/// Menu lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MenuStatus {
    /// Record created, extraction not finished
    Pending,
    /// Sections/dishes persisted, enrichment running
    Processing,
    /// Every dish reached a terminal status
    Complete,
    /// Extraction or persistence failed
    Failed,
}

impl MenuStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MenuStatus::Pending => "PENDING",
            MenuStatus::Processing => "PROCESSING",
            MenuStatus::Complete => "COMPLETE",
            MenuStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MenuStatus::Complete | MenuStatus::Failed)
    }

    /// Whether `self → next` is a legal forward transition
    pub fn can_transition_to(&self, next: MenuStatus) -> bool {
        matches!(
            (self, next),
            (MenuStatus::Pending, MenuStatus::Processing)
                | (MenuStatus::Pending, MenuStatus::Failed)
                | (MenuStatus::Processing, MenuStatus::Complete)
                | (MenuStatus::Processing, MenuStatus::Failed)
        )
    }
}

impl fmt::Display for MenuStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MenuStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(MenuStatus::Pending),
            "PROCESSING" => Ok(MenuStatus::Processing),
            "COMPLETE" => Ok(MenuStatus::Complete),
            "FAILED" => Ok(MenuStatus::Failed),
            other => Err(format!("unknown menu status: {}", other)),
        }
    }
}

/// Top-level record tracking one uploaded image through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Menu {
    pub id: Uuid,
    /// Hex SHA-256 of the uploaded bytes (unique)
    pub image_hash: String,
    pub original_filename: Option<String>,
    pub content_type: String,
    pub status: MenuStatus,
    /// Present iff status is FAILED
    pub failure_code: Option<FailureCode>,
    pub failure_reason: Option<String>,
    pub total_dishes: i64,
    pub processed_dishes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Menu {
    /// New PENDING menu for an upload
    pub fn new(image_hash: String, content_type: String, original_filename: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            image_hash,
            original_filename,
            content_type,
            status: MenuStatus::Pending,
            failure_code: None,
            failure_reason: None,
            total_dishes: 0,
            processed_dishes: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Progress reported to pollers once dishes exist
    pub fn has_progress(&self) -> bool {
        matches!(self.status, MenuStatus::Processing | MenuStatus::Complete)
    }
}
