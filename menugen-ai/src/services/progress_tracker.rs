//! Per-menu progress counters
//!
//! `processed_dishes` counts dishes that reached any terminal status, so 100%
//! means "every dish attempted", not "every dish succeeded". The counter lives
//! in the menus row and is advanced with a single guarded UPDATE; concurrent
//! dish tasks therefore never race on a read-modify-write.

use chrono::Utc;
use menugen_common::events::{EventBus, MenuEvent};
use menugen_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::menus;
use crate::models::DishStatus;

/// Counter snapshot served to pollers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub processed_dishes: i64,
    pub total_dishes: i64,
}

#[derive(Clone)]
pub struct ProgressTracker {
    db: SqlitePool,
    event_bus: EventBus,
}

impl ProgressTracker {
    pub fn new(db: SqlitePool, event_bus: EventBus) -> Self {
        Self { db, event_bus }
    }

    /// Record that one dish reached `status`; call exactly once per dish
    ///
    /// Returns the new counter, or None if the menu was not PROCESSING or the
    /// counter was already full.
    pub async fn record_terminal(
        &self,
        menu_id: Uuid,
        dish_id: Uuid,
        status: DishStatus,
        has_image: bool,
    ) -> Result<Option<Progress>> {
        let now = Utc::now();
        self.event_bus.emit_lossy(MenuEvent::DishEnriched {
            menu_id,
            dish_id,
            status: status.as_str().to_string(),
            has_image,
            timestamp: now,
        });

        let Some((processed_dishes, total_dishes)) =
            menus::increment_processed(&self.db, menu_id).await?
        else {
            tracing::warn!(
                menu_id = %menu_id,
                dish_id = %dish_id,
                "Progress not advanced: menu not processing or counter already full"
            );
            return Ok(None);
        };

        tracing::debug!(
            menu_id = %menu_id,
            processed_dishes,
            total_dishes,
            "Menu progress advanced"
        );

        self.event_bus.emit_lossy(MenuEvent::MenuProgress {
            menu_id,
            processed_dishes,
            total_dishes,
            timestamp: now,
        });

        Ok(Some(Progress {
            processed_dishes,
            total_dishes,
        }))
    }

    /// Current counters for a menu
    pub async fn snapshot(&self, menu_id: Uuid) -> Result<Option<Progress>> {
        Ok(menus::load_menu(&self.db, menu_id).await?.map(|menu| Progress {
            processed_dishes: menu.processed_dishes,
            total_dishes: menu.total_dishes,
        }))
    }
}
