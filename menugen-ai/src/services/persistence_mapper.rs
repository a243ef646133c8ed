//! Draft → sections/dishes, written in one transaction
//!
//! The transaction inserts every section and dish and advances the menu from
//! PENDING to PROCESSING with its dish count. Either all of it commits or none
//! of it does.

use chrono::Utc;
use menugen_common::{Error, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{dishes, menus};
use crate::error::PipelineError;
use crate::models::{Dish, DishStatus, FailureCode, MenuDraft, Section};
use crate::services::price_parser::parse_price_cents;
use crate::utils::{begin_monitored, retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Rows produced from one draft
#[derive(Debug, Clone)]
pub struct MappedMenu {
    pub sections: Vec<Section>,
    pub dishes: Vec<Dish>,
}

impl MappedMenu {
    pub fn dish_ids(&self) -> Vec<Uuid> {
        self.dishes.iter().map(|d| d.id).collect()
    }

    pub fn total_dishes(&self) -> i64 {
        self.dishes.len() as i64
    }
}

/// Build section and dish entities for `menu_id`
///
/// Section position is the index in the draft; dish position is the index
/// within its section. A blank section name produces no section and leaves
/// its dishes ungrouped.
pub fn map_draft(menu_id: Uuid, draft: &MenuDraft, currency: &str) -> MappedMenu {
    let now = Utc::now();
    let mut sections = Vec::with_capacity(draft.sections.len());
    let mut dishes = Vec::with_capacity(draft.dish_count());

    for (section_idx, section_draft) in draft.sections.iter().enumerate() {
        let section_id = if section_draft.name.trim().is_empty() {
            None
        } else {
            let section = Section {
                id: Uuid::new_v4(),
                menu_id,
                name: section_draft.name.clone(),
                position: section_idx as i64,
            };
            let id = section.id;
            sections.push(section);
            Some(id)
        };

        for (dish_idx, dish_draft) in section_draft.dishes.iter().enumerate() {
            let price_cents = dish_draft.price.as_deref().and_then(parse_price_cents);

            dishes.push(Dish {
                id: Uuid::new_v4(),
                menu_id,
                section_id,
                name: dish_draft.name.clone(),
                price_cents,
                currency: currency.to_string(),
                raw_price_string: dish_draft.price.clone(),
                description: None,
                image_url: None,
                status: DishStatus::Pending,
                failure_reason: None,
                position: dish_idx as i64,
                created_at: now,
                updated_at: now,
            });
        }
    }

    MappedMenu { sections, dishes }
}

/// Writes a validated draft for one menu
#[derive(Clone)]
pub struct PersistenceMapper {
    db: SqlitePool,
    base_currency: String,
}

impl PersistenceMapper {
    pub fn new(db: SqlitePool, base_currency: impl Into<String>) -> Self {
        Self {
            db,
            base_currency: base_currency.into(),
        }
    }

    /// Persist the draft and move the menu to PROCESSING
    ///
    /// Any failure rolls back the whole batch and is classified PERSISTENCE.
    pub async fn persist(
        &self,
        menu_id: Uuid,
        draft: &MenuDraft,
    ) -> std::result::Result<MappedMenu, PipelineError> {
        let mapped = map_draft(menu_id, draft, &self.base_currency);

        retry_on_lock("persist_menu_draft", DEFAULT_MAX_LOCK_WAIT_MS, || {
            write_batch(&self.db, menu_id, &mapped)
        })
        .await
        .map_err(|e| {
            PipelineError::new(
                FailureCode::Persistence,
                format!("Failed to persist menu sections and dishes: {}", e),
            )
        })?;

        tracing::info!(
            menu_id = %menu_id,
            sections = mapped.sections.len(),
            total_dishes = mapped.total_dishes(),
            "Menu draft persisted"
        );

        Ok(mapped)
    }
}

async fn write_batch(pool: &SqlitePool, menu_id: Uuid, mapped: &MappedMenu) -> Result<()> {
    let mut tx = begin_monitored(pool, "persist_menu_draft").await?;

    for section in &mapped.sections {
        dishes::insert_section(tx.conn(), section).await?;
    }
    for dish in &mapped.dishes {
        dishes::insert_dish(tx.conn(), dish).await?;
    }

    if !menus::mark_processing(tx.conn(), menu_id, mapped.total_dishes()).await? {
        tx.rollback().await?;
        return Err(Error::InvalidInput(format!(
            "Menu {} is no longer PENDING",
            menu_id
        )));
    }

    tx.commit().await
}
