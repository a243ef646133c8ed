//! Section and dish database operations
//!
//! Inserts run on the caller's transaction so a whole draft lands atomically.
//! Enrichment updates only ever touch a PENDING dish.

use chrono::Utc;
use menugen_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};
use crate::models::{Dish, DishStatus, Section};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

const DISH_COLUMNS: &str = r#"
    id, menu_id, section_id, name, price_cents, currency, raw_price_string,
    description, image_url, status, failure_reason, position,
    created_at, updated_at
"#;

/// Insert a section on the caller's transaction
pub async fn insert_section(conn: &mut SqliteConnection, section: &Section) -> Result<()> {
    sqlx::query("INSERT INTO menu_sections (id, menu_id, name, position) VALUES (?, ?, ?, ?)")
        .bind(section.id.to_string())
        .bind(section.menu_id.to_string())
        .bind(&section.name)
        .bind(section.position)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Insert a dish on the caller's transaction
pub async fn insert_dish(conn: &mut SqliteConnection, dish: &Dish) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO dishes (
            id, menu_id, section_id, name, price_cents, currency, raw_price_string,
            description, image_url, status, failure_reason, position,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(dish.id.to_string())
    .bind(dish.menu_id.to_string())
    .bind(dish.section_id.map(|id| id.to_string()))
    .bind(&dish.name)
    .bind(dish.price_cents)
    .bind(&dish.currency)
    .bind(&dish.raw_price_string)
    .bind(&dish.description)
    .bind(&dish.image_url)
    .bind(dish.status.as_str())
    .bind(&dish.failure_reason)
    .bind(dish.position)
    .bind(dish.created_at.to_rfc3339())
    .bind(dish.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Load dish by id
pub async fn load_dish(pool: &SqlitePool, dish_id: Uuid) -> Result<Option<Dish>> {
    let row = sqlx::query(&format!("SELECT {} FROM dishes WHERE id = ?", DISH_COLUMNS))
        .bind(dish_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(dish_from_row).transpose()
}

/// PENDING → COMPLETE with the generated description and optional image
///
/// Returns false if the dish was already terminal.
pub async fn complete_dish(
    pool: &SqlitePool,
    dish_id: Uuid,
    description: &str,
    image_url: Option<&str>,
) -> Result<bool> {
    let dish_id_str = dish_id.to_string();
    let now = Utc::now().to_rfc3339();

    retry_on_lock("complete_dish", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            UPDATE dishes
            SET status = 'COMPLETE', description = ?, image_url = ?, updated_at = ?
            WHERE id = ? AND status = 'PENDING'
            "#,
        )
        .bind(description)
        .bind(image_url)
        .bind(&now)
        .bind(&dish_id_str)
        .execute(pool)
        .await?;

        Ok::<_, Error>(result.rows_affected() == 1)
    })
    .await
}

/// PENDING → FAILED with a reason
///
/// Returns false if the dish was already terminal.
pub async fn fail_dish(pool: &SqlitePool, dish_id: Uuid, reason: &str) -> Result<bool> {
    let dish_id_str = dish_id.to_string();
    let now = Utc::now().to_rfc3339();

    retry_on_lock("fail_dish", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            UPDATE dishes
            SET status = 'FAILED', failure_reason = ?, updated_at = ?
            WHERE id = ? AND status = 'PENDING'
            "#,
        )
        .bind(reason)
        .bind(&now)
        .bind(&dish_id_str)
        .execute(pool)
        .await?;

        Ok::<_, Error>(result.rows_affected() == 1)
    })
    .await
}

/// Fail every dish of a menu still PENDING
///
/// Returns the number of dishes swept.
pub async fn fail_pending_dishes(pool: &SqlitePool, menu_id: Uuid, reason: &str) -> Result<u64> {
    let menu_id_str = menu_id.to_string();
    let now = Utc::now().to_rfc3339();

    retry_on_lock("fail_pending_dishes", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            UPDATE dishes
            SET status = 'FAILED', failure_reason = ?, updated_at = ?
            WHERE menu_id = ? AND status = 'PENDING'
            "#,
        )
        .bind(reason)
        .bind(&now)
        .bind(&menu_id_str)
        .execute(pool)
        .await?;

        Ok::<_, Error>(result.rows_affected())
    })
    .await
}

/// Sections of a menu ordered by position
pub async fn list_sections(pool: &SqlitePool, menu_id: Uuid) -> Result<Vec<Section>> {
    let rows = sqlx::query(
        "SELECT id, menu_id, name, position FROM menu_sections WHERE menu_id = ? ORDER BY position",
    )
    .bind(menu_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            let menu_id: String = row.get("menu_id");
            Ok(Section {
                id: parse_uuid(&id, "section id")?,
                menu_id: parse_uuid(&menu_id, "menu id")?,
                name: row.get("name"),
                position: row.get("position"),
            })
        })
        .collect()
}

/// Dishes of a menu ordered by position (grouping is left to the caller)
pub async fn list_dishes(pool: &SqlitePool, menu_id: Uuid) -> Result<Vec<Dish>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM dishes WHERE menu_id = ? ORDER BY position, created_at",
        DISH_COLUMNS
    ))
    .bind(menu_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(dish_from_row).collect()
}

/// Count dishes of a menu, optionally only those in `status`
pub async fn count_dishes(
    pool: &SqlitePool,
    menu_id: Uuid,
    status: Option<DishStatus>,
) -> Result<i64> {
    let count: i64 = match status {
        Some(status) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM dishes WHERE menu_id = ? AND status = ?")
                .bind(menu_id.to_string())
                .bind(status.as_str())
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(*) FROM dishes WHERE menu_id = ?")
                .bind(menu_id.to_string())
                .fetch_one(pool)
                .await?
        }
    };

    Ok(count)
}

/// Count sections of a menu
pub async fn count_sections(pool: &SqlitePool, menu_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menu_sections WHERE menu_id = ?")
        .bind(menu_id.to_string())
        .fetch_one(pool)
        .await?;

    Ok(count)
}

fn dish_from_row(row: &SqliteRow) -> Result<Dish> {
    let id: String = row.get("id");
    let menu_id: String = row.get("menu_id");
    let section_id: Option<String> = row.get("section_id");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Dish {
        id: parse_uuid(&id, "dish id")?,
        menu_id: parse_uuid(&menu_id, "menu id")?,
        section_id: section_id
            .map(|s| parse_uuid(&s, "section id"))
            .transpose()?,
        name: row.get("name"),
        price_cents: row.get("price_cents"),
        currency: row.get("currency"),
        raw_price_string: row.get("raw_price_string"),
        description: row.get("description"),
        image_url: row.get("image_url"),
        status: status.parse().map_err(Error::Internal)?,
        failure_reason: row.get("failure_reason"),
        position: row.get("position"),
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_database_pool, menus};
    use crate::models::Menu;
    use tempfile::TempDir;

    async fn pool_with_menu() -> (TempDir, SqlitePool, Menu) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database_pool(&temp_dir.path().join("menugen.db"))
            .await
            .unwrap();
        let menu = Menu::new("hash".into(), "image/png".into(), None);
        menus::insert_or_get_by_hash(&pool, &menu).await.unwrap();
        (temp_dir, pool, menu)
    }

    fn dish(menu_id: Uuid, section_id: Option<Uuid>, name: &str, position: i64) -> Dish {
        let now = Utc::now();
        Dish {
            id: Uuid::new_v4(),
            menu_id,
            section_id,
            name: name.to_string(),
            price_cents: None,
            currency: "USD".to_string(),
            raw_price_string: Some("Market Price".to_string()),
            description: None,
            image_url: None,
            status: DishStatus::Pending,
            failure_reason: None,
            position,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_and_list_ordered() {
        let (_dir, pool, menu) = pool_with_menu().await;
        let section = Section {
            id: Uuid::new_v4(),
            menu_id: menu.id,
            name: "Mains".into(),
            position: 0,
        };

        let mut tx = pool.begin().await.unwrap();
        insert_section(&mut tx, &section).await.unwrap();
        insert_dish(&mut tx, &dish(menu.id, Some(section.id), "Second", 1))
            .await
            .unwrap();
        insert_dish(&mut tx, &dish(menu.id, Some(section.id), "First", 0))
            .await
            .unwrap();
        insert_dish(&mut tx, &dish(menu.id, None, "Loose", 0)).await.unwrap();
        tx.commit().await.unwrap();

        let sections = list_sections(&pool, menu.id).await.unwrap();
        assert_eq!(sections, vec![section.clone()]);

        let dishes = list_dishes(&pool, menu.id).await.unwrap();
        assert_eq!(dishes.len(), 3);
        let in_section: Vec<_> = dishes
            .iter()
            .filter(|d| d.section_id == Some(section.id))
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(in_section, vec!["First", "Second"]);
        assert_eq!(dishes.iter().filter(|d| d.section_id.is_none()).count(), 1);
        assert_eq!(dishes[0].raw_price_string.as_deref(), Some("Market Price"));
    }

    #[tokio::test]
    async fn test_duplicate_section_position_rejected() {
        let (_dir, pool, menu) = pool_with_menu().await;
        let mut tx = pool.begin().await.unwrap();
        for name in ["A", "B"] {
            let section = Section {
                id: Uuid::new_v4(),
                menu_id: menu.id,
                name: name.into(),
                position: 0,
            };
            let result = insert_section(&mut tx, &section).await;
            if name == "B" {
                assert!(result.is_err());
            }
        }
    }

    #[tokio::test]
    async fn test_terminal_dish_not_rewritten() {
        let (_dir, pool, menu) = pool_with_menu().await;
        let d = dish(menu.id, None, "Soup", 0);
        let mut tx = pool.begin().await.unwrap();
        insert_dish(&mut tx, &d).await.unwrap();
        tx.commit().await.unwrap();

        assert!(complete_dish(&pool, d.id, "Warm and hearty.", None).await.unwrap());
        assert!(!fail_dish(&pool, d.id, "late failure").await.unwrap());
        assert!(!complete_dish(&pool, d.id, "Other", Some("http://x")).await.unwrap());

        let loaded = load_dish(&pool, d.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, DishStatus::Complete);
        assert_eq!(loaded.description.as_deref(), Some("Warm and hearty."));
        assert!(loaded.image_url.is_none());
        assert!(loaded.failure_reason.is_none());

        assert_eq!(count_dishes(&pool, menu.id, None).await.unwrap(), 1);
        assert_eq!(
            count_dishes(&pool, menu.id, Some(DishStatus::Pending)).await.unwrap(),
            0
        );
        assert_eq!(count_sections(&pool, menu.id).await.unwrap(), 0);
    }
}
