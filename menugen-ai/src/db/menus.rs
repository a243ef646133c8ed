//! Menu database operations
//!
//! Every status UPDATE carries a guard on the current status, so a write that
//! would regress the lifecycle matches zero rows instead of succeeding.

use chrono::Utc;
use menugen_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};
use crate::models::{FailureCode, Menu, MenuStatus};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

const MENU_COLUMNS: &str = r#"
    id, image_hash, original_filename, content_type, status,
    failure_code, failure_reason, total_dishes, processed_dishes,
    created_at, updated_at, completed_at
"#;

/// Insert `menu` unless a menu with the same image hash exists
///
/// Returns the stored menu and whether this call created it. When two uploads
/// of the same bytes race, the unique constraint on `image_hash` lets exactly
/// one insert through; the other reads back the winner's row.
pub async fn insert_or_get_by_hash(pool: &SqlitePool, menu: &Menu) -> Result<(Menu, bool)> {
    let result = sqlx::query(
        r#"
        INSERT INTO menus (
            id, image_hash, original_filename, content_type, status,
            total_dishes, processed_dishes, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, 0, 0, ?, ?)
        ON CONFLICT(image_hash) DO NOTHING
        "#,
    )
    .bind(menu.id.to_string())
    .bind(&menu.image_hash)
    .bind(&menu.original_filename)
    .bind(&menu.content_type)
    .bind(menu.status.as_str())
    .bind(menu.created_at.to_rfc3339())
    .bind(menu.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    let created = result.rows_affected() == 1;

    let stored = load_menu_by_hash(pool, &menu.image_hash)
        .await?
        .ok_or_else(|| {
            Error::Internal(format!(
                "Menu with hash {} vanished after insert",
                menu.image_hash
            ))
        })?;

    Ok((stored, created))
}

/// Load menu by id
pub async fn load_menu(pool: &SqlitePool, menu_id: Uuid) -> Result<Option<Menu>> {
    let row = sqlx::query(&format!("SELECT {} FROM menus WHERE id = ?", MENU_COLUMNS))
        .bind(menu_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(menu_from_row).transpose()
}

/// Load menu by content fingerprint
pub async fn load_menu_by_hash(pool: &SqlitePool, image_hash: &str) -> Result<Option<Menu>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM menus WHERE image_hash = ?",
        MENU_COLUMNS
    ))
    .bind(image_hash)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(menu_from_row).transpose()
}

/// PENDING → PROCESSING with the dish count, on the caller's transaction
///
/// Returns false if the menu was no longer PENDING.
pub async fn mark_processing(
    conn: &mut SqliteConnection,
    menu_id: Uuid,
    total_dishes: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE menus
        SET status = 'PROCESSING', total_dishes = ?, updated_at = ?
        WHERE id = ? AND status = 'PENDING'
        "#,
    )
    .bind(total_dishes)
    .bind(Utc::now().to_rfc3339())
    .bind(menu_id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Move a non-terminal menu to FAILED
///
/// Returns false if the menu was already terminal.
pub async fn mark_failed(
    pool: &SqlitePool,
    menu_id: Uuid,
    code: FailureCode,
    reason: &str,
) -> Result<bool> {
    let menu_id_str = menu_id.to_string();
    let now = Utc::now().to_rfc3339();

    retry_on_lock("mark_menu_failed", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            UPDATE menus
            SET status = 'FAILED', failure_code = ?, failure_reason = ?,
                updated_at = ?, completed_at = ?
            WHERE id = ? AND status IN ('PENDING', 'PROCESSING')
            "#,
        )
        .bind(code.as_str())
        .bind(reason)
        .bind(&now)
        .bind(&now)
        .bind(&menu_id_str)
        .execute(pool)
        .await?;

        Ok::<_, Error>(result.rows_affected() == 1)
    })
    .await
}

/// Atomically add one to `processed_dishes`
///
/// The increment happens inside a single UPDATE, so concurrent dish tasks
/// never lose a count. Returns the new `(processed, total)` pair, or None if
/// the menu is not PROCESSING or the counter is already at `total_dishes`.
pub async fn increment_processed(pool: &SqlitePool, menu_id: Uuid) -> Result<Option<(i64, i64)>> {
    let menu_id_str = menu_id.to_string();

    retry_on_lock("increment_processed", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let row = sqlx::query(
            r#"
            UPDATE menus
            SET processed_dishes = processed_dishes + 1, updated_at = ?
            WHERE id = ? AND status = 'PROCESSING' AND processed_dishes < total_dishes
            RETURNING processed_dishes, total_dishes
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&menu_id_str)
        .fetch_optional(pool)
        .await?;

        Ok::<_, Error>(row.map(|r| (r.get::<i64, _>(0), r.get::<i64, _>(1))))
    })
    .await
}

/// Set `processed_dishes` to the number of dishes already terminal
///
/// Repairs a counter that missed increments. Returns the stored
/// `(processed, total)` pair, or None if the menu is not PROCESSING.
pub async fn reconcile_processed(
    pool: &SqlitePool,
    menu_id: Uuid,
) -> Result<Option<(i64, i64)>> {
    let menu_id_str = menu_id.to_string();

    retry_on_lock("reconcile_processed", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let row = sqlx::query(
            r#"
            UPDATE menus
            SET processed_dishes = (
                    SELECT COUNT(*) FROM dishes
                    WHERE dishes.menu_id = menus.id AND dishes.status != 'PENDING'
                ),
                updated_at = ?
            WHERE id = ? AND status = 'PROCESSING'
            RETURNING processed_dishes, total_dishes
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&menu_id_str)
        .fetch_optional(pool)
        .await?;

        Ok::<_, Error>(row.map(|r| (r.get::<i64, _>(0), r.get::<i64, _>(1))))
    })
    .await
}

/// PROCESSING → COMPLETE, only once no dish of the menu is PENDING
///
/// Returns false if the guard did not hold.
pub async fn mark_complete(pool: &SqlitePool, menu_id: Uuid) -> Result<bool> {
    let menu_id_str = menu_id.to_string();
    let now = Utc::now().to_rfc3339();

    retry_on_lock("mark_menu_complete", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            UPDATE menus
            SET status = 'COMPLETE', updated_at = ?, completed_at = ?
            WHERE id = ? AND status = 'PROCESSING'
              AND NOT EXISTS (
                  SELECT 1 FROM dishes
                  WHERE dishes.menu_id = menus.id AND dishes.status = 'PENDING'
              )
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(&menu_id_str)
        .execute(pool)
        .await?;

        Ok::<_, Error>(result.rows_affected() == 1)
    })
    .await
}

fn menu_from_row(row: &SqliteRow) -> Result<Menu> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let status: MenuStatus = status.parse().map_err(Error::Internal)?;

    let failure_code: Option<String> = row.get("failure_code");
    let failure_code = failure_code
        .map(|code| code.parse::<FailureCode>())
        .transpose()
        .map_err(Error::Internal)?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let completed_at: Option<String> = row.get("completed_at");

    Ok(Menu {
        id: parse_uuid(&id, "menu id")?,
        image_hash: row.get("image_hash"),
        original_filename: row.get("original_filename"),
        content_type: row.get("content_type"),
        status,
        failure_code,
        failure_reason: row.get("failure_reason"),
        total_dishes: row.get("total_dishes"),
        processed_dishes: row.get("processed_dishes"),
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
        completed_at: completed_at
            .map(|s| parse_timestamp(&s, "completed_at"))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_pool;
    use tempfile::TempDir;

    async fn test_pool() -> (TempDir, SqlitePool) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database_pool(&temp_dir.path().join("menugen.db"))
            .await
            .unwrap();
        (temp_dir, pool)
    }

    #[tokio::test]
    async fn test_duplicate_hash_returns_existing_menu() {
        let (_dir, pool) = test_pool().await;

        let first = Menu::new("hash-a".into(), "image/png".into(), Some("menu.png".into()));
        let (stored, created) = insert_or_get_by_hash(&pool, &first).await.unwrap();
        assert!(created);
        assert_eq!(stored.id, first.id);

        let second = Menu::new("hash-a".into(), "image/jpeg".into(), None);
        let (stored, created) = insert_or_get_by_hash(&pool, &second).await.unwrap();
        assert!(!created);
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.content_type, "image/png");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menus")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_counter_stops_at_total() {
        let (_dir, pool) = test_pool().await;
        let menu = Menu::new("hash-b".into(), "image/png".into(), None);
        insert_or_get_by_hash(&pool, &menu).await.unwrap();

        // Not PROCESSING yet
        assert_eq!(increment_processed(&pool, menu.id).await.unwrap(), None);

        let mut conn = pool.acquire().await.unwrap();
        assert!(mark_processing(&mut conn, menu.id, 2).await.unwrap());
        drop(conn);

        assert_eq!(increment_processed(&pool, menu.id).await.unwrap(), Some((1, 2)));
        assert_eq!(increment_processed(&pool, menu.id).await.unwrap(), Some((2, 2)));
        assert_eq!(increment_processed(&pool, menu.id).await.unwrap(), None);

        let loaded = load_menu(&pool, menu.id).await.unwrap().unwrap();
        assert_eq!(loaded.processed_dishes, 2);
        assert_eq!(loaded.status, MenuStatus::Processing);
    }

    #[tokio::test]
    async fn test_terminal_status_never_regresses() {
        let (_dir, pool) = test_pool().await;
        let menu = Menu::new("hash-c".into(), "image/png".into(), None);
        insert_or_get_by_hash(&pool, &menu).await.unwrap();

        assert!(
            mark_failed(&pool, menu.id, FailureCode::StructureValidation, "empty")
                .await
                .unwrap()
        );
        assert!(!mark_failed(&pool, menu.id, FailureCode::Persistence, "again")
            .await
            .unwrap());

        let mut conn = pool.acquire().await.unwrap();
        assert!(!mark_processing(&mut conn, menu.id, 3).await.unwrap());
        drop(conn);
        assert!(!mark_complete(&pool, menu.id).await.unwrap());

        let loaded = load_menu(&pool, menu.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, MenuStatus::Failed);
        assert_eq!(loaded.failure_code, Some(FailureCode::StructureValidation));
        assert_eq!(loaded.failure_reason.as_deref(), Some("empty"));
        assert!(loaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_reconcile_counts_terminal_dishes() {
        let (_dir, pool) = test_pool().await;
        let menu = Menu::new("hash-d".into(), "image/png".into(), None);
        insert_or_get_by_hash(&pool, &menu).await.unwrap();

        assert_eq!(reconcile_processed(&pool, menu.id).await.unwrap(), None);

        let mut conn = pool.acquire().await.unwrap();
        assert!(mark_processing(&mut conn, menu.id, 3).await.unwrap());
        let now = Utc::now().to_rfc3339();
        for (position, status) in ["COMPLETE", "FAILED", "PENDING"].iter().enumerate() {
            sqlx::query(
                "INSERT INTO dishes (id, menu_id, name, currency, status, position, created_at, updated_at)
                 VALUES (?, ?, 'Dish', 'USD', ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(menu.id.to_string())
            .bind(*status)
            .bind(position as i64)
            .bind(&now)
            .bind(&now)
            .execute(&mut *conn)
            .await
            .unwrap();
        }
        drop(conn);

        assert_eq!(
            reconcile_processed(&pool, menu.id).await.unwrap(),
            Some((2, 3))
        );
        assert!(!mark_complete(&pool, menu.id).await.unwrap());

        let swept = crate::db::dishes::fail_pending_dishes(&pool, menu.id, "PERSISTENCE: x")
            .await
            .unwrap();
        assert_eq!(swept, 1);
        assert_eq!(
            reconcile_processed(&pool, menu.id).await.unwrap(),
            Some((3, 3))
        );
        assert!(mark_complete(&pool, menu.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_load_unknown_menu_is_none() {
        let (_dir, pool) = test_pool().await;
        assert!(load_menu(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }
}
