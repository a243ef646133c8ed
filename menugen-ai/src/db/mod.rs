//! Database access for menugen-ai
//!
//! SQLite store holding menus, their sections and dishes. UUIDs and
//! timestamps are stored as TEXT (RFC 3339).

pub mod dishes;
pub mod menus;

use chrono::{DateTime, Utc};
use menugen_common::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Per-connection busy timeout before SQLite reports "database is locked"
const BUSY_TIMEOUT_MS: u64 = 250;

/// Pool size; enrichment tasks each hold a connection only per statement
const MAX_CONNECTIONS: u32 = 8;

/// Open (creating if needed) the menu database and ensure tables exist
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::debug!(path = %db_path.display(), "Connecting to database");

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create menus, menu_sections and dishes if they don't exist
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS menus (
            id TEXT PRIMARY KEY,
            image_hash TEXT NOT NULL UNIQUE,
            original_filename TEXT,
            content_type TEXT NOT NULL,
            status TEXT NOT NULL
                CHECK (status IN ('PENDING', 'PROCESSING', 'COMPLETE', 'FAILED')),
            failure_code TEXT,
            failure_reason TEXT,
            total_dishes INTEGER NOT NULL DEFAULT 0,
            processed_dishes INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            completed_at TEXT,
            CHECK (processed_dishes >= 0 AND processed_dishes <= total_dishes)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS menu_sections (
            id TEXT PRIMARY KEY,
            menu_id TEXT NOT NULL REFERENCES menus(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            position INTEGER NOT NULL,
            UNIQUE (menu_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dishes (
            id TEXT PRIMARY KEY,
            menu_id TEXT NOT NULL REFERENCES menus(id) ON DELETE CASCADE,
            section_id TEXT REFERENCES menu_sections(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            price_cents INTEGER,
            currency TEXT NOT NULL,
            raw_price_string TEXT,
            description TEXT,
            image_url TEXT,
            status TEXT NOT NULL
                CHECK (status IN ('PENDING', 'COMPLETE', 'FAILED')),
            failure_reason TEXT,
            position INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_dishes_menu_status ON dishes (menu_id, status)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (menus, menu_sections, dishes)");

    Ok(())
}

pub(crate) fn parse_uuid(value: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}

pub(crate) fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}
