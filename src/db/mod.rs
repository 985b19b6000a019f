mod models;
mod seeders;

pub use models::*;
pub use seeders::DEFAULT_SIGNUP_ROLE;

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

pub type DbPool = SqlitePool;

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        // Strip SQL comment lines (lines starting with --)
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

/// Open (creating if needed) the database file under `data_dir` and migrate it.
pub async fn init(data_dir: &Path) -> Result<DbPool> {
    let db_path = data_dir.join("superclient.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    info!("Initializing database at {}", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    // Enable WAL mode for better concurrency
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;

    prepare(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// Open a private in-memory database.
///
/// Every connection to `sqlite::memory:` is a separate database, so the pool is
/// pinned to a single connection that is never recycled.
pub async fn init_memory() -> Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    prepare(&pool).await?;
    Ok(pool)
}

/// Close the pool, waiting for checked-out connections to be returned
pub async fn close(pool: &DbPool) {
    pool.close().await;
    info!("Database closed");
}

async fn prepare(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    run_migrations(pool).await?;

    seeders::seed_roles(pool).await?;
    seeders::seed_modules(pool).await?;
    Ok(())
}

async fn has_column(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let found: Option<(String,)> =
        sqlx::query_as("SELECT name FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

async fn has_table(pool: &SqlitePool, table: &str) -> Result<bool> {
    let found: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: Initial schema
    execute_sql(pool, include_str!("../../migrations/001_initial.sql")).await?;

    // Migration 002: Per-user module toggles
    if !has_column(pool, "user_preferences", "module_pipeline").await? {
        execute_sql(pool, include_str!("../../migrations/002_preference_modules.sql")).await?;
    }

    // Migration 003: Language and notification preferences
    if !has_column(pool, "user_preferences", "language").await? {
        execute_sql(
            pool,
            include_str!("../../migrations/003_preference_notifications.sql"),
        )
        .await?;
    }

    // Migration 004: Profile contact lists
    if !has_column(pool, "user_profiles", "phones").await? {
        execute_sql(pool, include_str!("../../migrations/004_profile_contact_lists.sql")).await?;
    }

    // Migration 005: Keyed user storage documents
    if !has_table(pool, "user_storage").await? {
        execute_sql(pool, include_str!("../../migrations/005_user_storage.sql")).await?;
    }

    info!("Migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_database_is_migrated_and_seeded() {
        let pool = init_memory().await.unwrap();

        assert!(has_table(&pool, "user_storage").await.unwrap());
        assert!(has_column(&pool, "user_preferences", "notify_product_updates")
            .await
            .unwrap());
        assert!(has_column(&pool, "user_profiles", "comments").await.unwrap());

        let roles: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM roles")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(roles.0, 4);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = init_memory().await.unwrap();
        prepare(&pool).await.unwrap();

        let modules: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM modules")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(modules.0, 4);
    }

    #[tokio::test]
    async fn test_file_database_reopens() {
        let dir = tempfile::tempdir().unwrap();

        let pool = init(dir.path()).await.unwrap();
        sqlx::query("INSERT INTO users (name, email, password_hash, created_at) VALUES (?, ?, ?, ?)")
            .bind("Ana")
            .bind("ana@example.com")
            .bind("x")
            .bind("2026-01-01T00:00:00Z")
            .execute(&pool)
            .await
            .unwrap();
        close(&pool).await;

        let pool = init(dir.path()).await.unwrap();
        let users: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(users.0, 1);
    }
}
