pub mod models;
pub mod recipes;

use crate::config::DatabaseConfig;
use crate::error::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;
use std::time::Duration;

pub type DbPool = Pool<Sqlite>;

/// Initialize database connection pool
pub async fn init_pool(database_url: &str) -> Result<DbPool> {
    ensure_parent_dir(database_url).await?;

    let pool = SqlitePool::connect(&with_create_mode(database_url)).await?;
    Ok(pool)
}

/// Initialize database connection pool with custom configuration
pub async fn init_pool_with_config(config: &DatabaseConfig) -> Result<DbPool> {
    if is_memory_url(&config.url) {
        return init_memory_pool().await;
    }

    ensure_parent_dir(&config.url).await?;

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
        .connect(&with_create_mode(&config.url))
        .await?;

    Ok(pool)
}

/// Single-connection in-memory pool. Every SQLite memory connection is its own
/// database, so the pool must never open a second one or recycle the first.
pub async fn init_memory_pool() -> Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    Ok(pool)
}

/// Run database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn is_memory_url(url: &str) -> bool {
    url == "sqlite::memory:" || url == ":memory:"
}

fn with_create_mode(url: &str) -> String {
    if url.starts_with("sqlite:") && !is_memory_url(url) && !url.contains('?') {
        format!("{url}?mode=rwc")
    } else {
        url.to_string()
    }
}

// Create data directory if it doesn't exist (for SQLite)
async fn ensure_parent_dir(url: &str) -> Result<()> {
    if is_memory_url(url) {
        return Ok(());
    }
    if let Some(path) = url.strip_prefix("sqlite:") {
        let path = path.trim_start_matches("//");
        let path = path.split('?').next().unwrap_or(path);
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_memory_pool_runs_migrations() {
        let pool = init_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_init_pool_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("nested/recipes.db").display());
        let pool = init_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        assert!(dir.path().join("nested/recipes.db").exists());
    }

    #[test]
    fn test_create_mode_suffix() {
        assert_eq!(with_create_mode("sqlite:./data/r.db"), "sqlite:./data/r.db?mode=rwc");
        assert_eq!(with_create_mode("sqlite::memory:"), "sqlite::memory:");
    }
}
