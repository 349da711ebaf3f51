//! Connection pools for the main and lookup databases

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Database configuration is invalid or missing
    #[error("Database configuration error: {0}. Check XFER_DATABASE__MAIN_URL and XFER_DATABASE__LOOKUP_URL.")]
    Config(String),
}

impl DbError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Settings for one connection pool
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Pool label used in logs ("main" or "lookup")
    pub name: &'static str,
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

pub async fn create_pool(config: &DbConfig) -> DbResult<PgPool> {
    if config.url.trim().is_empty() {
        return Err(DbError::config(format!("{} database URL is empty", config.name)));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.url)
        .await?;

    tracing::info!(
        pool = config.name,
        max_connections = config.max_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> DbResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(DbError::from)
}
