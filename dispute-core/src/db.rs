use crate::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

/// Number of dispute rows currently stored, or `None` before the schema exists.
pub async fn dispute_count(pool: &PgPool) -> Result<Option<i64>, sqlx::Error> {
    let exists: (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = 'disputes')",
    )
    .fetch_one(pool)
    .await?;
    if !exists.0 {
        return Ok(None);
    }
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM disputes")
        .fetch_one(pool)
        .await?;
    Ok(Some(row.0))
}
