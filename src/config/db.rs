// src/config/db.rs
// DOCUMENTATION: Database connection pool initialization
// PURPOSE: Setup the PostgreSQL pool and bring the schema up to date

use crate::config::Config;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Initialize PostgreSQL connection pool
/// DOCUMENTATION: Creates the pool, verifies it and applies pending migrations
/// Called once during application startup in main.rs
pub async fn init_db_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    log::info!("Initializing database pool");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_connection_timeout))
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    log::info!("DB connection successful");
    Ok(pool)
}
