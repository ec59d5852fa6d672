use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

use crate::app_config::DatabaseConfig;

/// Shared Postgres pool. Connections are acquired per statement or per
/// transaction and returned on drop.
#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await?;

        tracing::info!(
            "Connected to Postgres (max {} connections, {}s acquire timeout)",
            config.max_connections, config.acquire_timeout_seconds
        );
        Ok(Self { pool })
    }

    /// Applies `migrations/` (schema plus seed categories, tables and menu).
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        tracing::info!("Applying order schema migrations");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        tracing::info!("Schema is up to date");
        Ok(())
    }
}
