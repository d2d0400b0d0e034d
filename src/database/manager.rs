use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::info;

use crate::config;
use crate::database::store::StoreError;

/// Builds the shared connection pool. One database, one pool; everything else
/// (transactions, typed queries) goes through `PgEntityStore`.
pub struct DatabaseManager;

impl DatabaseManager {
    pub async fn connect() -> Result<PgPool, StoreError> {
        let base = std::env::var("DATABASE_URL")
            .map_err(|_| StoreError::ConfigMissing("DATABASE_URL"))?;

        // Reject malformed URLs up front instead of surfacing an opaque
        // connect error later.
        url::Url::parse(&base).map_err(|_| StoreError::InvalidDatabaseUrl)?;

        let db_config = &config::config().database;
        let pool = PgPoolOptions::new()
            .max_connections(db_config.max_connections)
            .acquire_timeout(Duration::from_secs(db_config.connect_timeout_secs))
            .connect(&base)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        info!("Created database pool");
        Ok(pool)
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(pool: &PgPool) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }
}
