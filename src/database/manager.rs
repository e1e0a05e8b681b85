use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::DatabaseConfig;

/// Errors from the record store
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("PR {0} not found")]
    NotFound(Uuid),

    /// The write would leave `end_date` before `start_date`.
    #[error("PR {0} would end before it starts")]
    InvalidWindow(Uuid),

    #[error("Invalid stored value: {0}")]
    Decode(String),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Owns the PostgreSQL connection pool shared by every request.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// Build the pool without connecting; the first query establishes a
    /// connection so the process can start while the database is still down.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let url = url::Url::parse(&config.url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(DatabaseError::InvalidDatabaseUrl);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_lazy(url.as_str())?;

        info!(
            "Created database pool for {}{} (max {} connections)",
            url.host_str().unwrap_or("localhost"),
            url.path(),
            config.max_connections
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply embedded migrations from `./migrations`.
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Close the pool (e.g., on shutdown)
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }
}
