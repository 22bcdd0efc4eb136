use std::time::Duration;

use avtoscrape_core::AppError;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use crate::config::DatabaseConfig;
use crate::repository::VehicleRepository;

static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// The vehicle store's PostgreSQL pool, ready for use.
///
/// A `Database` only exists once the embedded migrations have run and the
/// `vehicles` table is confirmed present, so a job never starts against a
/// half-initialised schema.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connects, migrates and checks the schema.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Cannot reach vehicle store: {e}")))?;

        tracing::debug!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Self::prepare(pool).await
    }

    /// Brings an existing pool up to the current schema. Safe to repeat.
    pub async fn prepare(pool: PgPool) -> Result<Self, AppError> {
        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Migration failed: {e}")))?;

        let db = Self { pool };
        db.ensure_vehicles_table().await?;
        Ok(db)
    }

    async fn ensure_vehicles_table(&self) -> Result<(), AppError> {
        let present =
            sqlx::query_scalar::<_, bool>("SELECT to_regclass('vehicles') IS NOT NULL")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if !present {
            return Err(AppError::DatabaseError(
                "vehicles table missing after migrations".into(),
            ));
        }
        Ok(())
    }

    pub fn vehicle_repo(&self) -> VehicleRepository {
        VehicleRepository::new(self.pool.clone())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
