use avtoscrape_core::error::AppError;
use avtoscrape_core::models::{DuplicateGroup, VehicleCategory, VehicleRecord};
use avtoscrape_core::traits::VehicleStore;
use sqlx::{PgPool, Pool, Postgres, QueryBuilder};
use uuid::Uuid;

/// Postgres caps bind parameters at 65535 per statement; 15 per row.
const INSERT_CHUNK: usize = 1000;

/// Vehicle persistence in PostgreSQL.
///
/// All categories live in one `vehicles` table partitioned by its `category`
/// column. `seq` preserves insertion order, which is the storage order used
/// for namespace listings and duplicate groups.
#[derive(Clone)]
pub struct VehicleRepository {
    pool: Pool<Postgres>,
}

impl VehicleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn exists_by_link(
        &self,
        category: VehicleCategory,
        link: &str,
    ) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM vehicles WHERE category = $1 AND link = $2)",
        )
        .bind(category.as_str())
        .bind(link)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))
    }

    /// Inserts in chunks; a failed chunk aborts the rest and reports the error.
    pub async fn insert_many(
        &self,
        category: VehicleCategory,
        records: &[VehicleRecord],
    ) -> Result<u64, AppError> {
        let mut inserted = 0;

        for chunk in records.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO vehicles (category, make, model, price_eur, first_registration, \
                 mileage_km, fuel_type, gearbox, engine_ccm, engine_kw, engine_hp, battery_kwh, \
                 state, image_url, link) ",
            );

            builder.push_values(chunk, |mut row, record| {
                row.push_bind(category.as_str())
                    .push_bind(record.make.clone())
                    .push_bind(record.model.clone())
                    .push_bind(record.price_eur)
                    .push_bind(record.first_registration)
                    .push_bind(record.mileage_km)
                    .push_bind(record.fuel_type.clone())
                    .push_bind(record.gearbox.clone())
                    .push_bind(record.engine_ccm)
                    .push_bind(record.engine_kw)
                    .push_bind(record.engine_hp)
                    .push_bind(record.battery_kwh)
                    .push_bind(record.state.as_str())
                    .push_bind(record.image_url.clone())
                    .push_bind(record.link.clone());
            });

            let result = builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;
            inserted += result.rows_affected();
        }

        Ok(inserted)
    }

    pub async fn links_in_namespace(
        &self,
        category: VehicleCategory,
        namespace: &str,
    ) -> Result<Vec<String>, AppError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT link FROM vehicles
            WHERE category = $1 AND starts_with(link, $2)
            ORDER BY seq
            "#,
        )
        .bind(category.as_str())
        .bind(namespace)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))
    }

    pub async fn delete_by_links(
        &self,
        category: VehicleCategory,
        links: &[String],
    ) -> Result<u64, AppError> {
        if links.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM vehicles WHERE category = $1 AND link = ANY($2)")
            .bind(category.as_str())
            .bind(links)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }

    /// Links stored more than once, each with its ids in storage order.
    /// Groups are ordered by their first stored row.
    pub async fn duplicate_groups(
        &self,
        category: VehicleCategory,
        namespace: Option<&str>,
    ) -> Result<Vec<DuplicateGroup>, AppError> {
        let rows = sqlx::query_as::<_, (String, Vec<Uuid>)>(
            r#"
            SELECT link, array_agg(id ORDER BY seq) AS ids
            FROM vehicles
            WHERE category = $1 AND ($2::text IS NULL OR starts_with(link, $2))
            GROUP BY link
            HAVING COUNT(*) > 1
            ORDER BY MIN(seq)
            "#,
        )
        .bind(category.as_str())
        .bind(namespace)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(link, ids)| DuplicateGroup { link, ids })
            .collect())
    }

    pub async fn delete_by_ids(
        &self,
        category: VehicleCategory,
        ids: &[Uuid],
    ) -> Result<u64, AppError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM vehicles WHERE category = $1 AND id = ANY($2)")
            .bind(category.as_str())
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

// -- Trait implementation --

impl VehicleStore for VehicleRepository {
    async fn exists_by_link(&self, category: VehicleCategory, link: &str) -> Result<bool, AppError> {
        VehicleRepository::exists_by_link(self, category, link).await
    }

    async fn insert_many(
        &self,
        category: VehicleCategory,
        records: &[VehicleRecord],
    ) -> Result<u64, AppError> {
        VehicleRepository::insert_many(self, category, records).await
    }

    async fn links_in_namespace(
        &self,
        category: VehicleCategory,
        namespace: &str,
    ) -> Result<Vec<String>, AppError> {
        VehicleRepository::links_in_namespace(self, category, namespace).await
    }

    async fn delete_by_links(
        &self,
        category: VehicleCategory,
        links: &[String],
    ) -> Result<u64, AppError> {
        VehicleRepository::delete_by_links(self, category, links).await
    }

    async fn duplicate_groups(
        &self,
        category: VehicleCategory,
        namespace: Option<&str>,
    ) -> Result<Vec<DuplicateGroup>, AppError> {
        VehicleRepository::duplicate_groups(self, category, namespace).await
    }

    async fn delete_by_ids(&self, category: VehicleCategory, ids: &[Uuid]) -> Result<u64, AppError> {
        VehicleRepository::delete_by_ids(self, category, ids).await
    }
}
