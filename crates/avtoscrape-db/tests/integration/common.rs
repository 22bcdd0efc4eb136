use avtoscrape_core::models::{VehicleCategory, VehicleRecord, VehicleState};
use avtoscrape_db::Database;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

/// Spins up PostgreSQL, applies the embedded migrations and returns the
/// database facade.
///
/// The `ContainerAsync` must be kept in scope for the test duration;
/// dropping it stops the container.
pub async fn setup_test_db() -> (Database, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "avtoscrape_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let connection_string =
        format!("postgresql://postgres:postgres@{host}:{port}/avtoscrape_test");

    // The server restarts once after init; retry until it stays up.
    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!("Failed to connect to database after {MAX_RETRIES} retries: {e}");
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    let db = Database::prepare(pool)
        .await
        .expect("Failed to prepare the vehicle store");
    (db, container)
}

pub fn car(link: &str) -> VehicleRecord {
    VehicleRecord {
        make: Some("BMW".into()),
        model: Some("Serija 3".into()),
        price_eur: Some(25_000),
        first_registration: Some(2020),
        mileage_km: Some(50_000),
        fuel_type: Some("Bencin".into()),
        gearbox: None,
        engine_ccm: Some(2000),
        engine_kw: Some(150),
        engine_hp: Some(204),
        battery_kwh: None,
        state: VehicleState::Rabljeno,
        image_url: Some("https://images.avto.net/1.jpg".into()),
        link: link.into(),
    }
}

/// Every record stored under `link`, oldest first.
pub async fn find_by_link(pool: &PgPool, category: VehicleCategory, link: &str) -> Vec<VehicleRecord> {
    sqlx::query_as::<_, StoredVehicle>(
        r#"
        SELECT make, model, price_eur, first_registration, mileage_km, fuel_type, gearbox,
               engine_ccm, engine_kw, engine_hp, battery_kwh, state, image_url, link
        FROM vehicles
        WHERE category = $1 AND link = $2
        ORDER BY seq
        "#,
    )
    .bind(category.as_str())
    .bind(link)
    .fetch_all(pool)
    .await
    .expect("Failed to read vehicles")
    .into_iter()
    .map(StoredVehicle::into_record)
    .collect()
}

pub async fn count(pool: &PgPool, category: VehicleCategory) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM vehicles WHERE category = $1")
        .bind(category.as_str())
        .fetch_one(pool)
        .await
        .expect("Failed to count vehicles")
}

#[derive(sqlx::FromRow)]
struct StoredVehicle {
    make: Option<String>,
    model: Option<String>,
    price_eur: Option<i64>,
    first_registration: Option<i32>,
    mileage_km: Option<i64>,
    fuel_type: Option<String>,
    gearbox: Option<String>,
    engine_ccm: Option<i32>,
    engine_kw: Option<i32>,
    engine_hp: Option<i32>,
    battery_kwh: Option<f64>,
    state: String,
    image_url: Option<String>,
    link: String,
}

impl StoredVehicle {
    fn into_record(self) -> VehicleRecord {
        VehicleRecord {
            make: self.make,
            model: self.model,
            price_eur: self.price_eur,
            first_registration: self.first_registration,
            mileage_km: self.mileage_km,
            fuel_type: self.fuel_type,
            gearbox: self.gearbox,
            engine_ccm: self.engine_ccm,
            engine_kw: self.engine_kw,
            engine_hp: self.engine_hp,
            battery_kwh: self.battery_kwh,
            state: VehicleState::from_label(&self.state),
            image_url: self.image_url,
            link: self.link,
        }
    }
}
