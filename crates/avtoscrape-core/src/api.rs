//! JSON marketplace APIs: payload decoding, code translation and full-refresh
//! sync.
//!
//! Each API returns its whole live inventory in one response, so a sync
//! inserts unseen links and then deletes stored links the response no longer
//! contains.

use std::collections::HashSet;
use std::sync::Mutex;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::AppError;
use crate::harvest::filter_new;
use crate::models::{VehicleCategory, VehicleRecord, VehicleState};
use crate::retry::{BackoffPolicy, retry_with_backoff};
use crate::site::{SiteConfig, SiteId};
use crate::staleness::purge_absent;
use crate::traits::{Fetcher, VehicleStore};

const KW_TO_HP: f64 = 1.36;

#[derive(Debug, Deserialize)]
struct DoberAvtoResponse {
    #[serde(default)]
    results: Vec<DoberAvtoListing>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DoberAvtoListing {
    post_id: Option<Value>,
    manufacturer_name: Option<String>,
    model_name: Option<String>,
    registration_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    odometer: Option<f64>,
    fuel_type: Option<String>,
    transmission: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    engine_displacement: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    engine_power: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    price: Option<f64>,
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AutolinaResponse {
    #[serde(default)]
    data: AutolinaData,
}

#[derive(Debug, Default, Deserialize)]
struct AutolinaData {
    #[serde(default)]
    cars: Vec<AutolinaListing>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutolinaListing {
    slug: Option<String>,
    car_id: Option<Value>,
    make_name: Option<String>,
    model_name: Option<String>,
    construction_year: Option<Value>,
    #[serde(default, deserialize_with = "lenient_number")]
    mileage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_code")]
    fuel_type: Option<i64>,
    #[serde(default, deserialize_with = "lenient_code")]
    gearbox_type: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    power_output: Option<f64>,
    #[serde(default)]
    is_new: bool,
    #[serde(default, deserialize_with = "lenient_number")]
    price: Option<f64>,
    #[serde(default)]
    pics: Vec<String>,
}

/// Accepts a JSON number or a numeric string. Anything else is `None`, so
/// one malformed field never rejects the whole inventory.
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().replace(',', ".").parse().ok(),
        _ => None,
    })
}

fn lenient_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}

pub fn doberavto_transmission(code: Option<&str>) -> &'static str {
    match code {
        Some("M") => "ročni menjalnik",
        Some("A") => "avtomatski menjalnik",
        _ => "neznan",
    }
}

pub fn doberavto_fuel(code: Option<&str>) -> &'static str {
    match code {
        Some("DIESEL") => "diesel motor",
        Some("PETROL") => "bencinski motor",
        Some("ELECTRIC") => "električni pogon",
        Some("HYBRID") => "hibridni pogon",
        _ => "neznan",
    }
}

pub fn autolina_gearbox(code: Option<i64>) -> &'static str {
    match code {
        Some(1201) => "Automatic",
        Some(1202) => "Manual",
        _ => "Unknown",
    }
}

pub fn autolina_fuel(code: Option<i64>) -> &'static str {
    match code {
        Some(1501) => "Petrol",
        Some(1502) => "Diesel",
        Some(1503) => "Electric",
        Some(1504) => "Hybrid",
        _ => "Unknown",
    }
}

/// Identifier text from a JSON number or string.
fn id_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn whole(value: Option<f64>) -> Option<i64> {
    value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round() as i64)
}

fn small(value: Option<f64>) -> Option<i32> {
    whole(value).and_then(|v| i32::try_from(v).ok())
}

fn horsepower(kw: Option<f64>) -> Option<i32> {
    small(kw.filter(|kw| *kw > 0.0).map(|kw| kw * KW_TO_HP))
}

fn year_from_date(date: Option<&str>) -> Option<i32> {
    date.and_then(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .map(|d| chrono::Datelike::year(&d))
}

fn year_from_value(value: Option<&Value>) -> Option<i32> {
    match value? {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn translate_doberavto(listing: DoberAvtoListing) -> Option<VehicleRecord> {
    let post_id = id_text(listing.post_id.as_ref())?;
    let mut record = VehicleRecord::new(format!("https://www.doberavto.si/oglas/{post_id}"));
    record.make = listing.manufacturer_name;
    record.model = listing.model_name;
    record.first_registration = year_from_date(listing.registration_date.as_deref());
    record.mileage_km = whole(listing.odometer);
    record.fuel_type = Some(doberavto_fuel(listing.fuel_type.as_deref()).to_string());
    record.gearbox = Some(doberavto_transmission(listing.transmission.as_deref()).to_string());
    record.engine_ccm = small(listing.engine_displacement);
    record.engine_kw = small(listing.engine_power);
    record.engine_hp = horsepower(listing.engine_power);
    record.state = VehicleState::Rabljeno;
    record.price_eur = whole(listing.price);
    record.image_url = listing.image_url;
    Some(record)
}

fn translate_autolina(listing: AutolinaListing) -> Option<VehicleRecord> {
    let slug = listing.slug.filter(|s| !s.is_empty())?;
    let car_id = id_text(listing.car_id.as_ref())?;
    let mut record = VehicleRecord::new(format!("https://www.autolina.ch/auto/{slug}/{car_id}"));
    record.make = listing.make_name;
    record.model = listing.model_name;
    record.first_registration = year_from_value(listing.construction_year.as_ref());
    record.mileage_km = whole(listing.mileage);
    record.fuel_type = Some(autolina_fuel(listing.fuel_type).to_string());
    record.gearbox = Some(autolina_gearbox(listing.gearbox_type).to_string());
    record.engine_kw = small(listing.power_output);
    record.engine_hp = horsepower(listing.power_output);
    record.state = if listing.is_new {
        VehicleState::Novo
    } else {
        VehicleState::Rabljeno
    };
    record.price_eur = whole(listing.price);
    record.image_url = listing.pics.into_iter().next();
    Some(record)
}

/// Decodes one API response body into canonical records.
///
/// Listings without an identifier are dropped.
pub fn decode(site: SiteId, body: &str) -> Result<Vec<VehicleRecord>, AppError> {
    let (total, records): (usize, Vec<VehicleRecord>) = match site {
        SiteId::DoberAvto => {
            let response: DoberAvtoResponse = serde_json::from_str(body)?;
            (
                response.results.len(),
                response
                    .results
                    .into_iter()
                    .filter_map(translate_doberavto)
                    .collect(),
            )
        }
        SiteId::Autolina => {
            let response: AutolinaResponse = serde_json::from_str(body)?;
            (
                response.data.cars.len(),
                response
                    .data
                    .cars
                    .into_iter()
                    .filter_map(translate_autolina)
                    .collect(),
            )
        }
        other => {
            return Err(AppError::ConfigError(format!(
                "{other} is not a JSON API source"
            )));
        }
    };

    if records.len() < total {
        tracing::warn!(%site, dropped = total - records.len(), "Listings without identifier dropped");
    }
    Ok(records)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub fetched: usize,
    pub inserted: u64,
    /// `None` when the diff was skipped.
    pub deleted: Option<u64>,
}

/// Full-refresh sync of a JSON API site.
pub struct ApiSyncService<F: Fetcher, S: VehicleStore> {
    fetcher: F,
    store: S,
    backoff: BackoffPolicy,
}

impl<F: Fetcher, S: VehicleStore> ApiSyncService<F, S> {
    pub fn new(fetcher: F, store: S) -> Self {
        Self {
            fetcher,
            store,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Fetch → translate → insert unseen links → delete links no longer
    /// listed.
    ///
    /// A failed fetch or undecodable payload aborts before anything is
    /// deleted. An empty inventory never purges.
    pub async fn sync(&self, site: &SiteConfig) -> Result<SyncReport, AppError> {
        if site.layout.is_some() {
            return Err(AppError::ConfigError(format!(
                "{} is not a JSON API source",
                site.name
            )));
        }
        let category = VehicleCategory::Car;
        let url = site.category_url(category).ok_or_else(|| {
            AppError::ConfigError(format!("{} has no API endpoint", site.name))
        })?;

        let fetcher = &self.fetcher;
        let body = retry_with_backoff(&self.backoff, site.name, |_| fetcher.fetch(url)).await?;
        let records = decode(site.id, &body)?;
        let mut report = SyncReport {
            fetched: records.len(),
            ..SyncReport::default()
        };
        tracing::info!(site = site.name, fetched = report.fetched, "API inventory fetched");

        let seen = Mutex::new(HashSet::new());
        let fresh = filter_new(&self.store, category, records, &seen).await;

        if !fresh.is_empty() {
            match self.store.insert_many(category, &fresh).await {
                Ok(count) => {
                    report.inserted = count;
                    tracing::info!(site = site.name, inserted = count, "New listings inserted");
                }
                Err(error) => tracing::warn!(site = site.name, %error, "Insert failed"),
            }
        }

        let live = match seen.into_inner() {
            Ok(live) => live,
            Err(poisoned) => poisoned.into_inner(),
        };
        if live.is_empty() {
            tracing::warn!(site = site.name, "Empty inventory, skipping purge");
            return Ok(report);
        }

        match purge_absent(&self.store, category, site.namespace, &live).await {
            Ok(deleted) => report.deleted = Some(deleted),
            Err(error) => tracing::warn!(site = site.name, %error, "Purge failed"),
        }
        Ok(report)
    }
}
