//! Turning one rendered results page into canonical records.

use std::collections::HashSet;
use std::sync::Mutex;

use url::Url;

use crate::assemble::assemble;
use crate::error::AppError;
use crate::models::{RenderedPage, VehicleCategory, VehicleRecord};
use crate::site::{SiteConfig, SiteLayout};
use crate::spec_table::SpecTable;
use crate::traits::{ListingParser, VehicleStore};

/// Everything the harvester needs to know about one site and category.
#[derive(Debug, Clone)]
pub struct HarvestTarget {
    pub site: &'static SiteConfig,
    pub category: VehicleCategory,
    pub layout: SiteLayout,
    pub table: SpecTable,
    pub base_url: Url,
}

impl HarvestTarget {
    /// Fails with [`AppError::ConfigError`] for sites without a results-page
    /// layout or without a spec table for `category`.
    pub fn new(site: &'static SiteConfig, category: VehicleCategory) -> Result<Self, AppError> {
        let layout = site.layout.ok_or_else(|| {
            AppError::ConfigError(format!("{} has no results-page layout", site.name))
        })?;
        let table = site.spec_table(category).ok_or_else(|| {
            AppError::ConfigError(format!("{} has no {} spec table", site.name, category))
        })?;

        Ok(Self {
            site,
            category,
            layout,
            table,
            base_url: site.base()?,
        })
    }
}

/// Reads every listing on `page` and assembles the records.
///
/// Listings flagged by the layout's skip marker, and listings that do not
/// assemble, are dropped. A link repeated on the same page is kept once.
pub fn harvest_page<P: ListingParser>(
    parser: &P,
    page: &RenderedPage,
    target: &HarvestTarget,
) -> Result<Vec<VehicleRecord>, AppError> {
    let listings = parser.parse(page, &target.layout)?;
    let found = listings.len();

    let mut links = HashSet::new();
    let records: Vec<VehicleRecord> = listings
        .iter()
        .filter(|listing| {
            let skip = match (target.layout.skip_when_misc_contains, &listing.misc) {
                (Some(marker), Some(misc)) => misc.to_lowercase().contains(marker),
                _ => false,
            };
            if skip {
                tracing::debug!(link = ?listing.link, "Listing skipped by misc marker");
            }
            !skip
        })
        .filter_map(|listing| assemble(listing, &target.table, &target.base_url))
        .filter(|record| links.insert(record.link.clone()))
        .collect();

    tracing::debug!(
        url = %page.requested_url,
        found,
        assembled = records.len(),
        "Page harvested"
    );
    Ok(records)
}

/// Drops records whose link was already seen during this run or already
/// exists in the store. Every link is added to `seen`.
///
/// A failed existence check is logged and the record is kept; the duplicate
/// reconciler collapses any resulting copies.
pub async fn filter_new<S: VehicleStore>(
    store: &S,
    category: VehicleCategory,
    records: Vec<VehicleRecord>,
    seen: &Mutex<HashSet<String>>,
) -> Vec<VehicleRecord> {
    let mut fresh = Vec::with_capacity(records.len());

    for record in records {
        let first_sighting = seen
            .lock()
            .map(|mut seen| seen.insert(record.link.clone()))
            .unwrap_or(true);
        if !first_sighting {
            continue;
        }

        match store.exists_by_link(category, &record.link).await {
            Ok(true) => {}
            Ok(false) => fresh.push(record),
            Err(error) => {
                tracing::warn!(link = %record.link, %error, "Existence check failed, keeping record");
                fresh.push(record);
            }
        }
    }

    fresh
}
