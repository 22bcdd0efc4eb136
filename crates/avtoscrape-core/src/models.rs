use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Spec-table key → value text, as read from one listing's spec rows.
pub type SpecMap = HashMap<String, String>;

/// Vehicle category. Each category is stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleCategory {
    Car,
    Motorcycle,
    Truck,
}

impl VehicleCategory {
    pub const ALL: [VehicleCategory; 3] = [
        VehicleCategory::Car,
        VehicleCategory::Motorcycle,
        VehicleCategory::Truck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleCategory::Car => "car",
            VehicleCategory::Motorcycle => "motorcycle",
            VehicleCategory::Truck => "truck",
        }
    }
}

impl fmt::Display for VehicleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VehicleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "car" | "cars" => Ok(VehicleCategory::Car),
            "motorcycle" | "motorcycles" | "moto" => Ok(VehicleCategory::Motorcycle),
            "truck" | "trucks" => Ok(VehicleCategory::Truck),
            _ => Err(format!("Unknown vehicle category: {}", s)),
        }
    }
}

/// New or used, using the marketplace's own labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleState {
    #[serde(rename = "NOVO")]
    Novo,
    #[default]
    #[serde(rename = "RABLJENO")]
    Rabljeno,
}

impl VehicleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleState::Novo => "NOVO",
            VehicleState::Rabljeno => "RABLJENO",
        }
    }

    /// Maps a site label to a state. Only an explicit "new" label yields
    /// [`VehicleState::Novo`]; anything else counts as used.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "NOVO" | "NEW" => VehicleState::Novo,
            _ => VehicleState::Rabljeno,
        }
    }
}

impl fmt::Display for VehicleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The unified vehicle schema persisted to the store.
///
/// `link` is the sole external identity: two records with the same link
/// are duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub make: Option<String>,
    pub model: Option<String>,
    pub price_eur: Option<i64>,
    pub first_registration: Option<i32>,
    pub mileage_km: Option<i64>,
    pub fuel_type: Option<String>,
    pub gearbox: Option<String>,
    pub engine_ccm: Option<i32>,
    pub engine_kw: Option<i32>,
    pub engine_hp: Option<i32>,
    pub battery_kwh: Option<f64>,
    pub state: VehicleState,
    pub image_url: Option<String>,
    pub link: String,
}

impl VehicleRecord {
    /// A record carrying only its identity; every other field is empty.
    pub fn new(link: impl Into<String>) -> Self {
        Self {
            make: None,
            model: None,
            price_eur: None,
            first_registration: None,
            mileage_km: None,
            fuel_type: None,
            gearbox: None,
            engine_ccm: None,
            engine_kw: None,
            engine_hp: None,
            battery_kwh: None,
            state: VehicleState::default(),
            image_url: None,
            link: link.into(),
        }
    }
}

/// Unstructured fragments of one listing, read from a results page.
///
/// Lives only while its page is being processed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawListing {
    /// Display name split on whitespace.
    pub name_parts: Vec<String>,
    pub regular_price: Option<String>,
    pub special_price: Option<String>,
    /// Two-cell spec rows keyed by their left cell.
    pub spec_pairs: SpecMap,
    /// Spec values without labels, in page order.
    pub spec_values: Vec<String>,
    pub engine: Option<String>,
    pub misc: Option<String>,
    /// Image URL attribute as written in the markup (possibly relative).
    pub image: Option<String>,
    /// Detail link attribute as written in the markup (possibly relative).
    pub link: Option<String>,
}

impl RawListing {
    pub fn with_name(name: &str) -> Self {
        Self {
            name_parts: name.split_whitespace().map(str::to_string).collect(),
            ..Self::default()
        }
    }
}

/// A page as returned by the rendering collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub requested_url: String,
    /// URL after redirects.
    pub final_url: String,
    pub status: u16,
    pub html: String,
}

impl RenderedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Server errors and rate limiting, which say nothing about the listing.
    pub fn is_transient_failure(&self) -> bool {
        self.status == 429 || (500..600).contains(&self.status)
    }
}

/// Stored records sharing one link, in storage order.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub link: String,
    pub ids: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_roundtrip() {
        for category in VehicleCategory::ALL {
            let parsed: VehicleCategory = category.as_str().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert_eq!("moto".parse::<VehicleCategory>(), Ok(VehicleCategory::Motorcycle));
        assert!("boat".parse::<VehicleCategory>().is_err());
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(VehicleState::from_label("NOVO"), VehicleState::Novo);
        assert_eq!(VehicleState::from_label(" novo "), VehicleState::Novo);
        assert_eq!(VehicleState::from_label("RABLJENO"), VehicleState::Rabljeno);
        assert_eq!(VehicleState::from_label("TESTNO"), VehicleState::Rabljeno);
    }

    #[test]
    fn test_state_serializes_as_site_label() {
        let json = serde_json::to_value(VehicleState::Novo).unwrap();
        assert_eq!(json, serde_json::json!("NOVO"));
    }

    #[test]
    fn test_rendered_page_success_range() {
        let mut page = RenderedPage {
            requested_url: "https://example.com".into(),
            final_url: "https://example.com".into(),
            status: 200,
            html: String::new(),
        };
        assert!(page.is_success());
        page.status = 404;
        assert!(!page.is_success());
    }

    #[test]
    fn test_raw_listing_with_name_splits_whitespace() {
        let listing = RawListing::with_name("  Land   Rover Range\nRover ");
        assert_eq!(listing.name_parts, vec!["Land", "Rover", "Range", "Rover"]);
    }
}
