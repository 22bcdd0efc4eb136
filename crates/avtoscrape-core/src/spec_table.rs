//! Declarative field tables: canonical field → (source, transform).
//!
//! A [`SpecTable`] holds no control flow. The record assembler walks it,
//! selects each entry's source from a [`RawListing`] and applies the entry's
//! pure transform.

use url::Url;

use crate::error::FieldError;
use crate::extract::{self, EngineMode};
use crate::models::{RawListing, VehicleState};

/// Canonical record fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Make,
    Model,
    PriceEur,
    FirstRegistration,
    MileageKm,
    FuelType,
    Gearbox,
    EngineCcm,
    EngineKw,
    EngineHp,
    BatteryKwh,
    State,
    ImageUrl,
    Link,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Make => "make",
            Field::Model => "model",
            Field::PriceEur => "price_eur",
            Field::FirstRegistration => "first_registration",
            Field::MileageKm => "mileage_km",
            Field::FuelType => "fuel_type",
            Field::Gearbox => "gearbox",
            Field::EngineCcm => "engine_ccm",
            Field::EngineKw => "engine_kw",
            Field::EngineHp => "engine_hp",
            Field::BatteryKwh => "battery_kwh",
            Field::State => "state",
            Field::ImageUrl => "image_url",
            Field::Link => "link",
        }
    }
}

/// Where a field's raw value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// The whitespace-tokenized display name.
    NameParts,
    /// The value of the labelled spec row with this key.
    SpecRow(&'static str),
    /// The unlabelled spec value at this position.
    SpecValue(usize),
    /// The engine descriptor text.
    Engine,
    /// Free text listing extras.
    Misc,
    /// Regular and special price text, in that order.
    PricePair,
    /// Image element attribute.
    Image,
    /// Detail link element attribute.
    Link,
}

impl FieldSource {
    pub fn select<'a>(&self, listing: &'a RawListing) -> SourceValue<'a> {
        match self {
            FieldSource::NameParts => SourceValue::Tokens(&listing.name_parts),
            FieldSource::SpecRow(key) => {
                SourceValue::Text(listing.spec_pairs.get(*key).map(String::as_str))
            }
            FieldSource::SpecValue(index) => {
                SourceValue::Text(listing.spec_values.get(*index).map(String::as_str))
            }
            FieldSource::Engine => SourceValue::Text(listing.engine.as_deref()),
            FieldSource::Misc => SourceValue::Text(listing.misc.as_deref()),
            FieldSource::PricePair => SourceValue::Prices(
                listing.regular_price.as_deref(),
                listing.special_price.as_deref(),
            ),
            FieldSource::Image => SourceValue::Text(listing.image.as_deref()),
            FieldSource::Link => SourceValue::Text(listing.link.as_deref()),
        }
    }
}

/// A selected source value, borrowed from the raw listing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceValue<'a> {
    Tokens(&'a [String]),
    Text(Option<&'a str>),
    Prices(Option<&'a str>, Option<&'a str>),
}

impl<'a> SourceValue<'a> {
    fn tokens(self) -> Result<&'a [String], FieldError> {
        match self {
            SourceValue::Tokens(tokens) => Ok(tokens),
            _ => Err(FieldError::SourceMismatch("non-token")),
        }
    }

    /// Trimmed, non-empty text.
    fn text(self) -> Result<Option<&'a str>, FieldError> {
        match self {
            SourceValue::Text(text) => Ok(text.map(str::trim).filter(|t| !t.is_empty())),
            _ => Err(FieldError::SourceMismatch("non-text")),
        }
    }
}

/// A transform's typed output.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    State(VehicleState),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Int(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
            FieldValue::State(_) => "state",
        }
    }

    fn from_int<T: Into<i64>>(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, |v| FieldValue::Int(v.into()))
    }

    fn from_text(value: Option<impl Into<String>>) -> Self {
        value.map_or(FieldValue::Null, |v| FieldValue::Text(v.into()))
    }
}

/// Values shared by every transform of one listing.
#[derive(Debug, Clone, Copy)]
pub struct FieldContext<'a> {
    /// The make resolved before any other field.
    pub make: Option<&'a str>,
    /// Base for resolving relative image and link attributes.
    pub base_url: &'a Url,
}

pub type Transform = fn(SourceValue<'_>, &FieldContext<'_>) -> Result<FieldValue, FieldError>;

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: Field,
    pub source: FieldSource,
    pub transform: Transform,
}

impl FieldSpec {
    pub const fn new(field: Field, source: FieldSource, transform: Transform) -> Self {
        Self {
            field,
            source,
            transform,
        }
    }

    pub fn evaluate(
        &self,
        listing: &RawListing,
        ctx: &FieldContext<'_>,
    ) -> Result<FieldValue, FieldError> {
        (self.transform)(self.source.select(listing), ctx)
    }
}

/// One category's field table for one site.
#[derive(Debug, Clone, Copy)]
pub struct SpecTable {
    pub name: &'static str,
    pub entries: &'static [FieldSpec],
}

impl SpecTable {
    pub fn entry(&self, field: Field) -> Option<&FieldSpec> {
        self.entries.iter().find(|e| e.field == field)
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.entries.iter().map(|e| e.field)
    }
}

// Transforms.

pub fn make(source: SourceValue<'_>, _ctx: &FieldContext<'_>) -> Result<FieldValue, FieldError> {
    Ok(FieldValue::from_text(extract::resolve_make(source.tokens()?)))
}

pub fn model(source: SourceValue<'_>, ctx: &FieldContext<'_>) -> Result<FieldValue, FieldError> {
    let tokens = source.tokens()?;
    Ok(FieldValue::from_text(
        ctx.make.and_then(|make| extract::resolve_model(make, tokens)),
    ))
}

pub fn price(source: SourceValue<'_>, _ctx: &FieldContext<'_>) -> Result<FieldValue, FieldError> {
    match source {
        SourceValue::Prices(regular, special) => {
            Ok(FieldValue::from_int(extract::extract_price(regular, special)))
        }
        _ => Err(FieldError::SourceMismatch("non-price")),
    }
}

/// Text as-is.
pub fn text(source: SourceValue<'_>, _ctx: &FieldContext<'_>) -> Result<FieldValue, FieldError> {
    Ok(FieldValue::from_text(source.text()?))
}

/// A whole number written without decoration (`"2020"`).
pub fn integer(source: SourceValue<'_>, _ctx: &FieldContext<'_>) -> Result<FieldValue, FieldError> {
    match source.text()? {
        None => Ok(FieldValue::Null),
        Some(raw) => raw
            .parse::<i64>()
            .map(FieldValue::Int)
            .map_err(|_| FieldError::InvalidNumber(raw.to_string())),
    }
}

/// A number with unit and separators, keeping only digits (`"50.000 km"`).
pub fn digits(source: SourceValue<'_>, _ctx: &FieldContext<'_>) -> Result<FieldValue, FieldError> {
    match source.text()? {
        None => Ok(FieldValue::Null),
        Some(raw) => extract::digits_only(raw)
            .map(FieldValue::Int)
            .ok_or_else(|| FieldError::InvalidNumber(raw.to_string())),
    }
}

pub fn battery_kwh(
    source: SourceValue<'_>,
    _ctx: &FieldContext<'_>,
) -> Result<FieldValue, FieldError> {
    match source.text()? {
        None => Ok(FieldValue::Null),
        Some(raw) => extract::parse_kwh(raw)
            .map(FieldValue::Float)
            .ok_or_else(|| FieldError::InvalidNumber(raw.to_string())),
    }
}

pub fn car_ccm(source: SourceValue<'_>, _ctx: &FieldContext<'_>) -> Result<FieldValue, FieldError> {
    let engine = extract::parse_engine(source.text()?.unwrap_or_default(), EngineMode::Car);
    Ok(FieldValue::from_int(engine.ccm))
}

pub fn car_kw(source: SourceValue<'_>, _ctx: &FieldContext<'_>) -> Result<FieldValue, FieldError> {
    let engine = extract::parse_engine(source.text()?.unwrap_or_default(), EngineMode::Car);
    Ok(FieldValue::from_int(engine.kw))
}

pub fn car_hp(source: SourceValue<'_>, _ctx: &FieldContext<'_>) -> Result<FieldValue, FieldError> {
    let engine = extract::parse_engine(source.text()?.unwrap_or_default(), EngineMode::Car);
    Ok(FieldValue::from_int(engine.hp))
}

pub fn moto_kw(source: SourceValue<'_>, _ctx: &FieldContext<'_>) -> Result<FieldValue, FieldError> {
    let engine = extract::parse_engine(source.text()?.unwrap_or_default(), EngineMode::Motorcycle);
    Ok(FieldValue::from_int(engine.kw))
}

pub fn moto_hp(source: SourceValue<'_>, _ctx: &FieldContext<'_>) -> Result<FieldValue, FieldError> {
    let engine = extract::parse_engine(source.text()?.unwrap_or_default(), EngineMode::Motorcycle);
    Ok(FieldValue::from_int(engine.hp))
}

/// A site label (`NOVO`/`RABLJENO`); missing means used.
pub fn state_label(
    source: SourceValue<'_>,
    _ctx: &FieldContext<'_>,
) -> Result<FieldValue, FieldError> {
    Ok(FieldValue::State(
        source
            .text()?
            .map(VehicleState::from_label)
            .unwrap_or_default(),
    ))
}

/// An owner-count field: any known or unknown previous owner means used.
pub fn state_from_owners(
    source: SourceValue<'_>,
    _ctx: &FieldContext<'_>,
) -> Result<FieldValue, FieldError> {
    Ok(FieldValue::State(extract::state_from_owners(source.text()?)))
}

/// `MM.YYYY` → year.
pub fn month_year(
    source: SourceValue<'_>,
    _ctx: &FieldContext<'_>,
) -> Result<FieldValue, FieldError> {
    match source.text()? {
        None => Ok(FieldValue::Null),
        Some(raw) => extract::registration_year(raw)
            .map(|y| FieldValue::Int(y.into()))
            .ok_or_else(|| FieldError::InvalidNumber(raw.to_string())),
    }
}

pub fn kilometrih(
    source: SourceValue<'_>,
    _ctx: &FieldContext<'_>,
) -> Result<FieldValue, FieldError> {
    Ok(FieldValue::from_int(
        source
            .text()?
            .and_then(|raw| extract::mileage_with_unit(raw, "Kilometrih")),
    ))
}

/// Fuel labels used in free-text listing extras.
pub const FUEL_TYPES: &[&str] = &[
    "bencin",
    "dizel",
    "avtoplin",
    "zemeljski plin",
    "hibrid",
    "mild-hybrid",
    "plug-in-hybrid",
    "benzin mildhybrid",
    "diesel mildhybrid",
    "diesel plugin hybrid",
    "električno vozilo",
    "ethanol",
];

/// Gearbox labels used in free-text listing extras.
pub const GEARBOX_TYPES: &[&str] = &[
    "4-stopenjsko stikalno gonilo",
    "5-stopenjsko stikalno gonilo",
    "6-stopenjsko stikalno gonilo",
    "7-stopenjsko stikalno gonilo",
    "avtomatik",
    "polavtomatik",
    "ročni menjalnik",
];

pub fn fuel_from_misc(
    source: SourceValue<'_>,
    _ctx: &FieldContext<'_>,
) -> Result<FieldValue, FieldError> {
    Ok(FieldValue::from_text(
        source
            .text()?
            .and_then(|raw| extract::match_vocabulary(raw, FUEL_TYPES)),
    ))
}

pub fn gearbox_from_misc(
    source: SourceValue<'_>,
    _ctx: &FieldContext<'_>,
) -> Result<FieldValue, FieldError> {
    Ok(FieldValue::from_text(
        source
            .text()?
            .and_then(|raw| extract::match_vocabulary(raw, GEARBOX_TYPES)),
    ))
}

/// Resolves a possibly relative URL attribute against the site base.
pub fn absolute_url(
    source: SourceValue<'_>,
    ctx: &FieldContext<'_>,
) -> Result<FieldValue, FieldError> {
    match source.text()? {
        None => Ok(FieldValue::Null),
        Some(raw) => ctx
            .base_url
            .join(raw)
            .map(|url| FieldValue::Text(url.to_string()))
            .map_err(|e| FieldError::InvalidUrl {
                url: raw.to_string(),
                reason: e.to_string(),
            }),
    }
}

// Tables.

const AVTONET_CAR_ENTRIES: &[FieldSpec] = &[
    FieldSpec::new(Field::Make, FieldSource::NameParts, make),
    FieldSpec::new(Field::Model, FieldSource::NameParts, model),
    FieldSpec::new(Field::PriceEur, FieldSource::PricePair, price),
    FieldSpec::new(
        Field::FirstRegistration,
        FieldSource::SpecRow("1.registracija"),
        integer,
    ),
    FieldSpec::new(Field::MileageKm, FieldSource::SpecRow("Prevoženih"), digits),
    FieldSpec::new(Field::FuelType, FieldSource::SpecRow("Gorivo"), text),
    FieldSpec::new(Field::Gearbox, FieldSource::SpecRow("Menjalnik"), text),
    FieldSpec::new(Field::EngineCcm, FieldSource::Engine, car_ccm),
    FieldSpec::new(Field::EngineKw, FieldSource::Engine, car_kw),
    FieldSpec::new(Field::EngineHp, FieldSource::Engine, car_hp),
    FieldSpec::new(Field::BatteryKwh, FieldSource::SpecRow("Baterija"), battery_kwh),
    FieldSpec::new(Field::State, FieldSource::SpecRow("Starost"), state_label),
    FieldSpec::new(Field::ImageUrl, FieldSource::Image, absolute_url),
    FieldSpec::new(Field::Link, FieldSource::Link, absolute_url),
];

const AVTONET_MOTORCYCLE_ENTRIES: &[FieldSpec] = &[
    FieldSpec::new(Field::Make, FieldSource::NameParts, make),
    FieldSpec::new(Field::Model, FieldSource::NameParts, model),
    FieldSpec::new(Field::PriceEur, FieldSource::PricePair, price),
    FieldSpec::new(
        Field::FirstRegistration,
        FieldSource::SpecRow("1.registracija"),
        integer,
    ),
    FieldSpec::new(Field::MileageKm, FieldSource::SpecRow("Prevoženih"), digits),
    FieldSpec::new(Field::EngineKw, FieldSource::Engine, moto_kw),
    FieldSpec::new(Field::EngineHp, FieldSource::Engine, moto_hp),
    FieldSpec::new(Field::State, FieldSource::SpecRow("Starost"), state_label),
    FieldSpec::new(Field::ImageUrl, FieldSource::Image, absolute_url),
    FieldSpec::new(Field::Link, FieldSource::Link, absolute_url),
];

const AVTONET_TRUCK_ENTRIES: &[FieldSpec] = &[
    FieldSpec::new(Field::Make, FieldSource::NameParts, make),
    FieldSpec::new(Field::Model, FieldSource::NameParts, model),
    FieldSpec::new(Field::PriceEur, FieldSource::PricePair, price),
    FieldSpec::new(
        Field::FirstRegistration,
        FieldSource::SpecRow("1.registracija"),
        integer,
    ),
    FieldSpec::new(Field::MileageKm, FieldSource::SpecRow("Prevoženih"), digits),
    FieldSpec::new(Field::FuelType, FieldSource::SpecRow("Gorivo"), text),
    FieldSpec::new(Field::Gearbox, FieldSource::SpecRow("Menjalnik"), text),
    FieldSpec::new(Field::EngineCcm, FieldSource::Engine, car_ccm),
    FieldSpec::new(Field::EngineKw, FieldSource::Engine, car_kw),
    FieldSpec::new(Field::EngineHp, FieldSource::Engine, car_hp),
    FieldSpec::new(Field::State, FieldSource::SpecRow("Starost"), state_label),
    FieldSpec::new(Field::ImageUrl, FieldSource::Image, absolute_url),
    FieldSpec::new(Field::Link, FieldSource::Link, absolute_url),
];

const AUTOBID_ENTRIES: &[FieldSpec] = &[
    FieldSpec::new(Field::Make, FieldSource::NameParts, make),
    FieldSpec::new(Field::Model, FieldSource::NameParts, model),
    FieldSpec::new(Field::PriceEur, FieldSource::PricePair, price),
    FieldSpec::new(Field::FirstRegistration, FieldSource::SpecValue(0), month_year),
    FieldSpec::new(Field::MileageKm, FieldSource::SpecValue(1), kilometrih),
    FieldSpec::new(Field::FuelType, FieldSource::Misc, fuel_from_misc),
    FieldSpec::new(Field::Gearbox, FieldSource::Misc, gearbox_from_misc),
    FieldSpec::new(Field::EngineKw, FieldSource::Engine, moto_kw),
    FieldSpec::new(Field::EngineHp, FieldSource::Engine, moto_hp),
    FieldSpec::new(Field::State, FieldSource::SpecValue(3), state_from_owners),
    FieldSpec::new(Field::ImageUrl, FieldSource::Image, absolute_url),
    FieldSpec::new(Field::Link, FieldSource::Link, absolute_url),
];

pub const AVTONET_CAR: SpecTable = SpecTable {
    name: "avtonet-car",
    entries: AVTONET_CAR_ENTRIES,
};

pub const AVTONET_MOTORCYCLE: SpecTable = SpecTable {
    name: "avtonet-motorcycle",
    entries: AVTONET_MOTORCYCLE_ENTRIES,
};

pub const AVTONET_TRUCK: SpecTable = SpecTable {
    name: "avtonet-truck",
    entries: AVTONET_TRUCK_ENTRIES,
};

pub const AUTOBID: SpecTable = SpecTable {
    name: "autobid",
    entries: AUTOBID_ENTRIES,
};
