use url::Url;

use crate::error::FieldError;
use crate::models::{RawListing, VehicleRecord, VehicleState};
use crate::spec_table::{Field, FieldContext, FieldValue, SpecTable};

/// Assembles one canonical record from a listing's raw fragments.
///
/// The make is resolved first and handed to every other transform. A failing
/// transform leaves its field empty and assembly continues. Returns `None`
/// when the record would carry no link or no data at all.
pub fn assemble(listing: &RawListing, table: &SpecTable, base_url: &Url) -> Option<VehicleRecord> {
    let bootstrap = FieldContext {
        make: None,
        base_url,
    };

    let make = table
        .entry(Field::Make)
        .map(|entry| settle(table, Field::Make, entry.evaluate(listing, &bootstrap)))
        .unwrap_or(FieldValue::Null);

    let make_text = match &make {
        FieldValue::Text(text) => Some(text.as_str()),
        _ => None,
    };
    let ctx = FieldContext {
        make: make_text,
        base_url,
    };

    let mut draft = Draft::default();
    draft.apply(table, Field::Make, make.clone());

    for entry in table.entries.iter().filter(|e| e.field != Field::Make) {
        let value = settle(table, entry.field, entry.evaluate(listing, &ctx));
        draft.apply(table, entry.field, value);
    }

    draft.finish(table)
}

fn settle(table: &SpecTable, field: Field, result: Result<FieldValue, FieldError>) -> FieldValue {
    result.unwrap_or_else(|error| {
        tracing::debug!(table = table.name, field = field.as_str(), %error, "Field transform failed");
        FieldValue::Null
    })
}

#[derive(Debug, Default)]
struct Draft {
    record: Option<VehicleRecord>,
    link: Option<String>,
    state: Option<VehicleState>,
    populated: usize,
}

impl Draft {
    fn record(&mut self) -> &mut VehicleRecord {
        self.record.get_or_insert_with(|| VehicleRecord::new(String::new()))
    }

    fn apply(&mut self, table: &SpecTable, field: Field, value: FieldValue) {
        if value.is_null() {
            return;
        }
        if let Err(error) = self.store(field, value) {
            tracing::debug!(table = table.name, field = field.as_str(), %error, "Field value discarded");
            return;
        }
        // Identity and the defaulted state do not count as data.
        if !matches!(field, Field::Link | Field::State) {
            self.populated += 1;
        }
    }

    fn store(&mut self, field: Field, value: FieldValue) -> Result<(), FieldError> {
        match field {
            Field::Make => self.record().make = Some(expect_text(value)?),
            Field::Model => self.record().model = Some(expect_text(value)?),
            Field::FuelType => self.record().fuel_type = Some(expect_text(value)?),
            Field::Gearbox => self.record().gearbox = Some(expect_text(value)?),
            Field::ImageUrl => self.record().image_url = Some(expect_text(value)?),
            Field::Link => self.link = Some(expect_text(value)?),
            Field::PriceEur => self.record().price_eur = Some(non_negative(expect_int(value)?)?),
            Field::MileageKm => self.record().mileage_km = Some(non_negative(expect_int(value)?)?),
            Field::FirstRegistration => {
                self.record().first_registration = Some(narrow(expect_int(value)?)?)
            }
            Field::EngineCcm => self.record().engine_ccm = Some(narrow(expect_int(value)?)?),
            Field::EngineKw => self.record().engine_kw = Some(narrow(expect_int(value)?)?),
            Field::EngineHp => self.record().engine_hp = Some(narrow(expect_int(value)?)?),
            Field::BatteryKwh => {
                self.record().battery_kwh = Some(match value {
                    FieldValue::Float(v) => v,
                    FieldValue::Int(v) => v as f64,
                    other => return Err(mismatch("float", &other)),
                })
            }
            Field::State => {
                self.state = Some(match value {
                    FieldValue::State(state) => state,
                    other => return Err(mismatch("state", &other)),
                })
            }
        }
        Ok(())
    }

    fn finish(self, table: &SpecTable) -> Option<VehicleRecord> {
        let Some(link) = self.link else {
            tracing::debug!(table = table.name, "Listing without a link skipped");
            return None;
        };
        if self.populated == 0 {
            tracing::debug!(table = table.name, %link, "Listing without data skipped");
            return None;
        }

        let mut record = self.record.unwrap_or_else(|| VehicleRecord::new(String::new()));
        record.link = link;
        record.state = self.state.unwrap_or_default();
        Some(record)
    }
}

fn mismatch(expected: &'static str, actual: &FieldValue) -> FieldError {
    FieldError::TypeMismatch {
        expected,
        actual: actual.kind(),
    }
}

fn expect_text(value: FieldValue) -> Result<String, FieldError> {
    match value {
        FieldValue::Text(text) => Ok(text),
        other => Err(mismatch("text", &other)),
    }
}

fn expect_int(value: FieldValue) -> Result<i64, FieldError> {
    match value {
        FieldValue::Int(v) => Ok(v),
        other => Err(mismatch("integer", &other)),
    }
}

fn non_negative(value: i64) -> Result<i64, FieldError> {
    if value < 0 {
        return Err(FieldError::OutOfRange(value));
    }
    Ok(value)
}

fn narrow(value: i64) -> Result<i32, FieldError> {
    i32::try_from(value).map_err(|_| FieldError::OutOfRange(value))
}
