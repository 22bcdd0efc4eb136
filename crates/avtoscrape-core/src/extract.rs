//! Pure extractors turning raw listing text into typed values.
//!
//! None of these functions fail: text that cannot be interpreted yields
//! `None`. Transforms that need to report *why* a value is missing wrap
//! these in [`crate::spec_table`].

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{SpecMap, VehicleState};

/// Makes whose display name spans more than one token. Checked in order;
/// the first prefix match wins.
const MULTI_WORD_MAKES: &[(&[&str], &str)] = &[
    (&["Land", "Rover"], "Land Rover"),
    (&["Alfa", "Romeo"], "Alfa Romeo"),
    (&["Aston", "Martin"], "Aston Martin"),
    (&["Rolls", "Royce"], "Rolls Royce"),
    (&["DS", "Automobiles"], "DS Automobiles"),
];

/// Per-make keywords that absorb the following token into a two-word model
/// (`BMW Serija 3`, `Land Rover Range Rover`, `Tesla Model S`).
const MODEL_SERIES_KEYWORDS: &[(&str, &str)] = &[
    ("BMW", "serija"),
    ("Land Rover", "range"),
    ("Tesla", "model"),
];

static CCM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*ccm").unwrap());
static KW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*kw").unwrap());
static HP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*km").unwrap());
static KW_WITH_HP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*kw\s*\((\d+)\s*km\)").unwrap());
static MONTH_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d{1,2}\.(\d{4})").unwrap());
static OWNER_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*(?:lastnik|lastnikov)?\s*$").unwrap());

/// Resolves the make from a tokenized display name.
pub fn resolve_make<S: AsRef<str>>(name_parts: &[S]) -> Option<String> {
    let first = name_parts.first()?;

    MULTI_WORD_MAKES
        .iter()
        .find(|(tokens, _)| {
            name_parts.len() >= tokens.len()
                && tokens
                    .iter()
                    .zip(name_parts)
                    .all(|(expected, part)| *expected == part.as_ref())
        })
        .map(|(_, make)| make.to_string())
        .or_else(|| Some(first.as_ref().to_string()))
}

/// Resolves the model given the already-resolved make.
///
/// Skips as many leading tokens as the make has words, then takes the next
/// token, or the next two when the make has a series keyword. Returns `None`
/// when the tokens run out.
pub fn resolve_model<S: AsRef<str>>(make: &str, name_parts: &[S]) -> Option<String> {
    if name_parts.len() < 2 {
        return None;
    }

    let offset = make.split_whitespace().count();
    let head = name_parts.get(offset)?.as_ref();

    let absorbs_next = MODEL_SERIES_KEYWORDS
        .iter()
        .any(|(series_make, keyword)| *series_make == make && head.to_lowercase() == *keyword);

    if !absorbs_next {
        return Some(head.to_string());
    }

    let next = name_parts.get(offset + 1)?.as_ref();
    Some(format!("{head} {next}").replace(':', ""))
}

/// Which components an engine descriptor carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// `"<ccm> ccm, <kw> kW (<hp> KM)"`: displacement first, power later.
    Car,
    /// Power only, usually `"<kw> kW (<hp> KM)"`.
    Motorcycle,
}

/// Parsed engine descriptor. Absent components are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineSpec {
    pub ccm: Option<i32>,
    pub kw: Option<i32>,
    pub hp: Option<i32>,
}

/// Parses a free-text engine descriptor.
pub fn parse_engine(descriptor: &str, mode: EngineMode) -> EngineSpec {
    let normalized = descriptor
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if normalized.is_empty() {
        return EngineSpec::default();
    }

    match mode {
        EngineMode::Motorcycle => {
            if let Some(caps) = KW_WITH_HP.captures(&normalized) {
                return EngineSpec {
                    ccm: None,
                    kw: caps[1].parse().ok(),
                    hp: caps[2].parse().ok(),
                };
            }
            EngineSpec {
                ccm: None,
                kw: first_capture(&KW, &normalized),
                hp: first_capture(&HP, &normalized),
            }
        }
        EngineMode::Car => {
            let parts: Vec<&str> = normalized.split(',').map(str::trim).collect();
            let ccm = parts.first().and_then(|p| first_capture(&CCM, p));
            let power = parts.get(1).copied().unwrap_or(&normalized);
            EngineSpec {
                ccm,
                kw: first_capture(&KW, power),
                hp: first_capture(&HP, power),
            }
        }
    }
}

fn first_capture(re: &Regex, text: &str) -> Option<i32> {
    re.captures(text).and_then(|caps| caps[1].parse().ok())
}

/// Returns the first price candidate that parses as a whole number.
///
/// Currency signs, thousands separators and whitespace are stripped; a
/// candidate with anything else left over is skipped, not an error.
pub fn extract_price(regular: Option<&str>, special: Option<&str>) -> Option<i64> {
    [regular, special].into_iter().flatten().find_map(parse_price)
}

fn parse_price(text: &str) -> Option<i64> {
    let digits: String = text
        .chars()
        .filter(|c| !matches!(c, '€' | '.' | ',') && !c.is_whitespace())
        .collect();

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Builds a spec map from raw table rows.
///
/// Only rows with exactly two cells are kept; a repeated key keeps the last
/// value.
pub fn parse_spec_rows<R, S>(rows: impl IntoIterator<Item = R>) -> SpecMap
where
    R: AsRef<[S]>,
    S: AsRef<str>,
{
    rows.into_iter()
        .filter_map(|row| match row.as_ref() {
            [key, value] => Some((
                key.as_ref().trim().to_string(),
                value.as_ref().trim().to_string(),
            )),
            _ => None,
        })
        .collect()
}

/// Keeps only the ASCII digits of `text` and parses them (`"50.000 km"` → 50000).
pub fn digits_only(text: &str) -> Option<i64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Parses a battery capacity such as `"54,5 kWh"`.
pub fn parse_kwh(text: &str) -> Option<f64> {
    text.replace("kWh", "").replace(',', ".").trim().parse().ok()
}

/// Year from a `MM.YYYY` registration date.
pub fn registration_year(text: &str) -> Option<i32> {
    MONTH_YEAR
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

/// Mileage from text carrying the given unit marker (`"123.456 Kilometrih"`).
pub fn mileage_with_unit(text: &str, unit: &str) -> Option<i64> {
    if !text.contains(unit) {
        return None;
    }
    digits_only(&text.replace(unit, ""))
}

/// Condition from an owner-count field: unknown ownership or at least one
/// previous owner means used.
pub fn state_from_owners(owners: Option<&str>) -> VehicleState {
    let Some(owners) = owners.filter(|o| !o.is_empty()) else {
        return VehicleState::Novo;
    };
    if owners.to_lowercase().starts_with("neznano") {
        return VehicleState::Rabljeno;
    }
    match OWNER_COUNT
        .captures(owners)
        .and_then(|caps| caps[1].parse::<u32>().ok())
    {
        Some(count) if count > 0 => VehicleState::Rabljeno,
        _ => VehicleState::Novo,
    }
}

/// First comma-separated item of `text` that belongs to `vocabulary`
/// (case-insensitive). Returns the item as written.
pub fn match_vocabulary(text: &str, vocabulary: &[&str]) -> Option<String> {
    text.split(", ")
        .map(str::trim)
        .find(|item| {
            let lowered = item.to_lowercase();
            vocabulary.iter().any(|v| *v == lowered)
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(s: &str) -> Vec<&str> {
        s.split_whitespace().collect()
    }

    #[test]
    fn test_resolve_make_multi_word() {
        assert_eq!(
            resolve_make(&tokens("Land Rover Discovery")),
            Some("Land Rover".into())
        );
        assert_eq!(
            resolve_make(&tokens("Alfa Romeo Giulia")),
            Some("Alfa Romeo".into())
        );
        assert_eq!(
            resolve_make(&tokens("DS Automobiles DS7")),
            Some("DS Automobiles".into())
        );
    }

    #[test]
    fn test_resolve_make_falls_back_to_first_token() {
        assert_eq!(resolve_make(&tokens("BMW Serija 3")), Some("BMW".into()));
        assert_eq!(resolve_make(&tokens("Toyota")), Some("Toyota".into()));
        assert_eq!(resolve_make(&tokens("Land")), Some("Land".into()));
        assert_eq!(resolve_make::<&str>(&[]), None);
    }

    #[test]
    fn test_resolve_model_series_keywords() {
        assert_eq!(
            resolve_model("BMW", &tokens("BMW Serija 3")),
            Some("Serija 3".into())
        );
        assert_eq!(
            resolve_model("BMW", &tokens("BMW Serija 5: 520d")),
            Some("Serija 5".into())
        );
        assert_eq!(
            resolve_model("Land Rover", &tokens("Land Rover Range Rover")),
            Some("Range Rover".into())
        );
        assert_eq!(
            resolve_model("Tesla", &tokens("Tesla Model S")),
            Some("Model S".into())
        );
    }

    #[test]
    fn test_resolve_model_default_takes_next_token() {
        assert_eq!(
            resolve_model("Toyota", &tokens("Toyota Corolla 1.8")),
            Some("Corolla".into())
        );
        assert_eq!(
            resolve_model("Land Rover", &tokens("Land Rover Defender 110")),
            Some("Defender".into())
        );
        // Series keyword only applies to its own make.
        assert_eq!(
            resolve_model("Audi", &tokens("Audi Model X")),
            Some("Model".into())
        );
    }

    #[test]
    fn test_resolve_model_insufficient_tokens() {
        assert_eq!(resolve_model("BMW", &tokens("BMW")), None);
        assert_eq!(resolve_model::<&str>("BMW", &[]), None);
        assert_eq!(resolve_model("Land Rover", &tokens("Land Rover")), None);
        assert_eq!(resolve_model("BMW", &tokens("BMW Serija")), None);
    }

    #[test]
    fn test_parse_engine_car_mode() {
        assert_eq!(
            parse_engine("2000 ccm, 150 kW (204 KM)", EngineMode::Car),
            EngineSpec {
                ccm: Some(2000),
                kw: Some(150),
                hp: Some(204)
            }
        );
        assert_eq!(
            parse_engine("  1598   ccm ,  85 kW  (116 KM) ", EngineMode::Car),
            EngineSpec {
                ccm: Some(1598),
                kw: Some(85),
                hp: Some(116)
            }
        );
    }

    #[test]
    fn test_parse_engine_car_mode_without_displacement() {
        // Electric cars list power only; it is read from the whole text.
        assert_eq!(
            parse_engine("150 kW (204 KM)", EngineMode::Car),
            EngineSpec {
                ccm: None,
                kw: Some(150),
                hp: Some(204)
            }
        );
    }

    #[test]
    fn test_parse_engine_motorcycle_mode() {
        assert_eq!(
            parse_engine("100 kW (136 KM)", EngineMode::Motorcycle),
            EngineSpec {
                ccm: None,
                kw: Some(100),
                hp: Some(136)
            }
        );
        assert_eq!(
            parse_engine("110 kW / 150 KM", EngineMode::Motorcycle),
            EngineSpec {
                ccm: None,
                kw: Some(110),
                hp: Some(150)
            }
        );
        assert_eq!(
            parse_engine("35 kW", EngineMode::Motorcycle),
            EngineSpec {
                ccm: None,
                kw: Some(35),
                hp: None
            }
        );
    }

    #[test]
    fn test_parse_engine_empty() {
        assert_eq!(parse_engine("", EngineMode::Car), EngineSpec::default());
        assert_eq!(parse_engine("   ", EngineMode::Motorcycle), EngineSpec::default());
        assert_eq!(parse_engine("neznano", EngineMode::Car), EngineSpec::default());
    }

    #[test]
    fn test_extract_price() {
        assert_eq!(extract_price(Some("25.000 €"), Some("anything")), Some(25000));
        assert_eq!(extract_price(None, Some("20.000 €")), Some(20000));
        assert_eq!(extract_price(Some("Negotiable"), None), None);
        assert_eq!(extract_price(None, None), None);
    }

    #[test]
    fn test_extract_price_falls_through_to_special() {
        assert_eq!(
            extract_price(Some("Pokličite"), Some("18.990 €")),
            Some(18990)
        );
        assert_eq!(extract_price(Some(""), Some("7.500 €")), Some(7500));
    }

    #[test]
    fn test_extract_price_strips_nbsp_and_commas() {
        assert_eq!(extract_price(Some("12\u{a0}500 €"), None), Some(12500));
        assert_eq!(extract_price(Some("1,250,000"), None), Some(1250000));
    }

    #[test]
    fn test_parse_spec_rows() {
        let rows = vec![
            vec!["1.registracija", "2020"],
            vec!["Gorivo", "Bencin"],
            vec!["a", "b", "c"],
            vec!["lonely"],
        ];
        let specs = parse_spec_rows(rows);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs["1.registracija"], "2020");
        assert_eq!(specs["Gorivo"], "Bencin");
    }

    #[test]
    fn test_parse_spec_rows_trims_and_last_wins() {
        let rows = vec![
            vec![" Gorivo ", " Bencin "],
            vec!["Gorivo", "Dizel"],
        ];
        let specs = parse_spec_rows(rows);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs["Gorivo"], "Dizel");
    }

    #[test]
    fn test_digits_only() {
        assert_eq!(digits_only("50.000 km"), Some(50000));
        assert_eq!(digits_only("km"), None);
    }

    #[test]
    fn test_parse_kwh() {
        assert_eq!(parse_kwh("54,5 kWh"), Some(54.5));
        assert_eq!(parse_kwh("77 kWh"), Some(77.0));
        assert_eq!(parse_kwh("n/a"), None);
    }

    #[test]
    fn test_registration_year() {
        assert_eq!(registration_year("03.2019"), Some(2019));
        assert_eq!(registration_year("3.2021"), Some(2021));
        assert_eq!(registration_year("2019"), None);
    }

    #[test]
    fn test_mileage_with_unit() {
        assert_eq!(
            mileage_with_unit("123.456 Kilometrih", "Kilometrih"),
            Some(123456)
        );
        assert_eq!(mileage_with_unit("123.456 km", "Kilometrih"), None);
    }

    #[test]
    fn test_state_from_owners() {
        assert_eq!(state_from_owners(Some("Neznano")), VehicleState::Rabljeno);
        assert_eq!(state_from_owners(Some("2 lastnikov")), VehicleState::Rabljeno);
        assert_eq!(state_from_owners(Some("1 lastnik")), VehicleState::Rabljeno);
        assert_eq!(state_from_owners(Some("0")), VehicleState::Novo);
        assert_eq!(state_from_owners(None), VehicleState::Novo);
    }

    #[test]
    fn test_match_vocabulary() {
        let fuels = ["bencin", "dizel", "hibrid"];
        assert_eq!(
            match_vocabulary("Limuzina, Dizel, Avtomatik", &fuels),
            Some("Dizel".into())
        );
        assert_eq!(match_vocabulary("Limuzina, Avtomatik", &fuels), None);
    }
}
