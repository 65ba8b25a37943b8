//! Core domain model and key derivation for the parking-violations warehouse.

use serde::{Deserialize, Serialize};

pub mod catalog;
pub mod keys;

pub use catalog::{Action, CatalogError, Phase, Table, TableKind};

pub const CRATE_NAME: &str = "pvdw-core";

/// Zero member of every integer-keyed dimension.
pub const UNKNOWN_KEY: i32 = 0;
pub const UNKNOWN_AGENCY_KEY: &str = "0";
pub const UNKNOWN_STATE_KEY: &str = "UK";
/// Registration state the source uses for unregistered vehicles.
pub const UNREGISTERED_STATE_CODE: &str = "99";
pub const UNKNOWN_PLATE_TYPE: &str = "UNK";
pub const INVALID_PLATE_TYPE: &str = "999";
/// Width of the vehicle natural-key text columns (`make`, `body_style`, `record_type`).
pub const VEHICLE_TEXT_WIDTH: usize = 50;

/// Text-typed violation record as it lands in `stage_parking_violations`.
///
/// Only the columns the fact hydrator reads are carried here.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StagedViolation {
    pub summons_number: Option<String>,
    pub plate_id: Option<String>,
    pub registration_state: Option<String>,
    pub plate_type: Option<String>,
    pub issue_date: Option<String>,
    pub violation_code: Option<String>,
    pub vehicle_body_type: Option<String>,
    pub vehicle_make: Option<String>,
    pub issuing_agency: Option<String>,
    pub vehicle_expiration_date: Option<String>,
    pub violation_precinct: Option<String>,
    pub issuer_precinct: Option<String>,
    pub violation_time: Option<String>,
    pub house_number: Option<String>,
    pub street_name: Option<String>,
    pub vehicle_color: Option<String>,
    pub unregistered_vehicle: Option<String>,
    pub vehicle_year: Option<String>,
}

/// A violation with every dimension reference resolved except the vehicle, which is
/// joined on its natural key when the candidate is promoted into the fact relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactCandidate {
    pub summons_number: i64,
    pub plate_id: Option<String>,
    pub registration_state_key: String,
    pub plate_type: String,
    pub fine_amount: i32,
    pub issue_date_key: i32,
    pub violation_key: i32,
    pub issuing_agency_key: String,
    pub vehicle_expiration_date_key: i32,
    pub violation_precinct_key: i32,
    pub issuer_precinct_key: i32,
    pub borough_key: i32,
    pub time_key: i32,
    pub violation_address: Option<String>,
    pub is_unregistered_vehicle: bool,
    pub vehicle_year: Option<i32>,
    pub vehicle_make: String,
    pub vehicle_body_type: String,
    pub vehicle_color_code: String,
}

/// Trimmed, non-empty text or nothing.
pub fn clean_text(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Parses integer codes that the source sometimes renders as `"14.0"` or with padding.
pub fn parse_code(raw: Option<&str>) -> Option<i64> {
    let raw = clean_text(raw)?;
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    let v = raw.parse::<f64>().ok()?;
    (v.is_finite() && v.fract() == 0.0).then_some(v as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_code_accepts_integral_renderings() {
        assert_eq!(parse_code(Some(" 14 ")), Some(14));
        assert_eq!(parse_code(Some("14.0")), Some(14));
        assert_eq!(parse_code(Some("14.5")), None);
        assert_eq!(parse_code(Some("")), None);
        assert_eq!(parse_code(None), None);
        assert_eq!(parse_code(Some("8713942291")), Some(8_713_942_291));
    }

    #[test]
    fn clean_text_drops_blank_values() {
        assert_eq!(clean_text(Some("  ")), None);
        assert_eq!(clean_text(Some(" FORD ")), Some("FORD"));
    }
}
