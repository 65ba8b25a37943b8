//! Date-key decoding for issue timestamps and vehicle expiration codes.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// `YYYYMMDD` key of the epoch member that absorbs unknown dates.
pub const EPOCH_DATE_KEY: i32 = 19000101;

pub fn epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

pub fn date_key(date: NaiveDate) -> i32 {
    date.year() * 10_000 + date.month() as i32 * 100 + date.day() as i32
}

/// Issue dates arrive as timestamps in a handful of shapes; unknown shapes map to the epoch.
pub fn decode_issue_date(raw: Option<&str>) -> NaiveDate {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return epoch_date();
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.date_naive();
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return ts.date();
        }
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date;
        }
    }
    epoch_date()
}

/// Codes made only of `8`s or only of `0`s mean "no expiration on record".
pub fn is_expiration_sentinel(raw: &str) -> bool {
    let raw = raw.trim();
    !raw.is_empty() && (raw.bytes().all(|b| b == b'8') || raw.bytes().all(|b| b == b'0'))
}

pub fn decode_expiration_code(raw: Option<&str>) -> NaiveDate {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() || is_expiration_sentinel(raw) {
        return epoch_date();
    }
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return epoch_date();
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d").unwrap_or_else(|_| epoch_date())
}

/// One `dim_date` member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalendarDay {
    pub date_key: i32,
    pub calendar_date: NaiveDate,
    pub year_number: i32,
    pub month_number: i32,
    pub day_number: i32,
    pub quarter_number: i32,
    pub day_of_the_week: String,
    pub is_weekday: bool,
}

impl From<NaiveDate> for CalendarDay {
    fn from(date: NaiveDate) -> Self {
        Self {
            date_key: date_key(date),
            calendar_date: date,
            year_number: date.year(),
            month_number: date.month() as i32,
            day_number: date.day() as i32,
            quarter_number: ((date.month() - 1) / 3 + 1) as i32,
            day_of_the_week: date.format("%A").to_string(),
            is_weekday: date.weekday().number_from_monday() <= 5,
        }
    }
}
