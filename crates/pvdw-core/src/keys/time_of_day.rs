//! Violation time decoding.
//!
//! Source readings look like `0752A`, `1130P`, `1430`, or garbled variants such as
//! `11O5A` where entry errors replaced digits with letters. Every input decodes to a
//! minute-of-day key in `0..=1439`; nothing here fails.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

pub const MINUTES_PER_DAY: i32 = 1440;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Meridiem {
    Am,
    Pm,
}

impl Meridiem {
    pub fn as_str(self) -> &'static str {
        match self {
            Meridiem::Am => "AM",
            Meridiem::Pm => "PM",
        }
    }
}

/// One `dim_time` member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeOfDay {
    /// Minutes since midnight.
    pub time_key: i32,
    /// 24-hour `HHMM` rendering.
    pub time_code: String,
    pub hour_number: i32,
    pub minute_number: i32,
    pub am_pm: Meridiem,
    pub military_time_hour_number: i32,
}

impl TimeOfDay {
    pub fn from_military(hour: u32, minute: u32) -> Self {
        let hour = hour.min(23) as i32;
        let minute = minute.min(59) as i32;
        let twelve_hour = match hour % 12 {
            0 => 12,
            h => h,
        };
        Self {
            time_key: hour * 60 + minute,
            time_code: format!("{hour:02}{minute:02}"),
            hour_number: twelve_hour,
            minute_number: minute,
            am_pm: if hour >= 12 { Meridiem::Pm } else { Meridiem::Am },
            military_time_hour_number: hour,
        }
    }

    /// The reading anchored on the epoch day 1900-01-01, for presentation columns.
    pub fn display_time(&self) -> NaiveDateTime {
        let time = NaiveTime::from_hms_opt(
            self.military_time_hour_number as u32,
            self.minute_number as u32,
            0,
        )
        .unwrap_or(NaiveTime::MIN);
        NaiveDate::from_ymd_opt(1900, 1, 1)
            .unwrap_or(NaiveDate::MIN)
            .and_time(time)
    }
}

/// Normalized four-digit body plus the trailing marker, if one was present.
pub fn normalize_time_text(raw: &str) -> (String, Option<Meridiem>) {
    let upper = raw.trim().to_ascii_uppercase();
    let chars: Vec<char> = upper.chars().collect();
    let (body, marker) = match chars.last() {
        Some('A') => (&chars[..chars.len() - 1], Some(Meridiem::Am)),
        Some('P') => (&chars[..chars.len() - 1], Some(Meridiem::Pm)),
        _ => (&chars[..], None),
    };

    let mut digits: String = body
        .iter()
        .map(|c| if c.is_ascii_digit() { *c } else { '0' })
        .collect();
    if digits.len() > 4 {
        digits.truncate(4);
    }
    (format!("{digits:0>4}"), marker)
}

pub fn decode_time(raw: &str) -> TimeOfDay {
    let (digits, marker) = normalize_time_text(raw);
    let value: u32 = digits.parse().unwrap_or(0);

    let meridiem = marker.unwrap_or_else(|| {
        let hour: u32 = digits[..2].parse().unwrap_or(0);
        if hour >= 12 {
            Meridiem::Pm
        } else {
            Meridiem::Am
        }
    });

    let military = match meridiem {
        Meridiem::Pm => value % 1200 + 1200,
        Meridiem::Am => value % 1200,
    };
    TimeOfDay::from_military(military / 100, military % 100)
}

pub fn decode_time_opt(raw: Option<&str>) -> TimeOfDay {
    decode_time(raw.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midnight_and_empty_decode_to_zero() {
        assert_eq!(decode_time("0000").time_key, 0);
        assert_eq!(decode_time("").time_key, 0);
        assert_eq!(decode_time("").am_pm, Meridiem::Am);
        assert_eq!(decode_time_opt(None).time_code, "0000");
    }

    #[test]
    fn trailing_marker_decides_meridiem() {
        let pm = decode_time("0100P");
        assert_eq!(pm.time_key, 13 * 60);
        assert_eq!(pm.time_code, "1300");
        assert_eq!(pm.hour_number, 1);
        assert_eq!(pm.am_pm, Meridiem::Pm);

        let am = decode_time("1130A");
        assert_eq!(am.time_key, 11 * 60 + 30);
        assert_eq!(am.military_time_hour_number, 11);
    }

    #[test]
    fn noon_and_midnight_markers() {
        assert_eq!(decode_time("1200P").time_key, 12 * 60);
        assert_eq!(decode_time("1200A").time_key, 0);
        assert_eq!(decode_time("1245A").time_key, 45);
        assert_eq!(decode_time("1200A").hour_number, 12);
    }

    #[test]
    fn missing_marker_infers_from_hour_digits() {
        let t = decode_time("1430");
        assert_eq!(t.am_pm, Meridiem::Pm);
        assert_eq!(t.time_key, 14 * 60 + 30);
        assert_eq!(decode_time("0915").am_pm, Meridiem::Am);
    }

    #[test]
    fn garbled_letters_become_zero_digits() {
        assert_eq!(normalize_time_text("11O5A"), ("1105".to_string(), Some(Meridiem::Am)));
        assert_eq!(decode_time("11O5A").time_key, 11 * 60 + 5);
        assert_eq!(normalize_time_text("0X30"), ("0030".to_string(), None));
        assert_eq!(normalize_time_text("930a").0, "0930");
    }

    #[test]
    fn keys_stay_within_one_day() {
        let inputs = [
            "9999P", "9999A", "9999", "2400", "1199P", "0075A", "ZZZZZ", "P", "A", "123456P", "  ",
        ];
        for raw in inputs {
            let key = decode_time(raw).time_key;
            assert!((0..MINUTES_PER_DAY).contains(&key), "{raw} -> {key}");
        }
    }

    #[test]
    fn display_time_uses_epoch_day() {
        let t = decode_time("0100P");
        assert_eq!(t.display_time().to_string(), "1900-01-01 13:00:00");
    }
}
