//! Vehicle color standardization.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorCode {
    pub code: &'static str,
    pub description: &'static str,
    #[serde(skip)]
    first: u8,
    #[serde(skip)]
    last: u8,
}

impl ColorCode {
    const fn new(code: &'static str, description: &'static str, first: u8, last: u8) -> Self {
        Self {
            code,
            description,
            first,
            last,
        }
    }

    /// `^<first>+[A-Z]*<last>` against already upper-cased input.
    fn matches(&self, input: &[u8]) -> bool {
        let Some((&head, rest)) = input.split_first() else {
            return false;
        };
        if head != self.first {
            return false;
        }
        for &b in rest {
            if b == self.last {
                return true;
            }
            if !b.is_ascii_uppercase() {
                return false;
            }
        }
        false
    }
}

pub const OTHER_COLOR: ColorCode = ColorCode::new("OTH", "Other/Unknown", 0, 0);

/// Match order matters: `BLACK` must hit `BK` before `BL` gets a chance.
pub static COLOR_CATALOGUE: [ColorCode; 14] = [
    ColorCode::new("BK", "Black", b'B', b'K'),
    ColorCode::new("WH", "White", b'W', b'H'),
    ColorCode::new("GY", "Gray", b'G', b'Y'),
    ColorCode::new("BL", "Blue", b'B', b'L'),
    ColorCode::new("BR", "Brown", b'B', b'R'),
    ColorCode::new("GL", "Gold", b'G', b'L'),
    ColorCode::new("MR", "Maroon", b'M', b'R'),
    ColorCode::new("OR", "Orange", b'O', b'R'),
    ColorCode::new("PK", "Pink", b'P', b'K'),
    ColorCode::new("PR", "Purple", b'P', b'R'),
    ColorCode::new("RD", "Red", b'R', b'D'),
    ColorCode::new("TN", "Tan", b'T', b'N'),
    ColorCode::new("YW", "Yellow", b'Y', b'W'),
    OTHER_COLOR,
];

pub fn match_color(raw: Option<&str>) -> &'static ColorCode {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return &COLOR_CATALOGUE[COLOR_CATALOGUE.len() - 1];
    };
    let upper = raw.to_ascii_uppercase();
    COLOR_CATALOGUE[..COLOR_CATALOGUE.len() - 1]
        .iter()
        .find(|c| c.matches(upper.as_bytes()))
        .unwrap_or(&COLOR_CATALOGUE[COLOR_CATALOGUE.len() - 1])
}

pub fn color_code(raw: Option<&str>) -> &'static str {
    match_color(raw).code
}
