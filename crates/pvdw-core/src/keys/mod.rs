//! Surrogate-key derivation: pure decoders shared by the dimension and fact hydrators.

pub mod borough;
pub mod calendar;
pub mod color;
pub mod time_of_day;

pub use borough::{rank_boroughs, BoroughRank};
pub use calendar::{
    date_key, decode_expiration_code, decode_issue_date, epoch_date, is_expiration_sentinel,
    CalendarDay, EPOCH_DATE_KEY,
};
pub use color::{color_code, match_color, ColorCode, COLOR_CATALOGUE, OTHER_COLOR};
pub use time_of_day::{decode_time, decode_time_opt, normalize_time_text, Meridiem, TimeOfDay, MINUTES_PER_DAY};
