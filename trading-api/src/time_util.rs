//! Venue-compatible date formatting shims. Pure functions, no side effects.

use crate::error::TradingError;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};

/// Venue wire format for date/time fields.
pub const VENUE_DATE_FORMAT: &str = "%Y%m%d %H:%M:%S";

/// Formats a timestamp in the venue's `yyyyMMdd HH:mm:ss` shape.
pub fn formatted_date(date: DateTime<Utc>) -> String {
    date.format(VENUE_DATE_FORMAT).to_string()
}

/// Formats today's date with the given time of day, in the venue's shape.
///
/// Fails with `TradingError::Configuration` on an out-of-range time.
pub fn formatted_date_today(hour: u32, minute: u32, second: u32) -> Result<String, TradingError> {
    let time = NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(|| {
        TradingError::Configuration(format!(
            "invalid time of day: {:02}:{:02}:{:02}",
            hour, minute, second
        ))
    })?;
    let date = Utc::now().date_naive().and_time(time);
    Ok(Utc
        .from_utc_datetime(&date)
        .format(VENUE_DATE_FORMAT)
        .to_string())
}
