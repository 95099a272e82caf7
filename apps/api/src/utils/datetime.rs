use chrono::{DateTime, Datelike, Duration, Months, NaiveDateTime, SecondsFormat, Utc};

use crate::constants::NEVER_EXPIRES;

pub fn parse_datetime(dt_str: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(dt_str) {
        return Some(dt.with_timezone(&Utc));
    }

    // SQLite datetime('now') format
    let formats = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

    let clean_str = dt_str.replace('Z', "");
    for fmt in &formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&clean_str, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }

    None
}

pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_string() -> String {
    format_datetime(&Utc::now())
}

/// An expiration of the unix epoch means the share never expires.
pub fn is_never(expiration: &str) -> bool {
    parse_datetime(expiration)
        .map(|dt| dt.timestamp() == 0)
        .unwrap_or(false)
}

/// `None` when the value is the "never" sentinel.
pub fn expiration_instant(expiration: &str) -> Option<DateTime<Utc>> {
    parse_datetime(expiration).filter(|dt| dt.timestamp() != 0)
}

/// Whether `expiration` lies in the past. The "never" sentinel is never
/// expired; an unparseable value is treated as expired.
pub fn is_expired(expiration: &str, now: DateTime<Utc>) -> bool {
    match parse_datetime(expiration) {
        Some(dt) if dt.timestamp() == 0 => false,
        Some(dt) => now > dt,
        None => true,
    }
}

/// Latest year whose RFC 3339 form still parses back.
const MAX_YEAR: i32 = 9999;

/// `now + delta`, or `None` when the result overflows or lies past
/// [`MAX_YEAR`].
pub fn checked_offset(now: DateTime<Utc>, delta: Option<Duration>) -> Option<DateTime<Utc>> {
    now.checked_add_signed(delta?)
        .filter(|at| at.year() <= MAX_YEAR)
}

/// Parse `"never"` or a relative `"<n>-<unit>"` expression into the stored
/// expiration string.
pub fn parse_relative_expiration(value: &str, now: DateTime<Utc>) -> Option<String> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("never") {
        return Some(NEVER_EXPIRES.to_string());
    }

    let (amount, unit) = value.split_once('-')?;
    let amount: u32 = amount.trim().parse().ok()?;
    if amount == 0 {
        return None;
    }

    let unit = unit.trim().to_ascii_lowercase();
    let unit = unit.strip_suffix('s').unwrap_or(&unit);

    let amount = i64::from(amount);
    let at = match unit {
        "minute" => checked_offset(now, Duration::try_minutes(amount))?,
        "hour" => checked_offset(now, Duration::try_hours(amount))?,
        "day" => checked_offset(now, Duration::try_days(amount))?,
        "week" => checked_offset(now, Duration::try_weeks(amount))?,
        "month" | "year" => {
            let months = if unit == "year" { amount.checked_mul(12)? } else { amount };
            now.checked_add_months(Months::new(u32::try_from(months).ok()?))
                .filter(|at| at.year() <= MAX_YEAR)?
        }
        _ => return None,
    };

    Some(format_datetime(&at))
}
