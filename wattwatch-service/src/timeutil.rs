//! Timestamp and hour-bucket utilities shared by the grouping engine, the
//! interval-report parser, and the report navigator.
//!
//! All calendar math happens in a caller-supplied fixed `UtcOffset` (the
//! household's reference timezone from configuration); timestamps themselves
//! stay `OffsetDateTime`.

use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime, UtcOffset};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TimeError {
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error("unrecognized hour format '{0}'")]
    UnrecognizedHourFormat(String),
}

/// Parse an RFC 3339 timestamp. Unparseable input is an error, never
/// coerced to "now" or to the epoch.
pub fn parse_timestamp(s: &str) -> Result<OffsetDateTime, TimeError> {
    OffsetDateTime::parse(s.trim(), &Rfc3339)
        .map_err(|_| TimeError::InvalidTimestamp(s.to_string()))
}

/// Calendar date of `ts` in the reference timezone.
pub fn local_calendar_date(ts: OffsetDateTime, offset: UtcOffset) -> Date {
    ts.to_offset(offset).date()
}

/// Minutes between two instants, possibly fractional.
///
/// No clamping: an end before its start yields a negative value and the
/// caller guards against it.
pub fn elapsed_minutes(start: OffsetDateTime, end: OffsetDateTime) -> f64 {
    (end - start).as_seconds_f64() / 60.0
}

/// Canonical `"HH:MM"` bucket key for `ts` in the reference timezone.
pub fn hour_label(ts: OffsetDateTime, offset: UtcOffset) -> String {
    let local = ts.to_offset(offset);
    format!("{:02}:{:02}", local.hour(), local.minute())
}

/// Inverse of [`hour_label`]: resolve an hour string on `date` to an
/// instant in the reference timezone.
///
/// Accepts 24-hour (`"14:00"`) and 12-hour (`"2:00 PM"`) forms.
pub fn parse_hour_label(
    date: Date,
    label: &str,
    offset: UtcOffset,
) -> Result<OffsetDateTime, TimeError> {
    let (hour, minute) = parse_hour_parts(label)?;
    let dt = date
        .with_hms(hour, minute, 0)
        .map_err(|_| TimeError::UnrecognizedHourFormat(label.to_string()))?;
    Ok(dt.assume_offset(offset))
}

fn parse_hour_parts(label: &str) -> Result<(u8, u8), TimeError> {
    let err = || TimeError::UnrecognizedHourFormat(label.to_string());

    let trimmed = label.trim();
    let upper = trimmed.to_ascii_uppercase();

    let (clock, meridiem) = if let Some(rest) = upper.strip_suffix("AM") {
        (rest.trim_end().to_string(), Some(false))
    } else if let Some(rest) = upper.strip_suffix("PM") {
        (rest.trim_end().to_string(), Some(true))
    } else {
        (upper, None)
    };

    let (hour_str, minute_str) = clock.split_once(':').ok_or_else(err)?;
    let hour: u8 = hour_str.trim().parse().map_err(|_| err())?;
    let minute: u8 = minute_str.trim().parse().map_err(|_| err())?;

    if minute > 59 {
        return Err(err());
    }

    let hour = match meridiem {
        None => {
            if hour > 23 {
                return Err(err());
            }
            hour
        }
        Some(is_pm) => {
            if hour < 1 || hour > 12 {
                return Err(err());
            }
            // 12 AM is midnight, 12 PM is noon.
            match (is_pm, hour) {
                (false, 12) => 0,
                (false, h) => h,
                (true, 12) => 12,
                (true, h) => h + 12,
            }
        }
    };

    Ok((hour, minute))
}
