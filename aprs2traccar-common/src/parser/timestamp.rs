//! APRS 7-character timestamps (`DDHHMMz`, `DDHHMM/`, `HHMMSSh`).

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

use crate::error::ParseError;

/// Resolve a packet timestamp to a full instant, relative to when the line
/// was received.
///
/// `DDHHMM/` is nominally local time at the sender; no zone is known, so it
/// is read as UTC like `DDHHMMz`.
pub(crate) fn resolve(stamp: &str, received_at: DateTime<Utc>) -> Result<DateTime<Utc>, ParseError> {
    let invalid = || ParseError::InvalidTimestamp(stamp.to_owned());

    let bytes = stamp.as_bytes();
    if bytes.len() != 7 || !bytes[..6].iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }

    let pair = |i: usize| u32::from(bytes[i] - b'0') * 10 + u32::from(bytes[i + 1] - b'0');
    let (a, b, c) = (pair(0), pair(2), pair(4));

    let resolved = match bytes[6] {
        b'z' | b'/' => day_hour_minute(a, b, c, received_at),
        b'h' => hour_minute_second(a, b, c, received_at),
        _ => None,
    };

    resolved.ok_or_else(invalid)
}

fn day_hour_minute(day: u32, hour: u32, minute: u32, received_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if day == 0 || day > 31 || hour > 23 || minute > 59 {
        return None;
    }

    let latest = received_at + Duration::days(1);
    let (mut year, mut month) = (received_at.year(), received_at.month());

    // Day-of-month only: take the most recent month in which the day exists
    // and which does not put the report in the future.
    for _ in 0..3 {
        if let Some(candidate) = Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).single() {
            if candidate <= latest {
                return Some(candidate);
            }
        }
        (year, month) = previous_month(year, month);
    }

    None
}

fn hour_minute_second(hour: u32, minute: u32, second: u32, received_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let candidate = received_at
        .date_naive()
        .and_hms_opt(hour, minute, second)?
        .and_utc();

    if candidate > received_at + Duration::hours(1) {
        Some(candidate - Duration::days(1))
    } else {
        Some(candidate)
    }
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}
