//! Mic-E positions: latitude lives in the destination field, longitude,
//! speed and course in the first eight bytes of the information field.

use super::compressed::base91;
use super::{is_symbol_table, normalize_course, DecodedPosition};
use crate::callsign;
use crate::error::ParseError;
use crate::types::PositionFormat;

const INFO_LEN: usize = 8;
const ALTITUDE_OFFSET: i64 = 10_000;

/// One decoded destination character.
struct DestinationDigit {
    digit: u8,
    blank: bool,
    /// North / +100° longitude offset / West, depending on position
    flag: bool,
}

fn destination_digit(position: usize, b: u8) -> Option<DestinationDigit> {
    let (digit, blank, flag) = match b {
        b'0'..=b'9' => (b - b'0', false, false),
        // Custom message bits; only meaningful in the first three positions
        b'A'..=b'J' if position < 3 => (b - b'A', false, true),
        b'K' if position < 3 => (0, true, true),
        b'L' => (0, true, false),
        b'P'..=b'Y' => (b - b'P', false, true),
        b'Z' => (0, true, true),
        _ => return None,
    };

    Some(DestinationDigit { digit, blank, flag })
}

pub(crate) fn decode<'a>(destination: &str, info: &'a str) -> Result<DecodedPosition<'a>, ParseError> {
    let bad_destination = || ParseError::InvalidMicEDestination(destination.to_owned());

    let dest = callsign::base(destination).as_bytes();
    if dest.len() != 6 {
        return Err(bad_destination());
    }

    let digits = dest
        .iter()
        .enumerate()
        .map(|(i, &b)| destination_digit(i, b))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(bad_destination)?;

    // Blanked digits must run contiguously from the right, at most four
    let mut ambiguity = 0u8;
    for i in (0..6).rev() {
        if digits[i].blank {
            if i < 2 || usize::from(ambiguity) != 5 - i {
                return Err(bad_destination());
            }
            ambiguity += 1;
        }
    }

    let d = |i: usize| f64::from(digits[i].digit);
    let lat_minutes = d(2) * 10.0 + d(3) + d(4) / 10.0 + d(5) / 100.0;
    if lat_minutes >= 60.0 {
        return Err(bad_destination());
    }
    let mut latitude = d(0) * 10.0 + d(1) + lat_minutes / 60.0;
    if !digits[3].flag {
        latitude = -latitude;
    }
    let longitude_offset = digits[4].flag;
    let west = digits[5].flag;

    let bytes = info.as_bytes();
    if bytes.len() < INFO_LEN {
        return Err(ParseError::Truncated {
            kind: "Mic-E",
            input: info.to_owned(),
        });
    }

    let bad_info = || ParseError::InvalidMicEInfo(info.to_owned());
    if bytes[..INFO_LEN].iter().any(|&b| !(28..=127).contains(&b)) {
        return Err(bad_info());
    }

    let field = |i: usize| i32::from(bytes[i]) - 28;

    let mut lon_degrees = field(0);
    if longitude_offset {
        lon_degrees += 100;
    }
    if (180..=189).contains(&lon_degrees) {
        lon_degrees -= 80;
    } else if (190..=199).contains(&lon_degrees) {
        lon_degrees -= 190;
    }

    let mut lon_minutes = field(1);
    if lon_minutes >= 60 {
        lon_minutes -= 60;
    }
    let lon_hundredths = field(2);

    if lon_degrees > 179 || lon_minutes > 59 || lon_hundredths > 99 {
        return Err(bad_info());
    }

    let mut longitude =
        f64::from(lon_degrees) + (f64::from(lon_minutes) + f64::from(lon_hundredths) / 100.0) / 60.0;
    if west {
        longitude = -longitude;
    }

    let (sp, dc, se) = (field(3), field(4), field(5));
    let mut speed = sp * 10 + dc / 10;
    if speed >= 800 {
        speed -= 800;
    }
    let mut course = (dc % 10) * 100 + se;
    if course >= 400 {
        course -= 400;
    }

    let symbol_code = bytes[6] as char;
    let symbol_table = bytes[7] as char;
    if !is_symbol_table(symbol_table) {
        return Err(ParseError::InvalidSymbolTable(symbol_table));
    }

    let rest = &info[INFO_LEN..];
    let (altitude, comment) = match altitude(rest) {
        Some((meters, end)) => (Some(meters), &rest[end..]),
        None => (None, rest),
    };

    Ok(DecodedPosition {
        latitude,
        longitude,
        symbol_table,
        symbol_code,
        course: u16::try_from(course).ok().and_then(normalize_course),
        speed: Some(f64::from(speed)),
        altitude,
        ambiguity,
        comment,
        format: PositionFormat::MicE,
    })
}

/// Optional `xxx}` altitude, possibly behind a one-byte radio type marker.
/// Returns metres and the byte offset just past the `}`.
fn altitude(rest: &str) -> Option<(f64, usize)> {
    let bytes = rest.as_bytes();
    [0usize, 1].into_iter().find_map(|start| {
        let field = bytes.get(start..start + 4)?;
        if field[3] != b'}' {
            return None;
        }
        let value = base91(&field[..3])?;
        Some(((i64::from(value) - ALTITUDE_OFFSET) as f64, start + 4))
    })
}
