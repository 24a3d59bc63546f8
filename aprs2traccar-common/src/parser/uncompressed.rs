//! Plain-text `DDMM.mmN/DDDMM.mmW$` positions with optional `CCC/SSS`.

use super::{ascii_at, is_symbol_table, normalize_course, DecodedPosition};
use crate::error::ParseError;
use crate::types::PositionFormat;

const LATITUDE_LEN: usize = 8;
const LONGITUDE_LEN: usize = 9;
const POSITION_LEN: usize = LATITUDE_LEN + 1 + LONGITUDE_LEN + 1;

pub(crate) fn decode(body: &str) -> Result<DecodedPosition<'_>, ParseError> {
    if body.len() < POSITION_LEN {
        return Err(ParseError::Truncated {
            kind: "uncompressed",
            input: body.to_owned(),
        });
    }

    let lat_text = body
        .get(..LATITUDE_LEN)
        .ok_or_else(|| ParseError::InvalidLatitude(body.to_owned()))?;
    let (latitude, ambiguity) = parse_coordinate(lat_text, 2, b'N', b'S')
        .ok_or_else(|| ParseError::InvalidLatitude(lat_text.to_owned()))?;

    let symbol_table = ascii_at(body, LATITUDE_LEN)
        .ok_or_else(|| ParseError::InvalidLongitude(body.to_owned()))?;
    if !is_symbol_table(symbol_table) {
        return Err(ParseError::InvalidSymbolTable(symbol_table));
    }

    let lon_text = body
        .get(LATITUDE_LEN + 1..POSITION_LEN - 1)
        .ok_or_else(|| ParseError::InvalidLongitude(body.to_owned()))?;
    let (longitude, _) = parse_coordinate(lon_text, 3, b'E', b'W')
        .ok_or_else(|| ParseError::InvalidLongitude(lon_text.to_owned()))?;

    let symbol_code = ascii_at(body, POSITION_LEN - 1)
        .ok_or_else(|| ParseError::InvalidLongitude(body.to_owned()))?;

    let mut comment = &body[POSITION_LEN..];
    let mut course = None;
    let mut speed = None;

    // On weather stations the same field carries wind direction/speed
    if symbol_code != '_' {
        if let Some((cse, spd, rest)) = course_speed(comment) {
            course = cse;
            speed = Some(spd);
            comment = rest;
        }
    }

    Ok(DecodedPosition {
        latitude,
        longitude,
        symbol_table,
        symbol_code,
        course,
        speed,
        altitude: None,
        ambiguity,
        comment,
        format: PositionFormat::Uncompressed,
    })
}

/// Parse `DD[D]MM.mmH` into signed degrees plus the ambiguity level.
///
/// Trailing digits may be blanked with spaces (right to left: hundredths,
/// then minute units, then minute tens); blanked digits read as zero.
fn parse_coordinate(text: &str, degree_digits: usize, positive: u8, negative: u8) -> Option<(f64, u8)> {
    let bytes = text.as_bytes();
    let dd = degree_digits;
    if bytes.len() != dd + 6 || bytes[dd + 2] != b'.' {
        return None;
    }

    let sign = match bytes[dd + 5] {
        b if b == positive => 1.0,
        b if b == negative => -1.0,
        _ => return None,
    };

    let mut ambiguity = 0u8;
    let mut seen_digit = false;
    for i in (0..dd + 2).chain(dd + 3..dd + 5).rev() {
        match bytes[i] {
            b' ' if !seen_digit && i >= dd => ambiguity += 1,
            b'0'..=b'9' => seen_digit = true,
            _ => return None,
        }
    }

    let digit = |i: usize| match bytes[i] {
        b' ' => 0.0,
        b => f64::from(b - b'0'),
    };

    let degrees = (0..dd).fold(0.0, |acc, i| acc * 10.0 + digit(i));
    let minutes = digit(dd) * 10.0 + digit(dd + 1) + digit(dd + 3) / 10.0 + digit(dd + 4) / 100.0;
    if minutes >= 60.0 {
        return None;
    }

    Some((sign * (degrees + minutes / 60.0), ambiguity))
}

/// `CCC/SSS` data extension at the start of the comment.
fn course_speed(comment: &str) -> Option<(Option<u16>, f64, &str)> {
    let ext = comment.get(..7)?;
    let bytes = ext.as_bytes();
    if bytes[3] != b'/'
        || !bytes[..3].iter().all(u8::is_ascii_digit)
        || !bytes[4..].iter().all(u8::is_ascii_digit)
    {
        return None;
    }

    let course: u16 = ext[..3].parse().ok()?;
    let speed: u16 = ext[4..].parse().ok()?;
    if course > 360 {
        return None;
    }

    Some((normalize_course(course), f64::from(speed), &comment[7..]))
}
