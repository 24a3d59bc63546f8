//! APRS-IS line decoder.
//!
//! Turns one TNC2 line (`SRC>DEST,PATH:payload`) into a [`PositionReport`],
//! [`Parsed::NotPosition`] for packet types we do not track, or a
//! [`ParseError`] when the line is structurally broken.

mod compressed;
mod mic_e;
mod timestamp;
mod uncompressed;

use chrono::{DateTime, Utc};

use crate::callsign;
use crate::error::ParseError;
use crate::types::{Parsed, PositionFormat, PositionReport};

pub(crate) const FEET_TO_METERS: f64 = 0.3048;

/// Position fields shared by all three encodings, before header data and
/// comment extensions are merged in.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DecodedPosition<'a> {
    pub latitude: f64,
    pub longitude: f64,
    pub symbol_table: char,
    pub symbol_code: char,
    pub course: Option<u16>,
    pub speed: Option<f64>,
    pub altitude: Option<f64>,
    pub ambiguity: u8,
    pub comment: &'a str,
    pub format: PositionFormat,
}

/// Parse a feed line received now.
pub fn parse(line: &str) -> Result<Parsed, ParseError> {
    parse_at(line, Utc::now())
}

/// Parse a feed line received at `received_at`.
///
/// Packets without a timestamp are stamped with `received_at`; partial
/// timestamps (day or time of day only) are resolved against it.
pub fn parse_at(line: &str, received_at: DateTime<Utc>) -> Result<Parsed, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Err(ParseError::EmptyLine);
    }

    let (header, payload) = line
        .split_once(':')
        .ok_or_else(|| ParseError::InvalidHeader(line.to_owned()))?;
    let (source, route) = header
        .split_once('>')
        .ok_or_else(|| ParseError::InvalidHeader(header.to_owned()))?;

    if !callsign::is_valid_source(source) {
        return Err(ParseError::InvalidCallsign(source.to_owned()));
    }

    let mut route_fields = route.split(',');
    let destination = route_fields.next().unwrap_or_default();
    let path: Vec<String> = route_fields.map(str::to_owned).collect();
    if destination.is_empty()
        || path.iter().any(String::is_empty)
        || route.chars().any(|c| c.is_control() || c.is_whitespace())
    {
        return Err(ParseError::InvalidHeader(header.to_owned()));
    }

    let data_type = payload.chars().next().ok_or(ParseError::EmptyPayload)?;
    let body = &payload[data_type.len_utf8()..];

    let (decoded, timestamp) = match data_type {
        // Ultimeter 2000 weather report
        '!' if body.starts_with('!') => return Ok(Parsed::NotPosition),
        '!' | '=' => (decode_position(body)?, None),
        '/' | '@' => {
            let stamp = body.get(..7).ok_or_else(|| ParseError::Truncated {
                kind: "timestamped",
                input: body.to_owned(),
            })?;
            let resolved = timestamp::resolve(stamp, received_at)?;
            (decode_position(&body[7..])?, Some(resolved))
        }
        '`' | '\'' => (mic_e::decode(destination, body)?, None),
        _ => return Ok(Parsed::NotPosition),
    };

    if !(-90.0..=90.0).contains(&decoded.latitude) || !(-180.0..=180.0).contains(&decoded.longitude) {
        return Err(ParseError::OutOfRange {
            latitude: decoded.latitude,
            longitude: decoded.longitude,
        });
    }

    let (altitude, comment) = match decoded.altitude {
        Some(altitude) => (Some(altitude), decoded.comment.to_owned()),
        None => match comment_altitude(decoded.comment) {
            Some((altitude, rest)) => (Some(altitude), rest),
            None => (None, decoded.comment.to_owned()),
        },
    };
    let comment = comment.trim();

    Ok(Parsed::Position(PositionReport {
        source_callsign: source.to_owned(),
        destination: destination.to_owned(),
        path,
        latitude: decoded.latitude,
        longitude: decoded.longitude,
        timestamp_utc: timestamp.unwrap_or(received_at),
        course_degrees: decoded.course,
        speed_knots: decoded.speed,
        altitude_meters: altitude,
        comment: (!comment.is_empty()).then(|| comment.to_owned()),
        symbol_table: decoded.symbol_table,
        symbol_code: decoded.symbol_code,
        format: decoded.format,
        ambiguity: decoded.ambiguity,
    }))
}

fn decode_position(body: &str) -> Result<DecodedPosition<'_>, ParseError> {
    match body.as_bytes().first() {
        Some(b) if b.is_ascii_digit() => uncompressed::decode(body),
        Some(_) => compressed::decode(body),
        None => Err(ParseError::Truncated {
            kind: "position",
            input: String::new(),
        }),
    }
}

/// `/A=nnnnnn` altitude in feet anywhere in the comment; returns metres and
/// the comment with the field removed.
fn comment_altitude(comment: &str) -> Option<(f64, String)> {
    let start = comment.find("/A=")?;
    let digits = comment.get(start + 3..start + 9)?;
    let feet: i32 = digits.parse().ok()?;

    let rest = format!("{}{}", &comment[..start], &comment[start + 9..]);
    Some((f64::from(feet) * FEET_TO_METERS, rest))
}

/// ASCII character at byte offset `index`, if there is one.
pub(crate) fn ascii_at(s: &str, index: usize) -> Option<char> {
    s.as_bytes()
        .get(index)
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
}

/// Primary/alternate table or an overlay character.
pub(crate) fn is_symbol_table(c: char) -> bool {
    matches!(c, '/' | '\\' | '0'..='9' | 'A'..='Z')
}

/// APRS course: 0 means unknown and 360 means north.
pub(crate) fn normalize_course(course: u16) -> Option<u16> {
    match course {
        0 => None,
        360 => Some(0),
        1..=359 => Some(course),
        _ => None,
    }
}
