//! Base-91 compressed positions (`/YYYYXXXX$csT`).

use super::{DecodedPosition, FEET_TO_METERS};
use crate::error::ParseError;
use crate::types::PositionFormat;

const COMPRESSED_LEN: usize = 13;

pub(crate) fn decode(body: &str) -> Result<DecodedPosition<'_>, ParseError> {
    let bytes = body.as_bytes();
    if bytes.len() < COMPRESSED_LEN {
        return Err(ParseError::Truncated {
            kind: "compressed",
            input: body.to_owned(),
        });
    }

    let invalid = || ParseError::InvalidCompressed(body.to_owned());
    if !bytes[..COMPRESSED_LEN].is_ascii() {
        return Err(invalid());
    }

    let symbol_table = match bytes[0] {
        b'/' | b'\\' | b'A'..=b'Z' => bytes[0] as char,
        // Lowercase a-j stand for overlay digits 0-9
        b'a'..=b'j' => (bytes[0] - b'a' + b'0') as char,
        other => return Err(ParseError::InvalidSymbolTable(other as char)),
    };

    let y = base91(&bytes[1..5]).ok_or_else(invalid)?;
    let x = base91(&bytes[5..9]).ok_or_else(invalid)?;
    let latitude = 90.0 - f64::from(y) / 380_926.0;
    let longitude = -180.0 + f64::from(x) / 190_463.0;

    let symbol_code = bytes[9] as char;
    let (course, speed, altitude) = decode_cs(bytes[10], bytes[11], bytes[12]).ok_or_else(invalid)?;

    Ok(DecodedPosition {
        latitude,
        longitude,
        symbol_table,
        symbol_code,
        course,
        speed,
        altitude,
        ambiguity: 0,
        comment: &body[COMPRESSED_LEN..],
        format: PositionFormat::Compressed,
    })
}

pub(crate) fn base91(chars: &[u8]) -> Option<u32> {
    chars.iter().try_fold(0u32, |acc, &b| {
        (33..=123).contains(&b).then(|| acc * 91 + u32::from(b - 33))
    })
}

type CourseSpeedAltitude = (Option<u16>, Option<f64>, Option<f64>);

/// Decode the `cs` pair, whose meaning depends on the compression type byte.
fn decode_cs(c: u8, s: u8, t: u8) -> Option<CourseSpeedAltitude> {
    // Space: no course/speed/range/altitude data; '{': pre-calculated range
    if c == b' ' || c == b'{' {
        return Some((None, None, None));
    }

    let c91 = i32::from(c) - 33;
    let s91 = i32::from(s) - 33;
    let t91 = i32::from(t) - 33;
    if !(0..=90).contains(&c91) || !(0..=90).contains(&s91) {
        return None;
    }

    // GGA origin: cs holds altitude
    if (0..=90).contains(&t91) && (t91 >> 3) & 0x3 == 2 {
        let feet = 1.002f64.powi(c91 * 91 + s91);
        return Some((None, None, Some(feet * FEET_TO_METERS)));
    }

    if c91 <= 89 {
        let course = Some((c91 * 4) as u16);
        let speed = 1.08f64.powi(s91) - 1.0;
        return Some((course, Some(speed), None));
    }

    Some((None, None, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base91() {
        assert_eq!(base91(b"!!!!"), Some(0));
        assert_eq!(base91(b"5L!!"), Some(20 * 91 * 91 * 91 + 43 * 91 * 91));
        assert_eq!(base91(b" !!!"), None);
    }

    #[test]
    fn test_decode_spec_example() {
        let pos = decode("/5L!!<*e7>7P[").unwrap();
        assert!((pos.latitude - 49.5).abs() < 1e-6);
        assert!((pos.longitude + 72.75).abs() < 1e-4);
        assert_eq!(pos.symbol_table, '/');
        assert_eq!(pos.symbol_code, '>');
        assert_eq!(pos.course, Some(88));
        assert!((pos.speed.unwrap() - 36.2).abs() < 0.1);
        assert_eq!(pos.altitude, None);
    }

    #[test]
    fn test_decode_altitude() {
        let pos = decode("/5L!!<*e7>S]1").unwrap();
        let expected = 1.002f64.powi(50 * 91 + 60) * FEET_TO_METERS;
        assert!((pos.altitude.unwrap() - expected).abs() < 1e-6);
        assert_eq!(pos.course, None);
    }

    #[test]
    fn test_decode_no_cs() {
        let pos = decode("\\5L!!<*e7#  Tcomment").unwrap();
        assert_eq!(pos.course, None);
        assert_eq!(pos.speed, None);
        assert_eq!(pos.comment, "comment");
    }

    #[test]
    fn test_overlay_table() {
        let pos = decode("c5L!!<*e7>7P[").unwrap();
        assert_eq!(pos.symbol_table, '2');
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode("/5L!!<*e7"), Err(ParseError::Truncated { .. })));
        assert!(matches!(decode("/5L ! <*e7>7P["), Err(ParseError::InvalidCompressed(_))));
        assert!(matches!(decode("*5L!!<*e7>7P["), Err(ParseError::InvalidSymbolTable('*'))));
    }
}
