use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position encoding a report was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionFormat {
    #[serde(rename = "uncompressed")]
    Uncompressed,
    #[serde(rename = "compressed")]
    Compressed,
    #[serde(rename = "mic-e")]
    MicE,
}

impl PositionFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionFormat::Uncompressed => "uncompressed",
            PositionFormat::Compressed => "compressed",
            PositionFormat::MicE => "mic-e",
        }
    }
}

/// One decoded APRS position report.
///
/// Built by the parser from a single feed line, handed to the dispatcher once
/// and then dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    /// Station that originated the packet (text before the first `>`)
    pub source_callsign: String,
    /// Destination field, e.g. "APRS" or a Mic-E encoded latitude
    pub destination: String,
    /// Digipeater path and q-construct, e.g. ["TCPIP*", "qAC", "T2TEST"]
    pub path: Vec<String>,
    /// Decimal degrees, positive north
    pub latitude: f64,
    /// Decimal degrees, positive east
    pub longitude: f64,
    /// Packet timestamp, or the receive time when the packet carries none
    pub timestamp_utc: DateTime<Utc>,
    /// True course in degrees, 0..=359
    pub course_degrees: Option<u16>,
    pub speed_knots: Option<f64>,
    pub altitude_meters: Option<f64>,
    pub comment: Option<String>,
    pub symbol_table: char,
    pub symbol_code: char,
    pub format: PositionFormat,
    /// Number of blanked position digits (0..=4)
    pub ambiguity: u8,
}

/// Result of parsing a structurally valid feed line
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Position(PositionReport),
    /// Status, message, telemetry, object or any other packet we do not track
    NotPosition,
}
