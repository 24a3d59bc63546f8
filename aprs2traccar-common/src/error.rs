use thiserror::Error;

/// Structural failures while decoding a feed line.
///
/// Any of these means the line is malformed; callers log and skip it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("empty line")]
    EmptyLine,
    #[error("invalid packet header: {0}")]
    InvalidHeader(String),
    #[error("invalid source callsign: {0}")]
    InvalidCallsign(String),
    #[error("empty information field")]
    EmptyPayload,
    #[error("truncated {kind} position: {input}")]
    Truncated { kind: &'static str, input: String },
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("invalid latitude: {0}")]
    InvalidLatitude(String),
    #[error("invalid longitude: {0}")]
    InvalidLongitude(String),
    #[error("invalid symbol table: {0:?}")]
    InvalidSymbolTable(char),
    #[error("invalid compressed position: {0}")]
    InvalidCompressed(String),
    #[error("invalid Mic-E destination: {0}")]
    InvalidMicEDestination(String),
    #[error("invalid Mic-E information field: {0}")]
    InvalidMicEInfo(String),
    #[error("coordinates out of range: {latitude}, {longitude}")]
    OutOfRange { latitude: f64, longitude: f64 },
}
