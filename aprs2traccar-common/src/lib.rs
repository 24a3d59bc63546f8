//! Shared APRS building blocks for the aprs2traccar bridge.
//!
//! Everything in this crate is pure: packet decoding, callsign handling and
//! the APRS-IS passcode. Network I/O lives in `aprs2traccar-bridge`.

pub mod callsign;
pub mod error;
pub mod parser;
pub mod passcode;
pub mod types;

pub use error::ParseError;
pub use parser::{parse, parse_at};
pub use passcode::passcode;
pub use types::{Parsed, PositionFormat, PositionReport};
