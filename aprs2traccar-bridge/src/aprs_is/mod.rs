///! APRS-IS feed client
///!
///! Connects, logs in with the callsign passcode and streams TNC2 lines into
///! the parser, reconnecting with exponential backoff whenever the session
///! ends.

mod backoff;
mod client;
mod state;

pub use backoff::Backoff;
pub use client::{AprsIsClient, ClientSettings, SessionError};
pub use state::ConnectionState;
