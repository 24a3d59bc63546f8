use std::fmt;

/// Lifecycle of the APRS-IS connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Login line sent, waiting for the server to answer
    LoggedIn,
    /// Lines are being parsed and dispatched
    Streaming,
    /// Waiting before the next connection attempt
    Backoff,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::LoggedIn => "logged-in",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Backoff => "backoff",
        };
        f.write_str(name)
    }
}
