use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraccarError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid Traccar URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("Traccar rejected the credentials (HTTP {0})")]
    Unauthorized(u16),

    #[error("Traccar has no device with identifier '{0}'")]
    UnknownDevice(String),

    #[error("unexpected HTTP {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl TraccarError {
    pub(crate) fn from_request(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TraccarError::Timeout(url.to_string())
        } else {
            TraccarError::Transport {
                url: url.to_string(),
                source: error,
            }
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TraccarError::Unauthorized(_))
    }
}
