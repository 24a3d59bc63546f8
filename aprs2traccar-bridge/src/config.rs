use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use aprs2traccar_common::callsign;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "APRS2TRACCAR_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no callsign configured (set aprs.callsign or CALLSIGN)")]
    MissingCallsign,
    #[error("invalid callsign '{0}'")]
    InvalidCallsign(String),
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("invalid URL '{value}' for {key}: {reason}")]
    InvalidUrl {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("backoff minimum ({min}s) exceeds maximum ({max}s)")]
    BackoffRange { min: u64, max: u64 },
    #[error("Traccar user and password must be configured together")]
    IncompleteCredentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AprsConfig {
    /// Login callsign, also the default `b/` filter subject
    #[serde(default)]
    pub callsign: String,

    #[serde(default = "default_aprs_host")]
    pub host: String,

    #[serde(default = "default_aprs_port")]
    pub port: u16,

    /// Server-side filter; empty disables, unset means `b/<callsign>`
    #[serde(default)]
    pub filter: Option<String>,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_login_timeout_secs")]
    pub login_timeout_secs: u64,

    /// Reconnect when the server stays silent this long
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Send a `#` comment line at this interval; unset disables
    #[serde(default)]
    pub keepalive_interval_secs: Option<u64>,

    #[serde(default = "default_backoff_min_secs")]
    pub backoff_min_secs: u64,

    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,

    /// Streaming this long resets the backoff delay to its minimum
    #[serde(default = "default_backoff_reset_after_secs")]
    pub backoff_reset_after_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraccarConfig {
    /// Base URL of the Traccar web/API server
    #[serde(default = "default_traccar_api_url")]
    pub api_url: String,

    /// OsmAnd position endpoint
    #[serde(default = "default_traccar_position_url")]
    pub position_url: String,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// API token, used instead of user/password when set
    #[serde(default)]
    pub token: Option<String>,

    /// Device attribute holding the watched callsign
    #[serde(default = "default_traccar_attribute")]
    pub attribute: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistConfig {
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Statistics summary interval; 0 disables
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    #[serde(default)]
    pub aprs: AprsConfig,

    #[serde(default)]
    pub traccar: TraccarConfig,

    #[serde(default)]
    pub watchlist: WatchlistConfig,
}

fn default_aprs_host() -> String {
    "rotate.aprs.net".to_string()
}

fn default_aprs_port() -> u16 {
    14580
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_login_timeout_secs() -> u64 {
    15
}

fn default_idle_timeout_secs() -> u64 {
    120
}

fn default_backoff_min_secs() -> u64 {
    5
}

fn default_backoff_max_secs() -> u64 {
    300
}

fn default_backoff_reset_after_secs() -> u64 {
    120
}

fn default_traccar_api_url() -> String {
    "http://traccar:8082".to_string()
}

fn default_traccar_position_url() -> String {
    "http://traccar:5055".to_string()
}

fn default_traccar_attribute() -> String {
    "aprs_callsign".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_stats_interval_secs() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AprsConfig {
    fn default() -> Self {
        Self {
            callsign: String::new(),
            host: default_aprs_host(),
            port: default_aprs_port(),
            filter: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            login_timeout_secs: default_login_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            keepalive_interval_secs: None,
            backoff_min_secs: default_backoff_min_secs(),
            backoff_max_secs: default_backoff_max_secs(),
            backoff_reset_after_secs: default_backoff_reset_after_secs(),
        }
    }
}

impl Default for TraccarConfig {
    fn default() -> Self {
        Self {
            api_url: default_traccar_api_url(),
            position_url: default_traccar_position_url(),
            user: None,
            password: None,
            token: None,
            attribute: default_traccar_attribute(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: None,
            aprs: AprsConfig::default(),
            traccar: TraccarConfig::default(),
            watchlist: WatchlistConfig::default(),
        }
    }
}

impl AprsConfig {
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Filter term for the login line, `None` when filtering is disabled.
    pub fn filter_term(&self) -> Option<String> {
        match &self.filter {
            Some(filter) if filter.trim().is_empty() => None,
            Some(filter) => Some(filter.trim().to_string()),
            None => Some(format!("b/{}", self.callsign.trim().to_ascii_uppercase())),
        }
    }
}

impl TraccarConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl WatchlistConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }
}

impl BridgeConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config: BridgeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply environment overrides (`CALLSIGN`, `APRS_HOST`, ...) through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(callsign) = get("CALLSIGN") {
            self.aprs.callsign = callsign;
        }
        if let Some(host) = get("APRS_HOST") {
            self.aprs.host = host;
        }
        if let Some(port) = get("APRS_PORT") {
            self.aprs.port = parse_number("APRS_PORT", &port)?;
        }
        // An explicitly empty APRS_FILTER disables filtering
        if let Some(filter) = lookup("APRS_FILTER") {
            self.aprs.filter = Some(filter);
        }
        if let Some(url) = get("TRACCAR_HOST") {
            self.traccar.position_url = url;
        }
        if let Some(url) = get("TRACCAR_API_URL") {
            self.traccar.api_url = url;
        }
        if let Some(user) = get("TRACCAR_USER") {
            self.traccar.user = Some(user);
        }
        if let Some(password) = get("TRACCAR_PASSWORD") {
            self.traccar.password = Some(password);
        }
        if let Some(token) = get("TRACCAR_TOKEN") {
            self.traccar.token = Some(token);
        }
        if let Some(attribute) = get("TRACCAR_ATTRIBUTE") {
            self.traccar.attribute = attribute;
        }
        if let Some(interval) = get("REFRESH_INTERVAL") {
            self.watchlist.refresh_interval_secs = parse_number("REFRESH_INTERVAL", &interval)?;
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.log_level = level.to_ascii_lowercase();
        }
        if let Some(dir) = get("LOG_DIR") {
            self.log_dir = Some(dir);
        }

        Ok(())
    }

    /// Startup checks; any failure here is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let call = self.aprs.callsign.trim();
        if call.is_empty() {
            return Err(ConfigError::MissingCallsign);
        }
        if !callsign::is_valid(call) {
            return Err(ConfigError::InvalidCallsign(call.to_string()));
        }

        if self.aprs.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "aprs.host",
                value: self.aprs.host.clone(),
            });
        }
        if self.aprs.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "aprs.port",
                value: "0".to_string(),
            });
        }

        validate_url("traccar.api_url", &self.traccar.api_url)?;
        validate_url("traccar.position_url", &self.traccar.position_url)?;

        if self.traccar.attribute.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "traccar.attribute",
                value: self.traccar.attribute.clone(),
            });
        }
        if self.traccar.user.is_some() != self.traccar.password.is_some() {
            return Err(ConfigError::IncompleteCredentials);
        }

        let durations = [
            ("aprs.connect_timeout_secs", self.aprs.connect_timeout_secs),
            ("aprs.login_timeout_secs", self.aprs.login_timeout_secs),
            ("aprs.idle_timeout_secs", self.aprs.idle_timeout_secs),
            ("aprs.backoff_min_secs", self.aprs.backoff_min_secs),
            ("traccar.request_timeout_secs", self.traccar.request_timeout_secs),
            ("watchlist.refresh_interval_secs", self.watchlist.refresh_interval_secs),
        ];
        if let Some((key, _)) = durations.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::ZeroDuration(*key));
        }
        if self.aprs.keepalive_interval_secs == Some(0) {
            return Err(ConfigError::ZeroDuration("aprs.keepalive_interval_secs"));
        }

        if self.aprs.backoff_min_secs > self.aprs.backoff_max_secs {
            return Err(ConfigError::BackoffRange {
                min: self.aprs.backoff_min_secs,
                max: self.aprs.backoff_max_secs,
            });
        }

        Ok(())
    }

    pub fn has_traccar_credentials(&self) -> bool {
        self.traccar.token.is_some() || self.traccar.user.is_some()
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

fn validate_url(key: &'static str, value: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidUrl {
            key,
            value: value.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// Load, override from the process environment and validate.
///
/// This is the only place that reads ambient process state; components get
/// the resulting value passed in.
pub fn load_from_env() -> anyhow::Result<BridgeConfig> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = BridgeConfig::load(Path::new(&path))?;
    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}
