use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};

use super::{Device, LocationUpdate, TraccarApi, TraccarError};
use crate::config::TraccarConfig;

const USER_AGENT: &str = concat!("aprs2traccar/", env!("CARGO_PKG_VERSION"));

/// How requests to the web API authenticate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    None,
    Basic { user: String, password: String },
    Bearer(String),
}

impl Credentials {
    /// A token wins over user/password when both are configured.
    pub fn from_config(config: &TraccarConfig) -> Self {
        if let Some(token) = &config.token {
            return Credentials::Bearer(token.clone());
        }
        match (&config.user, &config.password) {
            (Some(user), Some(password)) => Credentials::Basic {
                user: user.clone(),
                password: password.clone(),
            },
            _ => Credentials::None,
        }
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Credentials::None => request,
            Credentials::Basic { user, password } => request.basic_auth(user, Some(password)),
            Credentials::Bearer(token) => request.bearer_auth(token),
        }
    }
}

/// reqwest-backed [`TraccarApi`]
pub struct TraccarClient {
    http: Client,
    devices_url: Url,
    position_url: Url,
    credentials: Credentials,
}

impl TraccarClient {
    pub fn new(config: &TraccarConfig) -> Result<Self, TraccarError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(TraccarError::Client)?;
        Self::with_http_client(config, http)
    }

    /// Use a preconfigured HTTP client (timeouts, proxies) instead of the default one.
    pub fn with_http_client(config: &TraccarConfig, http: Client) -> Result<Self, TraccarError> {
        let api_url = config.api_url.trim_end_matches('/');
        let devices_url = parse_url(&format!("{}/api/devices", api_url))?;
        let position_url = parse_url(&config.position_url)?;

        Ok(Self {
            http,
            devices_url,
            position_url,
            credentials: Credentials::from_config(config),
        })
    }
}

fn parse_url(url: &str) -> Result<Url, TraccarError> {
    Url::parse(url).map_err(|e| TraccarError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl TraccarApi for TraccarClient {
    async fn fetch_devices(&self) -> Result<Vec<Device>, TraccarError> {
        let url = self.devices_url.as_str();
        tracing::debug!("Fetching Traccar devices from {}", url);

        let request = self
            .http
            .get(self.devices_url.clone())
            .header(reqwest::header::ACCEPT, "application/json");
        let response = self
            .credentials
            .apply(request)
            .send()
            .await
            .map_err(|e| TraccarError::from_request(url, e))?;

        let status = response.status();
        match status {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(TraccarError::Unauthorized(status.as_u16()));
            }
            _ => {
                return Err(TraccarError::UnexpectedStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
        }

        let devices: Vec<Device> = response.json().await.map_err(|e| TraccarError::Decode {
            url: url.to_string(),
            source: e,
        })?;

        tracing::debug!("Traccar returned {} devices", devices.len());
        Ok(devices)
    }

    async fn send_position(&self, update: &LocationUpdate) -> Result<(), TraccarError> {
        let mut url = self.position_url.clone();
        url.query_pairs_mut().extend_pairs(update.query_pairs());
        tracing::debug!("POST {}", url);

        let response = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| TraccarError::from_request(self.position_url.as_str(), e))?;

        let status = response.status();
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::BAD_REQUEST => Err(TraccarError::UnknownDevice(update.device_id.clone())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(TraccarError::Unauthorized(status.as_u16()))
            }
            _ => Err(TraccarError::UnexpectedStatus {
                url: self.position_url.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}
