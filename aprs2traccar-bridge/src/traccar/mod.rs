///! Traccar HTTP collaborator
///!
///! Two calls are used: the device listing of the web API (to learn which
///! devices carry a callsign attribute) and the OsmAnd position endpoint (to
///! push a location for one device).

mod client;
mod error;
mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use client::{Credentials, TraccarClient};
pub use error::TraccarError;
pub use types::{Device, LocationUpdate};

use async_trait::async_trait;

/// The subset of Traccar the bridge talks to
#[async_trait]
pub trait TraccarApi: Send + Sync {
    /// Every device visible to the configured account
    async fn fetch_devices(&self) -> Result<Vec<Device>, TraccarError>;

    /// Report one position for the device identified by `update.device_id`
    async fn send_position(&self, update: &LocationUpdate) -> Result<(), TraccarError>;
}
