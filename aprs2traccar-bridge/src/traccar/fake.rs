//! In-memory Traccar used by unit tests

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Device, LocationUpdate, TraccarApi, TraccarError};

#[derive(Default)]
pub(crate) struct FakeTraccar {
    devices: Mutex<Vec<Device>>,
    /// Status the next device listings fail with, if any
    failure: Mutex<Option<u16>>,
    push_failure: Mutex<Option<u16>>,
    sent: Mutex<Vec<LocationUpdate>>,
}

impl FakeTraccar {
    pub(crate) fn with_devices(devices: Vec<Device>) -> Self {
        let fake = Self::default();
        fake.set_devices(devices);
        fake
    }

    pub(crate) fn set_devices(&self, devices: Vec<Device>) {
        *self.devices.lock().unwrap() = devices;
    }

    pub(crate) fn fail_listing(&self, status: Option<u16>) {
        *self.failure.lock().unwrap() = status;
    }

    pub(crate) fn fail_pushes(&self, status: Option<u16>) {
        *self.push_failure.lock().unwrap() = status;
    }

    pub(crate) fn sent(&self) -> Vec<LocationUpdate> {
        self.sent.lock().unwrap().clone()
    }
}

fn status_error(status: u16) -> TraccarError {
    match status {
        401 | 403 => TraccarError::Unauthorized(status),
        _ => TraccarError::UnexpectedStatus {
            url: "http://traccar.invalid".to_string(),
            status,
        },
    }
}

/// Device fixture with an optional string attribute
pub(crate) fn device(id: i64, unique_id: &str, attribute: Option<(&str, &str)>) -> Device {
    let mut attributes = Map::new();
    if let Some((key, value)) = attribute {
        attributes.insert(key.to_string(), Value::String(value.to_string()));
    }
    Device {
        id,
        name: format!("Device {}", id),
        unique_id: unique_id.to_string(),
        disabled: false,
        attributes,
    }
}

#[async_trait]
impl TraccarApi for FakeTraccar {
    async fn fetch_devices(&self) -> Result<Vec<Device>, TraccarError> {
        if let Some(status) = *self.failure.lock().unwrap() {
            return Err(status_error(status));
        }
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn send_position(&self, update: &LocationUpdate) -> Result<(), TraccarError> {
        self.sent.lock().unwrap().push(update.clone());
        match *self.push_failure.lock().unwrap() {
            Some(400) => Err(TraccarError::UnknownDevice(update.device_id.clone())),
            Some(status) => Err(status_error(status)),
            None => Ok(()),
        }
    }
}
