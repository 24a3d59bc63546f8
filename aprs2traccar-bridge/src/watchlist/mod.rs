///! Callsign → Traccar device mapping
///!
///! The mapping is rebuilt from the device list on every refresh and swapped
///! in whole; readers hold an `Arc` to whichever snapshot was current when
///! they looked.

mod cache;
mod updater;

pub use cache::{RefreshSummary, WatchlistCache, WatchlistReader};
pub use updater::WatchlistUpdater;

use std::collections::HashMap;

use aprs2traccar_common::callsign;
use chrono::{DateTime, Utc};

use crate::traccar::Device;

/// One watched callsign and the device its positions go to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct WatchEntry {
    pub callsign: String,
    pub device_id: String,
}

/// Immutable snapshot of the watched callsigns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Watchlist {
    entries: HashMap<String, String>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl Watchlist {
    /// Build from a device listing.
    ///
    /// Disabled devices and devices without a string value for `attribute`
    /// are skipped. When two devices claim the same callsign the one with
    /// the lowest id keeps it.
    pub fn from_devices(devices: &[Device], attribute: &str) -> Self {
        let mut sorted: Vec<&Device> = devices.iter().collect();
        sorted.sort_by_key(|device| device.id);

        let mut entries: HashMap<String, String> = HashMap::new();
        for device in sorted {
            if device.disabled {
                tracing::debug!("Skipping disabled device {} ({})", device.id, device.name);
                continue;
            }
            let Some(value) = device.attribute(attribute) else {
                continue;
            };
            let call = callsign::normalize(value);
            if call.is_empty() {
                continue;
            }

            match entries.get(&call) {
                Some(owner) => {
                    tracing::warn!(
                        "Callsign {} is set on device '{}' and device '{}'; keeping '{}'",
                        call,
                        owner,
                        device.unique_id,
                        owner
                    );
                }
                None => {
                    entries.insert(call, device.unique_id.clone());
                }
            }
        }

        Self {
            entries,
            refreshed_at: Some(Utc::now()),
        }
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = WatchEntry>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (callsign::normalize(&entry.callsign), entry.device_id))
                .collect(),
            refreshed_at: Some(Utc::now()),
        }
    }

    /// Device watching `source_callsign`, matched exactly after normalization
    pub fn device_for(&self, source_callsign: &str) -> Option<&str> {
        self.entries
            .get(&callsign::normalize(source_callsign))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `None` until the first successful refresh
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// Entries ordered by callsign
    pub fn entries(&self) -> Vec<WatchEntry> {
        let mut entries: Vec<WatchEntry> = self
            .entries
            .iter()
            .map(|(callsign, device_id)| WatchEntry {
                callsign: callsign.clone(),
                device_id: device_id.clone(),
            })
            .collect();
        entries.sort();
        entries
    }
}
