use std::sync::Arc;

use tokio::sync::watch;

use super::Watchlist;
use crate::traccar::{TraccarApi, TraccarError};

/// What changed in one successful refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub total: usize,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Owner of the current [`Watchlist`] snapshot.
///
/// Only `refresh` writes; readers obtained through [`WatchlistCache::reader`]
/// never block it.
pub struct WatchlistCache {
    api: Arc<dyn TraccarApi>,
    attribute: String,
    snapshot: watch::Sender<Arc<Watchlist>>,
}

/// Cheap read handle on the current snapshot
#[derive(Clone)]
pub struct WatchlistReader {
    snapshot: watch::Receiver<Arc<Watchlist>>,
}

impl WatchlistReader {
    pub fn current(&self) -> Arc<Watchlist> {
        self.snapshot.borrow().clone()
    }
}

impl WatchlistCache {
    pub fn new(api: Arc<dyn TraccarApi>, attribute: impl Into<String>) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Watchlist::default()));
        Self {
            api,
            attribute: attribute.into(),
            snapshot,
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn snapshot(&self) -> Arc<Watchlist> {
        self.snapshot.borrow().clone()
    }

    pub fn reader(&self) -> WatchlistReader {
        WatchlistReader {
            snapshot: self.snapshot.subscribe(),
        }
    }

    /// Fetch the device list and swap in a freshly built snapshot.
    ///
    /// On failure the previous snapshot stays current.
    pub async fn refresh(&self) -> Result<RefreshSummary, TraccarError> {
        let devices = match self.api.fetch_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!(
                    "Watchlist refresh failed, keeping {} previous entries: {}",
                    self.snapshot().len(),
                    e
                );
                return Err(e);
            }
        };

        let next = Arc::new(Watchlist::from_devices(&devices, &self.attribute));
        let previous = self.snapshot.send_replace(next.clone());

        let summary = diff(&previous, &next);
        for call in &summary.added {
            tracing::info!("Watching {} -> device '{}'", call, next.device_for(call).unwrap_or_default());
        }
        for call in &summary.removed {
            tracing::info!("No longer watching {}", call);
        }
        tracing::debug!(
            "Watchlist refreshed: {} devices, {} watched callsigns",
            devices.len(),
            summary.total
        );

        Ok(summary)
    }
}

fn diff(previous: &Watchlist, next: &Watchlist) -> RefreshSummary {
    let before = previous.entries();
    let after = next.entries();

    let added = after
        .iter()
        .filter(|entry| !before.contains(entry))
        .map(|entry| entry.callsign.clone())
        .collect();
    let removed = before
        .iter()
        .filter(|entry| next.device_for(&entry.callsign).is_none())
        .map(|entry| entry.callsign.clone())
        .collect();

    RefreshSummary {
        total: next.len(),
        added,
        removed,
    }
}
