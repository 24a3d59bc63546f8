use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use super::WatchlistCache;
use crate::traccar::TraccarError;

/// Consecutive unauthorized refreshes before the failure is reported loudly
const AUTH_FAILURE_THRESHOLD: u32 = 3;

/// Periodic watchlist refresh task
pub struct WatchlistUpdater {
    cache: Arc<WatchlistCache>,
    refresh_interval: Duration,
}

impl WatchlistUpdater {
    pub fn new(cache: Arc<WatchlistCache>, refresh_interval: Duration) -> Self {
        Self {
            cache,
            refresh_interval,
        }
    }

    /// Spawn the refresh loop. The first refresh runs immediately.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        info!(
            "Starting watchlist updater (attribute: {}, interval: {}s)",
            self.cache.attribute(),
            self.refresh_interval.as_secs()
        );

        tokio::spawn(async move {
            let mut ticker = interval(self.refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut auth_failures = 0;

            loop {
                ticker.tick().await;
                let result = self.cache.refresh().await;
                track_auth_failures(&mut auth_failures, &result);
            }
        })
    }
}

/// Update the consecutive-unauthorized counter; returns true when the
/// threshold is reached on this refresh.
fn track_auth_failures<T>(count: &mut u32, result: &Result<T, TraccarError>) -> bool {
    match result {
        Err(e) if e.is_unauthorized() => {
            *count += 1;
            if *count == AUTH_FAILURE_THRESHOLD {
                error!(
                    "Traccar rejected the credentials {} times in a row; no positions will be forwarded until this is fixed",
                    count
                );
                return true;
            }
            if *count > AUTH_FAILURE_THRESHOLD {
                warn!("Traccar still rejects the credentials ({} attempts)", count);
            }
            false
        }
        Err(_) => false,
        Ok(_) => {
            if *count >= AUTH_FAILURE_THRESHOLD {
                info!("Traccar accepted the credentials again");
            }
            *count = 0;
            false
        }
    }
}
