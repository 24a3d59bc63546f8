///! Scheduled task manager - owns every background loop of the bridge
///!
///! - Watchlist refresh (configurable, default every minute)
///! - Statistics summary (default every 10 minutes)
///! - The APRS-IS feed loop, tracked so shutdown can wait for it

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::stats::BridgeStats;
use crate::watchlist::{WatchlistCache, WatchlistUpdater};

/// Scheduled task manager
#[derive(Default)]
pub struct ScheduledTaskManager {
    task_handles: Vec<JoinHandle<()>>,
}

impl ScheduledTaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.task_handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.task_handles.is_empty()
    }

    /// Track a task spawned elsewhere so `shutdown` stops it too
    pub fn track(&mut self, handle: JoinHandle<()>) {
        self.task_handles.push(handle);
    }

    pub fn spawn_watchlist_updater(&mut self, cache: Arc<WatchlistCache>, refresh_interval: Duration) {
        let handle = WatchlistUpdater::new(cache, refresh_interval).start();
        self.task_handles.push(handle);
    }

    /// Log a counter summary every `period`
    pub fn spawn_stats_reporter(&mut self, stats: Arc<BridgeStats>, cache: Arc<WatchlistCache>, period: Duration) {
        tracing::info!("Scheduling statistics summary (interval: {}s)", period.as_secs());

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                tracing::info!(
                    "Stats: {}; watching {} callsigns",
                    stats.snapshot(),
                    cache.snapshot().len()
                );
            }
        });
        self.task_handles.push(handle);
    }

    /// Abort every task and wait for them to wind down
    pub async fn shutdown(self) {
        tracing::info!("Shutting down {} scheduled tasks...", self.task_handles.len());

        for handle in &self.task_handles {
            handle.abort();
        }
        for result in join_all(self.task_handles).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    tracing::warn!("Task ended abnormally: {}", e);
                }
            }
        }

        tracing::info!("All scheduled tasks stopped");
    }
}
