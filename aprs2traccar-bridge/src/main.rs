use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use aprs2traccar_bridge::aprs_is::{AprsIsClient, ClientSettings};
use aprs2traccar_bridge::config;
use aprs2traccar_bridge::dispatcher::Dispatcher;
use aprs2traccar_bridge::logging;
use aprs2traccar_bridge::scheduled::ScheduledTaskManager;
use aprs2traccar_bridge::stats::BridgeStats;
use aprs2traccar_bridge::traccar::{TraccarApi, TraccarClient};
use aprs2traccar_bridge::watchlist::WatchlistCache;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration; errors here stop the process before any loop starts
    let config = config::load_from_env()?;

    // Initialize logging
    let log_dir = config.log_dir.as_ref().map(PathBuf::from);
    let _logging_guard = logging::init_logging(log_dir.as_deref(), "aprs2traccar", &config.log_level)?;

    tracing::info!("aprs2traccar {} starting...", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "APRS-IS server {} as {} (filter: {})",
        config.aprs.server_address(),
        config.aprs.callsign,
        config.aprs.filter_term().as_deref().unwrap_or("none")
    );
    tracing::info!(
        "Traccar API {}, positions to {}, callsign attribute '{}'",
        config.traccar.api_url,
        config.traccar.position_url,
        config.traccar.attribute
    );
    if !config.has_traccar_credentials() {
        tracing::warn!("No Traccar credentials configured; the device listing will most likely be rejected");
    }

    let traccar: Arc<dyn TraccarApi> =
        Arc::new(TraccarClient::new(&config.traccar).context("Failed to create Traccar client")?);
    let cache = Arc::new(WatchlistCache::new(traccar.clone(), config.traccar.attribute.clone()));
    let stats = Arc::new(BridgeStats::new());

    let dispatcher = Arc::new(Dispatcher::new(cache.reader(), traccar, stats.clone()));
    let client = Arc::new(AprsIsClient::new(
        ClientSettings::from_config(&config.aprs),
        dispatcher,
        stats.clone(),
    ));

    // Start background tasks
    let mut tasks = ScheduledTaskManager::new();
    tasks.spawn_watchlist_updater(cache.clone(), config.watchlist.refresh_interval());
    if let Some(period) = config.watchlist.stats_interval() {
        tasks.spawn_stats_reporter(stats.clone(), cache.clone(), period);
    }
    tasks.track(client.start());
    tracing::info!("Started {} background tasks", tasks.len());

    wait_for_shutdown().await?;

    tracing::info!("Shutdown requested, closing APRS-IS connection...");
    client.stop();
    tasks.shutdown().await;
    tracing::info!("Final stats: {}", stats.snapshot());

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")
}
