///! Position report → Traccar location update
use std::sync::Arc;

use aprs2traccar_common::{PositionFormat, PositionReport};
use async_trait::async_trait;

use crate::stats::BridgeStats;
use crate::traccar::{LocationUpdate, TraccarApi, TraccarError};
use crate::watchlist::WatchlistReader;

/// Mean Earth radius in metres
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Consumer of decoded position reports
#[async_trait]
pub trait ReportHandler: Send + Sync {
    async fn on_report(&self, report: PositionReport);
}

/// What happened to one report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Source callsign is not on the watchlist
    Unwatched,
    Delivered { device_id: String },
    Failed { device_id: String },
}

pub struct Dispatcher {
    watchlist: WatchlistReader,
    traccar: Arc<dyn TraccarApi>,
    stats: Arc<BridgeStats>,
}

impl Dispatcher {
    pub fn new(watchlist: WatchlistReader, traccar: Arc<dyn TraccarApi>, stats: Arc<BridgeStats>) -> Self {
        Self {
            watchlist,
            traccar,
            stats,
        }
    }

    /// Forward `report` if its source is watched. Failed pushes are logged
    /// and not retried; the next report from the station replaces it.
    pub async fn dispatch(&self, report: &PositionReport) -> DispatchOutcome {
        let device_id = {
            let snapshot = self.watchlist.current();
            match snapshot.device_for(&report.source_callsign) {
                Some(device_id) => device_id.to_string(),
                None => return DispatchOutcome::Unwatched,
            }
        };
        self.stats.record_matched();

        let update = to_location_update(report, &device_id);
        match self.traccar.send_position(&update).await {
            Ok(()) => {
                self.stats.record_pushed();
                tracing::info!(
                    "Forwarded {} to device '{}': {:.5}, {:.5}",
                    report.source_callsign,
                    device_id,
                    report.latitude,
                    report.longitude
                );
                DispatchOutcome::Delivered { device_id }
            }
            Err(e) => {
                self.stats.record_push_failure();
                match &e {
                    TraccarError::UnknownDevice(_) => tracing::warn!(
                        "{}. Create a device with identifier '{}' in Traccar",
                        e,
                        device_id
                    ),
                    _ => tracing::error!(
                        "Failed to forward {} to device '{}': {}",
                        report.source_callsign,
                        device_id,
                        e
                    ),
                }
                DispatchOutcome::Failed { device_id }
            }
        }
    }
}

#[async_trait]
impl ReportHandler for Dispatcher {
    async fn on_report(&self, report: PositionReport) {
        self.dispatch(&report).await;
    }
}

/// Map a decoded report onto the OsmAnd parameters for `device_id`.
pub fn to_location_update(report: &PositionReport, device_id: &str) -> LocationUpdate {
    let accuracy_meters = match report.format {
        PositionFormat::Compressed => None,
        PositionFormat::Uncompressed | PositionFormat::MicE => Some(
            ambiguity_accuracy(report.latitude, report.longitude, report.ambiguity).round(),
        ),
    };

    let mut attributes = vec![
        ("aprs_to", report.destination.clone()),
        ("aprs_symbol", format!("{}{}", report.symbol_table, report.symbol_code)),
        ("aprs_format", report.format.as_str().to_string()),
    ];
    if !report.path.is_empty() {
        attributes.push(("aprs_path", report.path.join(",")));
    }
    if let Some(comment) = report.comment.as_ref().filter(|c| !c.is_empty()) {
        attributes.push(("aprs_comment", comment.clone()));
    }

    LocationUpdate {
        device_id: device_id.to_string(),
        latitude: report.latitude,
        longitude: report.longitude,
        timestamp: report.timestamp_utc,
        speed_knots: report.speed_knots,
        bearing: report.course_degrees,
        altitude_meters: report.altitude_meters,
        accuracy_meters,
        attributes,
    }
}

/// Distance in metres covered by the blanked digits of an ambiguous
/// position, measured along the parallel at `latitude`.
pub fn ambiguity_accuracy(latitude: f64, longitude: f64, ambiguity: u8) -> f64 {
    let degrees = match ambiguity {
        0 => return 0.0,
        1 => 1.0 / 600.0,
        2 => 1.0 / 60.0,
        3 => 1.0 / 6.0,
        _ => 1.0,
    };
    haversine(latitude, longitude, latitude, longitude + degrees)
}

fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traccar::fake::{device, FakeTraccar};
    use crate::watchlist::WatchlistCache;
    use chrono::{TimeZone, Utc};

    fn report(source: &str) -> PositionReport {
        PositionReport {
            source_callsign: source.to_string(),
            destination: "APRS".to_string(),
            path: vec!["TCPIP*".to_string()],
            latitude: 49.058333,
            longitude: -72.029167,
            timestamp_utc: Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap(),
            course_degrees: None,
            speed_knots: None,
            altitude_meters: None,
            comment: Some("Test comment".to_string()),
            symbol_table: '/',
            symbol_code: '>',
            format: PositionFormat::Uncompressed,
            ambiguity: 0,
        }
    }

    async fn dispatcher_watching(callsign: &str) -> (Arc<FakeTraccar>, Arc<BridgeStats>, Dispatcher) {
        let fake = Arc::new(FakeTraccar::with_devices(vec![device(
            1,
            "dev-123",
            Some(("aprs_callsign", callsign)),
        )]));
        let api: Arc<dyn TraccarApi> = fake.clone();
        let cache = WatchlistCache::new(api.clone(), "aprs_callsign");
        cache.refresh().await.unwrap();

        let stats = Arc::new(BridgeStats::new());
        let dispatcher = Dispatcher::new(cache.reader(), api, stats.clone());
        (fake, stats, dispatcher)
    }

    #[tokio::test]
    async fn test_unwatched_report_makes_no_calls() {
        let (fake, stats, dispatcher) = dispatcher_watching("N0CALL").await;

        let outcome = dispatcher.dispatch(&report("W1AW")).await;
        assert_eq!(outcome, DispatchOutcome::Unwatched);
        assert!(fake.sent().is_empty());
        assert_eq!(stats.snapshot().matched, 0);
    }

    #[tokio::test]
    async fn test_watched_report_makes_one_call() {
        let (fake, stats, dispatcher) = dispatcher_watching("N0CALL").await;

        dispatcher.on_report(report("N0CALL")).await;

        let sent = fake.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].device_id, "dev-123");
        assert_eq!(sent[0].latitude, 49.058333);
        assert_eq!(sent[0].longitude, -72.029167);
        assert_eq!(sent[0].timestamp.timestamp(), 1792411200);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.matched, 1);
        assert_eq!(snapshot.pushed, 1);
    }

    #[tokio::test]
    async fn test_ssid_variant_is_not_matched() {
        let (fake, _stats, dispatcher) = dispatcher_watching("N0CALL").await;

        let outcome = dispatcher.dispatch(&report("N0CALL-9")).await;
        assert_eq!(outcome, DispatchOutcome::Unwatched);
        assert!(fake.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failed_push_is_reported_not_retried() {
        let (fake, stats, dispatcher) = dispatcher_watching("N0CALL").await;
        fake.fail_pushes(Some(400));

        let outcome = dispatcher.dispatch(&report("N0CALL")).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Failed {
                device_id: "dev-123".to_string()
            }
        );
        assert_eq!(fake.sent().len(), 1);
        assert_eq!(stats.snapshot().push_failures, 1);
    }

    #[test]
    fn test_location_update_attributes() {
        let mut report = report("N0CALL");
        report.course_degrees = Some(88);
        report.speed_knots = Some(36.2);
        report.altitude_meters = Some(61.0);

        let update = to_location_update(&report, "dev-123");
        assert_eq!(update.bearing, Some(88));
        assert_eq!(update.speed_knots, Some(36.2));
        assert_eq!(update.altitude_meters, Some(61.0));
        assert_eq!(update.accuracy_meters, Some(0.0));
        assert_eq!(
            update.attributes,
            vec![
                ("aprs_to", "APRS".to_string()),
                ("aprs_symbol", "/>".to_string()),
                ("aprs_format", "uncompressed".to_string()),
                ("aprs_path", "TCPIP*".to_string()),
                ("aprs_comment", "Test comment".to_string()),
            ]
        );
    }

    #[test]
    fn test_compressed_has_no_accuracy() {
        let mut report = report("N0CALL");
        report.format = PositionFormat::Compressed;
        report.comment = None;

        let update = to_location_update(&report, "dev-123");
        assert_eq!(update.accuracy_meters, None);
        assert!(update.attributes.iter().all(|(key, _)| *key != "aprs_comment"));
    }

    #[test]
    fn test_ambiguity_accuracy() {
        assert_eq!(ambiguity_accuracy(49.0, -72.0, 0), 0.0);

        // One degree of longitude on the equator
        let equator = ambiguity_accuracy(0.0, 0.0, 4);
        assert!((equator - 111_195.0).abs() < 10.0, "{}", equator);

        // Shrinks with the cosine of latitude
        let at_60 = ambiguity_accuracy(60.0, 10.0, 4);
        assert!((at_60 - equator / 2.0).abs() < 200.0, "{}", at_60);

        let minute = ambiguity_accuracy(0.0, 0.0, 2);
        assert!((minute - 1_853.0).abs() < 2.0, "{}", minute);
        assert!(ambiguity_accuracy(0.0, 0.0, 1) < minute);
        assert!(ambiguity_accuracy(0.0, 0.0, 3) > minute);
    }
}
