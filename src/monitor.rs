//! The polling loop.
//!
//! Each cycle visits every registry station once, with a bounded number of
//! fetches in flight. Cycles never overlap, so a station's appends stay in
//! order; a failed station is recorded and the cycle moves on.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::{Instant, sleep_until};
use tracing::{info, warn};

use crate::StationIngest;
use crate::registry::StationRegistry;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleSummary {
    pub appended: usize,
    /// `(station key, error message)`
    pub failures: Vec<(String, String)>,
}

pub struct Monitor {
    ingest: Arc<StationIngest>,
    registry: Arc<StationRegistry>,
    interval: Duration,
    max_in_flight: usize,
}

impl Monitor {
    pub fn new(
        ingest: Arc<StationIngest>,
        registry: Arc<StationRegistry>,
        interval: Duration,
        max_in_flight: usize,
    ) -> Self {
        Self {
            ingest,
            registry,
            interval,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Fetch and log every station once.
    pub async fn poll_once(&self) -> CycleSummary {
        let results: Vec<(String, crate::error::Result<()>)> = stream::iter(self.registry.iter())
            .map(|station| async move {
                let key = station.log_key().to_string();
                (key, self.ingest.fetch_and_log_station(station).await)
            })
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;

        let mut summary = CycleSummary::default();
        for (key, result) in results {
            match result {
                Ok(()) => summary.appended += 1,
                Err(e) => {
                    warn!(station = %key, error = %e, "failed to process station");
                    summary.failures.push((key, e.to_string()));
                }
            }
        }
        summary
    }

    /// Poll now and then once per interval until `shutdown` resolves.
    /// Returns the number of completed cycles.
    pub async fn run<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut next = Instant::now();
        let mut cycles = 0usize;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = sleep_until(next) => {}
            }

            let summary = tokio::select! {
                s = self.poll_once() => s,
                _ = &mut shutdown => break,
            };
            cycles += 1;
            info!(
                cycle = cycles,
                appended = summary.appended,
                failures = summary.failures.len(),
                "poll cycle done"
            );

            next = next_fire(next, self.interval, Instant::now());
        }

        info!(cycles, "monitoring stopped");
        cycles
    }
}

/// The first tick after `now` on the `previous + k * interval` grid; ticks
/// missed while a slow cycle ran are skipped.
pub fn next_fire(previous: Instant, interval: Duration, now: Instant) -> Instant {
    let mut next = previous + interval;
    if next <= now && !interval.is_zero() {
        let behind = (now - previous).as_nanos() / interval.as_nanos();
        let steps = u32::try_from(behind + 1).unwrap_or(u32::MAX);
        next = previous + interval.saturating_mul(steps);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airport::AirportFeedClient;
    use crate::buoy::BuoyFeedClient;
    use crate::coords::Coords;
    use crate::http::{HttpFetcher, RetryPolicy};
    use crate::log_store::StationLogStore;
    use crate::registry::{AIRPORT_SENTINEL_ID, Station, StationKind};
    use tempfile::TempDir;

    fn ingest(dir: &TempDir) -> Arc<StationIngest> {
        let retry = RetryPolicy {
            max_retries: 0,
            delay: Duration::ZERO,
        };
        let http = HttpFetcher::new(Duration::from_secs(2), retry).unwrap();
        // nothing listens on the discard port
        let root = "http://127.0.0.1:9/";
        Arc::new(StationIngest::from_parts(
            BuoyFeedClient::with_urls(http.clone(), root, root),
            AirportFeedClient::with_root(http, root),
            StationLogStore::new(dir.path()),
        ))
    }

    fn station(id: &str, kind: StationKind, name: &str) -> Station {
        Station {
            id: id.into(),
            kind,
            name: name.into(),
            location: String::new(),
            coords: Coords { lat: 0.0, lon: 0.0 },
            metadata: vec![],
        }
    }

    #[test]
    fn next_fire_stays_on_grid() {
        let t0 = Instant::now();
        let minute = Duration::from_secs(60);
        assert_eq!(next_fire(t0, minute, t0), t0 + minute);
        assert_eq!(next_fire(t0, minute, t0 + Duration::from_secs(30)), t0 + minute);
        // a cycle overran by 2.5 intervals: skip to the next grid point
        assert_eq!(next_fire(t0, minute, t0 + Duration::from_secs(150)), t0 + minute * 3);
    }

    #[tokio::test]
    async fn failing_stations_are_reported_not_fatal() {
        let dir = TempDir::new().unwrap();
        let registry = StationRegistry {
            passthrough_columns: vec![],
            stations: vec![
                station("41001", StationKind::Buoy, "EAST HATTERAS"),
                station(AIRPORT_SENTINEL_ID, StationKind::Airport, "EFJY"),
            ],
        };
        let monitor = Monitor::new(ingest(&dir), Arc::new(registry), Duration::from_secs(60), 2);

        let summary = monitor.poll_once().await;
        assert_eq!(summary.appended, 0);
        let mut keys: Vec<&str> = summary.failures.iter().map(|(k, _)| k.as_str()).collect();
        keys.sort();
        assert_eq!(keys, ["41001", "EFJY"]);
        assert!(!dir.path().join("41001.txt").exists());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let monitor = Monitor::new(
            ingest(&dir),
            Arc::new(StationRegistry::default()),
            Duration::from_secs(3600),
            1,
        );
        let cycles = monitor
            .run(tokio::time::sleep(Duration::from_millis(50)))
            .await;
        assert_eq!(cycles, 1);
    }
}
