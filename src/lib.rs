//! Polls NOAA buoy and airport feeds and keeps a newest-first log per station.

pub mod airport;
pub mod buoy;
pub mod config;
pub mod coords;
pub mod error;
#[cfg(test)]
mod fixture_server;
pub mod http;
pub mod log_store;
pub mod map;
pub mod monitor;
pub mod record;
pub mod registry;
pub mod stats;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::airport::AirportFeedClient;
use crate::buoy::BuoyFeedClient;
use crate::config::{Settings, Stations};
use crate::error::{MonitorError, Result};
use crate::http::HttpFetcher;
use crate::log_store::StationLogStore;
use crate::record::ObservationRecord;
use crate::registry::{RegistryBuilder, Station, StationKind, StationRegistry};

/// Holds the feed clients and the log store shared by every operation.
pub struct StationIngest {
    buoys: BuoyFeedClient,
    airports: AirportFeedClient,
    store: Arc<StationLogStore>,
}

impl StationIngest {
    /// Create the clients and make sure the data directory exists.
    pub fn new(settings: &Settings) -> Result<Self> {
        ensure_data_dir(&settings.data_dir)?;
        let http = HttpFetcher::new(settings.request_timeout(), settings.retry_policy())?;
        Ok(Self::from_parts(
            BuoyFeedClient::new(http.clone()),
            AirportFeedClient::new(http),
            StationLogStore::new(&settings.data_dir),
        ))
    }

    pub fn from_parts(buoys: BuoyFeedClient, airports: AirportFeedClient, store: StationLogStore) -> Self {
        Self {
            buoys,
            airports,
            store: Arc::new(store),
        }
    }

    pub fn store(&self) -> &StationLogStore {
        &self.store
    }

    /// Build the registry from the live feeds.
    pub async fn build_registry(&self, stations: &Stations) -> Result<StationRegistry> {
        RegistryBuilder::new(&self.buoys, &self.airports)
            .build(&stations.selection(), &stations.airport_list)
            .await
    }

    /// Fetch the current reading for one station.
    pub async fn fetch_station(&self, station: &Station) -> Result<ObservationRecord> {
        match station.kind {
            StationKind::Buoy => self
                .buoys
                .fetch_latest_observation(&station.id)
                .await
                .map(ObservationRecord::Buoy),
            StationKind::Airport => self
                .airports
                .fetch_decoded_report(&station.name)
                .await
                .map(ObservationRecord::Airport),
        }
    }

    /// Fetch the current reading for a station and append it to its log.
    ///
    /// The file rewrite runs on the blocking pool.
    pub async fn fetch_and_log_station(&self, station: &Station) -> Result<()> {
        let record = self.fetch_station(station).await?;
        let store = Arc::clone(&self.store);
        let key = station.log_key().to_string();
        tokio::task::spawn_blocking(move || store.append(&key, &record))
            .await
            .map_err(|e| MonitorError::io(self.store.path_for(station.log_key()), std::io::Error::other(e)))??;
        info!(station = %station.log_key(), kind = %station.kind, "observation logged");
        Ok(())
    }
}

fn ensure_data_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| MonitorError::io(dir, e))?;
    }
    Ok(())
}
