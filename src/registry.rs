//! The station registry: buoys from the NDBC station table merged with
//! configured airports into one ordered set of addressable stations.

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::path::Path;

use tracing::{info, warn};

use crate::airport::{AirportFeedClient, AirportObservation};
use crate::buoy::{BuoyFeedClient, FEED_EXTENSION, StationTable};
use crate::coords::{Coords, parse_location};
use crate::error::{MonitorError, Result};

/// Reserved id carried by every airport row.
pub const AIRPORT_SENTINEL_ID: &str = "99999";

const REGISTRY_DELIM: u8 = b';';
const ID_COLUMN: &str = "STATION_ID";
const LOCATION_COLUMN: &str = "LOCATION";
const NAME_COLUMN: &str = "NAME";
const CORE_COLUMNS: [&str; 5] = [ID_COLUMN, LOCATION_COLUMN, NAME_COLUMN, "LATITUDE", "LONGITUDE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationKind {
    Buoy,
    Airport,
}

impl fmt::Display for StationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationKind::Buoy => write!(f, "buoy"),
            StationKind::Airport => write!(f, "airport"),
        }
    }
}

/// One monitored location with a resolved position.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub id: String,
    pub kind: StationKind,
    pub name: String,
    pub location: String,
    pub coords: Coords,
    /// Station-table cells aligned with [`StationRegistry::passthrough_columns`].
    pub metadata: Vec<String>,
}

impl Station {
    /// Identifier the station's log is filed under: the buoy id, or the
    /// airport code for rows sharing the sentinel id.
    pub fn log_key(&self) -> &str {
        match self.kind {
            StationKind::Buoy => &self.id,
            StationKind::Airport => &self.name,
        }
    }
}

/// Which buoy feeds to keep.
#[derive(Debug, Clone, Default)]
pub struct StationSelection {
    pub selected_only: bool,
    pub station_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationRegistry {
    /// Station-table columns carried through besides the core five.
    pub passthrough_columns: Vec<String>,
    pub stations: Vec<Station>,
}

impl StationRegistry {
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.iter()
    }

    pub fn find(&self, key: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.log_key() == key)
    }

    /// Write the registry as a `;`-delimited file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut header: Vec<&str> = CORE_COLUMNS.to_vec();
        header.extend(self.passthrough_columns.iter().map(String::as_str));

        let file = File::create(path).map_err(|e| MonitorError::io(path, e))?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(REGISTRY_DELIM)
            .from_writer(file);
        writer
            .write_record(&header)
            .map_err(|e| MonitorError::csv(path, e))?;
        for s in &self.stations {
            let mut row = vec![
                s.id.clone(),
                s.location.clone(),
                s.name.clone(),
                s.coords.lat.to_string(),
                s.coords.lon.to_string(),
            ];
            row.extend((0..self.passthrough_columns.len()).map(|i| s.metadata.get(i).cloned().unwrap_or_default()));
            writer.write_record(&row).map_err(|e| MonitorError::csv(path, e))?;
        }
        writer.flush().map_err(|e| MonitorError::io(path, e))?;

        info!(file = %path.display(), stations = self.stations.len(), "registry saved");
        Ok(())
    }

    /// Reload a registry written by [`save`](Self::save).
    ///
    /// A missing or malformed file is a configuration error: the caller asked
    /// for a persisted registry and there is none to use.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| MonitorError::Config(format!("cannot read registry {}: {}", path.display(), e)))?;
        let bad = |msg: String| MonitorError::Config(format!("registry {}: {}", path.display(), msg));

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(REGISTRY_DELIM)
            .has_headers(true)
            .flexible(true)
            .from_reader(file);
        let header: Vec<String> = reader
            .headers()
            .map_err(|e| bad(e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();
        if header.is_empty() {
            return Err(bad("file is empty".into()));
        }
        if header.len() < CORE_COLUMNS.len() || header[..CORE_COLUMNS.len()] != CORE_COLUMNS {
            return Err(bad(format!("unexpected header {:?}", header)));
        }
        let passthrough_columns = header[CORE_COLUMNS.len()..].to_vec();

        let mut stations = Vec::new();
        for (n, record) in reader.records().enumerate() {
            let record = record.map_err(|e| bad(e.to_string()))?;
            if record.len() < CORE_COLUMNS.len() {
                return Err(bad(format!("row {} has {} columns", n + 1, record.len())));
            }
            let number = |i: usize| -> Result<f64> {
                let s = &record[i];
                s.parse()
                    .map_err(|_| bad(format!("row {}: bad coordinate {:?}", n + 1, s)))
            };
            let coords = Coords::new(number(3)?, number(4)?).map_err(|e| bad(format!("row {}: {}", n + 1, e)))?;
            let id = record[0].to_string();
            let kind = if id == AIRPORT_SENTINEL_ID {
                StationKind::Airport
            } else {
                StationKind::Buoy
            };
            stations.push(Station {
                id,
                kind,
                name: record[2].to_string(),
                location: record[1].to_string(),
                coords,
                metadata: record.iter().skip(CORE_COLUMNS.len()).map(str::to_string).collect(),
            });
        }

        info!(file = %path.display(), stations = stations.len(), "registry loaded");
        Ok(Self {
            passthrough_columns,
            stations,
        })
    }
}

/// Builds a registry from the live feeds.
pub struct RegistryBuilder<'a> {
    buoys: &'a BuoyFeedClient,
    airports: &'a AirportFeedClient,
}

impl<'a> RegistryBuilder<'a> {
    pub fn new(buoys: &'a BuoyFeedClient, airports: &'a AirportFeedClient) -> Self {
        Self { buoys, airports }
    }

    /// Buoys in station-table order followed by airports in configured order.
    ///
    /// Failing to list feeds or fetch the station table aborts the build; an
    /// individual station that cannot be placed is dropped with a warning.
    pub async fn build(&self, selection: &StationSelection, airport_codes: &[String]) -> Result<StationRegistry> {
        let buoy_wanted = !selection.selected_only || !selection.station_ids.is_empty();
        let mut registry = if buoy_wanted {
            let feeds = self.buoys.list_station_feeds(FEED_EXTENSION).await?;
            let table = self.buoys.fetch_station_table().await?;
            assemble_buoys(&feeds, &table, selection)?
        } else {
            StationRegistry::default()
        };

        let mut reports = Vec::with_capacity(airport_codes.len());
        for code in airport_codes {
            reports.push((code.as_str(), self.airports.fetch_decoded_report(code).await));
        }
        merge_airports(&mut registry, reports);

        info!(stations = registry.len(), "registry built");
        Ok(registry)
    }
}

/// Filter the station table down to buoys with a live feed (and, when asked,
/// to the selected ids), resolving each position.
pub fn assemble_buoys(feeds: &[String], table: &StationTable, selection: &StationSelection) -> Result<StationRegistry> {
    let id_idx = table
        .column_index(ID_COLUMN)
        .ok_or_else(|| MonitorError::parse("station table has no STATION_ID column"))?;
    let loc_idx = table
        .column_index(LOCATION_COLUMN)
        .ok_or_else(|| MonitorError::parse("station table has no LOCATION column"))?;
    let name_idx = table.column_index(NAME_COLUMN);

    let mut live: HashSet<&str> = feeds.iter().map(String::as_str).collect();
    if selection.selected_only {
        let wanted: HashSet<&str> = selection.station_ids.iter().map(String::as_str).collect();
        live.retain(|id| wanted.contains(id));
    }

    let passthrough: Vec<usize> = (0..table.columns.len())
        .filter(|&i| i != id_idx && i != loc_idx && Some(i) != name_idx)
        .collect();

    let mut stations = Vec::new();
    for row in &table.rows {
        let id = row.get(id_idx).map(String::as_str).unwrap_or_default();
        if !live.contains(id) {
            continue;
        }
        let raw_location = row.get(loc_idx).map(String::as_str).unwrap_or_default();
        let location = strip_parenthetical(raw_location);
        let coords = match parse_location(location) {
            Ok(c) => c,
            Err(e) => {
                warn!(station = %id, error = %e, "unresolvable position, station dropped");
                continue;
            }
        };
        stations.push(Station {
            id: id.to_string(),
            kind: StationKind::Buoy,
            name: name_idx.and_then(|i| row.get(i)).cloned().unwrap_or_default(),
            location: location.to_string(),
            coords,
            metadata: passthrough.iter().map(|&i| row.get(i).cloned().unwrap_or_default()).collect(),
        });
    }

    Ok(StationRegistry {
        passthrough_columns: passthrough.iter().map(|&i| table.columns[i].clone()).collect(),
        stations,
    })
}

/// Append one station per usable airport report, in the order given. Failed
/// fetches and reports without a position are skipped with a warning.
pub fn merge_airports<'c>(
    registry: &mut StationRegistry,
    reports: impl IntoIterator<Item = (&'c str, Result<AirportObservation>)>,
) {
    for (code, report) in reports {
        match report {
            Ok(obs) => match airport_station(&registry.passthrough_columns, &obs) {
                Some(station) => registry.stations.push(station),
                None => warn!(airport = %code, "report has no position, airport skipped"),
            },
            Err(e) => warn!(airport = %code, error = %e, "airport skipped"),
        }
    }
}

fn airport_station(passthrough_columns: &[String], obs: &AirportObservation) -> Option<Station> {
    let coords = obs.coords?;
    Some(Station {
        id: AIRPORT_SENTINEL_ID.to_string(),
        kind: StationKind::Airport,
        name: obs.code.clone(),
        location: obs.location.clone().unwrap_or_default(),
        coords,
        metadata: vec![String::new(); passthrough_columns.len()],
    })
}

/// `44.794 N 87.313 W (44°47'40" N 87°18'47" W)` -> `44.794 N 87.313 W`
fn strip_parenthetical(location: &str) -> &str {
    location.split('(').next().unwrap_or_default().trim()
}
