use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use quick_xml::Reader as XmlReader;
use quick_xml::events::Event;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, info};

use crate::error::{MonitorError, Result};
use crate::http::HttpFetcher;

pub const REALTIME_ROOT: &str = "https://www.ndbc.noaa.gov/data/realtime2/";
pub const STATION_TABLE_URL: &str = "https://www.ndbc.noaa.gov/data/stations/station_table.txt";
pub const FEED_EXTENSION: &str = ".txt";

/// Latest standard met row from one buoy, positional against `columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct BuoyObservation {
    pub fetched_at: PrimitiveDateTime,
    pub columns: Arc<[String]>,
    /// `None` where the feed reported `MM` or anything non-numeric.
    pub values: Vec<Option<f64>>,
}

/// NDBC station table: trimmed header names and one cell vector per station.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl StationTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Client for the NDBC realtime buoy feeds.
///
/// Column names are read from the header of each station's own file on first
/// contact and reused for the rest of the session, so a station's log schema
/// stays fixed while the client lives.
pub struct BuoyFeedClient {
    http: HttpFetcher,
    root_url: String,
    table_url: String,
    columns: Mutex<HashMap<String, Arc<[String]>>>,
}

impl BuoyFeedClient {
    pub fn new(http: HttpFetcher) -> Self {
        Self::with_urls(http, REALTIME_ROOT, STATION_TABLE_URL)
    }

    pub fn with_urls(http: HttpFetcher, root_url: impl Into<String>, table_url: impl Into<String>) -> Self {
        let mut root_url = root_url.into();
        if !root_url.ends_with('/') {
            root_url.push('/');
        }
        Self {
            http,
            root_url,
            table_url: table_url.into(),
            columns: Mutex::new(HashMap::new()),
        }
    }

    /// Station ids with a realtime feed, in listing order.
    pub async fn list_station_feeds(&self, extension: &str) -> Result<Vec<String>> {
        info!(url = %self.root_url, "listing buoy feeds");
        let html = self.http.get_text(&self.root_url).await?;
        let ids = parse_listing(&html, extension)?;
        info!(count = ids.len(), "buoy feeds listed");
        Ok(ids)
    }

    pub async fn fetch_station_table(&self) -> Result<StationTable> {
        info!(url = %self.table_url, "downloading station table");
        let text = self.http.get_text(&self.table_url).await?;
        parse_station_table(&text)
    }

    /// Fetch the realtime file for `station_id` and return its newest row.
    pub async fn fetch_latest_observation(&self, station_id: &str) -> Result<BuoyObservation> {
        let url = format!("{}{}{}", self.root_url, station_id, FEED_EXTENSION);
        debug!(station = %station_id, %url, "downloading realtime data");
        let text = self.http.get_text(&url).await?;
        if text.trim().is_empty() {
            return Err(MonitorError::parse(format!("empty realtime feed for {}", station_id)));
        }

        let columns = self.columns_for(station_id, &text)?;
        let now = OffsetDateTime::now_utc();
        let values = parse_latest_row(&text, &columns)?;
        Ok(BuoyObservation {
            fetched_at: PrimitiveDateTime::new(now.date(), now.time()),
            columns,
            values,
        })
    }

    /// Cached column names for a station, if it has been polled this session.
    pub fn cached_columns(&self, station_id: &str) -> Option<Arc<[String]>> {
        self.lock_columns().get(station_id).cloned()
    }

    fn columns_for(&self, station_id: &str, text: &str) -> Result<Arc<[String]>> {
        if let Some(cols) = self.cached_columns(station_id) {
            return Ok(cols);
        }
        let cols: Arc<[String]> = Arc::from(parse_columns(text)?);
        debug!(station = %station_id, count = cols.len(), "caching feed columns");
        self.lock_columns()
            .insert(station_id.to_string(), Arc::clone(&cols));
        Ok(cols)
    }

    fn lock_columns(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<[String]>>> {
        // The map holds no invariants a panicking writer could break.
        self.columns.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Extract hyperlink targets from a directory listing, keep those ending in
/// `extension`, and strip it.
pub fn parse_listing(html: &str, extension: &str) -> Result<Vec<String>> {
    let mut reader = XmlReader::from_str(html);
    reader.trim_text(true);
    reader.check_end_names(false);

    let mut links = 0usize;
    let mut ids = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if !e.name().as_ref().eq_ignore_ascii_case(b"a") {
                    continue;
                }
                for attr in e.html_attributes() {
                    let attr = attr.map_err(|e| MonitorError::parse(format!("listing attribute: {}", e)))?;
                    if !attr.key.as_ref().eq_ignore_ascii_case(b"href") {
                        continue;
                    }
                    let href = attr
                        .unescape_value()
                        .map_err(|e| MonitorError::parse(format!("listing href: {}", e)))?;
                    links += 1;
                    if href == "../" {
                        continue;
                    }
                    if let Some(id) = href.strip_suffix(extension) {
                        if !id.is_empty() && !id.contains('/') {
                            ids.push(id.to_string());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(MonitorError::parse(format!(
                    "directory listing parse error at {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    if links == 0 {
        return Err(MonitorError::parse("directory listing contains no hyperlinks"));
    }
    Ok(ids)
}

/// Parse the pipe-delimited NDBC station table.
///
/// The first row is the header (its leading `#` dropped); later rows starting
/// with `#` are comments. Cells are trimmed and short rows padded to the
/// header width. Quotes carry no meaning here: locations embed `"` for seconds.
pub fn parse_station_table(text: &str) -> Result<StationTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let mut records = reader.records();

    let header = records
        .next()
        .ok_or_else(|| MonitorError::parse("station table is empty"))?
        .map_err(|e| MonitorError::parse(format!("station table header: {}", e)))?;
    if header.len() < 2 {
        return Err(MonitorError::parse("station table header is not pipe-delimited"));
    }
    let columns: Vec<String> = header
        .iter()
        .map(|c| c.trim_start_matches('#').trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|e| MonitorError::parse(format!("station table row: {}", e)))?;
        if record.get(0).is_some_and(|c| c.starts_with('#')) {
            continue;
        }
        let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
        cells.resize(columns.len().max(cells.len()), String::new());
        rows.push(cells);
    }

    Ok(StationTable { columns, rows })
}

/// Column names from the first header line of a realtime feed.
pub fn parse_columns(text: &str) -> Result<Vec<String>> {
    let header = text
        .lines()
        .map(str::trim_start)
        .find(|l| l.starts_with('#'))
        .ok_or_else(|| MonitorError::parse("realtime feed has no header line"))?;
    let cols: Vec<String> = header
        .trim_start_matches('#')
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if cols.is_empty() {
        return Err(MonitorError::parse("realtime feed header is empty"));
    }
    Ok(cols)
}

/// Values of the first data row after the header and units lines.
///
/// A missing or non-numeric token only blanks its own column.
pub fn parse_latest_row(text: &str, columns: &[String]) -> Result<Vec<Option<f64>>> {
    let row = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .ok_or_else(|| MonitorError::parse("realtime feed has no data rows"))?;
    let toks: Vec<&str> = row.split_whitespace().collect();
    Ok((0..columns.len())
        .map(|i| {
            toks.get(i).and_then(|s| match *s {
                "MM" | "NaN" => None,
                other => other.parse::<f64>().ok(),
            })
        })
        .collect())
}
