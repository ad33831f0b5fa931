//! Per-station append logs, newest row first.
//!
//! Each station owns one `,`-delimited file: row 1 is the header written from
//! the first record ever appended, row 2 is always the latest observation.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use csv::StringRecord;
use tracing::{debug, warn};

use crate::error::{MonitorError, Result};
use crate::record::ObservationRecord;

pub const LOG_EXTENSION: &str = "txt";

pub struct StationLogStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl StationLogStore {
    /// The directory must already exist when appending.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Log file for a station key.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') || c.is_control() { '_' } else { c })
            .collect();
        self.dir.join(format!("{}.{}", safe, LOG_EXTENSION))
    }

    /// Insert `record` as the newest row of `key`'s log.
    ///
    /// The whole file is rewritten through a temporary sibling and renamed
    /// into place while holding the station's lock.
    pub fn append(&self, key: &str, record: &ObservationRecord) -> Result<()> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let path = self.path_for(key);
        let mut rows = match File::open(&path) {
            Ok(file) => read_records(file).map_err(|e| MonitorError::csv(&path, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(MonitorError::io(&path, e)),
        };

        let row = StringRecord::from(record.field_values());
        if rows.is_empty() {
            rows.push(StringRecord::from(record.field_names()));
            rows.push(row);
        } else {
            if rows[0].len() != row.len() {
                warn!(station = %key, header = rows[0].len(), values = row.len(), "record does not match log header");
            }
            rows.insert(1, row);
        }

        let tmp = path.with_extension(format!("{}.tmp", LOG_EXTENSION));
        let file = File::create(&tmp).map_err(|e| MonitorError::io(&tmp, e))?;
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);
        for r in &rows {
            writer.write_record(r).map_err(|e| MonitorError::csv(&tmp, e))?;
        }
        writer.flush().map_err(|e| MonitorError::io(&tmp, e))?;
        drop(writer);
        fs::rename(&tmp, &path).map_err(|e| MonitorError::io(&path, e))?;

        debug!(station = %key, file = %path.display(), rows = rows.len() - 1, "appended");
        Ok(())
    }

    /// Header and data rows of `key`'s log, newest first.
    pub fn read(&self, key: &str) -> Result<(Vec<String>, Vec<Vec<String>>)> {
        let path = self.path_for(key);
        let file = File::open(&path).map_err(|e| MonitorError::io(&path, e))?;
        let mut rows = read_records(file)
            .map_err(|e| MonitorError::csv(&path, e))?
            .into_iter()
            .map(|r| r.iter().map(str::to_string).collect::<Vec<_>>());
        let header = rows.next().unwrap_or_default();
        Ok((header, rows.collect()))
    }

    /// Every log file in the directory.
    pub fn log_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| MonitorError::io(&self.dir, e))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|x| x == LOG_EXTENSION))
            .collect();
        files.sort();
        Ok(files)
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(key.to_string()).or_default())
    }
}

/// Every row of a log, header included.
fn read_records(file: File) -> std::result::Result<Vec<StringRecord>, csv::Error> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file)
        .into_records()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airport::parse_decoded_report;
    use crate::buoy::BuoyObservation;
    use std::path::Path;
    use tempfile::TempDir;
    use time::macros::datetime;

    fn record(minute: u8, wtmp: Option<f64>) -> ObservationRecord {
        let fetched_at = datetime!(2024-10-06 12:00:00)
            .replace_minute(minute)
            .unwrap();
        ObservationRecord::Buoy(BuoyObservation {
            fetched_at,
            columns: Arc::from(vec!["YY".to_string(), "WTMP".to_string()]),
            values: vec![Some(2024.0), wtmp],
        })
    }

    #[test]
    fn n_appends_give_header_plus_n_rows_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = StationLogStore::new(dir.path());
        for m in 0..5 {
            store.append("41001", &record(m, Some(20.0 + m as f64))).unwrap();
        }

        let text = fs::read_to_string(store.path_for("41001")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "Time,YY,WTMP");
        assert_eq!(lines[1], "2024-10-06T12:04:00,2024,24");
        assert_eq!(lines[5], "2024-10-06T12:00:00,2024,20");

        let (header, rows) = store.read("41001").unwrap();
        assert_eq!(header, ["Time", "YY", "WTMP"]);
        let times: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(
            times,
            [
                "2024-10-06T12:04:00",
                "2024-10-06T12:03:00",
                "2024-10-06T12:02:00",
                "2024-10-06T12:01:00",
                "2024-10-06T12:00:00"
            ]
        );
    }

    #[test]
    fn header_is_kept_from_first_record() {
        let dir = TempDir::new().unwrap();
        let store = StationLogStore::new(dir.path());
        store.append("41001", &record(0, None)).unwrap();

        let drifted = ObservationRecord::Buoy(BuoyObservation {
            fetched_at: datetime!(2024-10-06 13:00:00),
            columns: Arc::from(vec!["YEAR".to_string(), "ATMP".to_string()]),
            values: vec![Some(2024.0), Some(18.5)],
        });
        store.append("41001", &drifted).unwrap();

        let (header, rows) = store.read("41001").unwrap();
        assert_eq!(header, ["Time", "YY", "WTMP"]);
        assert_eq!(rows[0], ["2024-10-06T13:00:00", "2024", "18.5"]);
        assert_eq!(rows[1], ["2024-10-06T12:00:00", "2024", "N/A"]);
    }

    #[test]
    fn fields_with_delimiters_survive_a_reread() {
        let dir = TempDir::new().unwrap();
        let store = StationLogStore::new(dir.path());
        let report = "Jyvaskyla, Finland (EFJY) 62-24N 025-41E 139M\n2024.10.06 1220 UTC\n";
        let obs = parse_decoded_report("EFJY", report).unwrap();
        store.append("EFJY", &ObservationRecord::Airport(obs.clone())).unwrap();
        store.append("EFJY", &ObservationRecord::Airport(obs)).unwrap();

        let text = fs::read_to_string(store.path_for("EFJY")).unwrap();
        assert!(text.lines().nth(1).unwrap().contains("\"Jyvaskyla, Finland\""));

        let (header, rows) = store.read("EFJY").unwrap();
        assert_eq!(header.len(), 10);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], "Jyvaskyla, Finland");
        assert_eq!(rows[0][2], "62.4");
    }

    #[test]
    fn missing_directory_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = StationLogStore::new(dir.path().join("absent"));
        let err = store.append("41001", &record(0, None)).unwrap_err();
        assert!(matches!(err, MonitorError::Io { .. }));
    }

    #[test]
    fn keys_map_to_safe_file_names() {
        let store = StationLogStore::new("data");
        assert_eq!(store.path_for("EFJY"), Path::new("data").join("EFJY.txt"));
        assert_eq!(store.path_for("../x"), Path::new("data").join(".._x.txt"));
    }

    #[test]
    fn concurrent_appends_to_one_station_are_serialised() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(StationLogStore::new(dir.path()));
        let handles: Vec<_> = (0..8u8)
            .map(|m| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.append("41001", &record(m, Some(1.0))).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let (_, rows) = store.read("41001").unwrap();
        assert_eq!(rows.len(), 8);
    }

    #[test]
    fn log_files_lists_only_logs() {
        let dir = TempDir::new().unwrap();
        let store = StationLogStore::new(dir.path());
        store.append("41001", &record(0, None)).unwrap();
        store.append("EFJY", &record(0, None)).unwrap();
        fs::write(dir.path().join("notes.md"), "x").unwrap();
        let files = store.log_files().unwrap();
        assert_eq!(files.len(), 2);
    }
}
