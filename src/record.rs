//! Typed observation records and their projection onto a log row.

use time::PrimitiveDateTime;
use time::macros::format_description;

use crate::airport::AirportObservation;
use crate::buoy::BuoyObservation;

/// Written in place of any absent or unparseable value.
pub const MISSING: &str = "N/A";

/// Name of the leading timestamp column in every station log.
pub const TIME_COLUMN: &str = "Time";

/// One reading from one station, discriminated by station kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationRecord {
    Buoy(BuoyObservation),
    Airport(AirportObservation),
}

impl ObservationRecord {
    /// Capture time: fetch time for buoys, the report's own time for airports.
    pub fn timestamp(&self) -> PrimitiveDateTime {
        match self {
            ObservationRecord::Buoy(b) => b.fetched_at,
            ObservationRecord::Airport(a) => a.timestamp,
        }
    }

    /// Header for this record's log, `Time` first.
    pub fn field_names(&self) -> Vec<String> {
        let mut names = vec![TIME_COLUMN.to_string()];
        match self {
            ObservationRecord::Buoy(b) => names.extend(b.columns.iter().cloned()),
            ObservationRecord::Airport(_) => {
                names.extend(AirportObservation::FIELDS.iter().map(|s| s.to_string()))
            }
        }
        names
    }

    /// Values in the same order as [`field_names`](Self::field_names).
    pub fn field_values(&self) -> Vec<String> {
        let mut values = vec![format_iso(self.timestamp())];
        match self {
            ObservationRecord::Buoy(b) => values.extend(b.values.iter().map(|v| format_number(*v))),
            ObservationRecord::Airport(a) => values.extend(a.values()),
        }
        values
    }
}

/// `YYYY-MM-DDTHH:MM:SS`
pub fn format_iso(dt: PrimitiveDateTime) -> String {
    let fmt = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    dt.format(&fmt).unwrap_or_else(|_| dt.to_string())
}

pub(crate) fn format_number(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => v.to_string(),
        _ => MISSING.to_string(),
    }
}

/// Round to a fixed number of decimal places.
pub(crate) fn round_to(v: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (v * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use time::macros::datetime;

    #[test]
    fn iso_format_drops_subseconds() {
        assert_eq!(format_iso(datetime!(2024-10-06 12:20:05.123)), "2024-10-06T12:20:05");
    }

    #[test]
    fn numbers_print_without_trailing_zeros() {
        assert_eq!(format_number(Some(2024.0)), "2024");
        assert_eq!(format_number(Some(1.5)), "1.5");
        assert_eq!(format_number(None), MISSING);
        assert_eq!(format_number(Some(f64::NAN)), MISSING);
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(10.0 * 0.514444, 2), 5.14);
        assert_eq!(round_to(5.0 * 1.60934, 2), 8.05);
        assert_eq!(round_to(62.4000001, 4), 62.4);
    }

    #[test]
    fn buoy_row_is_time_then_columns() {
        let rec = ObservationRecord::Buoy(BuoyObservation {
            fetched_at: datetime!(2024-10-06 12:25:00),
            columns: Arc::from(vec!["YY".to_string(), "WTMP".to_string()]),
            values: vec![Some(2024.0), None],
        });
        assert_eq!(rec.field_names(), ["Time", "YY", "WTMP"]);
        assert_eq!(rec.field_values(), ["2024-10-06T12:25:00", "2024", "N/A"]);
    }
}
