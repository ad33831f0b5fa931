//! NOAA decoded METAR reports.
//!
//! Each field is pulled out of the report text by its own pattern. Only the
//! observation time is required; anything else that fails to match is left
//! absent.

use std::sync::LazyLock;

use regex::Regex;
use time::PrimitiveDateTime;
use time::macros::format_description;
use tracing::debug;

use crate::coords::{Coords, parse_location};
use crate::error::{MonitorError, Result};
use crate::http::HttpFetcher;
use crate::record::{format_number, round_to};

pub const DECODED_ROOT: &str = "https://tgftp.nws.noaa.gov/data/observations/metar/decoded/";

pub const KNOTS_TO_M_S: f64 = 0.514444;
pub const MILES_TO_KM: f64 = 1.60934;

/// Decimal places kept for unit conversions.
const SI_PRECISION: i32 = 2;
/// Decimal places kept for coordinates.
const COORD_PRECISION: i32 = 4;

static LOCATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?) \((\w+)\)").expect("location pattern"));
static COORDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+-\d+(?:-\d+)?[NS]) (\d+-\d+(?:-\d+)?[EW])").expect("coordinate pattern")
});
static TIME_DOTTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}\.\d{2}\.\d{2} \d{4}) UTC").expect("dotted time pattern"));
static TIME_SLASHED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2}/\d{2}/\d{4} \d{2}:\d{2}) UTC").expect("slashed time pattern")
});
static WIND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Wind:.*?\((\d+) KT\)").expect("wind pattern"));
static VISIBILITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Visibility:\s*(?:greater than |less than )?(\d+(?: \d+/\d+)?|\d+/\d+)\s*(mile|km)")
        .expect("visibility pattern")
});
static TEMPERATURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Temperature:.*\((-?\d+(?:\.\d+)?) C\)").expect("temperature pattern")
});
static DEW_POINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Dew Point:.*\((-?\d+(?:\.\d+)?) C\)").expect("dew point pattern")
});
static HUMIDITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Relative Humidity: (\d+)%").expect("humidity pattern"));
static PRESSURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Pressure \(altimeter\):.*\((\d+(?:\.\d+)?) hPa\)").expect("pressure pattern")
});

/// One decoded airport report in SI units.
#[derive(Debug, Clone, PartialEq)]
pub struct AirportObservation {
    pub code: String,
    pub timestamp: PrimitiveDateTime,
    pub location: Option<String>,
    pub coords: Option<Coords>,
    pub wind_speed_m_s: Option<f64>,
    pub visibility_km: Option<f64>,
    pub temperature_c: Option<f64>,
    pub dew_point_c: Option<f64>,
    pub relative_humidity: Option<u32>,
    pub pressure_hpa: Option<f64>,
}

impl AirportObservation {
    /// Log columns after `Time`, in order.
    pub const FIELDS: [&'static str; 9] = [
        "location",
        "latitude",
        "longitude",
        "wind_speed_m_s",
        "visibility_km",
        "temperature_C",
        "dew_point_C",
        "relative_humidity",
        "pressure_hPa",
    ];

    pub(crate) fn values(&self) -> Vec<String> {
        vec![
            self.location
                .clone()
                .unwrap_or_else(|| crate::record::MISSING.to_string()),
            format_number(self.coords.map(|c| c.lat)),
            format_number(self.coords.map(|c| c.lon)),
            format_number(self.wind_speed_m_s),
            format_number(self.visibility_km),
            format_number(self.temperature_c),
            format_number(self.dew_point_c),
            format_number(self.relative_humidity.map(f64::from)),
            format_number(self.pressure_hpa),
        ]
    }
}

pub struct AirportFeedClient {
    http: HttpFetcher,
    root_url: String,
}

impl AirportFeedClient {
    pub fn new(http: HttpFetcher) -> Self {
        Self::with_root(http, DECODED_ROOT)
    }

    pub fn with_root(http: HttpFetcher, root_url: impl Into<String>) -> Self {
        let mut root_url = root_url.into();
        if !root_url.ends_with('/') {
            root_url.push('/');
        }
        Self { http, root_url }
    }

    /// Fetch and parse the decoded report for `airport_code` (ICAO).
    pub async fn fetch_decoded_report(&self, airport_code: &str) -> Result<AirportObservation> {
        let code = airport_code.trim().to_ascii_uppercase();
        let url = format!("{}{}.TXT", self.root_url, code);
        debug!(airport = %code, %url, "downloading decoded report");
        let text = self.http.get_text(&url).await?;
        parse_decoded_report(&code, &text)
    }
}

/// Parse a decoded METAR report.
pub fn parse_decoded_report(code: &str, text: &str) -> Result<AirportObservation> {
    let timestamp = parse_report_time(text)?;
    let location_line = text.lines().next().unwrap_or_default();

    let location = LOCATION_RE
        .captures(location_line)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty());

    let coords = COORDS_RE
        .captures(location_line)
        .and_then(|c| parse_location(&format!("{} {}", &c[1], &c[2])).ok())
        .map(|c| Coords {
            lat: round_to(c.lat, COORD_PRECISION),
            lon: round_to(c.lon, COORD_PRECISION),
        });

    let wind_speed_m_s = capture_f64(&WIND_RE, text).map(|kt| round_to(kt * KNOTS_TO_M_S, SI_PRECISION));

    let visibility_km = VISIBILITY_RE.captures(text).and_then(|c| {
        let amount = parse_mixed_fraction(&c[1])?;
        let km = if &c[2] == "km" { amount } else { amount * MILES_TO_KM };
        Some(round_to(km, SI_PRECISION))
    });

    Ok(AirportObservation {
        code: code.to_string(),
        timestamp,
        location,
        coords,
        wind_speed_m_s,
        visibility_km,
        temperature_c: capture_f64(&TEMPERATURE_RE, text),
        dew_point_c: capture_f64(&DEW_POINT_RE, text),
        relative_humidity: HUMIDITY_RE.captures(text).and_then(|c| c[1].parse().ok()),
        pressure_hpa: capture_f64(&PRESSURE_RE, text),
    })
}

/// The report's UTC observation time, in whichever layout the feed uses.
pub fn parse_report_time(text: &str) -> Result<PrimitiveDateTime> {
    if let Some(c) = TIME_DOTTED_RE.captures(text) {
        let fmt = format_description!("[year].[month].[day] [hour][minute]");
        return PrimitiveDateTime::parse(&c[1], &fmt)
            .map_err(|e| MonitorError::parse(format!("report time {:?}: {}", &c[1], e)));
    }
    if let Some(c) = TIME_SLASHED_RE.captures(text) {
        let fmt = format_description!("[day]/[month]/[year] [hour]:[minute]");
        return PrimitiveDateTime::parse(&c[1], &fmt)
            .map_err(|e| MonitorError::parse(format!("report time {:?}: {}", &c[1], e)));
    }
    Err(MonitorError::parse("report has no recognisable UTC time line"))
}

fn capture_f64(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text).and_then(|c| c[1].parse().ok())
}

/// `7`, `1/2` or `2 1/2`.
fn parse_mixed_fraction(s: &str) -> Option<f64> {
    let mut total = 0.0;
    for part in s.split_whitespace() {
        total += match part.split_once('/') {
            Some((n, d)) => {
                let d: f64 = d.parse().ok()?;
                if d == 0.0 {
                    return None;
                }
                n.parse::<f64>().ok()? / d
            }
            None => part.parse::<f64>().ok()?,
        };
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::format_iso;

    const EFJY: &str = "Jyvaskyla, Finland (EFJY) 62-24N 025-41E 139M
Oct 06, 2024 - 08:20 AM EDT / 2024.10.06 1220 UTC
Wind: from the SW (230 degrees) at 12 MPH (10 KT):0
Visibility: greater than 5 mile(s):0
Sky conditions: mostly cloudy
Temperature: 50 F (10 C)
Dew Point: 48 F (9 C)
Relative Humidity: 93%
Pressure (altimeter): 29.65 in. Hg (1004 hPa)
ob: EFJY 061220Z 23010KT 9999 BKN010 10/09 Q1004
cycle: 12
";

    const KJFK_SLASHED: &str = "NEW YORK/JOHN F. KENNEDY INTERNATIONAL AIRPORT, NY, United States (KJFK) 40-38-23N 073-46-44W 9M
Jan 15, 2025 - 06:51 AM EST / 15/01/2025 11:51 UTC
Wind: from the NW (310 degrees) at 17 MPH (15 KT) gusting to 29 MPH (25 KT):0
Visibility: 1 1/2 mile(s):0
Temperature: 26.1 F (-3.3 C)
Dew Point: 10.9 F (-11.7 C)
Relative Humidity: 52%
Pressure (altimeter): 30.12 in. Hg (1019.9 hPa)
";

    #[test]
    fn full_report_in_si_units() {
        let obs = parse_decoded_report("EFJY", EFJY).unwrap();
        assert_eq!(format_iso(obs.timestamp), "2024-10-06T12:20:00");
        assert_eq!(obs.location.as_deref(), Some("Jyvaskyla, Finland"));
        let c = obs.coords.unwrap();
        assert_eq!(c.lat, 62.4);
        assert_eq!(c.lon, 25.6833);
        assert_eq!(obs.wind_speed_m_s, Some(5.14));
        assert_eq!(obs.visibility_km, Some(8.05));
        assert_eq!(obs.temperature_c, Some(10.0));
        assert_eq!(obs.dew_point_c, Some(9.0));
        assert_eq!(obs.relative_humidity, Some(93));
        assert_eq!(obs.pressure_hpa, Some(1004.0));
    }

    #[test]
    fn slashed_time_negative_temps_and_fractional_visibility() {
        let obs = parse_decoded_report("KJFK", KJFK_SLASHED).unwrap();
        assert_eq!(format_iso(obs.timestamp), "2025-01-15T11:51:00");
        assert_eq!(
            obs.location.as_deref(),
            Some("NEW YORK/JOHN F. KENNEDY INTERNATIONAL AIRPORT, NY, United States")
        );
        let c = obs.coords.unwrap();
        assert_eq!(c.lat, 40.6397);
        assert_eq!(c.lon, -73.7789);
        // first KT group is the sustained wind, not the gust
        assert_eq!(obs.wind_speed_m_s, Some(7.72));
        assert_eq!(obs.visibility_km, Some(2.41));
        assert_eq!(obs.temperature_c, Some(-3.3));
        assert_eq!(obs.dew_point_c, Some(-11.7));
        assert_eq!(obs.pressure_hpa, Some(1019.9));
    }

    #[test]
    fn missing_wind_line_leaves_wind_absent() {
        let text = EFJY.replace("Wind: from the SW (230 degrees) at 12 MPH (10 KT):0\n", "");
        let obs = parse_decoded_report("EFJY", &text).unwrap();
        assert_eq!(obs.wind_speed_m_s, None);
        assert_eq!(obs.temperature_c, Some(10.0));
        assert_eq!(obs.location.as_deref(), Some("Jyvaskyla, Finland"));
    }

    #[test]
    fn calm_wind_and_no_visibility() {
        let text = EFJY
            .replace("Wind: from the SW (230 degrees) at 12 MPH (10 KT):0", "Wind: Calm:0")
            .replace("Visibility: greater than 5 mile(s):0\n", "");
        let obs = parse_decoded_report("EFJY", &text).unwrap();
        assert_eq!(obs.wind_speed_m_s, None);
        assert_eq!(obs.visibility_km, None);
        assert_eq!(obs.values()[3], "N/A");
        assert_eq!(obs.values()[4], "N/A");
    }

    #[test]
    fn coordinates_come_from_the_location_line_only() {
        let text = "Somewhere (XXXX)\n\
2024.10.06 1220 UTC\n\
Remark: runway 12-30N 04-22E closed\n";
        let obs = parse_decoded_report("XXXX", text).unwrap();
        assert_eq!(obs.location.as_deref(), Some("Somewhere"));
        assert_eq!(obs.coords, None);
    }

    #[test]
    fn visibility_already_in_km() {
        let text = EFJY.replace("greater than 5 mile(s)", "10 km");
        let obs = parse_decoded_report("EFJY", &text).unwrap();
        assert_eq!(obs.visibility_km, Some(10.0));
    }

    #[test]
    fn report_without_time_is_a_parse_error() {
        let text = EFJY.replace("2024.10.06 1220 UTC", "sometime");
        let err = parse_decoded_report("EFJY", &text).unwrap_err();
        assert!(matches!(err, MonitorError::Parse(_)));
    }

    #[test]
    fn log_values_follow_field_order() {
        let obs = parse_decoded_report("EFJY", EFJY).unwrap();
        let values = obs.values();
        assert_eq!(values.len(), AirportObservation::FIELDS.len());
        assert_eq!(
            values,
            ["Jyvaskyla, Finland", "62.4", "25.6833", "5.14", "8.05", "10", "9", "93", "1004"]
        );
    }

    #[test]
    fn mixed_fractions() {
        assert_eq!(parse_mixed_fraction("7"), Some(7.0));
        assert_eq!(parse_mixed_fraction("1/2"), Some(0.5));
        assert_eq!(parse_mixed_fraction("2 1/4"), Some(2.25));
        assert_eq!(parse_mixed_fraction("1/0"), None);
    }
}
