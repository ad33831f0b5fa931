//! Conversion of textual station positions into signed decimal degrees.
//!
//! Two shapes show up in the feeds:
//!
//! * degrees-minutes with a trailing hemisphere, `46-30N 123-15W` (METAR
//!   decoded reports, optionally with seconds: `40-38-23N`)
//! * decimal degrees followed by a separate hemisphere token,
//!   `44.794 N 87.313 W` (NDBC station table)

use crate::error::{MonitorError, Result};

/// The latitude and longitude, south and west negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coords {
    pub lat: f64,
    pub lon: f64,
}

impl From<(f64, f64)> for Coords {
    fn from(pair: (f64, f64)) -> Self {
        Self {
            lat: pair.0,
            lon: pair.1,
        }
    }
}

impl Coords {
    /// Build a position, rejecting anything outside [-90,90] x [-180,180].
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) || !lat.is_finite() {
            return Err(MonitorError::parse(format!("latitude out of range: {}", lat)));
        }
        if !(-180.0..=180.0).contains(&lon) || !lon.is_finite() {
            return Err(MonitorError::parse(format!("longitude out of range: {}", lon)));
        }
        Ok(Self { lat, lon })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Lat,
    Lon,
}

fn hemisphere(c: char) -> Option<(Axis, f64)> {
    match c.to_ascii_uppercase() {
        'N' => Some((Axis::Lat, 1.0)),
        'S' => Some((Axis::Lat, -1.0)),
        'E' => Some((Axis::Lon, 1.0)),
        'W' => Some((Axis::Lon, -1.0)),
        _ => None,
    }
}

/// Parse a single `DD-MM[-SS][NSEW]` token into signed degrees.
///
/// ```
/// use station_monitor::coords::parse_dms;
/// assert_eq!(parse_dms("46-30N").unwrap(), 46.5);
/// assert_eq!(parse_dms("123-15W").unwrap(), -123.25);
/// ```
pub fn parse_dms(token: &str) -> Result<f64> {
    parse_dms_axis(token).map(|(_, v)| v)
}

fn parse_dms_axis(token: &str) -> Result<(Axis, f64)> {
    let bad = || MonitorError::parse(format!("not a DD-MM[NSEW] coordinate: {:?}", token));

    let token = token.trim();
    let dir = token.chars().last().ok_or_else(bad)?;
    let (axis, sign) = hemisphere(dir).ok_or_else(bad)?;
    let body = &token[..token.len() - dir.len_utf8()];

    let parts: Vec<&str> = body.split('-').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(bad());
    }
    let mut nums = [0u32; 3];
    for (i, p) in parts.iter().enumerate() {
        if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        nums[i] = p.parse().map_err(|_| bad())?;
    }
    let [deg, min, sec] = nums;
    if min >= 60 || sec >= 60 {
        return Err(bad());
    }

    let value = deg as f64 + min as f64 / 60.0 + sec as f64 / 3600.0;
    Ok((axis, sign * value))
}

/// Parse a station position in either accepted shape.
///
/// A `ParseError` here only concerns the one station being resolved; callers
/// decide whether to drop it.
pub fn parse_location(text: &str) -> Result<Coords> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    match tokens.as_slice() {
        [lat, lat_dir, lon, lon_dir] => parse_decimal_pair(lat, lat_dir, lon, lon_dir),
        [first, second] => {
            let (a1, v1) = parse_dms_axis(first)?;
            let (a2, v2) = parse_dms_axis(second)?;
            match (a1, a2) {
                (Axis::Lat, Axis::Lon) => Coords::new(v1, v2),
                _ => Err(MonitorError::parse(format!(
                    "expected latitude then longitude: {:?}",
                    text
                ))),
            }
        }
        _ => Err(MonitorError::parse(format!("unrecognised location: {:?}", text))),
    }
}

fn parse_decimal_pair(lat: &str, lat_dir: &str, lon: &str, lon_dir: &str) -> Result<Coords> {
    let signed = |value: &str, dir: &str, want: Axis| -> Result<f64> {
        let v: f64 = value
            .parse()
            .map_err(|_| MonitorError::parse(format!("not a decimal degree: {:?}", value)))?;
        let mut chars = dir.chars();
        let (axis, sign) = match (chars.next(), chars.next()) {
            (Some(c), None) => hemisphere(c),
            _ => None,
        }
        .ok_or_else(|| MonitorError::parse(format!("not a hemisphere: {:?}", dir)))?;
        if axis != want {
            return Err(MonitorError::parse(format!("unexpected hemisphere {:?}", dir)));
        }
        Ok(sign * v)
    };

    Coords::new(
        signed(lat, lat_dir, Axis::Lat)?,
        signed(lon, lon_dir, Axis::Lon)?,
    )
}
