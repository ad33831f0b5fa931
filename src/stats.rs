//! Yearly mean and standard deviation per column of a station log.

use std::path::Path;

use polars::prelude::*;
use tracing::{debug, info};

use crate::error::{MonitorError, Result};
use crate::record::{MISSING, TIME_COLUMN};

const YEAR: &str = "year";

/// Timestamp parts and positions are not summarised.
const SKIPPED: [&str; 8] = [TIME_COLUMN, "YY", "MM", "DD", "hh", "mm", "latitude", "longitude"];

/// Read a station log with `N/A` as null.
pub fn read_log(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .map_parse_options(|opts| opts.with_null_values(Some(NullValues::AllColumnsSingle(MISSING.into()))))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    debug!(file = %path.display(), rows = df.height(), cols = df.width(), "log read");
    Ok(df)
}

/// Group a log by year and report `<col>_mean` and `<col>_std` for every
/// numeric column holding at least one value.
pub fn yearly_summary(df: &DataFrame) -> Result<DataFrame> {
    let year = year_series(df)?;

    let value_cols: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|s| !SKIPPED.contains(&s.name().as_str()))
        .filter(|s| s.dtype().is_numeric() && s.null_count() < s.len())
        .map(|s| s.name().to_string())
        .collect();

    let mut values = df.select(value_cols.clone())?;
    values.with_column(year)?;

    let aggs: Vec<Expr> = value_cols
        .iter()
        .flat_map(|c| {
            [
                col(c.as_str()).mean().alias(format!("{}_mean", c)),
                col(c.as_str()).std(1).alias(format!("{}_std", c)),
            ]
        })
        .collect();

    let summary = values
        .lazy()
        .filter(col(YEAR).is_not_null())
        .group_by([col(YEAR)])
        .agg(aggs)
        .sort([YEAR], SortMultipleOptions::default())
        .collect()?;
    Ok(summary)
}

/// Summarise one log file.
pub fn summarize_file(path: &Path) -> Result<DataFrame> {
    let df = read_log(path)?;
    if df.height() == 0 {
        return Err(MonitorError::parse(format!("{} has no data rows", path.display())));
    }
    let summary = yearly_summary(&df)?;
    info!(file = %path.display(), years = summary.height(), "log summarised");
    Ok(summary)
}

/// Buoy logs carry the observation year in `YY`; everything else is grouped
/// by the year of the `Time` column.
fn year_series(df: &DataFrame) -> Result<Series> {
    if let Ok(yy) = df.column("YY") {
        return Ok(yy.cast(&DataType::Int32)?.with_name(YEAR.into()));
    }
    let time = df.column(TIME_COLUMN)?;
    let years: Int32Chunked = time
        .str()?
        .into_iter()
        .map(|t| t.and_then(|t| t.get(..4)).and_then(|y| y.parse::<i32>().ok()))
        .collect();
    Ok(years.into_series().with_name(YEAR.into()))
}
