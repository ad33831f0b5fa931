//! Error taxonomy for feed fetching, parsing, and log persistence.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("network error for {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("delimited file error on {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("statistics error: {0}")]
    Stats(#[from] polars::error::PolarsError),
}

impl MonitorError {
    pub(crate) fn network(url: &str, reason: impl ToString) -> Self {
        MonitorError::Network {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn parse(reason: impl Into<String>) -> Self {
        MonitorError::Parse(reason.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MonitorError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        MonitorError::Csv {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
