//! Error type shared by the reporting library.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid geojson in {path}: {message}")]
    GeoJson { path: PathBuf, message: String },

    #[error("shapefile error in {path}: {message}")]
    Shapefile { path: PathBuf, message: String },

    #[error("no column named '{0}'")]
    MissingColumn(String),

    #[error("row has {got} cells, table has {expected} columns")]
    RowWidth { expected: usize, got: usize },

    #[error("unsupported EPSG code {0}")]
    UnknownCrs(u32),

    #[error("grade bands need one more cutoff than labels ({cutoffs} cutoffs, {labels} labels)")]
    BandShape { cutoffs: usize, labels: usize },

    #[error("settings error in {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
