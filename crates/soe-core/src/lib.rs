//! Shared primitives for the State of Environment reporting tools.
//!
//! Every reporting tool in this workspace is the same pipeline:
//! settings → load tabular/geospatial data → filter/join/aggregate →
//! render an interactive HTML chart or map. This crate holds the pieces
//! those pipelines share:
//!
//!   - [`table`]: lightweight record tables loaded from CSV
//!   - [`grade`]: ordinal grade scales and worst-grade aggregation
//!   - [`geo`]: feature sets, NZTM↔WGS84 reprojection, nearest-region joins
//!   - [`chart`]: Plotly figure construction and HTML emission
//!   - [`map`]: Leaflet map assembly and HTML emission
//!   - [`config`]: shared settings types with `.get()`-style defaults

pub mod chart;
pub mod config;
pub mod error;
pub mod geo;
pub mod grade;
pub mod map;
pub mod table;

pub use error::{Error, Result};
