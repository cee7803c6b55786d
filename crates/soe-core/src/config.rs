//! Shared settings types.
//!
//! Each tool owns a settings struct built from these pieces and a
//! `Default` impl; a JSON settings file overrides whichever keys it
//! names. Absent keys keep their defaults — the same contract as the
//! `.get()`-with-fallback dictionaries the analyses grew up with.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Load a settings file, deserialising into the tool's settings type.
pub fn load_settings<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| Error::Settings {
        path: path.to_path_buf(),
        source,
    })
}

/// Load settings from an optional path, falling back to the defaults.
pub fn load_settings_or_default<T: DeserializeOwned + Default>(
    path: Option<&Path>,
) -> Result<T> {
    match path {
        Some(p) => load_settings(p),
        None => Ok(T::default()),
    }
}

/// Reference to a geospatial layer on disk: a GeoJSON or shapefile path,
/// the EPSG its coordinates are stored in, and the attribute naming each
/// feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoLayerRef {
    pub file: PathBuf,
    pub epsg: u32,
    pub name_column: String,
}

impl GeoLayerRef {
    pub fn new(file: impl Into<PathBuf>, epsg: u32, name_column: &str) -> GeoLayerRef {
        GeoLayerRef { file: file.into(), epsg, name_column: name_column.to_string() }
    }
}

/// Styling knobs shared by every map-producing tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapFigureSettings {
    pub zoom_start: u32,
    pub tile_layer: String,
    /// Simplification tolerance for result polygons, CRS units.
    pub simplify_tolerance: f64,
    /// Simplification tolerance for management-unit outlines.
    pub fmu_simplify_tolerance: f64,
    pub fill_opacity: f64,
    pub fmu_fill_color: String,
    pub fmu_highlight_color: String,
    pub linecolor: String,
    pub lineweight: f64,
    pub fmu_lineweight: f64,
    /// Riverlines scale their weight by stream order up to this value.
    pub max_riverline_weight: f64,
    pub riverline_colour: String,
    pub min_stream_order: f64,
}

impl Default for MapFigureSettings {
    fn default() -> Self {
        MapFigureSettings {
            zoom_start: 8,
            tile_layer: "CartoDB positron".to_string(),
            simplify_tolerance: 0.001,
            fmu_simplify_tolerance: 0.001,
            fill_opacity: 0.7,
            fmu_fill_color: "#d9d9d9".to_string(),
            fmu_highlight_color: "#bdbdbd".to_string(),
            linecolor: "black".to_string(),
            lineweight: 1.0,
            fmu_lineweight: 2.0,
            max_riverline_weight: 4.0,
            riverline_colour: "#1281aa".to_string(),
            min_stream_order: 3.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct ToolSettings {
        title: String,
        map: MapFigureSettings,
    }

    #[test]
    fn absent_keys_fall_back_to_defaults() {
        let parsed: ToolSettings =
            serde_json::from_str(r#"{"map": {"zoom_start": 11}}"#).unwrap();
        assert_eq!(parsed.map.zoom_start, 11);
        // Everything else keeps its default.
        assert_eq!(parsed.map.tile_layer, "CartoDB positron");
        assert_eq!(parsed.title, "");
    }

    #[test]
    fn defaults_are_the_documented_fallbacks() {
        let map = MapFigureSettings::default();
        assert_eq!(map.zoom_start, 8);
        assert!(map.fill_opacity > 0.0 && map.fill_opacity <= 1.0);
    }
}
