//! Groundwater quality state maps.
//!
//! One map per attribute: management-unit outlines with a name tooltip,
//! and a div-icon marker per monitoring bore coloured by the attribute
//! grade. E. coli markers carry the detection count inside the disc.
//! Attribute maps are independent files, so they render in parallel.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use serde::Deserialize;
use tracing::{info, warn};

use soe_core::config::{load_settings_or_default, GeoLayerRef, MapFigureSettings};
use soe_core::geo::{Crs, FeatureSet};
use soe_core::map::legend::draggable_legend;
use soe_core::map::{DivMarker, GeoLayer, LeafletMap, PolygonStyle, Popup};
use soe_core::table::Table;

#[derive(Parser, Debug)]
#[command(name = "groundwater-maps", about = "Groundwater quality state maps per attribute")]
struct Args {
    /// Optional JSON settings file overriding the defaults.
    #[arg(short, long)]
    settings: Option<PathBuf>,
}

/// One mapped attribute: the grade column and its label → colour map.
#[derive(Debug, Clone, Deserialize)]
struct AttributeSettings {
    column: String,
    grade_colours: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct Settings {
    state_data: PathBuf,
    site_column: String,
    x_column: String,
    y_column: String,
    site_epsg: u32,
    /// Detection counts shown inside the E. coli markers.
    ecoli_detections_column: String,
    ecoli_attribute: String,
    /// Attribute display name → column and colours.
    attribute_columns: BTreeMap<String, AttributeSettings>,
    fmu: GeoLayerRef,
    map: MapFigureSettings,
    out_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        let traffic = BTreeMap::from([
            ("Green".to_string(), "#70ad47".to_string()),
            ("Amber".to_string(), "#ed7d31".to_string()),
            ("Red".to_string(), "#ff0000".to_string()),
        ]);
        Settings {
            state_data: "data/groundwater/groundwater_state.csv".into(),
            site_column: "site".to_string(),
            x_column: "easting".to_string(),
            y_column: "northing".to_string(),
            site_epsg: 2193,
            ecoli_detections_column: "ecoli_detections".to_string(),
            ecoli_attribute: "E. coli".to_string(),
            attribute_columns: BTreeMap::from([
                (
                    "E. coli".to_string(),
                    AttributeSettings {
                        column: "ecoli_grade".to_string(),
                        grade_colours: traffic.clone(),
                    },
                ),
                (
                    "Nitrate".to_string(),
                    AttributeSettings {
                        column: "nitrate_grade".to_string(),
                        grade_colours: traffic,
                    },
                ),
            ]),
            fmu: GeoLayerRef::new("data/gis/fmu_boundaries.geojson", 2193, "FMU"),
            map: MapFigureSettings::default(),
            out_dir: "results/groundwater/state_maps".into(),
        }
    }
}

/// Map output file name for an attribute, cleaned of path-hostile
/// characters.
fn output_file_name(attribute: &str) -> String {
    let cleaned = attribute.replace('.', "").replace([':', '>'], " ");
    format!("{cleaned}.html")
}

/// Unit outlines with the management-unit tooltip.
fn fmu_outline_layer(fmu_wgs: &FeatureSet, settings: &Settings) -> GeoLayer {
    let mut layer = GeoLayer::new();
    layer.push_features(
        fmu_wgs,
        |_| PolygonStyle {
            fill_color: settings.map.fmu_fill_color.clone(),
            color: settings.map.linecolor.clone(),
            weight: settings.map.fmu_lineweight,
            fill_opacity: settings.map.fill_opacity,
        },
        |feature| {
            feature
                .attr_display(&settings.fmu.name_column)
                .map(|name| format!("Freshwater Management Unit: {name}"))
        },
    );
    layer
}

/// Build one attribute map over the bore markers.
fn build_attribute_map(
    attribute: &str,
    attr: &AttributeSettings,
    sites: &FeatureSet,
    fmu_layer: &GeoLayer,
    settings: &Settings,
) -> LeafletMap {
    let centre = sites.mean_centroid().map(|p| (p.y(), p.x())).unwrap_or((-40.0, 175.5));
    let mut map = LeafletMap::new(centre, settings.map.zoom_start, &settings.map.tile_layer);
    map.add_geojson(fmu_layer.clone());

    for feature in sites.iter() {
        let Some(site_name) = feature.attr_display(&settings.site_column) else { continue };
        let Some(grade) = feature.attr_display(&attr.column) else { continue };
        let Some(colour) = attr.grade_colours.get(&grade) else {
            // Ungradeable bores are left off the map.
            warn!(site = %site_name, attribute, grade = %grade, "no colour for grade; skipping site");
            continue;
        };
        let Some(point) = feature.centroid() else { continue };

        let label = if attribute == settings.ecoli_attribute {
            feature
                .attr_display(&settings.ecoli_detections_column)
                .filter(|v| v != "No Data")
                .unwrap_or_default()
        } else {
            String::new()
        };

        map.add_div_marker(DivMarker {
            lat: point.y(),
            lon: point.x(),
            colour: colour.clone(),
            label,
            size: 20,
            tooltip: Some(site_name.clone()),
            popup: Some(Popup::text(format!(
                "<div style=\"width:300px;\">\
                 Site name: <strong>{site_name}</strong><br>\
                 Attribute : {attribute}<br>\
                 Grade:  <b>{grade}</b>.\
                 </div>"
            ))),
        });
    }

    let legend_entries: Vec<(String, String)> =
        attr.grade_colours.iter().map(|(label, colour)| (label.clone(), colour.clone())).collect();
    map.set_legend(draggable_legend(attribute, &legend_entries, settings.map.fill_opacity));
    map.add_css("path.leaflet-interactive:focus { outline: none; }");
    map.add_css(".leaflet-control-layers-list { font-size:18px; }");
    map
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings: Settings =
        load_settings_or_default(args.settings.as_deref()).context("loading settings")?;

    let data = Table::from_csv_path(&settings.state_data).context("loading groundwater state")?;
    let site_crs = Crs::from_epsg(settings.site_epsg)?;
    let sites = FeatureSet::from_table_points(&data, &settings.x_column, &settings.y_column, site_crs)?
        .to_crs(Crs::Wgs84);
    info!(sites = sites.len(), "groundwater bores loaded");

    let fmu_crs = Crs::from_epsg(settings.fmu.epsg)?;
    let fmu_wgs = FeatureSet::from_path(&settings.fmu.file, fmu_crs)
        .context("loading management units")?
        .to_crs(Crs::Wgs84)
        .simplify(settings.map.simplify_tolerance);
    let fmu_layer = fmu_outline_layer(&fmu_wgs, &settings);

    std::fs::create_dir_all(&settings.out_dir)?;
    let results: Vec<Result<PathBuf>> = settings
        .attribute_columns
        .par_iter()
        .map(|(attribute, attr)| {
            let map = build_attribute_map(attribute, attr, &sites, &fmu_layer, &settings);
            let out = settings.out_dir.join(output_file_name(attribute));
            map.save(&out)?;
            Ok(out)
        })
        .collect();
    for result in results {
        let path = result?;
        info!(path = %path.display(), "wrote groundwater map");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_file_names_drop_hostile_characters() {
        assert_eq!(output_file_name("E. coli"), "E coli.html");
        assert_eq!(output_file_name("Nitrate > 5.6"), "Nitrate   56.html");
    }

    #[test]
    fn defaults_name_both_attributes() {
        let settings = Settings::default();
        assert!(settings.attribute_columns.contains_key("E. coli"));
        assert!(settings.attribute_columns.contains_key("Nitrate"));
    }
}
