//! Swimmability dashboard map.
//!
//! One map of the whole region: each management-unit polygon opens a
//! popup with its sites' bathing-season results as horizontal stacked
//! percentage bars, sites ordered worst-first. The per-unit results come
//! from one CSV per unit carrying the % of samples in each grade.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};

use soe_core::chart::bar::{stacked_percentage_bar, StackedSeries};
use soe_core::config::{load_settings_or_default, GeoLayerRef, MapFigureSettings};
use soe_core::geo::{Crs, FeatureSet};
use soe_core::grade::GradeScale;
use soe_core::map::{GeoLayer, LeafletMap, PolygonStyle, Popup};
use soe_core::table::Table;

#[derive(Parser, Debug)]
#[command(name = "swimmability", about = "Regional swimmability dashboard map")]
struct Args {
    /// Optional JSON settings file overriding the defaults.
    #[arg(short, long)]
    settings: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct Settings {
    data_dir: PathBuf,
    /// Management unit name → results CSV file name.
    fmu_files: BTreeMap<String, String>,
    site_column: String,
    green_column: String,
    amber_column: String,
    red_column: String,
    no_sample_column: String,
    contact_rec_season_text: String,
    fmu: GeoLayerRef,
    map: MapFigureSettings,
    output: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dir: "data/surface_water/swimmability".into(),
            fmu_files: BTreeMap::new(),
            site_column: "site".to_string(),
            green_column: "Green".to_string(),
            amber_column: "Amber".to_string(),
            red_column: "Red".to_string(),
            no_sample_column: "No Sample".to_string(),
            contact_rec_season_text: "1 November - 30 April".to_string(),
            fmu: GeoLayerRef::new("data/gis/fmu_boundaries.geojson", 2193, "FMU"),
            map: MapFigureSettings::default(),
            output: "results/swimmability/swimmability_map.html".into(),
        }
    }
}

/// Chart height grows with the site count; floor of 500 px keeps small
/// units readable.
fn chart_height(site_count: usize) -> u32 {
    ((site_count as f64 / 36.0 * 1000.0).ceil() as u32).max(500)
}

/// Build one unit's stacked-bar popup from its results table.
fn unit_chart(fmu_name: &str, table: &Table, settings: &Settings) -> Result<(String, u32)> {
    let sorted = table.sort_num_desc(&[
        settings.green_column.as_str(),
        settings.amber_column.as_str(),
        settings.red_column.as_str(),
        settings.no_sample_column.as_str(),
    ])?;

    let sites = sorted.unique(&settings.site_column)?;
    let long = sorted.melt(
        &settings.site_column,
        &[
            settings.green_column.as_str(),
            settings.amber_column.as_str(),
            settings.red_column.as_str(),
            settings.no_sample_column.as_str(),
        ],
    )?;

    let scale = GradeScale::traffic_light();
    let mut series = Vec::new();
    for (state, column) in [
        ("Green", &settings.green_column),
        ("Amber", &settings.amber_column),
        ("Red", &settings.red_column),
        ("No Sample", &settings.no_sample_column),
    ] {
        let state_rows = long.filter_isin("variable", &[column.as_str()])?;
        let mut values = Vec::with_capacity(sites.len());
        for site in &sites {
            let rows = state_rows.filter_isin(&settings.site_column, &[site.as_str()])?;
            values.push(rows.num_max("value")?.unwrap_or(0.0));
        }
        series.push(StackedSeries {
            name: state.to_string(),
            colour: scale.colour(state).to_string(),
            values,
        });
    }

    let height = chart_height(sites.len());
    let title = format!("{fmu_name} swimmability: {}", settings.contact_rec_season_text);
    let figure = stacked_percentage_bar(&sites, &series, &title, height);
    Ok((figure.to_inline_html("swim"), height))
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

    let fmu_crs = Crs::from_epsg(settings.fmu.epsg)?;
    let fmu_wgs = FeatureSet::from_path(&settings.fmu.file, fmu_crs)
        .context("loading management units")?
        .to_crs(Crs::Wgs84)
        .simplify(settings.map.fmu_simplify_tolerance);

    let centre = fmu_wgs.mean_centroid().map(|p| (p.y(), p.x())).unwrap_or((-40.0, 175.5));
    let mut map = LeafletMap::new(centre, settings.map.zoom_start, &settings.map.tile_layer);

    let mut layer = GeoLayer::new();
    for feature in fmu_wgs.iter() {
        let Some(name) = feature.attr_display(&settings.fmu.name_column) else { continue };
        let popup = match settings.fmu_files.get(&name) {
            Some(file) => {
                let table = Table::from_csv_path(&settings.data_dir.join(file))
                    .with_context(|| format!("loading swimmability results for {name}"))?;
                let (chart, height) = unit_chart(&name, &table, &settings)?;
                Popup::chart(chart, 1000, height)
            }
            None => {
                warn!(fmu = %name, "no results file configured; empty popup");
                Popup::text("<p>No data available</p>")
            }
        };
        layer.push(
            &feature.geometry,
            PolygonStyle {
                fill_color: settings.map.fmu_fill_color.clone(),
                color: settings.map.linecolor.clone(),
                weight: settings.map.fmu_lineweight,
                fill_opacity: settings.map.fill_opacity,
            },
            Some(format!("{name} (click to see site results in this FMU)")),
            Some(popup),
        );
    }
    map.add_geojson(layer);
    map.add_css("path.leaflet-interactive:focus { outline: none; }");

    if let Some(parent) = settings.output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    map.save(&settings.output)?;
    info!(path = %settings.output.display(), "wrote swimmability map");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_height_scales_with_sites_but_floors_at_500() {
        assert_eq!(chart_height(1), 500);
        assert_eq!(chart_height(18), 500);
        assert_eq!(chart_height(36), 1000);
        assert_eq!(chart_height(54), 1500);
    }

    #[test]
    fn unit_chart_orders_sites_worst_first() {
        let csv = "\
site,Green,Amber,Red,No Sample
Best beach,90,5,5,0
Worst creek,20,30,50,0
Middle river,60,20,20,0
";
        let table = Table::from_csv_reader(csv.as_bytes()).unwrap();
        let settings = Settings::default();
        let (chart, height) = unit_chart("Coast", &table, &settings).unwrap();
        assert_eq!(height, 500);
        // Sorted descending by Green percentage.
        let best = chart.find("Best beach").unwrap();
        let middle = chart.find("Middle river").unwrap();
        let worst = chart.find("Worst creek").unwrap();
        assert!(best < middle && middle < worst);
        assert!(chart.contains("Coast swimmability: 1 November - 30 April"));
    }
}
