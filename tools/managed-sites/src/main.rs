//! Biodiversity managed-sites reporting and vegetation cover maps.
//!
//! Two outputs:
//!   - bar charts of managed-site counts and managed area per
//!     management unit, sites joined to units through their centroids;
//!   - a before/after vegetation cover map, layers dissolved by
//!     ecosystem type and coloured from the ecosystem colour table,
//!     switchable between the historic and present cover.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};

use soe_core::chart::bar::{grouped_bar, BarSeries, GroupedBarOptions};
use soe_core::config::{load_settings_or_default, GeoLayerRef, MapFigureSettings};
use soe_core::geo::join::assign_by_centroid;
use soe_core::geo::{Crs, FeatureSet};
use soe_core::grade::DEFAULT_COLOUR;
use soe_core::map::legend::draggable_legend;
use soe_core::map::{GeoLayer, LayerGroup, LeafletMap, PolygonStyle};
use soe_core::table::Table;

#[derive(Parser, Debug)]
#[command(name = "managed-sites", about = "Managed sites reporting and vegetation maps")]
struct Args {
    /// Optional JSON settings file overriding the defaults.
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Skip the vegetation before/after map.
    #[arg(long)]
    no_vegetation: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ColourTable {
    file: PathBuf,
    type_column: String,
    colour_column: String,
}

impl Default for ColourTable {
    fn default() -> Self {
        ColourTable {
            file: "data/biodiversity/ecosystem_type_colours.csv".into(),
            type_column: "EcosystemType".to_string(),
            colour_column: "HexCode".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct VegetationSettings {
    /// Historic (pre-clearance) cover layer.
    before_file: PathBuf,
    /// Present cover layer.
    after_file: PathBuf,
    epsg: u32,
    ecosystem_column: String,
    colour_table: ColourTable,
    output: PathBuf,
}

impl Default for VegetationSettings {
    fn default() -> Self {
        VegetationSettings {
            before_file: "data/biodiversity/past_veg_cover.geojson".into(),
            after_file: "data/biodiversity/present_veg_cover.geojson".into(),
            epsg: 2193,
            ecosystem_column: "EcosystemType".to_string(),
            colour_table: ColourTable::default(),
            output: "results/biodiversity/vegetation_before_after.html".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct Settings {
    /// Managed biodiversity sites layer (polygons).
    sites_file: PathBuf,
    sites_epsg: u32,
    management_level_column: String,
    /// Sites at or above this level count as managed.
    managed_level_threshold: f64,
    area_column: String,
    fmu: GeoLayerRef,
    /// Centroid-join cutoff in metres.
    max_distance: f64,
    vegetation: VegetationSettings,
    map: MapFigureSettings,
    count_output: PathBuf,
    area_output: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            sites_file: "data/biodiversity/managed_sites.geojson".into(),
            sites_epsg: 2193,
            management_level_column: "HRCLevel".to_string(),
            managed_level_threshold: 3.0,
            area_column: "AreaHa".to_string(),
            fmu: GeoLayerRef::new("data/gis/fmu_boundaries.shp", 2193, "Label"),
            max_distance: 2000.0,
            vegetation: VegetationSettings::default(),
            map: MapFigureSettings::default(),
            count_output: "results/biodiversity/managed_sites_count.html".into(),
            area_output: "results/biodiversity/managed_sites_area.html".into(),
        }
    }
}

/// Managed-site count and managed area (ha) per management unit.
fn managed_totals(
    sites: &FeatureSet,
    assignments: &[Option<String>],
    settings: &Settings,
) -> Vec<(String, usize, f64)> {
    let mut totals: Vec<(String, usize, f64)> = Vec::new();
    for (site, fmu) in sites.iter().zip(assignments) {
        let Some(fmu) = fmu else { continue };
        let level = site.attr_num(&settings.management_level_column).unwrap_or(0.0);
        if level < settings.managed_level_threshold {
            continue;
        }
        let area = site.attr_num(&settings.area_column).unwrap_or(0.0);
        match totals.iter_mut().find(|(name, _, _)| name == fmu) {
            Some((_, count, total_area)) => {
                *count += 1;
                *total_area += area;
            }
            None => totals.push((fmu.clone(), 1, area)),
        }
    }
    totals.sort_by(|a, b| a.0.cmp(&b.0));
    totals
}

fn managed_site_charts(settings: &Settings) -> Result<()> {
    let fmu_crs = Crs::from_epsg(settings.fmu.epsg)?;
    let fmu_layer =
        FeatureSet::from_path(&settings.fmu.file, fmu_crs).context("loading management units")?;
    let sites_crs = Crs::from_epsg(settings.sites_epsg)?;
    let sites = FeatureSet::from_path(&settings.sites_file, sites_crs)
        .context("loading managed sites layer")?
        .to_crs(fmu_crs);

    let assignments =
        assign_by_centroid(&sites, &fmu_layer, &settings.fmu.name_column, settings.max_distance);
    let totals = managed_totals(&sites, &assignments, settings);
    info!(units = totals.len(), "managed sites joined to management units");

    let groups: Vec<String> = totals.iter().map(|(name, _, _)| name.clone()).collect();
    let counts: Vec<f64> = totals.iter().map(|(_, count, _)| *count as f64).collect();
    let areas: Vec<f64> = totals.iter().map(|(_, _, area)| *area).collect();

    let count_chart = grouped_bar(
        &groups,
        &[BarSeries { name: "Managed".to_string(), colour: Some("#4B9B5B".to_string()), values: counts }],
        &GroupedBarOptions {
            y_title: "Number of managed sites".to_string(),
            barmode: "group".to_string(),
            ..GroupedBarOptions::default()
        },
    );
    let area_chart = grouped_bar(
        &groups,
        &[BarSeries { name: "Managed".to_string(), colour: Some("#87BE43".to_string()), values: areas }],
        &GroupedBarOptions {
            y_title: "Managed area (ha)".to_string(),
            barmode: "group".to_string(),
            ..GroupedBarOptions::default()
        },
    );

    for (figure, path) in [(count_chart, &settings.count_output), (area_chart, &settings.area_output)] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        figure.write_html(path)?;
        info!(path = %path.display(), "wrote managed-sites chart");
    }
    Ok(())
}

/// Ecosystem type → hex colour, keyed lowercase to survive the casing
/// drift between the survey layers.
fn ecosystem_colours(table: &ColourTable) -> Result<HashMap<String, String>> {
    let colours = Table::from_csv_path(&table.file).context("loading ecosystem colour table")?;
    let mut map = HashMap::new();
    for row in colours.iter() {
        if let (Some(kind), Some(colour)) =
            (row.display(&table.type_column), row.display(&table.colour_column))
        {
            map.insert(kind.to_lowercase(), colour);
        }
    }
    Ok(map)
}

/// Dissolve a cover layer by ecosystem type and reduce it to WGS84
/// display form.
fn prepare_cover(set: &FeatureSet, settings: &VegetationSettings, tolerance: f64) -> FeatureSet {
    set.drop_degenerate()
        .dissolve_by(&settings.ecosystem_column)
        .to_crs(Crs::Wgs84)
        .simplify(tolerance)
}

/// One vegetation layer with colours from the ecosystem colour table.
fn vegetation_layer(
    cover: &FeatureSet,
    colours: &HashMap<String, String>,
    settings: &Settings,
) -> GeoLayer {
    let mut layer = GeoLayer::new();
    for feature in cover.iter() {
        let Some(kind) = feature.attr_display(&settings.vegetation.ecosystem_column) else {
            continue;
        };
        let colour = match colours.get(&kind.to_lowercase()) {
            Some(colour) => colour.clone(),
            None => {
                warn!(ecosystem = %kind, "no colour mapping; using default");
                DEFAULT_COLOUR.to_string()
            }
        };
        layer.push(
            &feature.geometry,
            PolygonStyle {
                fill_color: colour,
                color: "black".to_string(),
                weight: 0.4,
                fill_opacity: 0.6,
            },
            Some(format!("Vegetation Type: {kind}")),
            None,
        );
    }
    layer
}

fn vegetation_map(settings: &Settings) -> Result<()> {
    let veg = &settings.vegetation;
    let crs = Crs::from_epsg(veg.epsg)?;
    let before = FeatureSet::from_path(&veg.before_file, crs).context("loading historic cover")?;
    let after = FeatureSet::from_path(&veg.after_file, crs).context("loading present cover")?;

    let before = prepare_cover(&before, veg, settings.map.simplify_tolerance);
    let after = prepare_cover(&after, veg, settings.map.simplify_tolerance);
    let colours = ecosystem_colours(&veg.colour_table)?;

    let centre = after
        .mean_centroid()
        .or_else(|| before.mean_centroid())
        .map(|p| (p.y(), p.x()))
        .unwrap_or((-40.0, 175.9));
    let mut map = LeafletMap::new(centre, settings.map.zoom_start, &settings.map.tile_layer);

    let mut before_group = LayerGroup::new("Vegetation cover - before", true, false);
    before_group.add_geojson(vegetation_layer(&before, &colours, settings));
    let mut after_group = LayerGroup::new("Vegetation cover - after", true, true);
    after_group.add_geojson(vegetation_layer(&after, &colours, settings));
    map.add_group(after_group);
    map.add_group(before_group);

    // Legend lists the types present in either layer, colour-table order
    // is lost to the dissolve so they are shown alphabetically.
    let mut kinds: Vec<String> = before
        .iter()
        .chain(after.iter())
        .filter_map(|f| f.attr_display(&veg.ecosystem_column))
        .collect();
    kinds.sort();
    kinds.dedup();
    let entries: Vec<(String, String)> = kinds
        .into_iter()
        .map(|kind| {
            let colour = colours
                .get(&kind.to_lowercase())
                .cloned()
                .unwrap_or_else(|| DEFAULT_COLOUR.to_string());
            (kind, colour)
        })
        .collect();
    map.set_legend(draggable_legend("Ecosystem Type (High Level)", &entries, 0.5));
    map.layer_control(false);
    map.add_css("path.leaflet-interactive:focus { outline: none; }");

    if let Some(parent) = veg.output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    map.save(&veg.output)?;
    info!(path = %veg.output.display(), "wrote vegetation map");
    Ok(())
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

    managed_site_charts(&settings)?;
    if !args.no_vegetation {
        vegetation_map(&settings)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use soe_core::table::Cell;

    fn site(level: f64, area: f64) -> soe_core::geo::Feature {
        let mut f = soe_core::geo::Feature::new(
            polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)]
                .into(),
        );
        f.attrs.insert("HRCLevel".to_string(), Cell::Num(level));
        f.attrs.insert("AreaHa".to_string(), Cell::Num(area));
        f
    }

    #[test]
    fn totals_only_count_sites_at_or_above_the_managed_level() {
        let mut sites = FeatureSet::new(Crs::Nztm);
        sites.features.push(site(5.0, 10.0));
        sites.features.push(site(2.0, 99.0)); // below threshold
        sites.features.push(site(3.0, 4.5));
        let assignments = vec![
            Some("Coast".to_string()),
            Some("Coast".to_string()),
            Some("Coast".to_string()),
        ];
        let totals = managed_totals(&sites, &assignments, &Settings::default());
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].0, "Coast");
        assert_eq!(totals[0].1, 2);
        assert!((totals[0].2 - 14.5).abs() < 1e-9);
    }

    #[test]
    fn unassigned_sites_are_left_out_of_the_totals() {
        let mut sites = FeatureSet::new(Crs::Nztm);
        sites.features.push(site(5.0, 10.0));
        let totals = managed_totals(&sites, &[None], &Settings::default());
        assert!(totals.is_empty());
    }
}
