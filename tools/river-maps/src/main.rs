//! River water quality state maps.
//!
//! Loads the river state table, attaches every monitoring site to its
//! freshwater management unit by nearest-region join, aggregates the
//! worst grade per unit, and writes one Leaflet map per attribute:
//! unit polygons coloured by the unit grade with a grade-distribution
//! donut popup, site markers with grade-history popups, and optionally
//! the river network weighted by stream order.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use geo::Point;
use serde::Deserialize;
use tracing::{info, warn};

use soe_core::chart::donut::grade_donut;
use soe_core::chart::scatter::grade_history;
use soe_core::config::{load_settings_or_default, GeoLayerRef, MapFigureSettings};
use soe_core::geo::join::nearest_within;
use soe_core::geo::{Crs, FeatureSet};
use soe_core::grade::GradeScale;
use soe_core::map::legend::draggable_legend;
use soe_core::map::{
    CircleMarker, GeoLayer, LayerGroup, LeafletMap, PolygonStyle, Popup,
};
use soe_core::table::Table;

#[derive(Parser, Debug)]
#[command(name = "river-maps", about = "River water quality state maps per attribute")]
struct Args {
    /// Optional JSON settings file overriding the defaults.
    #[arg(short, long)]
    settings: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RiverlinesSettings {
    file: PathBuf,
    epsg: u32,
    stream_order_column: String,
}

impl Default for RiverlinesSettings {
    fn default() -> Self {
        RiverlinesSettings {
            file: "data/gis/river_network.shp".into(),
            epsg: 2193,
            stream_order_column: "StreamOrde".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct Settings {
    river_state_data: PathBuf,
    year_column: String,
    years_of_interest: Vec<f64>,
    include_impact_sites: bool,
    status_column: String,
    rep_site_status: String,
    remove_filter_fails: bool,
    filter_column: String,
    site_column: String,
    ignore_sites: Vec<String>,
    x_column: String,
    y_column: String,
    site_epsg: u32,
    state_period_column: String,
    current_state_period: String,
    /// Attribute display name → grade column.
    attribute_columns: BTreeMap<String, String>,
    /// Nearest-unit cutoff in metres.
    max_distance: f64,
    fmu: GeoLayerRef,
    riverlines: RiverlinesSettings,
    plot_riverlines: bool,
    /// Optional column giving per-site fill opacity for the unit shapes.
    opacity_column: Option<String>,
    grade_scale: GradeScale,
    map: MapFigureSettings,
    out_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            river_state_data: "data/surface_water/river_state.csv".into(),
            year_column: "year".to_string(),
            years_of_interest: vec![2023.0],
            include_impact_sites: false,
            status_column: "status".to_string(),
            rep_site_status: "Representative".to_string(),
            remove_filter_fails: true,
            filter_column: "filters_passed".to_string(),
            site_column: "site".to_string(),
            ignore_sites: Vec::new(),
            x_column: "easting".to_string(),
            y_column: "northing".to_string(),
            site_epsg: 2193,
            state_period_column: "state period".to_string(),
            current_state_period: "2019 - 2023".to_string(),
            attribute_columns: BTreeMap::from([
                ("MCI".to_string(), "MCI".to_string()),
                ("E. coli".to_string(), "E. coli".to_string()),
            ]),
            max_distance: 500.0,
            fmu: GeoLayerRef::new("data/gis/fmu_boundaries.geojson", 2193, "FMU"),
            riverlines: RiverlinesSettings::default(),
            plot_riverlines: false,
            opacity_column: None,
            grade_scale: nof_scale(),
            map: MapFigureSettings::default(),
            out_dir: "results/state_maps".into(),
        }
    }
}

/// National Objectives Framework band colours.
fn nof_scale() -> GradeScale {
    GradeScale::new(
        ["A", "B", "C", "D", "E"],
        ["No Data"],
        &[
            ("A", "#00b0f0"),
            ("B", "#92d050"),
            ("C", "#ffff00"),
            ("D", "#ffc000"),
            ("E", "#ff0000"),
            ("No Data", "#a6a6a6"),
        ],
    )
}

/// Map output file name for an attribute, cleaned of path-hostile
/// characters.
fn output_file_name(attribute: &str) -> String {
    let cleaned = attribute.replace('.', "").replace([':', '>'], " ");
    format!("{cleaned}.html")
}

/// Load the river state table and run the filter chain.
fn load_state_table(settings: &Settings) -> Result<Table> {
    let mut table = Table::from_csv_path(&settings.river_state_data)
        .context("loading river state data")?;
    table = table.filter_num_isin(&settings.year_column, &settings.years_of_interest)?;
    if !settings.include_impact_sites {
        table = table.filter_isin(&settings.status_column, &[settings.rep_site_status.as_str()])?;
    }
    if settings.remove_filter_fails {
        let filter_column = settings.filter_column.clone();
        table = table.filter(|row| row.cell(&filter_column).and_then(|c| c.as_bool()) == Some(true));
    }
    let ignore: Vec<&str> = settings.ignore_sites.iter().map(String::as_str).collect();
    table = table.filter_not_isin(&settings.site_column, &ignore)?;
    Ok(table)
}

/// Last-seen coordinates per site, in the site EPSG.
fn site_coordinates(table: &Table, settings: &Settings) -> Result<HashMap<String, (f64, f64)>> {
    table.column_index(&settings.x_column)?;
    table.column_index(&settings.y_column)?;
    let mut coords = HashMap::new();
    for row in table.iter() {
        let Some(site) = row.display(&settings.site_column) else { continue };
        if let (Some(x), Some(y)) = (row.num(&settings.x_column), row.num(&settings.y_column)) {
            coords.insert(site, (x, y));
        }
    }
    Ok(coords)
}

/// Nearest-unit assignment per site, in the unit layer's CRS.
fn assign_site_fmus(
    coords: &HashMap<String, (f64, f64)>,
    fmu_layer: &FeatureSet,
    settings: &Settings,
) -> Result<HashMap<String, String>> {
    let site_crs = Crs::from_epsg(settings.site_epsg)?;
    let mut assigned = HashMap::new();
    for (site, &(x, y)) in coords {
        let coord = site_crs.reproject(fmu_layer.crs, geo::Coord { x, y });
        let point = Point::new(coord.x, coord.y);
        match nearest_within(&point, fmu_layer, settings.max_distance) {
            Some((feature, _)) => {
                if let Some(name) = feature.attr_display(&settings.fmu.name_column) {
                    assigned.insert(site.clone(), name);
                }
            }
            None => warn!(site = %site, "no management unit within cutoff; site unassigned"),
        }
    }
    Ok(assigned)
}

/// Everything the map assembly needs for one site.
struct SiteState {
    site: String,
    lat: f64,
    lon: f64,
    fmu: String,
    grade: String,
    opacity: Option<f64>,
    /// Full (state period, grade) history, period ascending.
    history: Vec<(String, String)>,
}

fn collect_site_states(
    table: &Table,
    coords: &HashMap<String, (f64, f64)>,
    fmu_of: &HashMap<String, String>,
    attribute_column: &str,
    settings: &Settings,
) -> Result<Vec<SiteState>> {
    let site_crs = Crs::from_epsg(settings.site_epsg)?;
    let current = table
        .filter_isin(&settings.state_period_column, &[settings.current_state_period.as_str()])?;

    let mut states = Vec::new();
    for site in current.unique(&settings.site_column)? {
        let Some(&(x, y)) = coords.get(&site) else { continue };
        let Some(fmu) = fmu_of.get(&site) else { continue };

        let rows = table.filter_isin(&settings.site_column, &[site.as_str()])?;
        let rows = rows.sort_by_str(&settings.state_period_column)?;
        let mut history = Vec::new();
        for row in rows.iter() {
            if let (Some(period), Some(grade)) = (
                row.display(&settings.state_period_column),
                row.display(attribute_column),
            ) {
                history.push((period, grade));
            }
        }
        let grade = history
            .iter()
            .find(|(period, _)| *period == settings.current_state_period)
            .map(|(_, grade)| grade.clone())
            .unwrap_or_else(|| "No Data".to_string());

        let opacity = settings.opacity_column.as_ref().and_then(|column| {
            current
                .filter_isin(&settings.site_column, &[site.as_str()])
                .ok()
                .and_then(|t| t.num_max(column).ok().flatten())
        });

        let wgs = site_crs.reproject(Crs::Wgs84, geo::Coord { x, y });
        states.push(SiteState {
            site,
            lat: wgs.y,
            lon: wgs.x,
            fmu: fmu.clone(),
            grade,
            opacity,
            history,
        });
    }
    Ok(states)
}

/// Worst grade per management unit over the current-period site grades.
fn fmu_worst_grades(
    sites: &[SiteState],
    scale: &GradeScale,
) -> HashMap<String, String> {
    let mut grades_per_fmu: HashMap<&str, Vec<&str>> = HashMap::new();
    for site in sites {
        grades_per_fmu.entry(&site.fmu).or_default().push(&site.grade);
    }
    grades_per_fmu
        .into_iter()
        .filter_map(|(fmu, grades)| {
            scale.worst(grades.iter().copied()).map(|g| (fmu.to_string(), g.to_string()))
        })
        .collect()
}

/// Riverlines layer for the region overview, line weight scaled by
/// stream order.
fn riverlines_layer(settings: &Settings) -> Result<GeoLayer> {
    let crs = Crs::from_epsg(settings.riverlines.epsg)?;
    let network = FeatureSet::from_path(&settings.riverlines.file, crs)
        .context("loading river network")?;
    let order_column = settings.riverlines.stream_order_column.as_str();
    let network = network.filter(|f| {
        f.attr_num(order_column).is_some_and(|order| order >= settings.map.min_stream_order)
    });
    let network = network.to_crs(Crs::Wgs84);

    let max_order = network
        .iter()
        .filter_map(|f| f.attr_num(order_column))
        .fold(1.0_f64, f64::max);
    let mut layer = GeoLayer::new();
    for feature in network.iter() {
        let order = feature.attr_num(order_column).unwrap_or(1.0);
        layer.push(
            &feature.geometry,
            PolygonStyle {
                fill_color: settings.map.riverline_colour.clone(),
                color: settings.map.riverline_colour.clone(),
                weight: order / max_order * settings.map.max_riverline_weight,
                fill_opacity: 0.0,
            },
            None,
            None,
        );
    }
    Ok(layer)
}

/// Unit polygons for one layer group, coloured by the unit worst grade.
fn fmu_polygon_layer(
    fmu_wgs: &FeatureSet,
    fmu_names: &[&str],
    worst: &HashMap<String, String>,
    sites: &[SiteState],
    attribute: &str,
    settings: &Settings,
) -> GeoLayer {
    let mut layer = GeoLayer::new();
    for &name in fmu_names {
        let shapes = fmu_wgs.filter_attr_isin(&settings.fmu.name_column, &[name]);
        let grade = worst.get(name);
        let colour = grade
            .map(|g| settings.grade_scale.colour(g).to_string())
            .unwrap_or_else(|| settings.map.fmu_fill_color.clone());
        let opacity = settings
            .opacity_column
            .as_ref()
            .and_then(|_| {
                sites
                    .iter()
                    .filter(|s| s.fmu == name)
                    .filter_map(|s| s.opacity)
                    .fold(None, |acc: Option<f64>, o| Some(acc.map_or(o, |a| a.max(o))))
            })
            .unwrap_or(settings.map.fill_opacity);

        // Grade-distribution donut over the unit's sites.
        let counts: Vec<(String, usize)> = {
            let mut counts: Vec<(String, usize)> = Vec::new();
            for site in sites.iter().filter(|s| s.fmu == name && s.grade != "No Data") {
                match counts.iter_mut().find(|(g, _)| *g == site.grade) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((site.grade.clone(), 1)),
                }
            }
            counts
        };
        let popup = if counts.is_empty() {
            Popup::text("<p>No data available</p>")
        } else {
            let donut = grade_donut(
                &counts,
                &format!("{name} - {attribute}"),
                &settings.grade_scale.colour_map(),
            );
            Popup::chart(donut.to_inline_html("donut"), 500, 500)
        };

        for feature in shapes.iter() {
            layer.push(
                &feature.geometry,
                PolygonStyle {
                    fill_color: colour.clone(),
                    color: settings.map.linecolor.clone(),
                    weight: settings.map.lineweight,
                    fill_opacity: opacity,
                },
                Some(format!("FMU : {name}")),
                Some(popup.clone()),
            );
        }
    }
    layer
}

/// Site circle markers for one layer group.
fn site_markers(
    sites: &[SiteState],
    fmu_names: &[&str],
    attribute: &str,
    settings: &Settings,
) -> Vec<CircleMarker> {
    sites
        .iter()
        .filter(|s| fmu_names.contains(&s.fmu.as_str()) && s.grade != "No Data")
        .map(|site| {
            let history =
                grade_history(&site.site, attribute, &site.history, &settings.grade_scale);
            CircleMarker {
                lat: site.lat,
                lon: site.lon,
                radius: 8.0,
                color: "#000000".to_string(),
                weight: 1.0,
                fill_color: settings.grade_scale.colour(&site.grade).to_string(),
                fill_opacity: 0.9,
                tooltip: Some(site.site.clone()),
                popup: Some(Popup::chart(history.to_inline_html("history"), 500, 300)),
            }
        })
        .collect()
}

fn build_attribute_map(
    attribute: &str,
    fmu_wgs: &FeatureSet,
    sites: &[SiteState],
    riverlines: Option<&GeoLayer>,
    settings: &Settings,
) -> LeafletMap {
    let centre = fmu_wgs.mean_centroid().map(|p| (p.y(), p.x())).unwrap_or((-40.0, 175.5));
    let mut map = LeafletMap::new(centre, settings.map.zoom_start, &settings.map.tile_layer);

    let worst = fmu_worst_grades(sites, &settings.grade_scale);
    let mut fmu_names: Vec<String> = fmu_wgs
        .iter()
        .filter_map(|f| f.attr_display(&settings.fmu.name_column))
        .collect();
    fmu_names.sort();
    fmu_names.dedup();
    let all_names: Vec<&str> = fmu_names.iter().map(String::as_str).collect();

    // Region overview first, then one radio group per unit.
    let mut region = LayerGroup::new("Region", true, true);
    if let Some(riverlines) = riverlines {
        region.add_geojson(riverlines.clone());
    }
    region.add_geojson(fmu_polygon_layer(fmu_wgs, &all_names, &worst, sites, attribute, settings));
    for marker in site_markers(sites, &all_names, attribute, settings) {
        region.add_circle_marker(marker);
    }
    map.add_group(region);

    for &name in &all_names {
        let mut group = LayerGroup::new(name, true, false);
        group.add_geojson(fmu_polygon_layer(
            fmu_wgs,
            &[name],
            &worst,
            sites,
            attribute,
            settings,
        ));
        for marker in site_markers(sites, &[name], attribute, settings) {
            group.add_circle_marker(marker);
        }
        map.add_group(group);
    }

    let legend_entries: Vec<(String, String)> = settings
        .grade_scale
        .all_labels()
        .iter()
        .map(|label| (label.to_string(), settings.grade_scale.colour(label).to_string()))
        .collect();
    map.set_legend(draggable_legend(attribute, &legend_entries, settings.map.fill_opacity));
    map.layer_control(false);
    map.add_css(".leaflet-control-layers-list { font-size:18px; }");
    map.add_css("path.leaflet-interactive:focus { outline: none; }");
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

    let table = load_state_table(&settings)?;
    info!(rows = table.len(), "river state records after filtering");

    let fmu_crs = Crs::from_epsg(settings.fmu.epsg)?;
    let fmu_layer =
        FeatureSet::from_path(&settings.fmu.file, fmu_crs).context("loading management units")?;
    let coords = site_coordinates(&table, &settings)?;
    let fmu_of = assign_site_fmus(&coords, &fmu_layer, &settings)?;
    info!(sites = coords.len(), assigned = fmu_of.len(), "nearest-unit join");

    let fmu_wgs = fmu_layer.to_crs(Crs::Wgs84).simplify(settings.map.fmu_simplify_tolerance);
    let riverlines =
        if settings.plot_riverlines { Some(riverlines_layer(&settings)?) } else { None };

    std::fs::create_dir_all(&settings.out_dir)?;
    for (attribute, column) in &settings.attribute_columns {
        let sites = collect_site_states(&table, &coords, &fmu_of, column, &settings)?;
        let map =
            build_attribute_map(attribute, &fmu_wgs, &sites, riverlines.as_ref(), &settings);
        let out = settings.out_dir.join(output_file_name(attribute));
        map.save(&out)?;
        info!(path = %out.display(), "wrote state map");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_file_names_drop_hostile_characters() {
        assert_eq!(output_file_name("E. coli"), "E coli.html");
        assert_eq!(output_file_name("NO3-N: toxicity"), "NO3-N  toxicity.html");
        assert_eq!(output_file_name("Clarity > 1.6m"), "Clarity   16m.html");
    }

    #[test]
    fn worst_grades_aggregate_per_unit() {
        let sites = vec![
            SiteState {
                site: "a".into(),
                lat: 0.0,
                lon: 0.0,
                fmu: "Coast".into(),
                grade: "B".into(),
                opacity: None,
                history: Vec::new(),
            },
            SiteState {
                site: "b".into(),
                lat: 0.0,
                lon: 0.0,
                fmu: "Coast".into(),
                grade: "D".into(),
                opacity: None,
                history: Vec::new(),
            },
            SiteState {
                site: "c".into(),
                lat: 0.0,
                lon: 0.0,
                fmu: "Hills".into(),
                grade: "No Data".into(),
                opacity: None,
                history: Vec::new(),
            },
        ];
        let worst = fmu_worst_grades(&sites, &nof_scale());
        assert_eq!(worst.get("Coast").map(String::as_str), Some("D"));
        // An all-No-Data unit has no worst grade.
        assert!(!worst.contains_key("Hills"));
    }
}
