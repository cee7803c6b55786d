//! Five-year NO₂ trend figures for the air quality chapter.
//!
//! Reads one CSV per monitored year plus the site metadata sheet, joins
//! the display names, and writes two HTML figures: a per-site scatter of
//! annual means against the national limit, and a faceted bar chart per
//! site against the WHO guideline.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::info;

use soe_core::chart::bar::{faceted_bar, BarFacet, FacetedBarOptions};
use soe_core::chart::scatter::{trend_scatter, TrendScatterOptions, TrendSeries};
use soe_core::chart::{Guideline, BAR_PALETTE};
use soe_core::config::load_settings_or_default;
use soe_core::table::{Cell, Table};

#[derive(Parser, Debug)]
#[command(name = "air-quality", about = "Five-year NO2 air quality trend figures")]
struct Args {
    /// Optional JSON settings file overriding the defaults.
    #[arg(short, long)]
    settings: Option<PathBuf>,
}

/// One monitored year: the exported CSV and its column names.
#[derive(Debug, Clone, Deserialize)]
struct YearSheet {
    file: PathBuf,
    site_id_column: String,
    mean_column: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct MetadataSheet {
    file: PathBuf,
    site_id_column: String,
    site_name_column: String,
    site_area_column: String,
}

impl Default for MetadataSheet {
    fn default() -> Self {
        MetadataSheet {
            file: "data/air_quality/site_metadata.csv".into(),
            site_id_column: "site_id".to_string(),
            site_name_column: "site_name".to_string(),
            site_area_column: "airshed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct Settings {
    /// Year label → exported annual summary.
    data: BTreeMap<String, YearSheet>,
    /// Site ids monitored across the whole window.
    monitored_site_ids: Vec<String>,
    metadata: MetadataSheet,
    /// National annual NO₂ limit, µg/m³.
    national_limit: f64,
    y_axis_title: String,
    scatter_output: PathBuf,
    bar_output: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        let data = (2019..=2023)
            .map(|year| {
                (
                    year.to_string(),
                    YearSheet {
                        file: format!("data/air_quality/no2_annual_{year}.csv").into(),
                        site_id_column: "site_id".to_string(),
                        mean_column: "annual_mean".to_string(),
                    },
                )
            })
            .collect();
        Settings {
            data,
            monitored_site_ids: Vec::new(),
            metadata: MetadataSheet::default(),
            national_limit: 10.0,
            y_axis_title: "Nitrogen dioxide annual average concentration  (µg/m3)".to_string(),
            scatter_output: "results/air_quality/no2_trend_scatter.html".into(),
            bar_output: "results/air_quality/no2_air_quality_results.html".into(),
        }
    }
}

/// Stack the per-year sheets into one long (year, site, value) table.
fn load_annual_series(settings: &Settings) -> Result<Table> {
    let site_ids: Vec<&str> = settings.monitored_site_ids.iter().map(String::as_str).collect();
    let mut data = Table::new(vec!["year".to_string(), "site".to_string(), "value".to_string()]);

    for (year, sheet) in &settings.data {
        let sheet_data = Table::from_csv_path(&sheet.file)
            .with_context(|| format!("loading {} data", year))?;
        let sheet_data = if site_ids.is_empty() {
            sheet_data
        } else {
            sheet_data.filter_isin(&sheet.site_id_column, &site_ids)?
        };
        for row in sheet_data.iter() {
            data.push_row(vec![
                Cell::parse(year),
                row.cell(&sheet.site_id_column).cloned().unwrap_or(Cell::Null),
                row.cell(&sheet.mean_column).cloned().unwrap_or(Cell::Null),
            ])?;
        }
    }
    Ok(data)
}

/// Site id → "area <br> <b>site name</b>" display label.
fn site_name_map(settings: &Settings) -> Result<HashMap<String, String>> {
    let meta = &settings.metadata;
    let table = Table::from_csv_path(&meta.file).context("loading site metadata")?;
    let site_ids: Vec<&str> = settings.monitored_site_ids.iter().map(String::as_str).collect();
    let table =
        if site_ids.is_empty() { table } else { table.filter_isin(&meta.site_id_column, &site_ids)? };

    let mut map = HashMap::new();
    for row in table.iter() {
        let (Some(id), Some(name), Some(area)) = (
            row.display(&meta.site_id_column),
            row.display(&meta.site_name_column),
            row.display(&meta.site_area_column),
        ) else {
            continue;
        };
        map.insert(id, format!("{area} <br> <b>{name}</b>"));
    }
    Ok(map)
}

/// Per-site series in site-name order.
fn collect_series(data: &Table) -> Result<Vec<TrendSeries>> {
    let mut names = data.unique("site name")?;
    names.sort();
    let mut series = Vec::new();
    for name in names {
        let rows = data.filter_isin("site name", &[name.as_str()])?;
        let mut years = Vec::new();
        let mut values = Vec::new();
        for row in rows.iter() {
            if let (Some(year), Some(value)) = (row.num("year"), row.num("value")) {
                years.push(year);
                values.push(value);
            }
        }
        series.push(TrendSeries { name, years, values });
    }
    Ok(series)
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

    let mut data = load_annual_series(&settings)?;
    let names = site_name_map(&settings)?;
    data.map_column("site", "site name", &names)?;

    let series = collect_series(&data)?;

    // Scatter of annual means with the national limit line.
    let scatter = trend_scatter(
        &series,
        &TrendScatterOptions {
            y_title: "Value".to_string(),
            guideline: Some(Guideline {
                y: settings.national_limit,
                label: "National Limit".to_string(),
                colour: "red".to_string(),
                width: 4.0,
            }),
            ..TrendScatterOptions::default()
        },
    );
    if let Some(parent) = settings.scatter_output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    scatter.write_html(&settings.scatter_output)?;
    info!(path = %settings.scatter_output.display(), "wrote trend scatter");

    // Faceted bars with the WHO guideline drawn in white across the facets.
    let facets: Vec<BarFacet> = series
        .iter()
        .enumerate()
        .map(|(i, s)| BarFacet {
            title: s.name.clone(),
            x: s.years.iter().map(|y| format!("{y:.0}")).collect(),
            y: s.values.clone(),
            colour: BAR_PALETTE[i % BAR_PALETTE.len()].to_string(),
        })
        .collect();
    let bars = faceted_bar(
        &facets,
        &FacetedBarOptions {
            y_title: settings.y_axis_title.clone(),
            guideline: Some(Guideline {
                y: settings.national_limit,
                label: "WHO air quality guideline  ".to_string(),
                colour: "white".to_string(),
                width: 5.0,
            }),
            ..FacetedBarOptions::default()
        },
    );
    if let Some(parent) = settings.bar_output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    bars.write_html(&settings.bar_output)?;
    info!(path = %settings.bar_output.display(), "wrote faceted bars");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_are_grouped_per_display_name() {
        let csv = "\
year,site,value,site name
2019,ns01,8.0,Town <br> <b>Main St</b>
2020,ns01,9.0,Town <br> <b>Main St</b>
2019,ns02,4.0,Rural <br> <b>School</b>
";
        let data = Table::from_csv_reader(csv.as_bytes()).unwrap();
        let series = collect_series(&data).unwrap();
        assert_eq!(series.len(), 2);
        // Sorted by name: Rural first.
        assert_eq!(series[0].values, vec![4.0]);
        assert_eq!(series[1].years, vec![2019.0, 2020.0]);
    }

    #[test]
    fn default_settings_cover_five_years() {
        let settings = Settings::default();
        assert_eq!(settings.data.len(), 5);
        assert_eq!(settings.national_limit, 10.0);
    }
}
