//! Regulatory plan compliance summary figures.
//!
//! From the state sheet: pass/fail donut grids and the site × parameter
//! grade grid, per parameter group. From the trends sheet: the
//! trend-confidence percentage table per trend period. Impact sites
//! (downstream of discharges) are excluded throughout.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::info;

use soe_core::chart::donut::{donut_grid, DonutFacet, DonutGridOptions};
use soe_core::chart::scatter::{grade_heatmap, HeatmapCell, HeatmapStyle};
use soe_core::chart::trend_table::{confidence_table, ConfidenceStyle};
use soe_core::config::load_settings_or_default;
use soe_core::grade::percentage_pivot;
use soe_core::table::{Cell, Table};

#[derive(Parser, Debug)]
#[command(name = "plan-summary", about = "Plan compliance summary figures")]
struct Args {
    /// Optional JSON settings file overriding the defaults.
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Skip the state donut/heatmap figures.
    #[arg(long)]
    no_state: bool,

    /// Skip the trend tables.
    #[arg(long)]
    no_trends: bool,

    /// Skip the grade heatmaps (donut grids still render).
    #[arg(long)]
    no_heatmap: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct StateSettings {
    file: PathBuf,
    site_column: String,
    end_year_column: String,
    end_year: f64,
    pass_fail_column: String,
    number_ok_column: String,
    number_ok: Vec<String>,
    site_type_column: String,
    site_type: Vec<String>,
    parameter_column: String,
    /// Parameter groups, one donut grid + heatmap per group.
    parameter_groups: Vec<Vec<String>>,
}

impl Default for StateSettings {
    fn default() -> Self {
        StateSettings {
            file: "data/surface_water/plan_state.csv".into(),
            site_column: "sID".to_string(),
            end_year_column: "EndYear".to_string(),
            end_year: 2022.0,
            pass_fail_column: "Grade".to_string(),
            number_ok_column: "nOK".to_string(),
            number_ok: vec!["Final".to_string(), "Interim".to_string()],
            site_type_column: "Type".to_string(),
            site_type: vec!["River".to_string()],
            parameter_column: "PrettyStandard".to_string(),
            parameter_groups: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct TrendSettings {
    file: PathBuf,
    end_year_column: String,
    end_year: f64,
    site_type_column: String,
    site_type: Vec<String>,
    parameter_column: String,
    parameters: Vec<String>,
    trend_dir_column: String,
    trend_dir_ok: Vec<String>,
    period_column: String,
    periods: Vec<f64>,
    confidence_column: String,
}

impl Default for TrendSettings {
    fn default() -> Self {
        TrendSettings {
            file: "data/surface_water/plan_trends.csv".into(),
            end_year_column: "EndYear".to_string(),
            end_year: 2022.0,
            site_type_column: "Type".to_string(),
            site_type: vec!["River".to_string()],
            parameter_column: "npID".to_string(),
            parameters: Vec::new(),
            trend_dir_column: "TrendDirection".to_string(),
            trend_dir_ok: vec![
                "Decreasing".to_string(),
                "Increasing".to_string(),
                "Indeterminate".to_string(),
            ],
            period_column: "Period".to_string(),
            periods: vec![10.0, 20.0],
            confidence_column: "SimpleConfidence".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ConfidenceConfig {
    category: String,
    symbol: String,
    colour: String,
    pad: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct Settings {
    state: StateSettings,
    trends: TrendSettings,
    /// Raw parameter id → display name (may carry HTML markup).
    parameter_name_map: BTreeMap<String, String>,
    impact_sites: Vec<String>,
    confidences: Vec<ConfidenceConfig>,
    out_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            state: StateSettings::default(),
            trends: TrendSettings::default(),
            parameter_name_map: BTreeMap::from([
                ("DRP".to_string(), "Dissolved Reactive Phosphorus".to_string()),
                ("SIN".to_string(), "Soluble Inorganic Nitrogen".to_string()),
                ("NH4-N".to_string(), "Ammoniacal Nitrogen".to_string()),
                ("ECOLI".to_string(), "<i>E. coli</i>".to_string()),
                ("Clarity".to_string(), "Visual Clarity".to_string()),
                ("MCI".to_string(), "Macroinvertebrate Community Index".to_string()),
            ]),
            impact_sites: Vec::new(),
            confidences: vec![
                ConfidenceConfig {
                    category: "Very Likely Improving".to_string(),
                    symbol: "↑".to_string(),
                    colour: "#a8caea".to_string(),
                    pad: 4,
                },
                ConfidenceConfig {
                    category: "Likely Improving".to_string(),
                    symbol: "↗".to_string(),
                    colour: "#c4dfb9".to_string(),
                    pad: 3,
                },
                ConfidenceConfig {
                    category: "Low Confidence".to_string(),
                    symbol: "→".to_string(),
                    colour: "#ffd966".to_string(),
                    pad: 2,
                },
                ConfidenceConfig {
                    category: "Likely Degrading".to_string(),
                    symbol: "↘".to_string(),
                    colour: "#f6b26b".to_string(),
                    pad: 2,
                },
                ConfidenceConfig {
                    category: "Very Likely Degrading".to_string(),
                    symbol: "↓".to_string(),
                    colour: "#ff7f7f".to_string(),
                    pad: 4,
                },
                ConfidenceConfig {
                    category: "Not Analysed".to_string(),
                    symbol: "●".to_string(),
                    colour: "#bcbcbc".to_string(),
                    pad: 2,
                },
            ],
            out_dir: "results/one_plan_summary".into(),
        }
    }
}

/// Category column combining pass/fail with final/interim, e.g.
/// "PASS (Final)".
const CATEGORY_COLUMN: &str = "pass_fail_interim_final";

fn category_colours() -> HashMap<String, String> {
    HashMap::from([
        ("PASS (Final)".to_string(), "#c4dfb9".to_string()),
        ("FAIL (Final)".to_string(), "#ff7f7f".to_string()),
        ("PASS (Interim)".to_string(), "#c4dfb9".to_string()),
        ("FAIL (Interim)".to_string(), "#ff7f7f".to_string()),
    ])
}

fn category_patterns() -> HashMap<String, String> {
    HashMap::from([
        ("PASS (Interim)".to_string(), ".".to_string()),
        ("FAIL (Interim)".to_string(), ".".to_string()),
    ])
}

fn heatmap_styles() -> Vec<HeatmapStyle> {
    vec![
        HeatmapStyle { category: "PASS (Final)".into(), fill: "#98c785".into(), outline: "#98c785".into() },
        HeatmapStyle { category: "FAIL (Final)".into(), fill: "#ff7f7f".into(), outline: "#ff7f7f".into() },
        HeatmapStyle { category: "PASS (Interim)".into(), fill: "#e4e4e4".into(), outline: "#98c785".into() },
        HeatmapStyle { category: "FAIL (Interim)".into(), fill: "#e4e4e4".into(), outline: "#ff7f7f".into() },
    ]
}

/// Load the state sheet, run the filter chain and derive the category
/// column.
fn load_state_table(settings: &Settings) -> Result<Table> {
    let state = &settings.state;
    let mut table = Table::from_csv_path(&state.file).context("loading plan state sheet")?;
    table = table.filter_num_eq(&state.end_year_column, state.end_year)?;
    let impact: Vec<&str> = settings.impact_sites.iter().map(String::as_str).collect();
    table = table.filter_not_isin(&state.site_column, &impact)?;
    let site_types: Vec<&str> = state.site_type.iter().map(String::as_str).collect();
    table = table.filter_isin(&state.site_type_column, &site_types)?;
    let all_parameters: Vec<&str> = state
        .parameter_groups
        .iter()
        .flatten()
        .map(String::as_str)
        .collect();
    if !all_parameters.is_empty() {
        table = table.filter_isin(&state.parameter_column, &all_parameters)?;
    }
    let number_ok: Vec<&str> = state.number_ok.iter().map(String::as_str).collect();
    table = table.filter_isin(&state.number_ok_column, &number_ok)?;

    let categories: Vec<Cell> = table
        .iter()
        .map(|row| {
            match (row.display(&state.pass_fail_column), row.display(&state.number_ok_column)) {
                (Some(grade), Some(ok)) => Cell::Str(format!("{grade} ({ok})")),
                _ => Cell::Null,
            }
        })
        .collect();
    table.add_column(CATEGORY_COLUMN, categories)?;
    Ok(table)
}

/// Donut facets for one parameter group, in the group's order.
fn group_donut_facets(
    table: &Table,
    group: &[String],
    settings: &Settings,
) -> Result<Vec<DonutFacet>> {
    let mut facets = Vec::new();
    for parameter in group {
        let rows = table.filter_isin(&settings.state.parameter_column, &[parameter.as_str()])?;
        if rows.is_empty() {
            continue;
        }
        let counts = rows.group_count(CATEGORY_COLUMN)?;
        let title = settings
            .parameter_name_map
            .get(parameter)
            .cloned()
            .unwrap_or_else(|| parameter.clone());
        facets.push(DonutFacet { title, slices: counts });
    }
    Ok(facets)
}

fn state_figures(settings: &Settings, run_heatmap: bool) -> Result<()> {
    let table = load_state_table(settings)?;
    info!(rows = table.len(), "state records after filtering");

    for (group_index, group) in settings.state.parameter_groups.iter().enumerate() {
        let facets = group_donut_facets(&table, group, settings)?;
        if facets.is_empty() {
            continue;
        }
        let height = (300.0 * (group.len() as f64 / 2.0)).ceil() as u32;
        let donuts = donut_grid(
            &facets,
            &DonutGridOptions {
                height: height.max(300),
                width: 675,
                colours: category_colours(),
                patterns: category_patterns(),
            },
        );
        let out = settings.out_dir.join(format!("state_{group_index}.html"));
        donuts.write_html(&out)?;
        info!(path = %out.display(), "wrote donut grid");

        if run_heatmap {
            let group_refs: Vec<&str> = group.iter().map(String::as_str).collect();
            let rows = table.filter_isin(&settings.state.parameter_column, &group_refs)?;
            let mut cells = Vec::new();
            for row in rows.iter() {
                let (Some(site), Some(parameter), Some(category)) = (
                    row.display(&settings.state.site_column),
                    row.display(&settings.state.parameter_column),
                    row.display(CATEGORY_COLUMN),
                ) else {
                    continue;
                };
                let parameter = settings
                    .parameter_name_map
                    .get(&parameter)
                    .cloned()
                    .unwrap_or(parameter);
                cells.push(HeatmapCell { site, parameter, category });
            }
            let heatmap = grade_heatmap(&cells, &heatmap_styles());
            let out = settings.out_dir.join(format!("heatmap_{group_index}.html"));
            heatmap.write_html(&out)?;
            info!(path = %out.display(), "wrote grade heatmap");
        }
    }
    Ok(())
}

fn trend_tables(settings: &Settings) -> Result<()> {
    let trends = &settings.trends;
    let mut table = Table::from_csv_path(&trends.file).context("loading plan trends sheet")?;
    table = table.filter_num_eq(&trends.end_year_column, trends.end_year)?;
    let site_types: Vec<&str> = trends.site_type.iter().map(String::as_str).collect();
    table = table.filter_isin(&trends.site_type_column, &site_types)?;
    if !trends.parameters.is_empty() {
        let parameters: Vec<&str> = trends.parameters.iter().map(String::as_str).collect();
        table = table.filter_isin(&trends.parameter_column, &parameters)?;
    }
    let directions: Vec<&str> = trends.trend_dir_ok.iter().map(String::as_str).collect();
    table = table.filter_isin(&trends.trend_dir_column, &directions)?;
    table = table.filter_num_isin(&trends.period_column, &trends.periods)?;
    info!(rows = table.len(), "trend records after filtering");

    let styles: Vec<ConfidenceStyle> = settings
        .confidences
        .iter()
        .map(|c| ConfidenceStyle::new(&c.category, &c.symbol, &c.colour, c.pad))
        .collect();
    let category_order: Vec<&str> =
        settings.confidences.iter().map(|c| c.category.as_str()).collect();

    for period in &trends.periods {
        let sub = table.filter_num_eq(&trends.period_column, *period)?;
        if sub.is_empty() {
            continue;
        }
        let mut pivot = percentage_pivot(
            &sub,
            &trends.parameter_column,
            &trends.confidence_column,
            &category_order,
        )?;
        // Parameter ids become display names in the left column.
        pivot.index = pivot
            .index
            .iter()
            .map(|id| settings.parameter_name_map.get(id).cloned().unwrap_or_else(|| id.clone()))
            .collect();

        let title = format!("Proportion of trends in each category - {period:.0} year trends");
        let figure = confidence_table(&pivot, &styles, &title);
        let out = settings.out_dir.join(format!("trend_{period:.0}_year.html"));
        figure.write_html(&out)?;
        info!(path = %out.display(), "wrote trend table");
    }
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

    std::fs::create_dir_all(&settings.out_dir)?;
    if !args.no_state {
        state_figures(&settings, !args.no_heatmap)?;
    }
    if !args.no_trends {
        trend_tables(&settings)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_column_combines_grade_and_status() {
        let csv = "\
sID,EndYear,Grade,nOK,Type,PrettyStandard
Site A,2022,PASS,Final,River,DRP
Site B,2022,FAIL,Interim,River,DRP
Site C,2021,PASS,Final,River,DRP
";
        let dir = std::env::temp_dir().join("plan_summary_state_test");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("state.csv");
        std::fs::write(&file, csv).unwrap();

        let mut settings = Settings::default();
        settings.state.file = file;
        settings.state.parameter_groups = vec![vec!["DRP".to_string()]];
        let table = load_state_table(&settings).unwrap();
        // 2021 row filtered out by end year.
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(0).str_value(CATEGORY_COLUMN), Some("PASS (Final)"));
        assert_eq!(table.row(1).str_value(CATEGORY_COLUMN), Some("FAIL (Interim)"));
    }

    #[test]
    fn impact_sites_are_excluded() {
        let csv = "\
sID,EndYear,Grade,nOK,Type,PrettyStandard
Site A,2022,PASS,Final,River,DRP
Oroua at d/s Feilding STP,2022,FAIL,Final,River,DRP
";
        let dir = std::env::temp_dir().join("plan_summary_impact_test");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("state.csv");
        std::fs::write(&file, csv).unwrap();

        let mut settings = Settings::default();
        settings.state.file = file;
        settings.impact_sites = vec!["Oroua at d/s Feilding STP".to_string()];
        let table = load_state_table(&settings).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.row(0).str_value("sID"), Some("Site A"));
    }

    #[test]
    fn donut_facets_follow_group_order_and_name_map() {
        let csv = format!(
            "PrettyStandard,{CATEGORY_COLUMN}\nSIN,PASS (Final)\nDRP,FAIL (Final)\nDRP,PASS (Final)\n"
        );
        let table = Table::from_csv_reader(csv.as_bytes()).unwrap();
        let settings = Settings::default();
        let group = vec!["DRP".to_string(), "SIN".to_string()];
        let facets = group_donut_facets(&table, &group, &settings).unwrap();
        assert_eq!(facets.len(), 2);
        assert_eq!(facets[0].title, "Dissolved Reactive Phosphorus");
        assert_eq!(facets[0].slices.len(), 2);
        assert_eq!(facets[1].title, "Soluble Inorganic Nitrogen");
    }
}
