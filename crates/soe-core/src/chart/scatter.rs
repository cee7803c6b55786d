//! Scatter-style figures: multi-year trend charts, per-site grade
//! histories, and the site × parameter grade grid.

use serde_json::json;

use crate::chart::{Figure, Guideline, SYMBOL_CYCLE};
use crate::grade::GradeScale;

/// One site's annual values for the trend scatter.
#[derive(Debug, Clone)]
pub struct TrendSeries {
    pub name: String,
    pub years: Vec<f64>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct TrendScatterOptions {
    pub y_title: String,
    pub marker_size: u32,
    pub guideline: Option<Guideline>,
}

impl Default for TrendScatterOptions {
    fn default() -> Self {
        TrendScatterOptions { y_title: String::new(), marker_size: 15, guideline: None }
    }
}

/// Value-by-year scatter, one colour/symbol per site, y axis from zero.
pub fn trend_scatter(series: &[TrendSeries], options: &TrendScatterOptions) -> Figure {
    let mut fig = Figure::new();
    for (i, s) in series.iter().enumerate() {
        fig.add_trace(json!({
            "type": "scatter",
            "mode": "markers",
            "name": s.name,
            "x": s.years,
            "y": s.values,
            "marker": {
                "size": options.marker_size,
                "symbol": SYMBOL_CYCLE[i % SYMBOL_CYCLE.len()],
            },
        }));
    }

    let max_value = series
        .iter()
        .flat_map(|s| s.values.iter().copied())
        .fold(0.0_f64, f64::max);
    fig.merge_layout(json!({
        "plot_bgcolor": "#ededed",
        "xaxis": {"title": {"text": "Year"}, "gridcolor": "white"},
        "yaxis": {
            "title": {"text": options.y_title},
            "gridcolor": "white",
            "range": [0.0, 1.025 * max_value],
        },
    }));

    if let Some(guide) = &options.guideline {
        let x_min = series.iter().flat_map(|s| s.years.iter().copied()).fold(f64::INFINITY, f64::min);
        let x_max =
            series.iter().flat_map(|s| s.years.iter().copied()).fold(f64::NEG_INFINITY, f64::max);
        fig.merge_layout(json!({
            "shapes": [{
                "type": "line",
                "x0": x_min, "x1": x_max,
                "y0": guide.y, "y1": guide.y,
                "line": {"color": guide.colour, "width": guide.width},
            }],
            "annotations": [{
                "x": x_max, "y": guide.y - 0.5,
                "text": guide.label,
                "showarrow": false,
                "font": {"color": "black", "size": 12},
                "align": "center",
            }],
        }));
    }
    fig
}

/// Grade history of one site across state periods, one marker per
/// period, coloured and labelled by grade. Rendered inside the site's
/// map popup.
pub fn grade_history(
    site_label: &str,
    topic: &str,
    periods: &[(String, String)],
    scale: &GradeScale,
) -> Figure {
    let mut fig = Figure::new();
    for grade in scale.all_labels() {
        let xs: Vec<&str> = periods
            .iter()
            .filter(|(_, g)| g == grade)
            .map(|(period, _)| period.as_str())
            .collect();
        if xs.is_empty() {
            continue;
        }
        let ys = vec![site_label; xs.len()];
        let texts = vec![grade; xs.len()];
        fig.add_trace(json!({
            "type": "scatter",
            "mode": "markers+text",
            "name": grade,
            "x": xs,
            "y": ys,
            "text": texts,
            "textposition": "top center",
            "marker": {"size": 20, "color": scale.colour(grade)},
        }));
    }

    fig.merge_layout(json!({
        "title": {"text": format!("{site_label} - {topic}")},
        "yaxis": {"visible": false, "showticklabels": false},
        "xaxis": {
            "visible": true,
            "showticklabels": true,
            "tickangle": 45,
            "title": {"text": ""},
            "categoryorder": "category ascending",
        },
        "legend": {"title": {"text": "Grade"}},
    }));
    fig
}

/// One cell of the site × parameter grade grid.
#[derive(Debug, Clone)]
pub struct HeatmapCell {
    pub site: String,
    pub parameter: String,
    pub category: String,
}

/// Fill and outline colour for one category of the grade grid.
#[derive(Debug, Clone)]
pub struct HeatmapStyle {
    pub category: String,
    pub fill: String,
    pub outline: String,
}

/// Site × parameter marker grid: every site-parameter pair gets a disc
/// coloured by its category (interim results show as outline-only).
pub fn grade_heatmap(cells: &[HeatmapCell], styles: &[HeatmapStyle]) -> Figure {
    let mut fig = Figure::new();
    for style in styles {
        let subset: Vec<&HeatmapCell> =
            cells.iter().filter(|c| c.category == style.category).collect();
        if subset.is_empty() {
            continue;
        }
        fig.add_trace(json!({
            "type": "scatter",
            "mode": "markers",
            "name": style.category,
            "x": subset.iter().map(|c| c.parameter.as_str()).collect::<Vec<_>>(),
            "y": subset.iter().map(|c| c.site.as_str()).collect::<Vec<_>>(),
            "marker": {
                "size": 25,
                "color": style.fill,
                "line": {"color": style.outline, "width": 5},
            },
        }));
    }

    let mut sites: Vec<&str> = cells.iter().map(|c| c.site.as_str()).collect();
    sites.sort_unstable();
    sites.dedup();

    fig.merge_layout(json!({
        "height": 580,
        "width": 850,
        "plot_bgcolor": "white",
        "xaxis": {"title": {"text": ""}, "tickangle": 90},
        "yaxis": {
            "title": {"text": ""},
            "categoryorder": "array",
            "categoryarray": sites,
        },
        "legend": {
            "title": {"text": ""},
            "yanchor": "top", "y": 1.0,
            "xanchor": "left", "x": 1.05,
            "itemsizing": "constant",
            "itemwidth": 40,
            "valign": "middle",
        },
    }));
    fig
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trend_scatter_ranges_y_from_zero() {
        let series = vec![TrendSeries {
            name: "Town centre".to_string(),
            years: vec![2019.0, 2020.0],
            values: vec![8.0, 12.0],
        }];
        let fig = trend_scatter(&series, &TrendScatterOptions::default());
        let range = &fig.layout()["yaxis"]["range"];
        assert_eq!(range[0], 0.0);
        assert!((range[1].as_f64().unwrap() - 12.3).abs() < 1e-9);
    }

    #[test]
    fn guideline_adds_shape_and_annotation() {
        let series = vec![TrendSeries {
            name: "s".to_string(),
            years: vec![2019.0, 2023.0],
            values: vec![5.0],
        }];
        let options = TrendScatterOptions {
            guideline: Some(Guideline {
                y: 10.0,
                label: "National Limit".to_string(),
                colour: "red".to_string(),
                width: 4.0,
            }),
            ..TrendScatterOptions::default()
        };
        let fig = trend_scatter(&series, &options);
        assert_eq!(fig.layout()["shapes"][0]["y0"], 10.0);
        assert_eq!(fig.layout()["annotations"][0]["text"], "National Limit");
    }

    #[test]
    fn grade_history_groups_periods_by_grade() {
        let scale = GradeScale::traffic_light();
        let periods = vec![
            ("2014 - 2018".to_string(), "Amber".to_string()),
            ("2019 - 2023".to_string(), "Green".to_string()),
            ("2009 - 2013".to_string(), "Amber".to_string()),
        ];
        let fig = grade_history("Oroua at Bridge", "MCI", &periods, &scale);
        // One trace per grade present.
        assert_eq!(fig.data().len(), 2);
        let amber = &fig.data()[1];
        assert_eq!(amber["name"], "Amber");
        assert_eq!(amber["x"].as_array().unwrap().len(), 2);
        assert_eq!(amber["marker"]["color"], "#ed7d31");
    }

    #[test]
    fn heatmap_skips_absent_categories_and_orders_sites() {
        let cells = vec![
            HeatmapCell {
                site: "B site".into(),
                parameter: "DRP".into(),
                category: "PASS (Final)".into(),
            },
            HeatmapCell {
                site: "A site".into(),
                parameter: "DRP".into(),
                category: "PASS (Final)".into(),
            },
        ];
        let styles = vec![
            HeatmapStyle {
                category: "PASS (Final)".into(),
                fill: "#98c785".into(),
                outline: "#98c785".into(),
            },
            HeatmapStyle {
                category: "FAIL (Final)".into(),
                fill: "#ff7f7f".into(),
                outline: "#ff7f7f".into(),
            },
        ];
        let fig = grade_heatmap(&cells, &styles);
        assert_eq!(fig.data().len(), 1);
        assert_eq!(fig.layout()["yaxis"]["categoryarray"][0], "A site");
    }
}
