//! Bar figures: per-site facet panels, horizontal stacked percentage
//! bars, and plain grouped bars.

use serde_json::json;

use crate::chart::{Figure, Guideline};

/// One facet panel of the faceted bar chart.
#[derive(Debug, Clone)]
pub struct BarFacet {
    pub title: String,
    pub x: Vec<String>,
    pub y: Vec<f64>,
    pub colour: String,
}

#[derive(Debug, Clone)]
pub struct FacetedBarOptions {
    pub y_title: String,
    pub width: u32,
    pub height: u32,
    pub font_size: u32,
    pub guideline: Option<Guideline>,
}

impl Default for FacetedBarOptions {
    fn default() -> Self {
        FacetedBarOptions {
            y_title: String::new(),
            width: 1500,
            height: 800,
            font_size: 14,
            guideline: None,
        }
    }
}

/// One bar panel per site sharing the y axis, site name as the panel
/// title, optional guideline drawn across the whole figure.
pub fn faceted_bar(facets: &[BarFacet], options: &FacetedBarOptions) -> Figure {
    let mut fig = Figure::new();
    let n = facets.len().max(1);

    for (i, facet) in facets.iter().enumerate() {
        let xaxis = axis_name("x", i);
        fig.add_trace(json!({
            "type": "bar",
            "x": facet.x,
            "y": facet.y,
            "marker": {"color": facet.colour},
            "xaxis": xaxis,
            "showlegend": false,
        }));
    }

    let annotations: Vec<serde_json::Value> = facets
        .iter()
        .enumerate()
        .map(|(i, facet)| {
            json!({
                "text": facet.title,
                "xref": format!("{} domain", axis_name("x", i)),
                "x": 0.5,
                "yref": "paper",
                "y": 1.0,
                "yanchor": "bottom",
                "showarrow": false,
            })
        })
        .collect();

    fig.merge_layout(json!({
        "grid": {"rows": 1, "columns": n, "pattern": "coupled"},
        "bargap": 0,
        "showlegend": false,
        "font": {"size": options.font_size},
        "autosize": false,
        "width": options.width,
        "height": options.height,
        "xaxis": {"title": {"text": ""}},
        "yaxis": {"title": {"text": options.y_title}},
        "annotations": annotations,
    }));

    if let Some(guide) = &options.guideline {
        fig.merge_layout(json!({
            "shapes": [{
                "type": "line",
                "xref": "paper", "x0": 0, "x1": 1,
                "yref": "y", "y0": guide.y, "y1": guide.y,
                "line": {"color": guide.colour, "width": guide.width},
            }],
        }));
        // The guideline label sits under the line at the right edge.
        let mut annotations = fig.layout()["annotations"].as_array().cloned().unwrap_or_default();
        annotations.push(json!({
            "text": guide.label,
            "xref": "paper", "x": 1.0, "xanchor": "right",
            "yref": "y", "y": guide.y, "yanchor": "top",
            "showarrow": false,
            "font": {"color": guide.colour},
        }));
        fig.merge_layout(json!({"annotations": annotations}));
    }
    fig
}

fn axis_name(prefix: &str, index: usize) -> String {
    if index == 0 {
        prefix.to_string()
    } else {
        format!("{prefix}{}", index + 1)
    }
}

/// One stacked series of the horizontal percentage bars.
#[derive(Debug, Clone)]
pub struct StackedSeries {
    pub name: String,
    pub colour: String,
    /// One value per site, same order as the site list.
    pub values: Vec<f64>,
}

/// Horizontal stacked percentage bars, one row per site — the
/// swimmability panel embedded in each management-unit popup.
pub fn stacked_percentage_bar(
    sites: &[String],
    series: &[StackedSeries],
    title: &str,
    height: u32,
) -> Figure {
    let mut fig = Figure::new();
    for s in series {
        fig.add_trace(json!({
            "type": "bar",
            "orientation": "h",
            "name": s.name,
            "y": sites,
            "x": s.values,
            "marker": {"color": s.colour},
        }));
    }

    let tickvals: Vec<f64> = (0..=10).map(|i| f64::from(i) * 10.0).collect();
    fig.merge_layout(json!({
        "barmode": "stack",
        "title": {"text": title},
        "width": 1000,
        "height": height,
        "bargap": 0.55,
        "plot_bgcolor": "rgba(0,0,0,0)",
        "legend": {"title": {"text": ""}},
        "xaxis": {
            "title": {"text": "<br><br><br> "},
            "tickvals": tickvals,
            "ticksuffix": "%",
            "ticks": "outside",
            "mirror": true,
            "showline": true,
            "linecolor": "#BCCCDC",
            "gridcolor": "#F1F1F1",
        },
        "yaxis": {
            "tickangle": 0,
            "title": {"text": "<br><br><br> "},
            "ticks": "outside",
            "mirror": true,
            "showline": true,
            "linecolor": "#BCCCDC",
        },
    }));
    fig
}

/// One coloured series of a plain bar chart.
#[derive(Debug, Clone)]
pub struct BarSeries {
    pub name: String,
    pub colour: Option<String>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct GroupedBarOptions {
    pub title: String,
    pub y_title: String,
    /// "group" or "relative", as in the underlying bar mode.
    pub barmode: String,
}

impl Default for GroupedBarOptions {
    fn default() -> Self {
        GroupedBarOptions {
            title: String::new(),
            y_title: String::new(),
            barmode: "relative".to_string(),
        }
    }
}

/// Bars per group with one trace per series — counts and areas by
/// management unit.
pub fn grouped_bar(
    groups: &[String],
    series: &[BarSeries],
    options: &GroupedBarOptions,
) -> Figure {
    let mut fig = Figure::new();
    for s in series {
        let mut trace = json!({
            "type": "bar",
            "name": s.name,
            "x": groups,
            "y": s.values,
        });
        if let Some(colour) = &s.colour {
            trace["marker"] = json!({"color": colour});
        }
        fig.add_trace(trace);
    }
    fig.merge_layout(json!({
        "barmode": options.barmode,
        "title": {"text": options.title},
        "plot_bgcolor": "#ededed",
        "xaxis": {"title": {"text": ""}, "gridcolor": "white"},
        "yaxis": {"title": {"text": options.y_title}, "gridcolor": "white"},
    }));
    fig
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facets_get_their_own_x_axes_and_titles() {
        let facets = vec![
            BarFacet {
                title: "Site A".into(),
                x: vec!["2019".into(), "2020".into()],
                y: vec![8.0, 9.0],
                colour: "#273747".into(),
            },
            BarFacet {
                title: "Site B".into(),
                x: vec!["2019".into()],
                y: vec![6.0],
                colour: "#000000".into(),
            },
        ];
        let fig = faceted_bar(&facets, &FacetedBarOptions::default());
        assert_eq!(fig.data()[0]["xaxis"], "x");
        assert_eq!(fig.data()[1]["xaxis"], "x2");
        assert_eq!(fig.layout()["grid"]["columns"], 2);
        assert_eq!(fig.layout()["annotations"][1]["text"], "Site B");
    }

    #[test]
    fn guideline_annotation_lands_after_facet_titles() {
        let facets = vec![BarFacet {
            title: "Site A".into(),
            x: vec!["2019".into()],
            y: vec![8.0],
            colour: "#273747".into(),
        }];
        let options = FacetedBarOptions {
            guideline: Some(Guideline {
                y: 10.0,
                label: "WHO air quality guideline  ".into(),
                colour: "white".into(),
                width: 5.0,
            }),
            ..FacetedBarOptions::default()
        };
        let fig = faceted_bar(&facets, &options);
        let annotations = fig.layout()["annotations"].as_array().unwrap();
        assert_eq!(annotations.len(), 2);
        assert_eq!(fig.layout()["shapes"][0]["line"]["width"], 5.0);
    }

    #[test]
    fn stacked_bars_use_percentage_ticks() {
        let sites = vec!["A".to_string(), "B".to_string()];
        let series = vec![
            StackedSeries { name: "Green".into(), colour: "#70ad47".into(), values: vec![60.0, 80.0] },
            StackedSeries { name: "Red".into(), colour: "#ff0000".into(), values: vec![40.0, 20.0] },
        ];
        let fig = stacked_percentage_bar(&sites, &series, "Coast swimmability", 500);
        assert_eq!(fig.data().len(), 2);
        assert_eq!(fig.data()[0]["orientation"], "h");
        assert_eq!(fig.layout()["xaxis"]["ticksuffix"], "%");
        assert_eq!(fig.layout()["barmode"], "stack");
    }

    #[test]
    fn grouped_bar_without_colour_leaves_marker_unset() {
        let fig = grouped_bar(
            &["Coast".to_string()],
            &[BarSeries { name: "Managed".into(), colour: None, values: vec![12.0] }],
            &GroupedBarOptions::default(),
        );
        assert!(fig.data()[0].get("marker").is_none());
    }
}
