//! Donut figures: grade distribution for one management unit, and the
//! two-column facet grid of pass/fail donuts.

use std::collections::HashMap;

use serde_json::json;

use crate::chart::Figure;

/// Single donut of grade counts, coloured by the grade colour map.
pub fn grade_donut(
    counts: &[(String, usize)],
    title: &str,
    colours: &HashMap<String, String>,
) -> Figure {
    let labels: Vec<&str> = counts.iter().map(|(label, _)| label.as_str()).collect();
    let values: Vec<usize> = counts.iter().map(|(_, n)| *n).collect();
    let slice_colours: Vec<&str> = labels
        .iter()
        .map(|label| colours.get(*label).map(String::as_str).unwrap_or(crate::grade::DEFAULT_COLOUR))
        .collect();

    let mut fig = Figure::new();
    fig.add_trace(json!({
        "type": "pie",
        "labels": labels,
        "values": values,
        "hole": 0.5,
        "marker": {"colors": slice_colours},
    }));
    fig.merge_layout(json!({
        "title": {"text": title},
        "legend": {"title": {"text": "Grade"}},
    }));
    fig
}

/// One panel of the donut facet grid.
#[derive(Debug, Clone)]
pub struct DonutFacet {
    pub title: String,
    pub slices: Vec<(String, usize)>,
}

#[derive(Debug, Clone)]
pub struct DonutGridOptions {
    pub height: u32,
    pub width: u32,
    /// Category → fill colour.
    pub colours: HashMap<String, String>,
    /// Category → pie pattern shape ("." for interim results, "" for none).
    pub patterns: HashMap<String, String>,
}

/// Two-column grid of donuts, one per parameter, zero-count slices
/// dropped, facet titles placed as annotations between the rows.
pub fn donut_grid(facets: &[DonutFacet], options: &DonutGridOptions) -> Figure {
    const COLUMNS: usize = 2;
    let rows = facets.len().div_ceil(COLUMNS).max(1);

    let mut fig = Figure::new();
    let mut annotations = Vec::new();
    for (i, facet) in facets.iter().enumerate() {
        let row = i / COLUMNS;
        let column = i % COLUMNS;

        let slices: Vec<&(String, usize)> =
            facet.slices.iter().filter(|(_, n)| *n > 0).collect();
        let labels: Vec<&str> = slices.iter().map(|(label, _)| label.as_str()).collect();
        let values: Vec<usize> = slices.iter().map(|(_, n)| *n).collect();
        let colours: Vec<&str> = labels
            .iter()
            .map(|label| {
                options.colours.get(*label).map(String::as_str).unwrap_or("#ffffff")
            })
            .collect();
        let patterns: Vec<&str> = labels
            .iter()
            .map(|label| options.patterns.get(*label).map(String::as_str).unwrap_or(""))
            .collect();

        fig.add_trace(json!({
            "type": "pie",
            "name": facet.title,
            "labels": labels,
            "values": values,
            "hole": 0.5,
            "textinfo": "percent",
            "textposition": "inside",
            "marker": {"colors": colours, "pattern": {"shape": patterns}},
            "domain": {"row": row, "column": column},
        }));

        // Facet title centred over its column, nudged down per row.
        let x = column as f64 / COLUMNS as f64 + 0.5 / COLUMNS as f64;
        let y = 1.0 - row as f64 / rows as f64 - 0.01 * row as f64;
        annotations.push(json!({
            "x": x,
            "y": y,
            "text": facet.title,
            "showarrow": false,
            "font": {"size": 12},
            "xref": "paper",
            "yref": "paper",
        }));
    }

    fig.merge_layout(json!({
        "grid": {"rows": rows, "columns": COLUMNS},
        "height": options.height,
        "width": options.width,
        "margin": {"t": 40, "b": 20, "l": 20, "r": 20},
        "font": {"size": 12},
        "showlegend": true,
        "title": {"text": ""},
        "annotations": annotations,
    }));
    fig
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colour_map() -> HashMap<String, String> {
        HashMap::from([
            ("PASS (Final)".to_string(), "#c4dfb9".to_string()),
            ("FAIL (Final)".to_string(), "#ff7f7f".to_string()),
        ])
    }

    #[test]
    fn donut_keeps_hole_and_maps_colours() {
        let counts = vec![("PASS (Final)".to_string(), 7), ("FAIL (Final)".to_string(), 3)];
        let fig = grade_donut(&counts, "Coast - MCI", &colour_map());
        assert_eq!(fig.data()[0]["hole"], 0.5);
        assert_eq!(fig.data()[0]["marker"]["colors"][1], "#ff7f7f");
    }

    #[test]
    fn unknown_labels_get_the_default_colour() {
        let counts = vec![("Odd".to_string(), 1)];
        let fig = grade_donut(&counts, "t", &colour_map());
        assert_eq!(fig.data()[0]["marker"]["colors"][0], "orange");
    }

    #[test]
    fn grid_drops_zero_slices_and_positions_facets() {
        let facets = vec![
            DonutFacet {
                title: "DRP".to_string(),
                slices: vec![("PASS (Final)".to_string(), 5), ("FAIL (Final)".to_string(), 0)],
            },
            DonutFacet {
                title: "SIN".to_string(),
                slices: vec![("FAIL (Final)".to_string(), 2)],
            },
            DonutFacet {
                title: "NH4-N".to_string(),
                slices: vec![("PASS (Final)".to_string(), 4)],
            },
        ];
        let options = DonutGridOptions {
            height: 600,
            width: 675,
            colours: colour_map(),
            patterns: HashMap::new(),
        };
        let fig = donut_grid(&facets, &options);
        assert_eq!(fig.data().len(), 3);
        // Zero-count slice dropped from the first facet.
        assert_eq!(fig.data()[0]["labels"].as_array().unwrap().len(), 1);
        // Third facet starts the second row.
        assert_eq!(fig.data()[2]["domain"]["row"], 1);
        assert_eq!(fig.layout()["grid"]["rows"], 2);
    }
}
