//! The trend-confidence summary table: coloured arrow glyphs in the
//! header, a parameter × confidence pivot of percentages in the body.

use serde_json::json;

use crate::chart::Figure;
use crate::grade::PercentagePivot;

/// Display styling for one trend-confidence category.
#[derive(Debug, Clone)]
pub struct ConfidenceStyle {
    pub category: String,
    /// Arrow (or dot) glyph shown above the category name.
    pub symbol: String,
    pub colour: String,
    /// Non-breaking-space padding in front of the glyph, to centre it
    /// over the column.
    pub pad: usize,
}

impl ConfidenceStyle {
    pub fn new(category: &str, symbol: &str, colour: &str, pad: usize) -> ConfidenceStyle {
        ConfidenceStyle {
            category: category.to_string(),
            symbol: symbol.to_string(),
            colour: colour.to_string(),
            pad,
        }
    }
}

/// Build the summary table from a percentage pivot. Only categories
/// present in the pivot get a column, in the style order given.
pub fn confidence_table(
    pivot: &PercentagePivot,
    styles: &[ConfidenceStyle],
    title: &str,
) -> Figure {
    let mut headers: Vec<String> = vec![String::new()];
    let mut ordered: Vec<&str> = Vec::new();
    for style in styles {
        if !pivot.columns.iter().any(|c| *c == style.category) {
            continue;
        }
        ordered.push(&style.category);
        headers.push(format!(
            "<span style='font-size:48px; color:{colour}; font-weight:bold;'>{pad}{symbol}</span>\
             <br> <br> <br><span style='font-size:16px;'>{category}</span>",
            colour = style.colour,
            pad = "&nbsp;".repeat(style.pad),
            symbol = style.symbol,
            category = style.category,
        ));
    }

    // First cell column is the parameter names, then one column per
    // confidence category, percentages to one decimal place.
    let mut cell_columns: Vec<Vec<String>> = vec![pivot.index.clone()];
    for category in &ordered {
        let col = pivot
            .columns
            .iter()
            .position(|c| c == category)
            .map(|ci| pivot.values.iter().map(|row| format!("{:.1}%", row[ci])).collect())
            .unwrap_or_default();
        cell_columns.push(col);
    }

    let row_colours: Vec<&str> = (0..pivot.index.len())
        .map(|i| if i % 2 == 0 { "#d8d8d8" } else { "#ececec" })
        .collect();

    let mut fig = Figure::new();
    fig.add_trace(json!({
        "type": "table",
        "header": {
            "values": headers,
            "align": "center",
            "line": {"color": "darkslategray"},
            "fill": {"color": "#f9f9f9"},
        },
        "cells": {
            "values": cell_columns,
            "font": {"size": 20},
            "height": 30,
            "fill": {"color": [row_colours]},
        },
    }));
    fig.merge_layout(json!({
        "height": 900,
        "width": 1800,
        "autosize": true,
        "title": {"text": title, "font": {"size": 24}},
    }));
    fig
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pivot() -> PercentagePivot {
        PercentagePivot {
            index: vec!["Ammoniacal Nitrogen".to_string(), "Visual Clarity".to_string()],
            columns: vec!["Likely Improving".to_string(), "Likely Degrading".to_string()],
            values: vec![vec![75.0, 25.0], vec![40.0, 60.0]],
        }
    }

    fn styles() -> Vec<ConfidenceStyle> {
        vec![
            ConfidenceStyle::new("Very Likely Improving", "↑", "#a8caea", 4),
            ConfidenceStyle::new("Likely Improving", "↗", "#c4dfb9", 3),
            ConfidenceStyle::new("Likely Degrading", "↘", "#f6b26b", 2),
        ]
    }

    #[test]
    fn only_present_categories_become_columns() {
        let fig = confidence_table(&pivot(), &styles(), "Proportion of trends");
        let header = fig.data()[0]["header"]["values"].as_array().unwrap();
        // Blank corner + the two categories present in the pivot.
        assert_eq!(header.len(), 3);
        assert!(header[1].as_str().unwrap().contains("Likely Improving"));
        assert!(!header.iter().any(|h| h.as_str().unwrap().contains("Very Likely Improving")));
    }

    #[test]
    fn cells_are_percentages_to_one_decimal() {
        let fig = confidence_table(&pivot(), &styles(), "");
        let cells = fig.data()[0]["cells"]["values"].as_array().unwrap();
        assert_eq!(cells[0][0], "Ammoniacal Nitrogen");
        assert_eq!(cells[1][0], "75.0%");
        assert_eq!(cells[2][1], "60.0%");
    }

    #[test]
    fn row_colours_alternate() {
        let fig = confidence_table(&pivot(), &styles(), "");
        let colours = &fig.data()[0]["cells"]["fill"]["color"][0];
        assert_eq!(colours[0], "#d8d8d8");
        assert_eq!(colours[1], "#ececec");
    }
}
