//! Plotly figure construction.
//!
//! A [`Figure`] is the trace/layout JSON of a Plotly figure plus the
//! HTML emission the tools need: a full standalone page, or an inline
//! fragment for embedding in a map popup. Plotly.js itself is loaded
//! from CDN, so the written files are self-contained.
//!
//! The builders live in the submodules: [`bar`], [`donut`], [`scatter`]
//! and [`trend_table`].

pub mod bar;
pub mod donut;
pub mod scatter;
pub mod trend_table;

use std::path::Path;

use serde_json::{json, Value};

use crate::error::{Error, Result};

/// Pinned Plotly.js build served from CDN.
pub const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.32.0.min.js";

/// Marker symbol cycle for multi-series scatter traces.
pub const SYMBOL_CYCLE: &[&str] =
    &["circle", "square", "diamond", "cross", "x", "triangle-up", "star", "hexagon"];

/// Report palette for categorical bar colours.
pub const BAR_PALETTE: &[&str] = &[
    "#273747", "#000000", "#00A7CF", "#87BE43", "#B84626", "#4B9B5B", "#1281AA", "#D3D3D3",
];

/// Trace data + layout of one Plotly figure.
#[derive(Debug, Clone)]
pub struct Figure {
    data: Vec<Value>,
    layout: Value,
}

impl Default for Figure {
    fn default() -> Self {
        Self::new()
    }
}

impl Figure {
    pub fn new() -> Figure {
        Figure { data: Vec::new(), layout: json!({}) }
    }

    pub fn add_trace(&mut self, trace: Value) {
        self.data.push(trace);
    }

    /// Deep-merge a layout patch; objects merge key-wise, anything else
    /// replaces.
    pub fn merge_layout(&mut self, patch: Value) {
        merge(&mut self.layout, patch);
    }

    pub fn data(&self) -> &[Value] {
        &self.data
    }

    pub fn layout(&self) -> &Value {
        &self.layout
    }

    /// Inline fragment: a div plus the CDN script and the `newPlot`
    /// call, for embedding into popups and dashboards.
    pub fn to_inline_html(&self, div_id: &str) -> String {
        let data = escape_for_script(&Value::Array(self.data.clone()).to_string());
        let layout = escape_for_script(&self.layout.to_string());
        format!(
            "<div id=\"{div_id}\" class=\"plotly-graph-div\"></div>\n\
             <script src=\"{PLOTLY_CDN}\" charset=\"utf-8\"></script>\n\
             <script type=\"text/javascript\">\n\
             Plotly.newPlot(\"{div_id}\", {data}, {layout}, {{\"responsive\": true}});\n\
             </script>"
        )
    }

    /// A complete standalone HTML page.
    pub fn to_html_page(&self, title: &str) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <title>{title}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
            self.to_inline_html("figure")
        )
    }

    pub fn write_html(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_html_page("")).map_err(|source| Error::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Horizontal guideline drawn across a figure (the national limit line).
#[derive(Debug, Clone)]
pub struct Guideline {
    pub y: f64,
    pub label: String,
    pub colour: String,
    pub width: f64,
}

fn merge(dst: &mut Value, patch: Value) {
    match (dst, patch) {
        (Value::Object(dst_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match dst_map.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        dst_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// JSON embedded in a `<script>` must not contain a literal `</`
/// (it would terminate the script element mid-string).
fn escape_for_script(json: &str) -> String {
    json.replace("</", "<\\/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_merge_is_deep() {
        let mut fig = Figure::new();
        fig.merge_layout(json!({"xaxis": {"title": "Year", "tickangle": 45}}));
        fig.merge_layout(json!({"xaxis": {"tickangle": 0}, "showlegend": false}));
        assert_eq!(fig.layout()["xaxis"]["title"], "Year");
        assert_eq!(fig.layout()["xaxis"]["tickangle"], 0);
        assert_eq!(fig.layout()["showlegend"], false);
    }

    #[test]
    fn inline_html_embeds_cdn_script_exactly_once() {
        let mut fig = Figure::new();
        fig.add_trace(json!({"type": "bar", "x": ["a"], "y": [1]}));
        let html = fig.to_inline_html("chart-1");
        assert_eq!(html.matches(PLOTLY_CDN).count(), 1);
        assert!(html.contains("Plotly.newPlot(\"chart-1\""));
        assert!(html.contains("\"type\":\"bar\""));
    }

    #[test]
    fn script_content_cannot_close_the_script_element() {
        let mut fig = Figure::new();
        fig.add_trace(json!({"type": "bar", "name": "</script><b>x</b>"}));
        let html = fig.to_inline_html("chart-1");
        // The trace JSON keeps the text but never as a raw "</".
        assert!(!html.contains("</script><b>"));
    }

    #[test]
    fn page_wraps_the_fragment() {
        let fig = Figure::new();
        let page = fig.to_html_page("Air quality");
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<title>Air quality</title>"));
    }
}
