//! Leaflet map assembly.
//!
//! [`LeafletMap`] builds a self-contained HTML document: Leaflet from
//! CDN, one tile layer, then polygon layers, circle markers and div-icon
//! markers, optionally grouped into switchable layer groups. Per-feature
//! styling, tooltips and popup HTML ride inside the GeoJSON properties
//! under reserved `__`-prefixed keys, which the emitted script reads
//! back when it builds the layers.

pub mod legend;

use std::path::Path;

use serde_json::json;

use crate::error::{Error, Result};
use crate::geo::FeatureSet;

const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";

/// Resolve a named basemap ("CartoDB positron", "OpenStreetMap") to a
/// URL template and attribution. Unrecognised names are treated as URL
/// templates.
fn resolve_tiles(name: &str) -> (String, String) {
    match name.to_ascii_lowercase().as_str() {
        "cartodb positron" => (
            "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png".to_string(),
            "&copy; OpenStreetMap contributors &copy; CARTO".to_string(),
        ),
        "openstreetmap" => (
            "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            "&copy; OpenStreetMap contributors".to_string(),
        ),
        _ => (name.to_string(), String::new()),
    }
}

/// Polygon/line styling carried per feature.
#[derive(Debug, Clone)]
pub struct PolygonStyle {
    pub fill_color: String,
    pub color: String,
    pub weight: f64,
    pub fill_opacity: f64,
}

impl PolygonStyle {
    fn to_json(&self) -> serde_json::Value {
        json!({
            "fillColor": self.fill_color,
            "color": self.color,
            "weight": self.weight,
            "fillOpacity": self.fill_opacity,
        })
    }
}

/// Popup content: plain HTML, or a chart fragment sandboxed in an
/// iframe so its scripts run inside the popup.
#[derive(Debug, Clone)]
pub enum Popup {
    Html { html: String, width: u32 },
    IFrame { html: String, width: u32, height: u32 },
}

impl Popup {
    pub fn text(html: impl Into<String>) -> Popup {
        Popup::Html { html: html.into(), width: 300 }
    }

    pub fn chart(fragment: impl Into<String>, width: u32, height: u32) -> Popup {
        Popup::IFrame { html: fragment.into(), width, height }
    }

    fn render(&self) -> String {
        match self {
            Popup::Html { html, .. } => html.clone(),
            Popup::IFrame { html, width, height } => format!(
                "<iframe srcdoc=\"{}\" width=\"{width}\" height=\"{height}\" \
                 style=\"border:none;\"></iframe>",
                escape_attribute(html)
            ),
        }
    }

    fn width(&self) -> u32 {
        match self {
            Popup::Html { width, .. } => *width,
            Popup::IFrame { width, .. } => *width + 20,
        }
    }
}

/// A GeoJSON layer with per-feature style/tooltip/popup.
#[derive(Debug, Clone, Default)]
pub struct GeoLayer {
    features: Vec<geojson::Feature>,
}

impl GeoLayer {
    pub fn new() -> GeoLayer {
        GeoLayer::default()
    }

    /// Add one feature. Style, tooltip and popup are embedded in the
    /// feature's properties.
    pub fn push(
        &mut self,
        geometry: &geo::Geometry<f64>,
        style: PolygonStyle,
        tooltip: Option<String>,
        popup: Option<Popup>,
    ) {
        let mut properties = serde_json::Map::new();
        properties.insert("__style".to_string(), style.to_json());
        if let Some(tooltip) = tooltip {
            properties.insert("__tooltip".to_string(), json!(tooltip));
        }
        if let Some(popup) = popup {
            properties.insert("__popup".to_string(), json!(popup.render()));
            properties.insert("__popup_width".to_string(), json!(popup.width()));
        }
        self.features.push(geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(geometry))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }

    /// Add every feature of a set with one style function.
    pub fn push_features(
        &mut self,
        set: &FeatureSet,
        style: impl Fn(&crate::geo::Feature) -> PolygonStyle,
        tooltip: impl Fn(&crate::geo::Feature) -> Option<String>,
    ) {
        for feature in set.iter() {
            self.push(&feature.geometry, style(feature), tooltip(feature), None);
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    fn to_collection(&self) -> geojson::FeatureCollection {
        geojson::FeatureCollection {
            bbox: None,
            features: self.features.clone(),
            foreign_members: None,
        }
    }
}

/// A circle marker (site dot) with grade colouring.
#[derive(Debug, Clone)]
pub struct CircleMarker {
    pub lat: f64,
    pub lon: f64,
    pub radius: f64,
    pub color: String,
    pub weight: f64,
    pub fill_color: String,
    pub fill_opacity: f64,
    pub tooltip: Option<String>,
    pub popup: Option<Popup>,
}

/// A div-icon marker: coloured disc with an optional count label.
#[derive(Debug, Clone)]
pub struct DivMarker {
    pub lat: f64,
    pub lon: f64,
    pub colour: String,
    pub label: String,
    pub size: u32,
    pub tooltip: Option<String>,
    pub popup: Option<Popup>,
}

#[derive(Debug, Clone)]
enum MapElement {
    GeoJson(GeoLayer),
    Circle(CircleMarker),
    Div(DivMarker),
}

/// A named, switchable group of map elements. Exclusive groups render
/// as radio options ("base layers"), the Region / per-FMU switcher.
#[derive(Debug, Clone)]
pub struct LayerGroup {
    pub name: String,
    pub exclusive: bool,
    pub show: bool,
    elements: Vec<MapElement>,
}

impl LayerGroup {
    pub fn new(name: &str, exclusive: bool, show: bool) -> LayerGroup {
        LayerGroup { name: name.to_string(), exclusive, show, elements: Vec::new() }
    }

    pub fn add_geojson(&mut self, layer: GeoLayer) {
        self.elements.push(MapElement::GeoJson(layer));
    }

    pub fn add_circle_marker(&mut self, marker: CircleMarker) {
        self.elements.push(MapElement::Circle(marker));
    }

    pub fn add_div_marker(&mut self, marker: DivMarker) {
        self.elements.push(MapElement::Div(marker));
    }
}

/// The map document builder.
#[derive(Debug, Clone)]
pub struct LeafletMap {
    centre: (f64, f64),
    zoom: u32,
    tile_url: String,
    tile_attribution: String,
    base: Vec<MapElement>,
    groups: Vec<LayerGroup>,
    legend: Option<String>,
    extra_css: Vec<String>,
    layer_control: Option<bool>,
}

impl LeafletMap {
    /// `centre` is (lat, lon); `tiles` a named basemap or URL template.
    pub fn new(centre: (f64, f64), zoom: u32, tiles: &str) -> LeafletMap {
        let (tile_url, tile_attribution) = resolve_tiles(tiles);
        LeafletMap {
            centre,
            zoom,
            tile_url,
            tile_attribution,
            base: Vec::new(),
            groups: Vec::new(),
            legend: None,
            extra_css: Vec::new(),
            layer_control: None,
        }
    }

    /// Elements added here are always visible (no layer-control entry).
    pub fn add_geojson(&mut self, layer: GeoLayer) {
        self.base.push(MapElement::GeoJson(layer));
    }

    pub fn add_circle_marker(&mut self, marker: CircleMarker) {
        self.base.push(MapElement::Circle(marker));
    }

    pub fn add_div_marker(&mut self, marker: DivMarker) {
        self.base.push(MapElement::Div(marker));
    }

    pub fn add_group(&mut self, group: LayerGroup) {
        self.groups.push(group);
    }

    pub fn set_legend(&mut self, html: String) {
        self.legend = Some(html);
    }

    pub fn add_css(&mut self, css: &str) {
        self.extra_css.push(css.to_string());
    }

    /// Show the layer control; `collapsed = false` keeps it expanded.
    pub fn layer_control(&mut self, collapsed: bool) {
        self.layer_control = Some(collapsed);
    }

    pub fn to_html(&self) -> String {
        let mut js = String::new();
        js.push_str(&format!(
            "var map = L.map(\"map\", {{center: [{lat}, {lon}], zoom: {zoom}}});\n\
             L.tileLayer({url}, {{attribution: {attribution}}}).addTo(map);\n",
            lat = self.centre.0,
            lon = self.centre.1,
            zoom = self.zoom,
            url = js_string(&self.tile_url),
            attribution = js_string(&self.tile_attribution),
        ));
        js.push_str(
            "function styleOf(f) {\n\
             \x20   return (f.properties && f.properties.__style) || {};\n\
             }\n\
             function onEach(f, layer) {\n\
             \x20   if (f.properties && f.properties.__tooltip) {\n\
             \x20       layer.bindTooltip(f.properties.__tooltip);\n\
             \x20   }\n\
             \x20   if (f.properties && f.properties.__popup) {\n\
             \x20       layer.bindPopup(f.properties.__popup,\n\
             \x20           {maxWidth: f.properties.__popup_width || 300});\n\
             \x20   }\n\
             }\n",
        );

        let mut var_id = 0usize;
        for element in &self.base {
            emit_element(&mut js, element, "map", &mut var_id);
        }

        let mut base_entries: Vec<(String, String)> = Vec::new();
        let mut overlay_entries: Vec<(String, String)> = Vec::new();
        for group in &self.groups {
            let group_var = format!("group_{var_id}");
            var_id += 1;
            js.push_str(&format!("var {group_var} = L.layerGroup();\n"));
            for element in &group.elements {
                emit_element(&mut js, element, &group_var, &mut var_id);
            }
            if group.show {
                js.push_str(&format!("{group_var}.addTo(map);\n"));
            }
            if group.exclusive {
                base_entries.push((group.name.clone(), group_var));
            } else {
                overlay_entries.push((group.name.clone(), group_var));
            }
        }

        if let Some(collapsed) = self.layer_control {
            js.push_str(&format!(
                "L.control.layers({}, {}, {{collapsed: {collapsed}}}).addTo(map);\n",
                entries_object(&base_entries),
                entries_object(&overlay_entries),
            ));
        }

        let css = self
            .extra_css
            .iter()
            .map(|css| format!("<style>{css}</style>\n"))
            .collect::<String>();
        let legend = self.legend.as_deref().unwrap_or("");

        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n\
             <meta charset=\"utf-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
             <link rel=\"stylesheet\" href=\"{LEAFLET_CSS}\">\n\
             <script src=\"{LEAFLET_JS}\"></script>\n\
             <style>html, body, #map {{ height: 100%; margin: 0; }}</style>\n\
             {css}</head>\n<body>\n\
             <div id=\"map\"></div>\n\
             {legend}\n\
             <script>\n{js}</script>\n\
             </body>\n</html>\n"
        )
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_html()).map_err(|source| Error::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn emit_element(js: &mut String, element: &MapElement, target: &str, var_id: &mut usize) {
    match element {
        MapElement::GeoJson(layer) => {
            let data_var = format!("data_{var_id}");
            *var_id += 1;
            let data = serde_json::to_string(&layer.to_collection())
                .unwrap_or_else(|_| "{}".to_string());
            js.push_str(&format!("var {data_var} = {};\n", escape_for_script(&data)));
            js.push_str(&format!(
                "L.geoJSON({data_var}, {{style: styleOf, onEachFeature: onEach}}).addTo({target});\n"
            ));
        }
        MapElement::Circle(m) => {
            js.push_str(&format!(
                "L.circleMarker([{lat}, {lon}], {{radius: {radius}, color: {color}, \
                 weight: {weight}, fill: true, fillColor: {fill}, fillOpacity: {fill_opacity}, \
                 opacity: 1}})",
                lat = m.lat,
                lon = m.lon,
                radius = m.radius,
                color = js_string(&m.color),
                weight = m.weight,
                fill = js_string(&m.fill_color),
                fill_opacity = m.fill_opacity,
            ));
            push_bindings(js, &m.tooltip, &m.popup);
            js.push_str(&format!(".addTo({target});\n"));
        }
        MapElement::Div(m) => {
            let anchor = m.size / 2;
            let icon_html = format!(
                "<div style=\"background-color: {colour}; border-radius: 50%; \
                 display: inline-block; width: {size}px; height: {size}px; \
                 text-align: center; line-height: {size}px; font-size: 10pt; \
                 color: black; border: 1px solid black;\">{label}</div>",
                colour = m.colour,
                size = m.size,
                label = m.label,
            );
            js.push_str(&format!(
                "L.marker([{lat}, {lon}], {{icon: L.divIcon({{className: \"\", \
                 iconAnchor: [{anchor}, {anchor}], html: {html}}})}})",
                lat = m.lat,
                lon = m.lon,
                html = js_string(&icon_html),
            ));
            push_bindings(js, &m.tooltip, &m.popup);
            js.push_str(&format!(".addTo({target});\n"));
        }
    }
}

fn push_bindings(js: &mut String, tooltip: &Option<String>, popup: &Option<Popup>) {
    if let Some(tooltip) = tooltip {
        js.push_str(&format!(".bindTooltip({})", js_string(tooltip)));
    }
    if let Some(popup) = popup {
        js.push_str(&format!(
            ".bindPopup({}, {{maxWidth: {}}})",
            js_string(&popup.render()),
            popup.width(),
        ));
    }
}

fn entries_object(entries: &[(String, String)]) -> String {
    let body = entries
        .iter()
        .map(|(name, var)| format!("{}: {var}", js_string(name)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{body}}}")
}

/// A JS string literal (JSON string escaping, safe inside `<script>`).
fn js_string(text: &str) -> String {
    escape_for_script(&serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string()))
}

fn escape_for_script(json: &str) -> String {
    json.replace("</", "<\\/")
}

/// Escape text for an HTML attribute value (iframe `srcdoc`).
fn escape_attribute(text: &str) -> String {
    text.replace('&', "&amp;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn style() -> PolygonStyle {
        PolygonStyle {
            fill_color: "#70ad47".to_string(),
            color: "black".to_string(),
            weight: 1.0,
            fill_opacity: 0.7,
        }
    }

    #[test]
    fn document_contains_tiles_layers_and_control() {
        let mut layer = GeoLayer::new();
        layer.push(
            &polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)]
                .into(),
            style(),
            Some("Coast".to_string()),
            None,
        );
        let mut group = LayerGroup::new("Coast", true, true);
        group.add_geojson(layer);

        let mut map = LeafletMap::new((-40.0, 175.6), 8, "CartoDB positron");
        map.add_group(group);
        map.layer_control(false);
        let html = map.to_html();

        assert!(html.contains("basemaps.cartocdn.com"));
        assert!(html.contains("L.geoJSON"));
        assert!(html.contains("\"__tooltip\":\"Coast\""));
        assert!(html.contains("L.control.layers({\"Coast\": group_0}, {}, {collapsed: false})"));
        assert!(html.contains("group_0.addTo(map)"));
    }

    #[test]
    fn circle_markers_bind_tooltip_and_popup() {
        let mut map = LeafletMap::new((-40.0, 175.6), 8, "OpenStreetMap");
        map.add_circle_marker(CircleMarker {
            lat: -40.1,
            lon: 175.4,
            radius: 8.0,
            color: "#000000".to_string(),
            weight: 1.0,
            fill_color: "#ff0000".to_string(),
            fill_opacity: 0.9,
            tooltip: Some("Site at bridge".to_string()),
            popup: Some(Popup::text("<b>Red</b>")),
        });
        let html = map.to_html();
        assert!(html.contains("L.circleMarker([-40.1, 175.4]"));
        assert!(html.contains(".bindTooltip(\"Site at bridge\")"));
        assert!(html.contains(".bindPopup(\"<b>Red</b>\""));
    }

    #[test]
    fn div_marker_carries_count_label() {
        let mut map = LeafletMap::new((-40.0, 175.6), 8, "OpenStreetMap");
        map.add_div_marker(DivMarker {
            lat: -40.0,
            lon: 175.0,
            colour: "#ed7d31".to_string(),
            label: "3".to_string(),
            size: 20,
            tooltip: None,
            popup: None,
        });
        let html = map.to_html();
        assert!(html.contains("L.divIcon"));
        assert!(html.contains("border-radius: 50%"));
        assert!(html.contains(">3</div>"));
    }

    #[test]
    fn iframe_popup_escapes_srcdoc() {
        let popup = Popup::chart("<div id=\"c\">a & b</div>", 500, 300);
        let rendered = popup.render();
        assert!(rendered.contains("srcdoc=\"<div id=&quot;c&quot;>a &amp; b</div>\""));
    }

    #[test]
    fn script_content_never_closes_the_script_element() {
        let mut map = LeafletMap::new((-40.0, 175.6), 8, "OpenStreetMap");
        map.add_circle_marker(CircleMarker {
            lat: 0.0,
            lon: 0.0,
            radius: 1.0,
            color: "x".to_string(),
            weight: 1.0,
            fill_color: "y".to_string(),
            fill_opacity: 1.0,
            tooltip: Some("</script>".to_string()),
            popup: None,
        });
        let html = map.to_html();
        let script_start = html.find("<script>\n").unwrap();
        let body = &html[script_start + 9..];
        assert!(!body[..body.find("</script>").unwrap()].contains("</s"));
    }

    #[test]
    fn legend_and_css_are_injected() {
        let mut map = LeafletMap::new((-40.0, 175.6), 8, "OpenStreetMap");
        map.set_legend("<div id=\"legend\">Grades</div>".to_string());
        map.add_css("path.leaflet-interactive:focus { outline: none; }");
        let html = map.to_html();
        assert!(html.contains("<div id=\"legend\">Grades</div>"));
        assert!(html.contains("outline: none"));
    }
}
