//! Geospatial feature sets: loading, reprojection, simplification,
//! dissolving, and the nearest-region join used to attach monitoring
//! sites to management units.

pub mod crs;
pub mod join;

use std::collections::BTreeMap;
use std::path::Path;

use geo::{Area, Centroid, MapCoords, Point, Polygon, Simplify};
use serde_json::Map as JsonMap;
use tracing::warn;

use crate::error::{Error, Result};
use crate::table::{Cell, Table};
pub use crs::Crs;

/// One geospatial record: a geometry plus its attribute row.
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: geo::Geometry<f64>,
    pub attrs: BTreeMap<String, Cell>,
}

impl Feature {
    pub fn new(geometry: geo::Geometry<f64>) -> Feature {
        Feature { geometry, attrs: BTreeMap::new() }
    }

    pub fn attr(&self, name: &str) -> Option<&Cell> {
        self.attrs.get(name)
    }

    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(Cell::as_str)
    }

    pub fn attr_num(&self, name: &str) -> Option<f64> {
        self.attrs.get(name).and_then(Cell::as_num)
    }

    /// Display rendering of an attribute; `None` for absent or null cells.
    pub fn attr_display(&self, name: &str) -> Option<String> {
        let cell = self.attrs.get(name)?;
        if cell.is_null() {
            None
        } else {
            Some(cell.to_string())
        }
    }

    pub fn centroid(&self) -> Option<Point<f64>> {
        self.geometry.centroid()
    }
}

/// A set of features sharing one CRS.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub features: Vec<Feature>,
    pub crs: Crs,
}

impl FeatureSet {
    pub fn new(crs: Crs) -> FeatureSet {
        FeatureSet { features: Vec::new(), crs }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    // ── Loading ──────────────────────────────────────────────────────────────

    /// Load a layer by extension: `.shp` via the shapefile reader,
    /// anything else as GeoJSON.
    pub fn from_path(path: &Path, crs: Crs) -> Result<FeatureSet> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("shp") => Self::from_shapefile_path(path, crs),
            _ => Self::from_geojson_path(path, crs),
        }
    }

    /// Load a feature collection from a GeoJSON file. The stored CRS is
    /// whatever the file was exported in; GeoJSON itself carries no CRS.
    pub fn from_geojson_path(path: &Path, crs: Crs) -> Result<FeatureSet> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_geojson_str(&text, crs).map_err(|e| match e {
            Error::GeoJson { message, .. } => {
                Error::GeoJson { path: path.to_path_buf(), message }
            }
            other => other,
        })
    }

    /// Parse a GeoJSON feature collection from a string.
    pub fn from_geojson_str(text: &str, crs: Crs) -> Result<FeatureSet> {
        let bad = |message: String| Error::GeoJson { path: "<string>".into(), message };
        let gj: geojson::GeoJson = text.parse().map_err(|e: geojson::Error| bad(e.to_string()))?;
        let collection = match gj {
            geojson::GeoJson::FeatureCollection(fc) => fc,
            other => {
                return Err(bad(format!("expected a FeatureCollection, found {}", kind_of(&other))))
            }
        };

        let mut set = FeatureSet::new(crs);
        for (idx, feature) in collection.features.into_iter().enumerate() {
            let Some(geometry) = feature.geometry else {
                warn!(feature = idx, "skipping feature without geometry");
                continue;
            };
            let geometry = match geo::Geometry::<f64>::try_from(geometry.value) {
                Ok(g) => g,
                Err(e) => {
                    warn!(feature = idx, error = %e, "skipping unconvertible geometry");
                    continue;
                }
            };
            let mut attrs = BTreeMap::new();
            if let Some(properties) = feature.properties {
                for (key, value) in properties {
                    attrs.insert(key, json_to_cell(value));
                }
            }
            set.features.push(Feature { geometry, attrs });
        }
        Ok(set)
    }

    /// Load features from an ESRI shapefile (geometry from the .shp,
    /// attributes from the .dbf). Z/M shape variants are not supported
    /// and are skipped with a warning.
    pub fn from_shapefile_path(path: &Path, crs: Crs) -> Result<FeatureSet> {
        let bad = |message: String| Error::Shapefile { path: path.to_path_buf(), message };
        let mut reader = shapefile::Reader::from_path(path).map_err(|e| bad(e.to_string()))?;

        let mut set = FeatureSet::new(crs);
        for (idx, pair) in reader.iter_shapes_and_records().enumerate() {
            let (shape, record) = pair.map_err(|e| bad(e.to_string()))?;
            let Some(geometry) = shape_to_geometry(shape) else {
                warn!(feature = idx, "skipping unsupported shape type");
                continue;
            };
            let mut attrs = BTreeMap::new();
            for (name, value) in record {
                attrs.insert(name, field_to_cell(value));
            }
            set.features.push(Feature { geometry, attrs });
        }
        Ok(set)
    }

    /// Build point features from a table's x/y columns; rows without both
    /// coordinates are skipped with a warning. All other columns become
    /// attributes.
    pub fn from_table_points(
        table: &Table,
        x_column: &str,
        y_column: &str,
        crs: Crs,
    ) -> Result<FeatureSet> {
        table.column_index(x_column)?;
        table.column_index(y_column)?;

        let mut set = FeatureSet::new(crs);
        for (idx, row) in table.iter().enumerate() {
            let (Some(x), Some(y)) = (row.num(x_column), row.num(y_column)) else {
                warn!(row = idx, "skipping row without usable coordinates");
                continue;
            };
            let mut attrs = BTreeMap::new();
            for column in table.columns() {
                if let Some(cell) = row.cell(column) {
                    attrs.insert(column.clone(), cell.clone());
                }
            }
            set.features.push(Feature { geometry: Point::new(x, y).into(), attrs });
        }
        Ok(set)
    }

    // ── Transforms ───────────────────────────────────────────────────────────

    /// Reproject every feature into `target`.
    pub fn to_crs(&self, target: Crs) -> FeatureSet {
        if self.crs == target {
            return self.clone();
        }
        let from = self.crs;
        let features = self
            .features
            .iter()
            .map(|f| Feature {
                geometry: f.geometry.map_coords(|c| from.reproject(target, c)),
                attrs: f.attrs.clone(),
            })
            .collect();
        FeatureSet { features, crs: target }
    }

    /// Ramer–Douglas–Peucker simplification of line and polygon
    /// geometries; tolerance is in the units of the current CRS.
    pub fn simplify(&self, tolerance: f64) -> FeatureSet {
        let features = self
            .features
            .iter()
            .map(|f| Feature {
                geometry: simplify_geometry(&f.geometry, tolerance),
                attrs: f.attrs.clone(),
            })
            .collect();
        FeatureSet { features, crs: self.crs }
    }

    /// Drop features whose geometry is empty or degenerate, warning per
    /// dropped feature.
    pub fn drop_degenerate(&self) -> FeatureSet {
        let mut features = Vec::with_capacity(self.features.len());
        for (idx, f) in self.features.iter().enumerate() {
            if is_degenerate(&f.geometry) {
                warn!(feature = idx, "dropping degenerate geometry");
            } else {
                features.push(f.clone());
            }
        }
        FeatureSet { features, crs: self.crs }
    }

    /// Merge all features sharing a value of `column` into one
    /// multi-polygon feature per value, keeping only that attribute.
    pub fn dissolve_by(&self, column: &str) -> FeatureSet {
        let mut groups: Vec<(String, Vec<Polygon<f64>>)> = Vec::new();
        for f in &self.features {
            let Some(key) = f.attr_display(column) else {
                warn!(column, "skipping feature without dissolve attribute");
                continue;
            };
            let polygons = polygons_of(&f.geometry);
            if polygons.is_empty() {
                continue;
            }
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, list)) => list.extend(polygons),
                None => groups.push((key, polygons)),
            }
        }

        let features = groups
            .into_iter()
            .map(|(key, polygons)| {
                let mut attrs = BTreeMap::new();
                attrs.insert(column.to_string(), Cell::Str(key));
                Feature { geometry: geo::MultiPolygon::new(polygons).into(), attrs }
            })
            .collect();
        FeatureSet { features, crs: self.crs }
    }

    /// Keep features satisfying the predicate.
    pub fn filter(&self, pred: impl Fn(&Feature) -> bool) -> FeatureSet {
        let features = self.features.iter().filter(|f| pred(f)).cloned().collect();
        FeatureSet { features, crs: self.crs }
    }

    /// Keep features whose `column` display value is one of `values`.
    pub fn filter_attr_isin(&self, column: &str, values: &[&str]) -> FeatureSet {
        let features = self
            .features
            .iter()
            .filter(|f| {
                f.attr_display(column).is_some_and(|v| values.contains(&v.as_str()))
            })
            .cloned()
            .collect();
        FeatureSet { features, crs: self.crs }
    }

    /// Mean of the feature centroids — the map centring point.
    pub fn mean_centroid(&self) -> Option<Point<f64>> {
        let centroids: Vec<Point<f64>> =
            self.features.iter().filter_map(Feature::centroid).collect();
        if centroids.is_empty() {
            return None;
        }
        let n = centroids.len() as f64;
        let x = centroids.iter().map(|p| p.x()).sum::<f64>() / n;
        let y = centroids.iter().map(|p| p.y()).sum::<f64>() / n;
        Some(Point::new(x, y))
    }

    /// Convert to a GeoJSON feature collection (attributes → properties).
    pub fn to_geojson(&self) -> geojson::FeatureCollection {
        let features = self
            .features
            .iter()
            .map(|f| geojson::Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&f.geometry))),
                id: None,
                properties: Some(attrs_to_json(&f.attrs)),
                foreign_members: None,
            })
            .collect();
        geojson::FeatureCollection { bbox: None, features, foreign_members: None }
    }
}

// ── Conversion helpers ────────────────────────────────────────────────────────

fn kind_of(gj: &geojson::GeoJson) -> &'static str {
    match gj {
        geojson::GeoJson::Geometry(_) => "a bare Geometry",
        geojson::GeoJson::Feature(_) => "a bare Feature",
        geojson::GeoJson::FeatureCollection(_) => "a FeatureCollection",
    }
}

fn json_to_cell(value: serde_json::Value) -> Cell {
    match value {
        serde_json::Value::String(s) => Cell::Str(s),
        serde_json::Value::Number(n) => n.as_f64().map(Cell::Num).unwrap_or(Cell::Null),
        serde_json::Value::Bool(b) => Cell::Bool(b),
        serde_json::Value::Null => Cell::Null,
        other => Cell::Str(other.to_string()),
    }
}

fn attrs_to_json(attrs: &BTreeMap<String, Cell>) -> JsonMap<String, serde_json::Value> {
    let mut map = JsonMap::new();
    for (key, cell) in attrs {
        let value = match cell {
            Cell::Str(s) => serde_json::Value::String(s.clone()),
            Cell::Num(n) => serde_json::json!(n),
            Cell::Bool(b) => serde_json::Value::Bool(*b),
            Cell::Null => serde_json::Value::Null,
        };
        map.insert(key.clone(), value);
    }
    map
}

fn shape_to_geometry(shape: shapefile::Shape) -> Option<geo::Geometry<f64>> {
    match shape {
        shapefile::Shape::Point(p) => Some(geo::Point::<f64>::from(p).into()),
        shapefile::Shape::Multipoint(mp) => Some(geo::MultiPoint::<f64>::from(mp).into()),
        shapefile::Shape::Polyline(l) => Some(geo::MultiLineString::<f64>::from(l).into()),
        shapefile::Shape::Polygon(p) => Some(geo::MultiPolygon::<f64>::from(p).into()),
        // Z/M shapes (3D survey exports) are not supported.
        _ => None,
    }
}

fn field_to_cell(value: shapefile::dbase::FieldValue) -> Cell {
    use shapefile::dbase::FieldValue;
    match value {
        FieldValue::Character(Some(s)) => Cell::Str(s.trim().to_string()),
        FieldValue::Numeric(Some(n)) => Cell::Num(n),
        FieldValue::Float(Some(f)) => Cell::Num(f64::from(f)),
        FieldValue::Integer(i) => Cell::Num(f64::from(i)),
        FieldValue::Logical(Some(b)) => Cell::Bool(b),
        _ => Cell::Null,
    }
}

fn simplify_geometry(geometry: &geo::Geometry<f64>, tolerance: f64) -> geo::Geometry<f64> {
    match geometry {
        geo::Geometry::Polygon(p) => p.simplify(&tolerance).into(),
        geo::Geometry::MultiPolygon(mp) => mp.simplify(&tolerance).into(),
        geo::Geometry::LineString(l) => l.simplify(&tolerance).into(),
        geo::Geometry::MultiLineString(ml) => ml.simplify(&tolerance).into(),
        other => other.clone(),
    }
}

fn is_degenerate(geometry: &geo::Geometry<f64>) -> bool {
    match geometry {
        geo::Geometry::Polygon(p) => degenerate_polygon(p),
        geo::Geometry::MultiPolygon(mp) => {
            mp.0.is_empty() || mp.0.iter().all(degenerate_polygon)
        }
        geo::Geometry::LineString(l) => l.0.len() < 2,
        geo::Geometry::MultiLineString(ml) => {
            ml.0.is_empty() || ml.0.iter().all(|l| l.0.len() < 2)
        }
        _ => false,
    }
}

fn degenerate_polygon(p: &Polygon<f64>) -> bool {
    p.exterior().0.len() < 4 || p.unsigned_area() == 0.0
}

fn polygons_of(geometry: &geo::Geometry<f64>) -> Vec<Polygon<f64>> {
    match geometry {
        geo::Geometry::Polygon(p) => vec![p.clone()],
        geo::Geometry::MultiPolygon(mp) => mp.0.clone(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, CoordsIter};

    fn square(x0: f64, y0: f64, size: f64, name: &str) -> Feature {
        let mut f = Feature::new(
            polygon![
                (x: x0, y: y0),
                (x: x0 + size, y: y0),
                (x: x0 + size, y: y0 + size),
                (x: x0, y: y0 + size),
                (x: x0, y: y0),
            ]
            .into(),
        );
        f.attrs.insert("name".to_string(), Cell::Str(name.to_string()));
        f
    }

    #[test]
    fn geojson_round_trip_keeps_features_and_attrs() {
        let mut set = FeatureSet::new(Crs::Wgs84);
        set.features.push(square(0.0, 0.0, 1.0, "a"));
        set.features.push(square(2.0, 0.0, 1.0, "b"));

        let text = geojson::GeoJson::from(set.to_geojson()).to_string();
        let back = FeatureSet::from_geojson_str(&text, Crs::Wgs84).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.features[1].attr_str("name"), Some("b"));
    }

    #[test]
    fn non_collection_geojson_is_rejected() {
        let err = FeatureSet::from_geojson_str(
            r#"{"type":"Point","coordinates":[0,0]}"#,
            Crs::Wgs84,
        );
        assert!(err.is_err());
    }

    #[test]
    fn dissolve_groups_by_attribute_value() {
        let mut set = FeatureSet::new(Crs::Nztm);
        set.features.push(square(0.0, 0.0, 1.0, "wetland"));
        set.features.push(square(5.0, 5.0, 1.0, "wetland"));
        set.features.push(square(9.0, 9.0, 1.0, "forest"));

        let dissolved = set.dissolve_by("name");
        assert_eq!(dissolved.len(), 2);
        let wetland = &dissolved.features[0];
        assert_eq!(wetland.attr_str("name"), Some("wetland"));
        match &wetland.geometry {
            geo::Geometry::MultiPolygon(mp) => assert_eq!(mp.0.len(), 2),
            other => panic!("expected MultiPolygon, got {other:?}"),
        }
    }

    #[test]
    fn drop_degenerate_removes_empty_polygons() {
        let mut set = FeatureSet::new(Crs::Nztm);
        set.features.push(square(0.0, 0.0, 1.0, "ok"));
        // Zero-area sliver.
        set.features.push(Feature::new(
            polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)].into(),
        ));
        let kept = set.drop_degenerate();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.features[0].attr_str("name"), Some("ok"));
    }

    #[test]
    fn simplify_reduces_vertices_and_keeps_ring_closed() {
        // A square with a redundant midpoint on each edge.
        let dense: Polygon<f64> = polygon![
            (x: 0.0, y: 0.0), (x: 0.5, y: 0.0), (x: 1.0, y: 0.0),
            (x: 1.0, y: 0.5), (x: 1.0, y: 1.0), (x: 0.5, y: 1.0),
            (x: 0.0, y: 1.0), (x: 0.0, y: 0.5), (x: 0.0, y: 0.0),
        ];
        let mut set = FeatureSet::new(Crs::Nztm);
        set.features.push(Feature::new(dense.clone().into()));
        let simplified = set.simplify(0.01);
        match &simplified.features[0].geometry {
            geo::Geometry::Polygon(p) => {
                assert!(p.exterior().coords_count() < dense.exterior().coords_count());
                assert_eq!(p.exterior().0.first(), p.exterior().0.last());
            }
            other => panic!("expected Polygon, got {other:?}"),
        }
    }

    #[test]
    fn reprojection_moves_coordinates_into_target_units() {
        let mut set = FeatureSet::new(Crs::Wgs84);
        let mut f = Feature::new(Point::new(175.5, -40.0).into());
        f.attrs.insert("site".to_string(), Cell::Str("well".to_string()));
        set.features.push(f);

        let projected = set.to_crs(Crs::Nztm);
        match &projected.features[0].geometry {
            geo::Geometry::Point(p) => {
                assert!(p.x() > 1_000_000.0, "easting {}", p.x());
                assert!(p.y() > 5_000_000.0, "northing {}", p.y());
            }
            other => panic!("expected Point, got {other:?}"),
        }
        assert_eq!(projected.features[0].attr_str("site"), Some("well"));
    }

    #[test]
    fn table_points_skip_rows_without_coordinates() {
        let csv = "site,x,y\nA,1753000,5432000\nB,,\n";
        let table = Table::from_csv_reader(csv.as_bytes()).unwrap();
        let set = FeatureSet::from_table_points(&table, "x", "y", Crs::Nztm).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.features[0].attr_str("site"), Some("A"));
    }

    #[test]
    fn mean_centroid_averages_feature_centroids() {
        let mut set = FeatureSet::new(Crs::Nztm);
        set.features.push(Feature::new(Point::new(0.0, 0.0).into()));
        set.features.push(Feature::new(Point::new(10.0, 4.0).into()));
        let c = set.mean_centroid().unwrap();
        assert_eq!((c.x(), c.y()), (5.0, 2.0));
    }
}
