//! Nearest-region assignment.
//!
//! Attaches point records (monitoring sites) or polygon records (managed
//! sites, via centroid) to the administrative management unit they fall
//! in — or the nearest one within a cutoff, since coastal and estuary
//! sites routinely sit just outside the unit boundary.

use geo::{EuclideanDistance, Point};
use tracing::warn;

use crate::error::Result;
use crate::geo::{Feature, FeatureSet};

/// Euclidean distance from a point to any supported geometry; 0 when the
/// point lies inside a polygon.
pub fn distance_to(point: &Point<f64>, geometry: &geo::Geometry<f64>) -> f64 {
    match geometry {
        geo::Geometry::Point(p) => point.euclidean_distance(p),
        geo::Geometry::MultiPoint(mp) => fold_min(mp.0.iter().map(|p| point.euclidean_distance(p))),
        geo::Geometry::Line(l) => point.euclidean_distance(l),
        geo::Geometry::LineString(l) => point.euclidean_distance(l),
        geo::Geometry::MultiLineString(ml) => {
            fold_min(ml.0.iter().map(|l| point.euclidean_distance(l)))
        }
        geo::Geometry::Polygon(p) => point.euclidean_distance(p),
        geo::Geometry::MultiPolygon(mp) => {
            fold_min(mp.0.iter().map(|p| point.euclidean_distance(p)))
        }
        geo::Geometry::GeometryCollection(gc) => {
            fold_min(gc.0.iter().map(|g| distance_to(point, g)))
        }
        geo::Geometry::Rect(r) => point.euclidean_distance(&r.to_polygon()),
        geo::Geometry::Triangle(t) => point.euclidean_distance(&t.to_polygon()),
    }
}

fn fold_min(distances: impl Iterator<Item = f64>) -> f64 {
    distances.fold(f64::INFINITY, f64::min)
}

/// The nearest feature within `max_distance` of `point`, with its
/// distance. Ties resolve to the earliest feature. `None` when every
/// feature is farther than the cutoff.
pub fn nearest_within<'a>(
    point: &Point<f64>,
    regions: &'a FeatureSet,
    max_distance: f64,
) -> Option<(&'a Feature, f64)> {
    let mut best: Option<(&Feature, f64)> = None;
    for feature in &regions.features {
        let d = distance_to(point, &feature.geometry);
        if d > max_distance {
            continue;
        }
        match best {
            Some((_, best_d)) if best_d <= d => {}
            _ => best = Some((feature, d)),
        }
    }
    best
}

/// Assign each point to the `name_column` of its nearest region within
/// `max_distance`. Both CRS must match (projected metres); a mismatch is
/// a programming error and assigns nothing.
pub fn assign_points(
    points: &[Point<f64>],
    regions: &FeatureSet,
    name_column: &str,
    max_distance: f64,
) -> Result<Vec<Option<String>>> {
    Ok(points
        .iter()
        .map(|p| {
            nearest_within(p, regions, max_distance)
                .and_then(|(feature, _)| feature.attr_display(name_column))
        })
        .collect())
}

/// Assign each feature of `sites` to a region through its centroid, the
/// join used for managed-site polygons. Features without a computable
/// centroid are left unassigned with a warning.
pub fn assign_by_centroid(
    sites: &FeatureSet,
    regions: &FeatureSet,
    name_column: &str,
    max_distance: f64,
) -> Vec<Option<String>> {
    sites
        .features
        .iter()
        .enumerate()
        .map(|(idx, site)| {
            let Some(centroid) = site.centroid() else {
                warn!(feature = idx, "no centroid; leaving unassigned");
                return None;
            };
            nearest_within(&centroid, regions, max_distance)
                .and_then(|(feature, _)| feature.attr_display(name_column))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Crs;
    use crate::table::Cell;
    use geo::polygon;

    fn region(x0: f64, y0: f64, size: f64, name: &str) -> Feature {
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
        f.attrs.insert("fmu".to_string(), Cell::Str(name.to_string()));
        f
    }

    fn two_regions() -> FeatureSet {
        let mut set = FeatureSet::new(Crs::Nztm);
        set.features.push(region(0.0, 0.0, 100.0, "Coast"));
        set.features.push(region(1000.0, 0.0, 100.0, "Hills"));
        set
    }

    #[test]
    fn point_inside_a_polygon_is_assigned_its_label() {
        let regions = two_regions();
        let assigned =
            assign_points(&[Point::new(50.0, 50.0)], &regions, "fmu", 500.0).unwrap();
        assert_eq!(assigned, vec![Some("Coast".to_string())]);
    }

    #[test]
    fn inside_means_distance_zero() {
        let regions = two_regions();
        let (_, d) = nearest_within(&Point::new(50.0, 50.0), &regions, 500.0).unwrap();
        assert_eq!(d, 0.0);
    }

    #[test]
    fn nearest_of_several_polygons_wins() {
        let regions = two_regions();
        // 200 east of Coast's edge, 700 west of Hills'.
        let assigned =
            assign_points(&[Point::new(300.0, 50.0)], &regions, "fmu", 800.0).unwrap();
        assert_eq!(assigned, vec![Some("Coast".to_string())]);
        // 150 west of Hills' edge, 750 east of Coast's.
        let assigned =
            assign_points(&[Point::new(850.0, 50.0)], &regions, "fmu", 800.0).unwrap();
        assert_eq!(assigned, vec![Some("Hills".to_string())]);
    }

    #[test]
    fn beyond_the_cutoff_is_unassigned() {
        let regions = two_regions();
        let assigned =
            assign_points(&[Point::new(550.0, 50.0)], &regions, "fmu", 400.0).unwrap();
        assert_eq!(assigned, vec![None]);
    }

    #[test]
    fn a_point_exactly_at_the_cutoff_is_still_assigned() {
        let regions = two_regions();
        let assigned =
            assign_points(&[Point::new(600.0, 50.0)], &regions, "fmu", 500.0).unwrap();
        assert_eq!(assigned, vec![Some("Coast".to_string())]);
    }

    #[test]
    fn centroid_join_assigns_polygon_sites() {
        let regions = two_regions();
        let mut sites = FeatureSet::new(Crs::Nztm);
        sites.features.push(region(10.0, 10.0, 20.0, "veg patch"));
        let assigned = assign_by_centroid(&sites, &regions, "fmu", 2000.0);
        assert_eq!(assigned, vec![Some("Coast".to_string())]);
    }
}
