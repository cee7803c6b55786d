//! NZTM2000 ↔ WGS84 reprojection.
//!
//! The only coordinate systems in the source data are NZ Transverse
//! Mercator 2000 (EPSG:2193, metres on GRS80) and geographic WGS84
//! (EPSG:4326, degrees). The transverse Mercator forward/inverse series
//! below is the standard Snyder formulation; within the projection's
//! design extent it round-trips to well under a millimetre.

use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported coordinate reference systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Crs {
    /// Geographic WGS84, EPSG:4326. Coordinates are (lon, lat) degrees.
    Wgs84,
    /// NZ Transverse Mercator 2000, EPSG:2193. Coordinates are
    /// (easting, northing) metres.
    Nztm,
}

impl Crs {
    pub fn from_epsg(code: u32) -> Result<Crs> {
        match code {
            4326 => Ok(Crs::Wgs84),
            2193 => Ok(Crs::Nztm),
            other => Err(Error::UnknownCrs(other)),
        }
    }

    pub fn epsg(self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::Nztm => 2193,
        }
    }

    /// Reproject a single coordinate from `self` into `target`.
    pub fn reproject(self, target: Crs, coord: Coord<f64>) -> Coord<f64> {
        match (self, target) {
            (Crs::Wgs84, Crs::Nztm) => {
                let (e, n) = wgs84_to_nztm(coord.x, coord.y);
                Coord { x: e, y: n }
            }
            (Crs::Nztm, Crs::Wgs84) => {
                let (lon, lat) = nztm_to_wgs84(coord.x, coord.y);
                Coord { x: lon, y: lat }
            }
            _ => coord,
        }
    }
}

// ── GRS80 ellipsoid and NZTM2000 projection constants ─────────────────────────

const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_222_101;
/// Central meridian, 173°E.
const LON0_DEG: f64 = 173.0;
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 1_600_000.0;
const FALSE_NORTHING: f64 = 10_000_000.0;

fn e2() -> f64 {
    F * (2.0 - F)
}

fn ep2() -> f64 {
    let e2 = e2();
    e2 / (1.0 - e2)
}

/// Meridian arc length from the equator to latitude `phi` (radians).
fn meridian_arc(phi: f64) -> f64 {
    let e2 = e2();
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    A * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
        - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

/// Forward projection: (lon, lat) degrees → NZTM (easting, northing) metres.
pub fn wgs84_to_nztm(lon_deg: f64, lat_deg: f64) -> (f64, f64) {
    let e2 = e2();
    let ep2 = ep2();
    let phi = lat_deg.to_radians();
    let dlon = (lon_deg - LON0_DEG).to_radians();

    let sin_phi = phi.sin();
    let cos_phi = phi.cos();
    let n = A / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let t = phi.tan().powi(2);
    let c = ep2 * cos_phi * cos_phi;
    let a = dlon * cos_phi;

    let easting = FALSE_EASTING
        + K0 * n
            * (a + (1.0 - t + c) * a.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0);
    let northing = FALSE_NORTHING
        + K0 * (meridian_arc(phi)
            + n * phi.tan()
                * (a * a / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));

    (easting, northing)
}

/// Inverse projection: NZTM (easting, northing) metres → (lon, lat) degrees.
pub fn nztm_to_wgs84(easting: f64, northing: f64) -> (f64, f64) {
    let e2 = e2();
    let ep2 = ep2();
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    let m = (northing - FALSE_NORTHING) / K0;
    let mu = m / (A * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    // Footpoint latitude.
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let c1 = ep2 * cos_phi1 * cos_phi1;
    let t1 = phi1.tan().powi(2);
    let n1 = A / (1.0 - e2 * sin_phi1 * sin_phi1).sqrt();
    let r1 = A * (1.0 - e2) / (1.0 - e2 * sin_phi1 * sin_phi1).powf(1.5);
    let d = (easting - FALSE_EASTING) / (n1 * K0);

    let phi = phi1
        - (n1 * phi1.tan() / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                    - 252.0 * ep2
                    - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lon = LON0_DEG.to_radians()
        + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / cos_phi1;

    (lon.to_degrees(), phi.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn central_meridian_maps_to_false_easting() {
        for lat in [-47.0, -41.0, -38.0, -34.5] {
            let (e, _) = wgs84_to_nztm(173.0, lat);
            assert_relative_eq!(e, FALSE_EASTING, epsilon = 1e-6);
        }
    }

    #[test]
    fn northing_increases_northwards() {
        let (_, n_south) = wgs84_to_nztm(175.0, -41.0);
        let (_, n_north) = wgs84_to_nztm(175.0, -39.0);
        assert!(n_north > n_south);
    }

    #[test]
    fn easting_increases_eastwards() {
        let (e_west, _) = wgs84_to_nztm(172.0, -40.0);
        let (e_east, _) = wgs84_to_nztm(176.0, -40.0);
        assert!(e_east > e_west);
    }

    #[test]
    fn round_trip_is_sub_millimetre_over_the_region() {
        for &(lon, lat) in &[
            (175.6082, -40.3523),
            (173.0, -39.0),
            (176.9, -39.8),
            (174.0, -42.0),
            (170.5, -45.9),
        ] {
            let (e, n) = wgs84_to_nztm(lon, lat);
            let (lon2, lat2) = nztm_to_wgs84(e, n);
            let (e2, n2) = wgs84_to_nztm(lon2, lat2);
            assert_relative_eq!(lon, lon2, epsilon = 1e-8);
            assert_relative_eq!(lat, lat2, epsilon = 1e-8);
            assert!((e - e2).abs() < 1e-3 && (n - n2).abs() < 1e-3);
        }
    }

    #[test]
    fn region_lands_in_plausible_nztm_ranges() {
        // Lower North Island monitoring extent.
        let (e, n) = wgs84_to_nztm(175.6, -40.35);
        assert!((1_500_000.0..1_950_000.0).contains(&e), "easting {e}");
        assert!((5_300_000.0..5_700_000.0).contains(&n), "northing {n}");
    }

    #[test]
    fn unknown_epsg_is_rejected() {
        assert!(Crs::from_epsg(2193).is_ok());
        assert!(Crs::from_epsg(4326).is_ok());
        assert!(Crs::from_epsg(27200).is_err());
    }
}
