//! Flat-earth projection from longitude/latitude to the local frame.
//!
//! Valid for city-scale extents (well under 1% error below ~20 km).

use serde::Serialize;

/// Meters per degree of longitude at the equator.
pub const METERS_PER_DEG_LON: f64 = 111_320.0;
/// Meters per degree of latitude.
pub const METERS_PER_DEG_LAT: f64 = 110_540.0;

/// Converts geographic coordinates to local `(x, z)` meters around a reference point.
///
/// `x` grows eastward and `z` northward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoordinateProjector {
    lon0: f64,
    lat0: f64,
    lon_scale: f64,
}

impl CoordinateProjector {
    pub fn new(lon0: f64, lat0: f64) -> Self {
        Self {
            lon0,
            lat0,
            lon_scale: METERS_PER_DEG_LON * lat0.to_radians().cos(),
        }
    }

    /// Reference point as `(lon, lat)`.
    pub fn reference(&self) -> (f64, f64) {
        (self.lon0, self.lat0)
    }

    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        ((lon - self.lon0) * self.lon_scale, (lat - self.lat0) * METERS_PER_DEG_LAT)
    }

    /// Inverse of `project`.
    pub fn unproject(&self, x: f64, z: f64) -> (f64, f64) {
        (self.lon0 + x / self.lon_scale, self.lat0 + z / METERS_PER_DEG_LAT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn haversine_m(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
        const R: f64 = 6_371_008.8;
        let (p1, p2) = (lat1.to_radians(), lat2.to_radians());
        let dp = p2 - p1;
        let dl = (lon2 - lon1).to_radians();
        let a = (dp / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dl / 2.0).sin().powi(2);
        2.0 * R * a.sqrt().asin()
    }

    #[test]
    fn reference_projects_to_origin() {
        let projector = CoordinateProjector::new(13.405, 52.52);
        assert_eq!(projector.project(13.405, 52.52), (0.0, 0.0));
    }

    #[test]
    fn unproject_inverts_project() {
        let projector = CoordinateProjector::new(-73.9857, 40.7484);
        let (x, z) = projector.project(-73.97, 40.76);
        let (lon, lat) = projector.unproject(x, z);
        assert!((lon + 73.97).abs() < 1e-9 && (lat - 40.76).abs() < 1e-9);
    }

    #[test]
    fn planar_distance_tracks_great_circle_at_city_scale() {
        for (lon0, lat0) in [(13.405, 52.52), (-73.9857, 40.7484), (151.2093, -33.8688), (103.8198, 1.3521)] {
            let projector = CoordinateProjector::new(lon0, lat0);
            for (dlon, dlat) in [(0.01, 0.0), (0.0, 0.02), (0.05, 0.04), (-0.08, 0.06)] {
                let (lon, lat) = (lon0 + dlon, lat0 + dlat);
                let (x, z) = projector.project(lon, lat);
                let planar = (x * x + z * z).sqrt();
                let great_circle = haversine_m(lon0, lat0, lon, lat);
                assert!(great_circle < 20_000.0);
                let relative = (planar - great_circle).abs() / great_circle;
                assert!(relative < 0.01, "({}, {}) -> ({}, {}): {}", lon0, lat0, lon, lat, relative);
            }
        }
    }
}
