//! Line-of-sight between a sample point and the transmitter antenna.
//!
//! A single straight ray is cast from the sample toward the antenna and tested
//! against the building snapshot held by a `SpatialIndex`. The oracle itself keeps
//! no geometry state.
//!
//! Any failure while evaluating the ray (degenerate direction, non-finite values)
//! reports line-of-sight with no intersection detail. The overlay is advisory, so a
//! geometry edge case must never stop a sampling run.

use serde::Serialize;

use super::geometry::{Intersection, Ray, Vec3};
use super::spatial_index::SpatialIndex;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineOfSight {
    pub visible: bool,
    /// Closest building crossing along the ray, whether or not it blocks the path.
    pub nearest: Option<Intersection>,
}

impl LineOfSight {
    const FAIL_OPEN: LineOfSight = LineOfSight { visible: true, nearest: None };
}

/// Check whether the straight path from `point` to `transmitter` is free of buildings.
///
/// LOS holds iff no intersection lies strictly closer than the transmitter.
pub fn has_line_of_sight<I: SpatialIndex + ?Sized>(point: Vec3, transmitter: Vec3, index: &I) -> LineOfSight {
    let (ray, distance_to_transmitter) = match Ray::towards(point, transmitter) {
        Ok(ray) => ray,
        Err(err) => {
            log::trace!("LOS ray from {:?} fails open: {}", point, err);
            return LineOfSight::FAIL_OPEN;
        }
    };

    match index.nearest_intersection(&ray, f64::INFINITY) {
        Ok(nearest) => LineOfSight {
            visible: nearest.map_or(true, |hit| hit.distance >= distance_to_transmitter),
            nearest,
        },
        Err(err) => {
            log::debug!("LOS query from {:?} fails open: {}", point, err);
            LineOfSight::FAIL_OPEN
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::geometry::BuildingSolid;
    use crate::propagation::spatial_index::{GridIndex, LinearIndex};

    fn blocker() -> Vec<BuildingSolid> {
        vec![BuildingSolid::rectangle(42, 40.0, -10.0, 60.0, 10.0, 30.0).unwrap()]
    }

    #[test]
    fn point_behind_building_is_shadowed() {
        let tx = Vec3::new(0.0, 25.0, 0.0);
        let point = Vec3::new(100.0, 0.0, 0.0);
        for los in [has_line_of_sight(point, tx, &LinearIndex::new(blocker())), has_line_of_sight(point, tx, &GridIndex::new(blocker(), 10.0))] {
            assert!(!los.visible);
            let hit = los.nearest.unwrap();
            assert_eq!(hit.building_id, 42);
            assert!((hit.point.x - 60.0).abs() < 1e-6);
        }
    }

    #[test]
    fn clear_path_without_buildings() {
        let los = has_line_of_sight(Vec3::new(100.0, 0.0, 0.0), Vec3::new(0.0, 25.0, 0.0), &LinearIndex::default());
        assert!(los.visible);
        assert!(los.nearest.is_none());
    }

    #[test]
    fn building_beyond_transmitter_does_not_block() {
        let index = LinearIndex::new(blocker());
        let los = has_line_of_sight(Vec3::new(100.0, 0.0, 0.0), Vec3::new(80.0, 5.0, 0.0), &index);
        assert!(los.visible);
        assert!(los.nearest.is_some());
    }

    #[test]
    fn coincident_point_fails_open() {
        let tx = Vec3::new(0.0, 25.0, 0.0);
        let los = has_line_of_sight(tx, tx, &LinearIndex::new(blocker()));
        assert_eq!(los, LineOfSight::FAIL_OPEN);

        let nan = has_line_of_sight(Vec3::new(f64::NAN, 0.0, 0.0), tx, &LinearIndex::new(blocker()));
        assert_eq!(nan, LineOfSight::FAIL_OPEN);
    }
}
