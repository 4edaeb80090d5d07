//! Nearest-intersection queries over a snapshot of building solids.
//!
//! The visibility oracle and the samplers only talk to the `SpatialIndex` trait, so
//! the linear scan can be swapped for the bucketed grid without touching sampler code.
//! Both indexes own their solids: a sampling run always sees one stable snapshot.

use std::collections::HashSet;

use serde::Deserialize;

use super::error::GeometryError;
use super::geometry::{Aabb, BuildingSolid, Intersection, Ray, Vec3};

/// Default bucket edge length for `GridIndex`, in meters.
pub const DEFAULT_CELL_SIZE: f64 = 50.0;

/// Which index implementation to build for a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Linear,
    #[default]
    Grid,
}

pub trait SpatialIndex: Sync {
    /// All solids in the snapshot, in insertion order.
    fn solids(&self) -> &[BuildingSolid];

    /// Closest boundary crossing along `ray` with distance `<= max_distance`.
    fn nearest_intersection(&self, ray: &Ray, max_distance: f64) -> Result<Option<Intersection>, GeometryError>;

    /// True if `point` lies inside any solid's axis-aligned bounding box.
    fn bounding_box_contains(&self, point: Vec3) -> bool {
        self.solids().iter().any(|s| s.bounds().contains(point))
    }

    /// Height of the tallest roof in the snapshot, 0 when empty.
    fn tallest(&self) -> f64 {
        self.solids().iter().map(BuildingSolid::top).fold(0.0, f64::max)
    }
}

/// Build the requested index over `solids`.
pub fn build_index(kind: IndexKind, solids: Vec<BuildingSolid>) -> Box<dyn SpatialIndex> {
    match kind {
        IndexKind::Linear => Box::new(LinearIndex::new(solids)),
        IndexKind::Grid => Box::new(GridIndex::new(solids, DEFAULT_CELL_SIZE)),
    }
}

/// Tests `solid` against the ray and folds the result into `best`.
fn consider(solid: &BuildingSolid, ray: &Ray, max_distance: f64, best: &mut Option<Intersection>) -> Result<(), GeometryError> {
    let Some((t_enter, _)) = solid.bounds().ray_interval(ray) else {
        return Ok(());
    };
    let limit = best.map_or(max_distance, |b| b.distance.min(max_distance));
    if t_enter > limit {
        return Ok(());
    }
    if let Some(t) = solid.nearest_hit(ray)? {
        if t <= limit && best.map_or(true, |b| t < b.distance) {
            *best = Some(Intersection {
                distance: t,
                point: ray.at(t),
                building_id: solid.id,
            });
        }
    }
    Ok(())
}

/// Scans every solid, rejecting most of them with an AABB test first.
#[derive(Debug, Clone, Default)]
pub struct LinearIndex {
    solids: Vec<BuildingSolid>,
}

impl LinearIndex {
    pub fn new(solids: Vec<BuildingSolid>) -> Self {
        Self { solids }
    }
}

impl SpatialIndex for LinearIndex {
    fn solids(&self) -> &[BuildingSolid] {
        &self.solids
    }

    fn nearest_intersection(&self, ray: &Ray, max_distance: f64) -> Result<Option<Intersection>, GeometryError> {
        let mut best = None;
        for solid in &self.solids {
            consider(solid, ray, max_distance, &mut best)?;
        }
        Ok(best)
    }
}

/// Uniform bucket grid over the ground plane.
///
/// Each cell lists the solids whose bounding box overlaps it. Queries walk the cells
/// pierced by the ray in order (2D DDA) and stop as soon as the best hit so far lies
/// before the exit of the current cell.
#[derive(Debug, Clone)]
pub struct GridIndex {
    solids: Vec<BuildingSolid>,
    bounds: Option<Aabb>,
    cell_size: f64,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<usize>>,
}

impl GridIndex {
    pub fn new(solids: Vec<BuildingSolid>, cell_size: f64) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 { cell_size } else { DEFAULT_CELL_SIZE };
        let bounds = solids.iter().map(|s| *s.bounds()).reduce(|a, b| a.union(&b));
        let Some(bounds) = bounds else {
            return Self {
                solids,
                bounds: None,
                cell_size,
                cols: 0,
                rows: 0,
                cells: Vec::new(),
            };
        };

        let size = bounds.size();
        let cols = ((size.x / cell_size).ceil() as usize).max(1);
        let rows = ((size.z / cell_size).ceil() as usize).max(1);
        let mut cells = vec![Vec::new(); cols * rows];
        for (idx, solid) in solids.iter().enumerate() {
            let b = solid.bounds();
            let (c0, c1) = (Self::axis_cell(b.min.x - bounds.min.x, cell_size, cols), Self::axis_cell(b.max.x - bounds.min.x, cell_size, cols));
            let (r0, r1) = (Self::axis_cell(b.min.z - bounds.min.z, cell_size, rows), Self::axis_cell(b.max.z - bounds.min.z, cell_size, rows));
            for row in r0..=r1 {
                for col in c0..=c1 {
                    cells[row * cols + col].push(idx);
                }
            }
        }
        log::debug!("Grid index: {} solids in {}x{} cells of {} m", solids.len(), cols, rows, cell_size);

        Self {
            solids,
            bounds: Some(bounds),
            cell_size,
            cols,
            rows,
            cells,
        }
    }

    fn axis_cell(offset: f64, cell_size: f64, count: usize) -> usize {
        let idx = (offset / cell_size).floor();
        if idx <= 0.0 { 0 } else { (idx as usize).min(count - 1) }
    }
}

impl SpatialIndex for GridIndex {
    fn solids(&self) -> &[BuildingSolid] {
        &self.solids
    }

    fn nearest_intersection(&self, ray: &Ray, max_distance: f64) -> Result<Option<Intersection>, GeometryError> {
        let Some(bounds) = self.bounds else {
            return Ok(None);
        };
        let Some((t_enter, t_exit)) = bounds.ray_interval(ray) else {
            return Ok(None);
        };
        let t_start = t_enter.max(0.0);
        let t_end = t_exit.min(max_distance);
        if t_start > t_end {
            return Ok(None);
        }

        let entry = ray.at(t_start);
        if !entry.is_finite() {
            return Err(GeometryError::NonFinite);
        }
        let mut col = Self::axis_cell(entry.x - bounds.min.x, self.cell_size, self.cols) as i64;
        let mut row = Self::axis_cell(entry.z - bounds.min.z, self.cell_size, self.rows) as i64;

        let (dx, dz) = (ray.direction.x, ray.direction.z);
        let step_col: i64 = if dx > 0.0 { 1 } else { -1 };
        let step_row: i64 = if dz > 0.0 { 1 } else { -1 };
        let boundary_t = |cell: i64, step: i64, origin: f64, min: f64, dir: f64| -> f64 {
            if dir == 0.0 {
                return f64::INFINITY;
            }
            let edge = if step > 0 { cell + 1 } else { cell };
            (min + edge as f64 * self.cell_size - origin) / dir
        };
        let mut t_max_col = boundary_t(col, step_col, ray.origin.x, bounds.min.x, dx);
        let mut t_max_row = boundary_t(row, step_row, ray.origin.z, bounds.min.z, dz);
        let t_delta_col = if dx == 0.0 { f64::INFINITY } else { self.cell_size / dx.abs() };
        let t_delta_row = if dz == 0.0 { f64::INFINITY } else { self.cell_size / dz.abs() };

        let mut visited: HashSet<usize> = HashSet::new();
        let mut best: Option<Intersection> = None;
        loop {
            for &idx in &self.cells[row as usize * self.cols + col as usize] {
                if visited.insert(idx) {
                    consider(&self.solids[idx], ray, max_distance, &mut best)?;
                }
            }

            let cell_exit = t_max_col.min(t_max_row);
            if best.is_some_and(|b| b.distance <= cell_exit) || cell_exit > t_end {
                break;
            }
            if t_max_col < t_max_row {
                col += step_col;
                t_max_col += t_delta_col;
            } else {
                row += step_row;
                t_max_row += t_delta_row;
            }
            if col < 0 || row < 0 || col >= self.cols as i64 || row >= self.rows as i64 {
                break;
            }
        }
        Ok(best)
    }

    fn bounding_box_contains(&self, point: Vec3) -> bool {
        let Some(bounds) = self.bounds else {
            return false;
        };
        if !bounds.contains(point) {
            return false;
        }
        let col = Self::axis_cell(point.x - bounds.min.x, self.cell_size, self.cols);
        let row = Self::axis_cell(point.z - bounds.min.z, self.cell_size, self.rows);
        self.cells[row * self.cols + col].iter().any(|&idx| self.solids[idx].bounds().contains(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn city_block() -> Vec<BuildingSolid> {
        let mut solids = Vec::new();
        let mut id = 0;
        for i in 0..6 {
            for j in 0..6 {
                let x = -150.0 + i as f64 * 55.0;
                let z = -150.0 + j as f64 * 55.0;
                let height = 8.0 + ((i * 7 + j * 3) % 5) as f64 * 6.0;
                solids.push(BuildingSolid::rectangle(id, x, z, x + 30.0, z + 25.0, height).unwrap());
                id += 1;
            }
        }
        solids
    }

    #[test]
    fn empty_indexes_report_no_hits() {
        let ray = Ray::new(Vec3::default(), Vec3::new(1.0, 0.0, 0.0)).unwrap();
        assert!(LinearIndex::new(Vec::new()).nearest_intersection(&ray, f64::INFINITY).unwrap().is_none());
        assert!(GridIndex::new(Vec::new(), 10.0).nearest_intersection(&ray, f64::INFINITY).unwrap().is_none());
        assert_eq!(GridIndex::new(Vec::new(), 10.0).tallest(), 0.0);
    }

    #[test]
    fn max_distance_limits_hits() {
        let index = LinearIndex::new(vec![BuildingSolid::rectangle(1, 10.0, -5.0, 20.0, 5.0, 10.0).unwrap()]);
        let ray = Ray::new(Vec3::new(0.0, 2.0, 0.0), Vec3::new(1.0, 0.0, 0.0)).unwrap();
        let hit = index.nearest_intersection(&ray, 100.0).unwrap().unwrap();
        assert_eq!(hit.building_id, 1);
        assert!((hit.distance - 10.0).abs() < 1e-9);
        assert!(index.nearest_intersection(&ray, 5.0).unwrap().is_none());
    }

    #[test]
    fn grid_index_agrees_with_linear_scan() {
        let linear = LinearIndex::new(city_block());
        let grid = GridIndex::new(city_block(), 40.0);
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..2000 {
            let origin = Vec3::new(rng.gen_range(-250.0..250.0), rng.gen_range(0.0..40.0), rng.gen_range(-250.0..250.0));
            let target = Vec3::new(rng.gen_range(-250.0..250.0), rng.gen_range(0.0..40.0), rng.gen_range(-250.0..250.0));
            let Ok((ray, distance)) = Ray::towards(origin, target) else {
                continue;
            };
            let a = linear.nearest_intersection(&ray, distance).unwrap();
            let b = grid.nearest_intersection(&ray, distance).unwrap();
            match (a, b) {
                (None, None) => {}
                (Some(a), Some(b)) => {
                    assert!((a.distance - b.distance).abs() < 1e-6, "{:?} vs {:?}", a, b);
                }
                other => panic!("index mismatch for ray {:?}: {:?}", ray, other),
            }
        }
    }

    #[test]
    fn bounding_box_lookup_matches_between_indexes() {
        let linear = LinearIndex::new(city_block());
        let grid = GridIndex::new(city_block(), 40.0);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..2000 {
            let p = Vec3::new(rng.gen_range(-200.0..200.0), rng.gen_range(0.0..40.0), rng.gen_range(-200.0..200.0));
            assert_eq!(linear.bounding_box_contains(p), grid.bounding_box_contains(p), "point {:?}", p);
        }
        assert_eq!(linear.tallest(), grid.tallest());
    }
}
