//! Geometry for line-of-sight and building occupancy queries.
//!
//! Contains:
//! - A small `Vec3` value type in the local frame (x east, y up, z north, meters)
//! - Axis-aligned bounding boxes with slab-based ray clipping
//! - Rays with a normalized direction
//! - `BuildingSolid`: an extruded footprint polygon with walls, floor and roof
//! - Ray/solid intersection, point-in-polygon and the parity interior test

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

use super::error::GeometryError;

/// Smallest ray parameter accepted as a hit. Filters self-intersection at the origin.
const HIT_EPSILON: f64 = 1e-9;

/// Below this magnitude a 2D cross product is treated as parallel.
const PARALLEL_EPSILON: f64 = 1e-12;

/// Fixed, deliberately skewed direction for the parity test. A non axis-aligned
/// direction avoids grazing the edges and vertices of typical rectangular footprints.
const PARITY_DIRECTION: Vec3 = Vec3 {
    x: 0.801_783_725_737_273_2,
    y: 0.267_261_241_912_424_4,
    z: 0.534_522_483_824_848_8,
};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Vec3) -> f64 {
        (other - self).length()
    }

    /// Distance on the ground plane, ignoring the vertical component.
    pub fn horizontal_distance(self, other: Vec3) -> f64 {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        (dx * dx + dz * dz).sqrt()
    }

    /// Unit vector in the same direction, or `None` for a zero or non-finite vector.
    pub fn normalized(self) -> Option<Vec3> {
        let len = self.length();
        if !len.is_finite() || len <= f64::EPSILON {
            return None;
        }
        Some(self * (1.0 / len))
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Axis-aligned bounding box. Containment is inclusive on every face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y && p.z >= self.min.z && p.z <= self.max.z
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: Vec3::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y), self.min.z.min(other.min.z)),
            max: Vec3::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y), self.max.z.max(other.max.z)),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Parameter interval `[t_enter, t_exit]` where the ray lies inside the box,
    /// using the slab method. `None` when the ray misses.
    pub fn ray_interval(&self, ray: &Ray) -> Option<(f64, f64)> {
        let mut t_enter = f64::NEG_INFINITY;
        let mut t_exit = f64::INFINITY;
        let axes = [
            (ray.origin.x, ray.direction.x, self.min.x, self.max.x),
            (ray.origin.y, ray.direction.y, self.min.y, self.max.y),
            (ray.origin.z, ray.direction.z, self.min.z, self.max.z),
        ];
        for (origin, dir, lo, hi) in axes {
            if dir.abs() <= PARALLEL_EPSILON {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir;
            let (t0, t1) = {
                let a = (lo - origin) * inv;
                let b = (hi - origin) * inv;
                if a <= b { (a, b) } else { (b, a) }
            };
            t_enter = t_enter.max(t0);
            t_exit = t_exit.min(t1);
            if t_enter > t_exit {
                return None;
            }
        }
        if t_exit < 0.0 {
            return None;
        }
        Some((t_enter, t_exit))
    }
}

/// A half-line with a unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Result<Self, GeometryError> {
        if !origin.is_finite() {
            return Err(GeometryError::NonFinite);
        }
        let direction = direction.normalized().ok_or(GeometryError::DegenerateRay)?;
        Ok(Self { origin, direction })
    }

    /// Ray from `origin` aimed at `target`, together with the distance to the target.
    pub fn towards(origin: Vec3, target: Vec3) -> Result<(Self, f64), GeometryError> {
        let ray = Ray::new(origin, target - origin)?;
        Ok((ray, origin.distance(target)))
    }

    pub fn at(&self, t: f64) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Nearest building boundary hit along a ray.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intersection {
    /// Distance from the ray origin in meters.
    pub distance: f64,
    pub point: Vec3,
    pub building_id: u64,
}

/// An extruded building footprint.
///
/// The footprint is a simple polygon in the ground plane, stored as `[x, z]` pairs
/// without a closing duplicate vertex. The solid spans `base..=base + height` on y.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildingSolid {
    pub id: u64,
    footprint: Vec<[f64; 2]>,
    base: f64,
    height: f64,
    bounds: Aabb,
}

impl BuildingSolid {
    /// Build a solid from a footprint ring. A closing vertex equal to the first one and
    /// consecutive duplicates are dropped. Returns `None` if fewer than three distinct
    /// vertices remain or any value is not finite.
    pub fn new(id: u64, ring: &[[f64; 2]], base: f64, height: f64) -> Option<Self> {
        if !base.is_finite() || !height.is_finite() || height <= 0.0 {
            return None;
        }
        let mut footprint: Vec<[f64; 2]> = Vec::with_capacity(ring.len());
        for vertex in ring {
            if !vertex[0].is_finite() || !vertex[1].is_finite() {
                return None;
            }
            if footprint.last() != Some(vertex) {
                footprint.push(*vertex);
            }
        }
        while footprint.len() > 1 && footprint.first() == footprint.last() {
            footprint.pop();
        }
        if footprint.len() < 3 {
            return None;
        }

        let (mut min_x, mut max_x, mut min_z, mut max_z) = (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
        for [x, z] in &footprint {
            min_x = min_x.min(*x);
            max_x = max_x.max(*x);
            min_z = min_z.min(*z);
            max_z = max_z.max(*z);
        }
        let bounds = Aabb {
            min: Vec3::new(min_x, base, min_z),
            max: Vec3::new(max_x, base + height, max_z),
        };
        Some(Self {
            id,
            footprint,
            base,
            height,
            bounds,
        })
    }

    /// Axis-aligned box solid, convenient for scenes and tests.
    pub fn rectangle(id: u64, min_x: f64, min_z: f64, max_x: f64, max_z: f64, height: f64) -> Option<Self> {
        Self::new(id, &[[min_x, min_z], [max_x, min_z], [max_x, max_z], [min_x, max_z]], 0.0, height)
    }

    pub fn footprint(&self) -> &[[f64; 2]] {
        &self.footprint
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    pub fn top(&self) -> f64 {
        self.base + self.height
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Copy of this solid shifted on the ground plane.
    pub fn translated(&self, dx: f64, dz: f64) -> Self {
        let footprint: Vec<[f64; 2]> = self.footprint.iter().map(|[x, z]| [x + dx, z + dz]).collect();
        let shift = Vec3::new(dx, 0.0, dz);
        Self {
            id: self.id,
            footprint,
            base: self.base,
            height: self.height,
            bounds: Aabb {
                min: self.bounds.min + shift,
                max: self.bounds.max + shift,
            },
        }
    }

    /// Ray parameters of every boundary crossing (walls, floor, roof) with `t > 0`,
    /// unsorted.
    ///
    /// Wall edges are treated as half-open on their end vertex so that a ray through a
    /// shared vertex is counted once.
    pub fn intersections(&self, ray: &Ray) -> Result<Vec<f64>, GeometryError> {
        let mut hits = Vec::new();
        let (ox, oz) = (ray.origin.x, ray.origin.z);
        let (dx, dz) = (ray.direction.x, ray.direction.z);
        let top = self.top();

        let n = self.footprint.len();
        for i in 0..n {
            let [ax, az] = self.footprint[i];
            let [bx, bz] = self.footprint[(i + 1) % n];
            let (ex, ez) = (bx - ax, bz - az);
            let denom = cross(dx, dz, ex, ez);
            if denom.abs() <= PARALLEL_EPSILON {
                continue;
            }
            let (wx, wz) = (ax - ox, az - oz);
            let t = cross(wx, wz, ex, ez) / denom;
            let s = cross(wx, wz, dx, dz) / denom;
            if !t.is_finite() || !s.is_finite() {
                return Err(GeometryError::NonFinite);
            }
            if t <= HIT_EPSILON || !(0.0..1.0).contains(&s) {
                continue;
            }
            let y = ray.origin.y + t * ray.direction.y;
            if y >= self.base && y <= top {
                hits.push(t);
            }
        }

        if ray.direction.y.abs() > PARALLEL_EPSILON {
            for cap in [self.base, top] {
                let t = (cap - ray.origin.y) / ray.direction.y;
                if !t.is_finite() {
                    return Err(GeometryError::NonFinite);
                }
                if t <= HIT_EPSILON {
                    continue;
                }
                let p = ray.at(t);
                if point_in_polygon(p.x, p.z, &self.footprint) {
                    hits.push(t);
                }
            }
        }
        Ok(hits)
    }

    /// Closest boundary crossing along the ray, if any.
    pub fn nearest_hit(&self, ray: &Ray) -> Result<Option<f64>, GeometryError> {
        let hits = self.intersections(ray)?;
        Ok(hits.into_iter().fold(None, |best: Option<f64>, t| match best {
            Some(b) if b <= t => Some(b),
            _ => Some(t),
        }))
    }

    /// Exact occupancy test: inside the footprint and between floor and roof.
    pub fn contains(&self, p: Vec3) -> bool {
        p.y >= self.base && p.y <= self.top() && point_in_polygon(p.x, p.z, &self.footprint)
    }

    /// Occupancy by crossing parity: a ray cast in a fixed direction leaves a closed
    /// solid an odd number of times from any interior point.
    pub fn parity_contains(&self, p: Vec3) -> bool {
        if !self.bounds.contains(p) {
            return false;
        }
        let ray = Ray {
            origin: p,
            direction: PARITY_DIRECTION,
        };
        match self.intersections(&ray) {
            Ok(hits) => hits.len() % 2 == 1,
            Err(_) => false,
        }
    }
}

fn cross(ax: f64, az: f64, bx: f64, bz: f64) -> f64 {
    ax * bz - az * bx
}

/// Even-odd point-in-polygon test on the ground plane.
pub fn point_in_polygon(x: f64, z: f64, polygon: &[[f64; 2]]) -> bool {
    let mut inside = false;
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let [xi, zi] = polygon[i];
        let [xj, zj] = polygon[j];
        if (zi > z) != (zj > z) {
            let x_cross = xi + (z - zi) * (xj - xi) / (zj - zi);
            if x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> BuildingSolid {
        BuildingSolid::rectangle(7, 0.0, 0.0, 10.0, 10.0, 20.0).unwrap()
    }

    #[test]
    fn footprint_drops_closing_and_duplicate_vertices() {
        let ring = [[0.0, 0.0], [4.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 0.0]];
        let solid = BuildingSolid::new(1, &ring, 0.0, 5.0).unwrap();
        assert_eq!(solid.footprint().len(), 3);

        assert!(BuildingSolid::new(2, &[[0.0, 0.0], [1.0, 1.0], [0.0, 0.0]], 0.0, 5.0).is_none());
        assert!(BuildingSolid::new(3, &[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]], 0.0, 0.0).is_none());
    }

    #[test]
    fn ray_hits_nearest_wall_first() {
        let solid = unit_box();
        let ray = Ray::new(Vec3::new(-5.0, 5.0, 5.0), Vec3::new(1.0, 0.0, 0.0)).unwrap();
        let mut hits = solid.intersections(&ray).unwrap();
        hits.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(hits.len(), 2);
        assert!((hits[0] - 5.0).abs() < 1e-9);
        assert!((hits[1] - 15.0).abs() < 1e-9);
        assert!((solid.nearest_hit(&ray).unwrap().unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn ray_over_the_roof_misses() {
        let solid = unit_box();
        let ray = Ray::new(Vec3::new(-5.0, 25.0, 5.0), Vec3::new(1.0, 0.0, 0.0)).unwrap();
        assert!(solid.intersections(&ray).unwrap().is_empty());
    }

    #[test]
    fn descending_ray_hits_roof() {
        let solid = unit_box();
        let ray = Ray::new(Vec3::new(5.0, 30.0, 5.0), Vec3::new(0.0, -1.0, 0.0)).unwrap();
        let t = solid.nearest_hit(&ray).unwrap().unwrap();
        assert!((t - 10.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_ray_is_rejected() {
        assert_eq!(Ray::new(Vec3::default(), Vec3::default()), Err(GeometryError::DegenerateRay));
        assert_eq!(
            Ray::new(Vec3::new(f64::NAN, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)),
            Err(GeometryError::NonFinite)
        );
    }

    #[test]
    fn parity_matches_exact_containment() {
        let l_shape = BuildingSolid::new(3, &[[0.0, 0.0], [20.0, 0.0], [20.0, 5.0], [5.0, 5.0], [5.0, 20.0], [0.0, 20.0]], 0.0, 12.0).unwrap();
        let probes = [
            Vec3::new(2.0, 3.0, 2.0),
            Vec3::new(15.0, 6.0, 2.5),
            Vec3::new(2.5, 11.0, 15.0),
            Vec3::new(10.0, 3.0, 10.0),
            Vec3::new(2.0, 13.0, 2.0),
            Vec3::new(-1.0, 3.0, 2.0),
        ];
        for p in probes {
            assert_eq!(l_shape.parity_contains(p), l_shape.contains(p), "probe {:?}", p);
        }
    }

    #[test]
    fn aabb_slab_interval() {
        let bounds = *unit_box().bounds();
        let ray = Ray::new(Vec3::new(-10.0, 5.0, 5.0), Vec3::new(1.0, 0.0, 0.0)).unwrap();
        let (t0, t1) = bounds.ray_interval(&ray).unwrap();
        assert!((t0 - 10.0).abs() < 1e-9 && (t1 - 20.0).abs() < 1e-9);

        let away = Ray::new(Vec3::new(-10.0, 5.0, 5.0), Vec3::new(-1.0, 0.0, 0.0)).unwrap();
        assert!(bounds.ray_interval(&away).is_none());
    }

    #[test]
    fn translated_moves_bounds_and_footprint() {
        let moved = unit_box().translated(-5.0, 3.0);
        assert_eq!(moved.bounds().min, Vec3::new(-5.0, 0.0, 3.0));
        assert!(moved.contains(Vec3::new(0.0, 1.0, 8.0)));
        assert!(!moved.contains(Vec3::new(6.0, 1.0, 8.0)));
    }
}
