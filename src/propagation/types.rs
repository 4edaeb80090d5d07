//! Type definitions for the propagation engine.
//!
//! Contains:
//! - `Transmitter`: placement and antenna settings
//! - `GridParams` / `SamplingMode`: what to sample and how densely
//! - `SampleGrid`: the regular lattice derived from grid parameters

use serde::{Deserialize, Serialize};

use crate::common::config::PropagationConfig;

use super::antenna::{GainPattern, directional_gain};
use super::error::PropagationError;
use super::geometry::Vec3;

/// Default horizontal spacing in meters.
pub const DEFAULT_RESOLUTION: f64 = 5.0;
/// Default spacing between volumetric layers in meters.
pub const DEFAULT_VERTICAL_RESOLUTION: f64 = 15.0;
/// Default ceiling of the volumetric grid in meters.
pub const DEFAULT_MAX_HEIGHT: f64 = 30.0;
/// Default edge length of indoor sampling cubes in meters.
pub const DEFAULT_CUBE_SIZE: f64 = 2.0;

/// Upper bound on lattice points per run. Larger requests are rejected up front.
pub const MAX_GRID_POINTS: usize = 50_000_000;

/// A placed transmitter.
///
/// Repositioning produces a new value (`relocated`); the other setters mirror the
/// interactive controls and normalize their input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmitter {
    /// Ground anchor of the mast.
    pub position: Vec3,
    /// Mast height above the anchor in meters.
    pub height: f64,
    /// Boresight direction in degrees clockwise from north.
    #[serde(default)]
    pub azimuth_deg: f64,
    #[serde(default = "default_beamwidth")]
    pub beamwidth_deg: f64,
    /// Peak antenna gain. Falls back to the config's transmitter gain when unset.
    #[serde(default)]
    pub max_gain_dbi: Option<f64>,
    #[serde(default)]
    pub pattern: GainPattern,
}

fn default_beamwidth() -> f64 {
    120.0
}

impl Transmitter {
    pub fn new(x: f64, z: f64, height: f64) -> Self {
        Self {
            position: Vec3::new(x, 0.0, z),
            height,
            azimuth_deg: 0.0,
            beamwidth_deg: default_beamwidth(),
            max_gain_dbi: None,
            pattern: GainPattern::default(),
        }
    }

    /// Radiating point: the anchor raised by the mast height.
    pub fn antenna_position(&self) -> Vec3 {
        Vec3::new(self.position.x, self.position.y + self.height, self.position.z)
    }

    /// Same antenna moved to a new ground location.
    pub fn relocated(&self, x: f64, z: f64) -> Self {
        Self {
            position: Vec3::new(x, self.position.y, z),
            ..self.clone()
        }
    }

    pub fn with_height(self, height: f64) -> Self {
        Self { height, ..self }
    }

    /// Azimuth wrapped into `[0, 360)`.
    pub fn with_azimuth(self, azimuth_deg: f64) -> Self {
        Self {
            azimuth_deg: azimuth_deg.rem_euclid(360.0),
            ..self
        }
    }

    /// Beamwidth clamped into `[1, 360]`.
    pub fn with_beamwidth(self, beamwidth_deg: f64) -> Self {
        Self {
            beamwidth_deg: beamwidth_deg.clamp(1.0, 360.0),
            ..self
        }
    }

    pub fn with_pattern(self, pattern: GainPattern) -> Self {
        Self { pattern, ..self }
    }

    pub fn with_max_gain(self, max_gain_dbi: f64) -> Self {
        Self {
            max_gain_dbi: Some(max_gain_dbi),
            ..self
        }
    }

    pub fn max_gain(&self, config: &PropagationConfig) -> f64 {
        self.max_gain_dbi.unwrap_or(config.tx_gain_dbi)
    }

    /// Antenna gain in dBi toward `point`.
    pub fn gain_towards(&self, point: Vec3, config: &PropagationConfig) -> f64 {
        directional_gain(point, self.antenna_position(), self.azimuth_deg, self.beamwidth_deg, self.max_gain(config), self.pattern)
    }

    pub fn validate(&self) -> Result<(), PropagationError> {
        if !self.position.is_finite() || !self.height.is_finite() || !self.azimuth_deg.is_finite() || !self.beamwidth_deg.is_finite() {
            return Err(PropagationError::InvalidTransmitter("values must be finite".to_string()));
        }
        if self.height <= 0.0 {
            return Err(PropagationError::InvalidTransmitter(format!("height must be positive, got {}", self.height)));
        }
        if self.beamwidth_deg <= 0.0 || self.beamwidth_deg > 360.0 {
            return Err(PropagationError::InvalidTransmitter(format!("beamwidth {} outside (0, 360]", self.beamwidth_deg)));
        }
        if self.max_gain_dbi.is_some_and(|g| !g.is_finite()) {
            return Err(PropagationError::InvalidTransmitter("max gain must be finite".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum SamplingMode {
    /// Ground-plane lattice rendered as a colored mesh.
    #[serde(rename = "2d")]
    #[value(name = "2d")]
    Ground,
    /// Outdoor volumetric lattice.
    #[serde(rename = "3d")]
    #[value(name = "3d")]
    Volume,
    /// Per-building interior lattice.
    #[serde(rename = "indoor")]
    #[value(name = "indoor")]
    Indoor,
}

impl std::fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamplingMode::Ground => write!(f, "2d"),
            SamplingMode::Volume => write!(f, "3d"),
            SamplingMode::Indoor => write!(f, "indoor"),
        }
    }
}

/// What to sample and at which density.
///
/// The horizontal lattice starts at `(origin_x, origin_z)` and covers a square of
/// `extent` meters per side. Indoor sampling ignores the lattice and walks each
/// building's bounding box in cubes of `cube_size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    pub mode: SamplingMode,
    pub origin_x: f64,
    pub origin_z: f64,
    pub extent: f64,
    pub horizontal_resolution: f64,
    #[serde(default)]
    pub vertical_resolution: Option<f64>,
    #[serde(default)]
    pub max_height: Option<f64>,
    #[serde(default)]
    pub cube_size: Option<f64>,
}

impl GridParams {
    /// Square lattice of side `extent` centred on the origin.
    pub fn centered(mode: SamplingMode, extent: f64, horizontal_resolution: f64) -> Self {
        Self {
            mode,
            origin_x: -extent / 2.0,
            origin_z: -extent / 2.0,
            extent,
            horizontal_resolution,
            vertical_resolution: None,
            max_height: None,
            cube_size: None,
        }
    }

    pub fn vertical_resolution(&self) -> f64 {
        self.vertical_resolution.unwrap_or(DEFAULT_VERTICAL_RESOLUTION)
    }

    pub fn max_height(&self) -> f64 {
        self.max_height.unwrap_or(DEFAULT_MAX_HEIGHT)
    }

    pub fn cube_size(&self) -> f64 {
        self.cube_size.unwrap_or(DEFAULT_CUBE_SIZE)
    }

    /// Reject parameters that would produce an empty, infinite or negative lattice.
    pub fn validate(&self) -> Result<(), PropagationError> {
        let positive = |name: &str, value: f64| -> Result<(), PropagationError> {
            if !value.is_finite() || value <= 0.0 {
                return Err(PropagationError::InvalidGrid(format!("{} must be positive and finite, got {}", name, value)));
            }
            Ok(())
        };
        if !self.origin_x.is_finite() || !self.origin_z.is_finite() {
            return Err(PropagationError::InvalidGrid("origin must be finite".to_string()));
        }
        match self.mode {
            SamplingMode::Ground => {
                positive("extent", self.extent)?;
                positive("horizontal resolution", self.horizontal_resolution)?;
            }
            SamplingMode::Volume => {
                positive("extent", self.extent)?;
                positive("horizontal resolution", self.horizontal_resolution)?;
                positive("vertical resolution", self.vertical_resolution())?;
                positive("max height", self.max_height())?;
            }
            SamplingMode::Indoor => positive("cube size", self.cube_size())?,
        }
        Ok(())
    }
}

/// Regular lattice of sample points in row-major order: y layers, then z rows, then x.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampleGrid {
    pub origin: Vec3,
    /// Spacing per axis in meters.
    pub resolution: Vec3,
    pub x_count: usize,
    pub y_count: usize,
    pub z_count: usize,
}

impl SampleGrid {
    /// Ground lattice at y = 0.
    pub fn ground(params: &GridParams) -> Self {
        let count = Self::axis_count(params.extent, params.horizontal_resolution);
        Self {
            origin: Vec3::new(params.origin_x, 0.0, params.origin_z),
            resolution: Vec3::new(params.horizontal_resolution, params.vertical_resolution(), params.horizontal_resolution),
            x_count: count,
            y_count: 1,
            z_count: count,
        }
    }

    /// Volumetric lattice from the ground up to `max_height` (exclusive).
    pub fn volume(params: &GridParams, max_height: f64) -> Self {
        let count = Self::axis_count(params.extent, params.horizontal_resolution);
        Self {
            origin: Vec3::new(params.origin_x, 0.0, params.origin_z),
            resolution: Vec3::new(params.horizontal_resolution, params.vertical_resolution(), params.horizontal_resolution),
            x_count: count,
            y_count: Self::axis_count(max_height, params.vertical_resolution()),
            z_count: count,
        }
    }

    fn axis_count(extent: f64, resolution: f64) -> usize {
        (extent / resolution).ceil().max(0.0) as usize
    }

    pub fn len(&self) -> usize {
        self.x_count.saturating_mul(self.y_count).saturating_mul(self.z_count)
    }

    /// Number of (y, z) rows, the unit of parallel work and cancellation.
    pub fn row_count(&self) -> usize {
        self.y_count * self.z_count
    }

    pub fn point(&self, xi: usize, yi: usize, zi: usize) -> Vec3 {
        Vec3::new(
            self.origin.x + xi as f64 * self.resolution.x,
            self.origin.y + yi as f64 * self.resolution.y,
            self.origin.z + zi as f64 * self.resolution.z,
        )
    }

    /// Points of one row, `row = yi * z_count + zi`.
    pub fn row(&self, row: usize) -> impl Iterator<Item = Vec3> + '_ {
        let (yi, zi) = (row / self.z_count, row % self.z_count);
        (0..self.x_count).map(move |xi| self.point(xi, yi, zi))
    }

    /// All points in row-major order.
    pub fn points(&self) -> impl Iterator<Item = Vec3> + '_ {
        (0..self.row_count()).flat_map(move |row| self.row(row))
    }
}
