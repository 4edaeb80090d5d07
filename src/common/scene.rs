//! Scene loading, parsing, and validation logic.
//!
//! A scene is a pre-parsed list of map features (building footprints and road lines in
//! longitude/latitude) plus the transmitter placement. `SceneGeometry` turns it into
//! building solids in the local metric frame, centred on the origin.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::propagation::antenna::GainPattern;
use crate::propagation::error::PropagationError;
use crate::propagation::geometry::{Aabb, BuildingSolid};
use crate::propagation::projection::CoordinateProjector;
use crate::propagation::types::Transmitter;

/// Height per building level in meters.
pub const LEVEL_HEIGHT: f64 = 3.0;
/// Height used when a building has neither a height nor a level count.
pub const DEFAULT_BUILDING_HEIGHT: f64 = 10.0;
/// Smallest ground extent in meters.
pub const MIN_GROUND_EXTENT: f64 = 400.0;
/// Margin applied to the city footprint when sizing the ground.
pub const GROUND_MARGIN: f64 = 1.05;

/// Error type for scene loading failures.
#[derive(Debug, Error)]
pub enum SceneLoadError {
    #[error("Failed to read file: {0}")]
    FileReadError(String),
    #[error("Failed to parse JSON: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    #[default]
    Building,
    Road,
    Other,
}

/// Feature geometry in `[lon, lat]` pairs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum FeatureGeometry {
    /// Outer ring first; inner rings are ignored.
    Polygon(Vec<Vec<[f64; 2]>>),
    LineString(Vec<[f64; 2]>),
}

impl FeatureGeometry {
    /// First vertex of the outer ring or of the line.
    fn first_vertex(&self) -> Option<[f64; 2]> {
        match self {
            FeatureGeometry::Polygon(rings) => rings.first().and_then(|ring| ring.first()).copied(),
            FeatureGeometry::LineString(line) => line.first().copied(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SceneFeature {
    /// Building identifier. Defaults to the feature's position in the list.
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub kind: FeatureKind,
    pub geometry: FeatureGeometry,
    /// Explicit height in meters.
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub levels: Option<u32>,
}

impl SceneFeature {
    /// Explicit height, then levels × 3 m, then 10 m.
    pub fn building_height(&self) -> f64 {
        match (self.height, self.levels) {
            (Some(height), _) if height > 0.0 => height,
            (_, Some(levels)) if levels > 0 => levels as f64 * LEVEL_HEIGHT,
            _ => DEFAULT_BUILDING_HEIGHT,
        }
    }
}

/// Where the transmitter stands, geographically or in the centred local frame.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Placement {
    Geographic { lon: f64, lat: f64 },
    Local { x: f64, z: f64 },
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransmitterSpec {
    #[serde(flatten)]
    pub placement: Placement,
    pub height: f64,
    #[serde(default)]
    pub azimuth_deg: f64,
    #[serde(default = "default_beamwidth")]
    pub beamwidth_deg: f64,
    #[serde(default)]
    pub max_gain_dbi: Option<f64>,
    #[serde(default)]
    pub pattern: GainPattern,
}

fn default_beamwidth() -> f64 {
    120.0
}

/// Optional sampling defaults stored with the scene. Command-line flags win.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GridDefaults {
    #[serde(default)]
    pub resolution: Option<f64>,
    #[serde(default)]
    pub vertical_resolution: Option<f64>,
    #[serde(default)]
    pub max_height: Option<f64>,
    #[serde(default)]
    pub cube_size: Option<f64>,
    #[serde(default)]
    pub extent: Option<f64>,
}

/// Root structure representing the entire scene.
#[derive(Debug, Clone, Deserialize)]
pub struct Scene {
    pub features: Vec<SceneFeature>,
    pub transmitter: TransmitterSpec,
    #[serde(default)]
    pub grid: GridDefaults,
}

impl Scene {
    /// Identifier for the building at `index`.
    fn building_id(feature: &SceneFeature, index: usize) -> u64 {
        feature.id.unwrap_or(index as u64)
    }
}

/// Load and parse a scene from a file.
pub fn load_scene(path: &Path) -> Result<Scene, SceneLoadError> {
    let data = fs::read_to_string(path).map_err(|e| SceneLoadError::FileReadError(format!("{}: {}", path.display(), e)))?;
    let scene: Scene = serde_json::from_str(&data).map_err(|e| SceneLoadError::ParseError(e.to_string()))?;
    validate_scene(&scene).map_err(SceneLoadError::ValidationError)?;
    Ok(scene)
}

/// Validate scene values that do not need the projection.
///
/// Returns `Err(String)` with a description of the first problem found.
pub fn validate_scene(scene: &Scene) -> Result<(), String> {
    const MIN_TX_HEIGHT: f64 = 1.0;
    const MAX_TX_HEIGHT: f64 = 500.0;

    let tx = &scene.transmitter;
    let (a, b) = match tx.placement {
        Placement::Geographic { lon, lat } => (lon, lat),
        Placement::Local { x, z } => (x, z),
    };
    if !a.is_finite() || !b.is_finite() {
        return Err("Transmitter position must be finite".to_string());
    }
    if !(MIN_TX_HEIGHT..=MAX_TX_HEIGHT).contains(&tx.height) {
        return Err(format!("Transmitter height {} m outside {}-{} m", tx.height, MIN_TX_HEIGHT, MAX_TX_HEIGHT));
    }
    if !tx.azimuth_deg.is_finite() {
        return Err("Transmitter azimuth must be finite".to_string());
    }
    if !(tx.beamwidth_deg > 0.0 && tx.beamwidth_deg <= 360.0) {
        return Err(format!("Transmitter beamwidth {} outside (0, 360]", tx.beamwidth_deg));
    }
    if tx.max_gain_dbi.is_some_and(|g| !g.is_finite()) {
        return Err("Transmitter max gain must be finite".to_string());
    }

    let mut ids = HashSet::new();
    for (index, feature) in scene.features.iter().enumerate() {
        if let Some(height) = feature.height {
            if !height.is_finite() || height < 0.0 {
                return Err(format!("Feature {} has invalid height {}", index, height));
            }
        }
        if feature.kind == FeatureKind::Building && !ids.insert(Scene::building_id(feature, index)) {
            return Err(format!("Duplicate building id found: {}", Scene::building_id(feature, index)));
        }
    }

    let grid = &scene.grid;
    for (name, value) in [
        ("resolution", grid.resolution),
        ("vertical_resolution", grid.vertical_resolution),
        ("max_height", grid.max_height),
        ("cube_size", grid.cube_size),
        ("extent", grid.extent),
    ] {
        if let Some(v) = value {
            if !v.is_finite() || v <= 0.0 {
                return Err(format!("Grid {} must be positive, got {}", name, v));
            }
        }
    }
    Ok(())
}

/// Reference coordinate for the projection: the first vertex of the first feature that
/// has one, as `(lon, lat)`.
pub fn reference_point(features: &[SceneFeature]) -> Option<(f64, f64)> {
    features
        .iter()
        .filter_map(|f| f.geometry.first_vertex())
        .find(|[lon, lat]| lon.is_finite() && lat.is_finite())
        .map(|[lon, lat]| (lon, lat))
}

/// Scene features converted into the local frame.
#[derive(Debug, Clone)]
pub struct SceneGeometry {
    pub projector: CoordinateProjector,
    /// Building solids, centred on the origin.
    pub solids: Vec<BuildingSolid>,
    /// Road polylines as `[x, z]`, centred like the solids.
    pub roads: Vec<Vec<[f64; 2]>>,
    /// Shift applied after projection to centre the city.
    pub offset: (f64, f64),
    /// Side of the square ground plane in meters.
    pub ground_extent: f64,
}

impl SceneGeometry {
    pub fn from_scene(scene: &Scene) -> Result<Self, PropagationError> {
        let (lon0, lat0) = reference_point(&scene.features).ok_or(PropagationError::MissingReferencePoint)?;
        let projector = CoordinateProjector::new(lon0, lat0);
        let project_ring = |ring: &[[f64; 2]]| -> Vec<[f64; 2]> {
            ring.iter()
                .map(|[lon, lat]| {
                    let (x, z) = projector.project(*lon, *lat);
                    [x, z]
                })
                .collect()
        };

        let mut solids = Vec::new();
        let mut roads = Vec::new();
        for (index, feature) in scene.features.iter().enumerate() {
            match (&feature.kind, &feature.geometry) {
                (FeatureKind::Building, FeatureGeometry::Polygon(rings)) => {
                    let Some(outer) = rings.first() else {
                        continue;
                    };
                    let id = Scene::building_id(feature, index);
                    match BuildingSolid::new(id, &project_ring(outer), 0.0, feature.building_height()) {
                        Some(solid) => solids.push(solid),
                        None => log::warn!("Skipping building {}: footprint has fewer than 3 distinct vertices", id),
                    }
                }
                (FeatureKind::Road, FeatureGeometry::LineString(line)) if line.len() >= 2 => roads.push(project_ring(line)),
                _ => {}
            }
        }

        let bounds = solids.iter().map(|s| *s.bounds()).reduce(|a, b| a.union(&b));
        let (offset, ground_extent) = match bounds {
            Some(bounds) => {
                let center = bounds.center();
                ((-center.x, -center.z), ground_extent_for(&bounds))
            }
            None => ((0.0, 0.0), MIN_GROUND_EXTENT),
        };
        let solids: Vec<BuildingSolid> = solids.iter().map(|s| s.translated(offset.0, offset.1)).collect();
        for road in &mut roads {
            for vertex in road.iter_mut() {
                vertex[0] += offset.0;
                vertex[1] += offset.1;
            }
        }

        log::info!(
            "Scene geometry: {} buildings, {} roads, reference ({:.6}, {:.6}), ground {:.0} m",
            solids.len(),
            roads.len(),
            lon0,
            lat0,
            ground_extent
        );
        Ok(Self {
            projector,
            solids,
            roads,
            offset,
            ground_extent,
        })
    }

    /// Convert `(lon, lat)` into the centred local frame.
    pub fn to_local(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (x, z) = self.projector.project(lon, lat);
        (x + self.offset.0, z + self.offset.1)
    }

    /// Place the scene's transmitter in the local frame.
    pub fn transmitter(&self, spec: &TransmitterSpec) -> Transmitter {
        let (x, z) = match spec.placement {
            Placement::Geographic { lon, lat } => self.to_local(lon, lat),
            Placement::Local { x, z } => (x, z),
        };
        let tx = Transmitter::new(x, z, spec.height)
            .with_azimuth(spec.azimuth_deg)
            .with_beamwidth(spec.beamwidth_deg)
            .with_pattern(spec.pattern);
        match spec.max_gain_dbi {
            Some(gain) => tx.with_max_gain(gain),
            None => tx,
        }
    }
}

fn ground_extent_for(bounds: &Aabb) -> f64 {
    let size = bounds.size();
    (GROUND_MARGIN * size.x.max(size.z)).max(MIN_GROUND_EXTENT)
}
