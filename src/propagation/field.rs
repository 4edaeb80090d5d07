//! Sample records and the per-layer field store.
//!
//! A `SignalField` is the complete output of one sampling run. It is replaced as a
//! whole and never merged. `FieldSet` keeps the most recent ground field next to the
//! most recent volume (3D or indoor) field and tracks which one is shown.

use serde::Serialize;

use super::color::{ColorMapper, Rgb};
use super::geometry::{Intersection, Vec3};
use super::signal_calculations::{IndoorLoss, dbm_to_mw, mw_to_dbm};
use super::types::{GridParams, SampleGrid, SamplingMode};

/// Height at which the ground mesh is laid, slightly above the ground plane.
pub const MESH_ELEVATION: f32 = 0.1;

/// One evaluated sample point.
///
/// `signal_strength` is the raw value. Only the color derived from it is clamped to
/// the display bounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalSample {
    pub position: Vec3,
    pub has_line_of_sight: bool,
    pub distance_3d: f64,
    pub path_loss: f64,
    pub signal_strength: f64,
    /// Indoor loss decomposition, set for indoor samples only.
    pub indoor: Option<IndoorLoss>,
    /// Nearest building crossing on the ray toward the antenna.
    pub intersection: Option<Intersection>,
    /// Building containing the sample, for indoor samples.
    pub building_id: Option<u64>,
    pub color: Rgb,
    /// Rendering opacity for volumetric samples.
    pub opacity: Option<f64>,
}

/// Vertex, color and index buffers for the ground mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeshBuffers {
    pub positions: Vec<[f32; 3]>,
    pub colors: Vec<[f32; 3]>,
    /// Two counter-clockwise triangles per lattice cell.
    pub indices: Vec<u32>,
    pub opacity: f32,
}

impl MeshBuffers {
    /// Build buffers for a single-layer lattice whose samples are in row-major order.
    pub fn from_ground(grid: &SampleGrid, samples: &[SignalSample], opacity: f64) -> Self {
        let positions = samples
            .iter()
            .map(|s| [s.position.x as f32, MESH_ELEVATION, s.position.z as f32])
            .collect();
        let colors = samples.iter().map(|s| [s.color.r, s.color.g, s.color.b]).collect();

        let (nx, nz) = (grid.x_count, grid.z_count);
        let mut indices = Vec::with_capacity(nx.saturating_sub(1) * nz.saturating_sub(1) * 6);
        for zi in 0..nz.saturating_sub(1) {
            for xi in 0..nx.saturating_sub(1) {
                let a = (zi * nx + xi) as u32;
                let b = a + 1;
                let c = a + nx as u32;
                let d = c + 1;
                indices.extend_from_slice(&[a, c, b, b, c, d]);
            }
        }
        Self {
            positions,
            colors,
            indices,
            opacity: opacity as f32,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Aggregate view of a field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldSummary {
    pub samples: usize,
    pub line_of_sight: usize,
    pub skipped: usize,
    pub min_dbm: f64,
    pub max_dbm: f64,
    /// Mean received power, averaged in milliwatts.
    pub mean_dbm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalField {
    pub mode: SamplingMode,
    pub grid_params: GridParams,
    /// Lattice the samples were drawn from. Indoor fields have none.
    pub grid: Option<SampleGrid>,
    pub samples: Vec<SignalSample>,
    /// Ground fields only.
    pub mesh: Option<MeshBuffers>,
    /// Lattice points dropped because they fell inside a building's bounding box.
    pub skipped: usize,
}

impl SignalField {
    /// Recompute colors and opacities from the stored strengths, e.g. after the display
    /// bounds or base opacity changed. Positions and strengths are left untouched.
    pub fn restyle(&mut self, mapper: &ColorMapper, base_opacity: f64) {
        let volumetric = self.mode != SamplingMode::Ground;
        for sample in &mut self.samples {
            sample.color = mapper.color_for(sample.signal_strength);
            sample.opacity = volumetric.then(|| volume_opacity(mapper, base_opacity, sample.signal_strength));
        }
        if let Some(mesh) = &mut self.mesh {
            mesh.colors = self.samples.iter().map(|s| [s.color.r, s.color.g, s.color.b]).collect();
        }
    }

    /// Sample closest to `point`, or `None` for an empty field.
    pub fn nearest_sample(&self, point: Vec3) -> Option<&SignalSample> {
        self.samples
            .iter()
            .min_by(|a, b| a.position.distance(point).total_cmp(&b.position.distance(point)))
    }

    pub fn summary(&self) -> FieldSummary {
        let mut min_dbm = f64::INFINITY;
        let mut max_dbm = f64::NEG_INFINITY;
        let mut total_mw = 0.0;
        let mut line_of_sight = 0;
        for sample in &self.samples {
            min_dbm = min_dbm.min(sample.signal_strength);
            max_dbm = max_dbm.max(sample.signal_strength);
            total_mw += dbm_to_mw(sample.signal_strength);
            if sample.has_line_of_sight {
                line_of_sight += 1;
            }
        }
        let mean_dbm = if self.samples.is_empty() {
            f64::NAN
        } else {
            mw_to_dbm(total_mw / self.samples.len() as f64)
        };
        FieldSummary {
            samples: self.samples.len(),
            line_of_sight,
            skipped: self.skipped,
            min_dbm,
            max_dbm,
            mean_dbm,
        }
    }
}

/// `base · (0.5 + 0.5 · normalized strength)`.
pub fn volume_opacity(mapper: &ColorMapper, base_opacity: f64, strength: f64) -> f64 {
    base_opacity * (0.5 + 0.5 * mapper.normalized(strength))
}

/// Which field slot is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layer {
    #[default]
    Ground,
    Volume,
}

impl Layer {
    pub fn for_mode(mode: SamplingMode) -> Self {
        match mode {
            SamplingMode::Ground => Layer::Ground,
            SamplingMode::Volume | SamplingMode::Indoor => Layer::Volume,
        }
    }
}

/// Holds the latest ground and volume fields side by side.
#[derive(Debug, Default)]
pub struct FieldSet {
    ground: Option<SignalField>,
    volume: Option<SignalField>,
    visible: Layer,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `field` in its slot, replacing the previous occupant, and make it visible.
    /// Returns the field it replaced.
    pub fn install(&mut self, field: SignalField) -> Option<SignalField> {
        let layer = Layer::for_mode(field.mode);
        self.visible = layer;
        self.slot_mut(layer).replace(field)
    }

    pub fn clear(&mut self, layer: Layer) -> Option<SignalField> {
        self.slot_mut(layer).take()
    }

    pub fn get(&self, layer: Layer) -> Option<&SignalField> {
        match layer {
            Layer::Ground => self.ground.as_ref(),
            Layer::Volume => self.volume.as_ref(),
        }
    }

    pub fn visible(&self) -> Layer {
        self.visible
    }

    pub fn visible_field(&self) -> Option<&SignalField> {
        self.get(self.visible)
    }

    /// Switch to the other layer.
    pub fn toggle(&mut self) -> Layer {
        self.visible = match self.visible {
            Layer::Ground => Layer::Volume,
            Layer::Volume => Layer::Ground,
        };
        self.visible
    }

    /// Restyle every stored field.
    pub fn restyle(&mut self, mapper: &ColorMapper, base_opacity: f64) {
        for field in [self.ground.as_mut(), self.volume.as_mut()].into_iter().flatten() {
            field.restyle(mapper, base_opacity);
        }
    }

    fn slot_mut(&mut self, layer: Layer) -> &mut Option<SignalField> {
        match layer {
            Layer::Ground => &mut self.ground,
            Layer::Volume => &mut self.volume,
        }
    }
}
