//! Grid sampling of the signal field.
//!
//! A run is split into rows: z rows for the ground lattice, (y, z) rows for the
//! volume lattice, and one row per building for indoor sampling. Rows share no state,
//! so they can be evaluated on the rayon pool; results are always concatenated in row
//! order, giving the same flat layout as a sequential run.
//!
//! Each row draws its shadowing from its own `StdRng`, seeded from the run's base seed
//! and the row index. A seeded run is therefore reproducible whether it runs in
//! parallel or not.
//!
//! Cancellation is cooperative: the flag is checked before each row starts, and a
//! cancelled run returns `PropagationError::Cancelled` without a partial field.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::common::config::PropagationConfig;

use super::color::ColorMapper;
use super::error::PropagationError;
use super::field::{MeshBuffers, SignalField, SignalSample, volume_opacity};
use super::geometry::{BuildingSolid, Vec3};
use super::signal_calculations::{Shadowing, indoor_path_loss, outdoor_path_loss, received_power};
use super::spatial_index::SpatialIndex;
use super::types::{GridParams, MAX_GRID_POINTS, SampleGrid, SamplingMode, Transmitter};
use super::visibility::has_line_of_sight;

/// Samples at or below this height are never dropped by the building bounding-box test.
pub const GROUND_LAYER_HEIGHT: f64 = 0.1;

/// Receives row completion counts while a run is in progress.
///
/// Called from worker threads in parallel runs, in no particular order.
pub trait ProgressSink: Sync {
    fn report(&self, completed_rows: usize, total_rows: usize);
}

/// Logs progress at every tenth of the run.
pub struct LogProgress {
    label: String,
    last_decile: AtomicUsize,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last_decile: AtomicUsize::new(0),
        }
    }
}

impl ProgressSink for LogProgress {
    fn report(&self, completed_rows: usize, total_rows: usize) {
        if total_rows == 0 {
            return;
        }
        let decile = completed_rows * 10 / total_rows;
        if self.last_decile.fetch_max(decile, Ordering::Relaxed) < decile {
            log::info!("{}: {}% ({}/{} rows)", self.label, decile * 10, completed_rows, total_rows);
        }
    }
}

/// Computes signal fields for one transmitter over one building snapshot.
///
/// The sampler only borrows its inputs. Changing the transmitter, config or buildings
/// means building a new sampler and running again.
pub struct SignalSampler<'a> {
    transmitter: &'a Transmitter,
    config: &'a PropagationConfig,
    index: &'a dyn SpatialIndex,
    mapper: ColorMapper,
    parallel: bool,
    cancel: Option<Arc<AtomicBool>>,
    progress: Option<&'a dyn ProgressSink>,
}

impl<'a> SignalSampler<'a> {
    pub fn new(transmitter: &'a Transmitter, config: &'a PropagationConfig, index: &'a dyn SpatialIndex) -> Self {
        Self {
            transmitter,
            config,
            index,
            mapper: ColorMapper::from_config(config),
            parallel: true,
            cancel: None,
            progress: None,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Validate all inputs, then sample according to `params.mode`.
    pub fn run(&self, params: &GridParams) -> Result<SignalField, PropagationError> {
        self.config.validate()?;
        self.transmitter.validate()?;
        params.validate()?;
        match params.mode {
            SamplingMode::Ground => self.sample_ground(params),
            SamplingMode::Volume => self.sample_volume(params),
            SamplingMode::Indoor => self.sample_indoor(params),
        }
    }

    /// Ground-plane lattice at y = 0 with mesh buffers.
    pub fn sample_ground(&self, params: &GridParams) -> Result<SignalField, PropagationError> {
        params.validate()?;
        let grid = SampleGrid::ground(params);
        check_size(grid.len())?;
        log::info!("Sampling 2D field: {}x{} points at {} m", grid.x_count, grid.z_count, params.horizontal_resolution);

        let started = Instant::now();
        let rows = self.evaluate_rows("2D sampling", grid.row_count(), |row, shadowing| {
            grid.row(row).map(|point| self.outdoor_sample(point, false, shadowing)).collect::<Vec<_>>()
        })?;
        let samples: Vec<SignalSample> = rows.into_iter().flatten().collect();
        let mesh = MeshBuffers::from_ground(&grid, &samples, self.config.ground_opacity);
        log::info!("2D field ready: {} samples, {} triangles in {:?}", samples.len(), mesh.triangle_count(), started.elapsed());

        Ok(SignalField {
            mode: SamplingMode::Ground,
            grid_params: params.clone(),
            grid: Some(grid),
            samples,
            mesh: Some(mesh),
            skipped: 0,
        })
    }

    /// Outdoor volume lattice. Points inside a building's bounding box are skipped,
    /// except on the ground layer.
    pub fn sample_volume(&self, params: &GridParams) -> Result<SignalField, PropagationError> {
        params.validate()?;
        let max_height = params.max_height().max(self.index.tallest());
        let grid = SampleGrid::volume(params, max_height);
        check_size(grid.len())?;
        log::info!(
            "Sampling 3D field: {}x{}x{} points up to {:.1} m",
            grid.x_count,
            grid.y_count,
            grid.z_count,
            max_height
        );

        let started = Instant::now();
        let rows = self.evaluate_rows("3D sampling", grid.row_count(), |row, shadowing| {
            let mut samples = Vec::with_capacity(grid.x_count);
            let mut skipped = 0;
            for point in grid.row(row) {
                if point.y > GROUND_LAYER_HEIGHT && self.index.bounding_box_contains(point) {
                    skipped += 1;
                    continue;
                }
                samples.push(self.outdoor_sample(point, true, shadowing));
            }
            (samples, skipped)
        })?;

        let mut samples = Vec::new();
        let mut skipped = 0;
        for (row_samples, row_skipped) in rows {
            samples.extend(row_samples);
            skipped += row_skipped;
        }
        log::info!("3D field ready: {} samples, {} skipped inside buildings in {:?}", samples.len(), skipped, started.elapsed());

        Ok(SignalField {
            mode: SamplingMode::Volume,
            grid_params: params.clone(),
            grid: Some(grid),
            samples,
            mesh: None,
            skipped,
        })
    }

    /// Interior points of every building, found with the parity test over a cube lattice
    /// spanning each building's bounding box.
    pub fn sample_indoor(&self, params: &GridParams) -> Result<SignalField, PropagationError> {
        params.validate()?;
        let cube = params.cube_size();
        let solids = self.index.solids();
        let candidates = solids.iter().fold(0usize, |acc, s| acc.saturating_add(cube_lattice_len(s, cube)));
        check_size(candidates)?;
        log::info!("Sampling indoor field: {} buildings, {} candidate points at {} m", solids.len(), candidates, cube);

        let started = Instant::now();
        let rows = self.evaluate_rows("Indoor sampling", solids.len(), |row, shadowing| {
            let solid = &solids[row];
            cube_lattice(solid, cube)
                .filter(|point| solid.parity_contains(*point))
                .map(|point| self.indoor_sample(point, solid.id, shadowing))
                .collect::<Vec<_>>()
        })?;
        let samples: Vec<SignalSample> = rows.into_iter().flatten().collect();
        log::info!("Indoor field ready: {} interior samples in {:?}", samples.len(), started.elapsed());

        Ok(SignalField {
            mode: SamplingMode::Indoor,
            grid_params: params.clone(),
            grid: None,
            samples,
            mesh: None,
            skipped: 0,
        })
    }

    fn outdoor_sample(&self, point: Vec3, volumetric: bool, shadowing: &mut Shadowing<StdRng>) -> SignalSample {
        let antenna = self.transmitter.antenna_position();
        let los = has_line_of_sight(point, antenna, self.index);
        let distance_3d = point.distance(antenna);
        let path_loss = outdoor_path_loss(distance_3d, los.visible, antenna.y, self.config, shadowing);
        let gain = self.transmitter.gain_towards(point, self.config);
        let signal_strength = received_power(self.config, gain, path_loss);

        SignalSample {
            position: point,
            has_line_of_sight: los.visible,
            distance_3d,
            path_loss,
            signal_strength,
            indoor: None,
            intersection: los.nearest,
            building_id: None,
            color: self.mapper.color_for(signal_strength),
            opacity: volumetric.then(|| volume_opacity(&self.mapper, self.config.volume_opacity, signal_strength)),
        }
    }

    fn indoor_sample(&self, point: Vec3, building_id: u64, shadowing: &mut Shadowing<StdRng>) -> SignalSample {
        let antenna = self.transmitter.antenna_position();
        let los = has_line_of_sight(point, antenna, self.index);
        let distance_3d = point.distance(antenna);
        // Depth to the first boundary toward the antenna; 0 when the ray failed open
        let penetration = los.nearest.map_or(0.0, |hit| hit.distance.min(distance_3d));
        let loss = indoor_path_loss(distance_3d, point, antenna, antenna.y, penetration, self.config, shadowing);
        let gain = self.transmitter.gain_towards(point, self.config);
        let signal_strength = received_power(self.config, gain, loss.total);

        SignalSample {
            position: point,
            has_line_of_sight: los.visible,
            distance_3d,
            path_loss: loss.total,
            signal_strength,
            indoor: Some(loss),
            intersection: los.nearest,
            building_id: Some(building_id),
            color: self.mapper.color_for(signal_strength),
            opacity: Some(volume_opacity(&self.mapper, self.config.volume_opacity, signal_strength)),
        }
    }

    /// Evaluate `rows` rows with `eval`, in parallel when enabled, returning per-row
    /// results in row order.
    fn evaluate_rows<T, F>(&self, label: &str, rows: usize, eval: F) -> Result<Vec<T>, PropagationError>
    where
        T: Send,
        F: Fn(usize, &mut Shadowing<StdRng>) -> T + Sync,
    {
        let base_seed = self.config.shadowing_seed.unwrap_or_else(rand::random);
        let fallback = LogProgress::new(label);
        let progress: &dyn ProgressSink = match self.progress {
            Some(sink) => sink,
            None => &fallback,
        };
        let completed = AtomicUsize::new(0);

        let run_row = |row: usize| -> Result<T, PropagationError> {
            if self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return Err(PropagationError::Cancelled);
            }
            let mut shadowing = Shadowing::new(StdRng::seed_from_u64(row_seed(base_seed, row)));
            let result = eval(row, &mut shadowing);
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            progress.report(done, rows);
            Ok(result)
        };

        let result: Result<Vec<T>, PropagationError> = if self.parallel {
            (0..rows).into_par_iter().map(run_row).collect()
        } else {
            (0..rows).map(run_row).collect()
        };
        if let Err(PropagationError::Cancelled) = &result {
            log::warn!("{} cancelled after {}/{} rows", label, completed.load(Ordering::Relaxed), rows);
        }
        result
    }
}

fn row_seed(base: u64, row: usize) -> u64 {
    base ^ (row as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn check_size(points: usize) -> Result<(), PropagationError> {
    if points > MAX_GRID_POINTS {
        return Err(PropagationError::InvalidGrid(format!("{} points exceeds the limit of {}", points, MAX_GRID_POINTS)));
    }
    Ok(())
}

fn cube_counts(solid: &BuildingSolid, cube: f64) -> [usize; 3] {
    let size = solid.bounds().size();
    [size.x, size.y, size.z].map(|s| (s / cube).ceil().max(0.0) as usize)
}

fn cube_lattice_len(solid: &BuildingSolid, cube: f64) -> usize {
    let [nx, ny, nz] = cube_counts(solid, cube);
    nx.saturating_mul(ny).saturating_mul(nz)
}

/// Cube centres over the bounding box of `solid`, y layers first, then z, then x.
fn cube_lattice(solid: &BuildingSolid, cube: f64) -> impl Iterator<Item = Vec3> {
    let [nx, ny, nz] = cube_counts(solid, cube);
    let min = solid.bounds().min;
    let half = cube / 2.0;
    (0..ny).flat_map(move |yi| {
        (0..nz).flat_map(move |zi| {
            (0..nx).map(move |xi| {
                Vec3::new(
                    min.x + half + xi as f64 * cube,
                    min.y + half + yi as f64 * cube,
                    min.z + half + zi as f64 * cube,
                )
            })
        })
    })
}
