//! Signal propagation engine.
//!
//! Combines a statistical path-loss model with a directional antenna model and a
//! line-of-sight test against building geometry, and evaluates them over 2D, 3D and
//! indoor lattices. It integrates:
//! - Flat-earth projection of map coordinates
//! - 3GPP Urban Macro path loss with shadowing and the indoor decomposition
//! - Directional gain patterns
//! - Ray/building intersection behind a spatial index
//! - Grid sampling, coloring and export
//!
//! ## Module Organization
//!
//! - `geometry`: Vectors, rays, bounding boxes and extruded building solids
//! - `spatial_index`: Linear and grid-bucketed nearest-intersection queries
//! - `visibility`: Fail-open line-of-sight oracle
//! - `signal_calculations`: Path loss, shadowing and link budget
//! - `antenna`: Gain patterns
//! - `projection`: Longitude/latitude to local meters
//! - `color`: Strength to color gradient and legend
//! - `types`: Transmitter, grid parameters and lattices
//! - `field`: Sample records and the field store
//! - `sampler`: Row-parallel sampling runs
//! - `export`: Diagnostic text, JSON and heatmap output
//!
//! ## Public API
//!
//! Build a `SpatialIndex` over the scene's solids, then call `SignalSampler::run`
//! with a `Transmitter`, a `PropagationConfig` and `GridParams`. The returned
//! `SignalField` replaces any earlier field of the same layer in a `FieldSet`.

pub mod antenna;
pub mod color;
pub mod error;
pub mod export;
pub mod field;
pub mod geometry;
pub mod projection;
pub mod sampler;
pub mod signal_calculations;
pub mod spatial_index;
pub mod types;
pub mod visibility;

// Re-export commonly used types
pub use color::ColorMapper;
pub use error::PropagationError;
pub use field::{FieldSet, SignalField, SignalSample};
pub use sampler::SignalSampler;
pub use spatial_index::{IndexKind, SpatialIndex, build_index};
pub use types::{GridParams, SamplingMode, Transmitter};
