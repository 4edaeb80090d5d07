//! Error types shared by the propagation engine.

use thiserror::Error;

/// Failures that stop a sampling run before any field is produced.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PropagationError {
    /// The input geometry contained no usable coordinate to anchor the local frame.
    #[error("no valid coordinate found in scene features, nothing to render")]
    MissingReferencePoint,
    #[error("invalid grid parameters: {0}")]
    InvalidGrid(String),
    #[error("invalid propagation config: {0}")]
    InvalidConfig(String),
    #[error("invalid transmitter: {0}")]
    InvalidTransmitter(String),
    /// The cooperative cancellation flag was raised between rows.
    #[error("sampling cancelled")]
    Cancelled,
}

/// Failures while evaluating ray queries against building solids.
///
/// These never leave the visibility oracle, which reports line-of-sight instead.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    #[error("ray direction has zero length")]
    DegenerateRay,
    #[error("non-finite value in intersection test")]
    NonFinite,
}
