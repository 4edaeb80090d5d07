//! Radio signal propagation over urban building geometry.
//!
//! - `common`: scene files and propagation config
//! - `propagation`: path loss, visibility, sampling and export

pub mod common;
pub mod propagation;
