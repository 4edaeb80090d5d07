//! Inputs shared by every sampling mode: the scene file and the propagation config.

pub mod config;
pub mod scene;

pub use config::PropagationConfig;
pub use scene::{Scene, SceneGeometry, load_scene};
