//! Propagation configuration loading.
//!
//! The radio constants live in one immutable `PropagationConfig` value that is passed
//! by reference into every computation, so repeated or concurrent runs can never see
//! a partially updated set of constants. Changing any value means building a new
//! config and sampling again.

use serde::Deserialize;
use std::path::Path;

use crate::propagation::error::PropagationError;

/// File name looked up next to the scene when no config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "propagation.toml";

/// Radio link constants and display bounds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PropagationConfig {
    /// Carrier frequency in GHz.
    pub frequency_ghz: f64,
    /// Transmit power at the antenna port in dBm.
    pub tx_power_dbm: f64,
    /// Transmitter gain in dBi, used when a transmitter does not set its own maximum gain.
    pub tx_gain_dbi: f64,
    pub rx_gain_dbi: f64,
    /// Shadowing standard deviation in dB for line-of-sight samples.
    pub shadowing_sigma_los: f64,
    /// Shadowing standard deviation in dB for obstructed samples.
    pub shadowing_sigma_nlos: f64,
    /// Lower end of the color scale in dBm.
    pub min_signal_dbm: f64,
    /// Upper end of the color scale in dBm.
    pub max_signal_dbm: f64,
    /// Outdoor-to-indoor attenuation per meter of ground-projected penetration depth.
    pub outdoor_to_indoor_db_per_m: f64,
    /// Base opacity for volumetric samples before strength scaling.
    pub volume_opacity: f64,
    /// Opacity of the ground-plane mesh.
    pub ground_opacity: f64,
    /// Seed for the shadowing generator. `None` draws a fresh seed per run.
    pub shadowing_seed: Option<u64>,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            frequency_ghz: 2.6,
            tx_power_dbm: 43.0,
            tx_gain_dbi: 15.0,
            rx_gain_dbi: 0.0,
            shadowing_sigma_los: 4.0,
            shadowing_sigma_nlos: 6.0,
            min_signal_dbm: -110.0,
            max_signal_dbm: -40.0,
            outdoor_to_indoor_db_per_m: 0.5,
            volume_opacity: 0.15,
            ground_opacity: 0.6,
            shadowing_seed: None,
        }
    }
}

impl PropagationConfig {
    /// Load configuration from a TOML file. Missing keys fall back to the defaults.
    pub fn load(config_path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let content = std::fs::read_to_string(config_path).with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        let config: PropagationConfig = toml::from_str(&content).with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Derive the config path from a scene file path.
    ///
    /// Replaces the scene filename with `propagation.toml` in the same directory.
    pub fn config_path_from_scene(scene_path: &Path) -> std::path::PathBuf {
        scene_path.parent().unwrap_or(Path::new(".")).join(DEFAULT_CONFIG_FILE)
    }

    /// Same config with both shadowing deviations set to zero.
    pub fn without_shadowing(&self) -> Self {
        Self {
            shadowing_sigma_los: 0.0,
            shadowing_sigma_nlos: 0.0,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), PropagationError> {
        let finite = [
            ("frequency-ghz", self.frequency_ghz),
            ("tx-power-dbm", self.tx_power_dbm),
            ("tx-gain-dbi", self.tx_gain_dbi),
            ("rx-gain-dbi", self.rx_gain_dbi),
            ("shadowing-sigma-los", self.shadowing_sigma_los),
            ("shadowing-sigma-nlos", self.shadowing_sigma_nlos),
            ("min-signal-dbm", self.min_signal_dbm),
            ("max-signal-dbm", self.max_signal_dbm),
            ("outdoor-to-indoor-db-per-m", self.outdoor_to_indoor_db_per_m),
            ("volume-opacity", self.volume_opacity),
            ("ground-opacity", self.ground_opacity),
        ];
        if let Some((name, value)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(PropagationError::InvalidConfig(format!("{} must be finite, got {}", name, value)));
        }
        if self.frequency_ghz <= 0.0 {
            return Err(PropagationError::InvalidConfig(format!("frequency-ghz must be positive, got {}", self.frequency_ghz)));
        }
        if self.shadowing_sigma_los < 0.0 || self.shadowing_sigma_nlos < 0.0 {
            return Err(PropagationError::InvalidConfig("shadowing sigmas must be non-negative".to_string()));
        }
        if self.min_signal_dbm >= self.max_signal_dbm {
            return Err(PropagationError::InvalidConfig(format!(
                "min-signal-dbm {} must be below max-signal-dbm {}",
                self.min_signal_dbm, self.max_signal_dbm
            )));
        }
        if self.outdoor_to_indoor_db_per_m < 0.0 {
            return Err(PropagationError::InvalidConfig("outdoor-to-indoor-db-per-m must be non-negative".to_string()));
        }
        for (name, value) in [("volume-opacity", self.volume_opacity), ("ground-opacity", self.ground_opacity)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PropagationError::InvalidConfig(format!("{} must be within 0-1, got {}", name, value)));
            }
        }
        Ok(())
    }
}
