//! Signal strength to color mapping.
//!
//! Seven anchor colors run from red (strongest) to violet (weakest). Their dBm levels
//! split `[min_signal_dbm, max_signal_dbm]` into six equal intervals, so any change to
//! the bounds requires a new mapper.

use serde::Serialize;

use crate::common::config::PropagationConfig;

/// Linear RGB color with channels in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn to_rgb8(self) -> [u8; 3] {
        let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [channel(self.r), channel(self.g), channel(self.b)]
    }

    fn lerp(self, other: Rgb, t: f32) -> Rgb {
        Rgb::new(self.r + t * (other.r - self.r), self.g + t * (other.g - self.g), self.b + t * (other.b - self.b))
    }
}

/// Gradient anchors, strongest first.
pub const GRADIENT: [Rgb; 7] = [
    Rgb::new(1.0, 0.0, 0.0),
    Rgb::new(1.0, 0.5, 0.0),
    Rgb::new(1.0, 1.0, 0.0),
    Rgb::new(0.0, 1.0, 0.0),
    Rgb::new(0.0, 1.0, 1.0),
    Rgb::new(0.0, 0.0, 1.0),
    Rgb::new(0.5, 0.0, 1.0),
];

/// One legend entry: anchor level and its color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LegendEntry {
    pub level_dbm: f64,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorMapper {
    min_dbm: f64,
    max_dbm: f64,
    /// Anchor levels aligned with `GRADIENT`, descending.
    levels: [f64; 7],
}

impl ColorMapper {
    /// Mapper over `[min_dbm, max_dbm]`. Callers validate `min_dbm < max_dbm`.
    pub fn new(min_dbm: f64, max_dbm: f64) -> Self {
        let step = (max_dbm - min_dbm) / (GRADIENT.len() - 1) as f64;
        let mut levels = [0.0; 7];
        for (i, level) in levels.iter_mut().enumerate() {
            *level = max_dbm - step * i as f64;
        }
        levels[GRADIENT.len() - 1] = min_dbm;
        Self { min_dbm, max_dbm, levels }
    }

    pub fn from_config(config: &PropagationConfig) -> Self {
        Self::new(config.min_signal_dbm, config.max_signal_dbm)
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min_dbm, self.max_dbm)
    }

    pub fn clamp(&self, strength: f64) -> f64 {
        strength.clamp(self.min_dbm, self.max_dbm)
    }

    /// Position of `strength` within the bounds, clamped to `0.0..=1.0`.
    pub fn normalized(&self, strength: f64) -> f64 {
        ((strength - self.min_dbm) / (self.max_dbm - self.min_dbm)).clamp(0.0, 1.0)
    }

    pub fn color_for(&self, strength: f64) -> Rgb {
        if strength.is_nan() {
            return GRADIENT[GRADIENT.len() - 1];
        }
        let clamped = self.clamp(strength);
        if clamped >= self.levels[0] {
            return GRADIENT[0];
        }
        for i in 0..GRADIENT.len() - 1 {
            let (upper, lower) = (self.levels[i], self.levels[i + 1]);
            if clamped <= upper && clamped > lower {
                let ratio = ((clamped - lower) / (upper - lower)) as f32;
                return GRADIENT[i + 1].lerp(GRADIENT[i], ratio);
            }
        }
        GRADIENT[GRADIENT.len() - 1]
    }

    pub fn legend(&self) -> Vec<LegendEntry> {
        self.levels
            .iter()
            .zip(GRADIENT)
            .map(|(&level_dbm, color)| LegendEntry { level_dbm, color })
            .collect()
    }
}
