//! Directional antenna gain.
//!
//! The gain toward a sample depends only on the horizontal bearing from the antenna
//! to the sample. Azimuth is measured clockwise from north: 0° points along +Z,
//! 90° along +X. The angle fed to the pattern is the undirected angle between the
//! bearing and the boresight, always within [0°, 180°].

use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

use super::geometry::Vec3;

/// Below this horizontal distance (1 mm) the bearing is undefined.
const MIN_BEARING_DISTANCE: f64 = 0.001;

/// Side-lobe floor of the sectoral pattern relative to max gain (−20 dB).
const SIDE_LOBE_FACTOR: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GainPattern {
    Omnidirectional,
    Cardioid,
    /// Sectoral pattern: cosine-squared main lobe with a flat side-lobe floor.
    #[default]
    Parabolic,
}

/// Undirected angle in radians between the antenna boresight and the bearing from
/// `tx` to `point`. `None` when the point sits on the antenna's vertical axis.
pub fn off_boresight_angle(point: Vec3, tx: Vec3, azimuth_deg: f64) -> Option<f64> {
    let dx = point.x - tx.x;
    let dz = point.z - tx.z;
    let len = (dx * dx + dz * dz).sqrt();
    if !(len >= MIN_BEARING_DISTANCE) {
        return None;
    }
    let azimuth = azimuth_deg.to_radians();
    let dot = (azimuth.sin() * dx + azimuth.cos() * dz) / len;
    Some(dot.clamp(-1.0, 1.0).acos())
}

/// Pattern value for an off-boresight angle in radians.
pub fn pattern_gain(angle_rad: f64, beamwidth_deg: f64, max_gain_dbi: f64, pattern: GainPattern) -> f64 {
    match pattern {
        GainPattern::Omnidirectional => max_gain_dbi,
        GainPattern::Cardioid => max_gain_dbi * (1.0 + angle_rad.cos()) / 2.0,
        GainPattern::Parabolic => {
            let half_beam = beamwidth_deg / 2.0;
            let angle_deg = angle_rad.to_degrees();
            if angle_deg <= half_beam {
                let normalized = angle_deg / half_beam * FRAC_PI_2;
                max_gain_dbi * normalized.cos().powi(2)
            } else {
                max_gain_dbi * SIDE_LOBE_FACTOR
            }
        }
    }
}

/// Gain in dBi toward `point` for an antenna at `tx`.
///
/// A point directly below or above the antenna has no bearing and receives the full
/// `max_gain_dbi`.
pub fn directional_gain(point: Vec3, tx: Vec3, azimuth_deg: f64, beamwidth_deg: f64, max_gain_dbi: f64, pattern: GainPattern) -> f64 {
    match off_boresight_angle(point, tx, azimuth_deg) {
        Some(angle) => pattern_gain(angle, beamwidth_deg, max_gain_dbi, pattern),
        None => max_gain_dbi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const TX: Vec3 = Vec3::new(0.0, 25.0, 0.0);

    #[test]
    fn omnidirectional_is_constant() {
        for deg in (0..360).step_by(15) {
            let a = (deg as f64).to_radians();
            let p = Vec3::new(100.0 * a.sin(), 0.0, 100.0 * a.cos());
            assert_eq!(directional_gain(p, TX, 37.0, 65.0, 15.0, GainPattern::Omnidirectional), 15.0);
        }
    }

    #[test]
    fn parabolic_boresight_and_back_lobe() {
        assert!((pattern_gain(0.0, 120.0, 15.0, GainPattern::Parabolic) - 15.0).abs() < 1e-12);
        assert!((pattern_gain(PI, 120.0, 15.0, GainPattern::Parabolic) - 0.15).abs() < 1e-12);
        assert!((pattern_gain(PI, 359.0, 15.0, GainPattern::Parabolic) - 0.15).abs() < 1e-12);
        // Main lobe tapers to zero at its edge
        assert!(pattern_gain(59.999f64.to_radians(), 120.0, 15.0, GainPattern::Parabolic).abs() < 1e-6);
    }

    #[test]
    fn cardioid_halves_at_right_angle() {
        assert!((pattern_gain(0.0, 0.0, 10.0, GainPattern::Cardioid) - 10.0).abs() < 1e-12);
        assert!((pattern_gain(FRAC_PI_2, 0.0, 10.0, GainPattern::Cardioid) - 5.0).abs() < 1e-12);
        assert!(pattern_gain(PI, 0.0, 10.0, GainPattern::Cardioid).abs() < 1e-12);
    }

    #[test]
    fn azimuth_follows_compass_convention() {
        let east = Vec3::new(50.0, 0.0, 0.0);
        let north = Vec3::new(0.0, 0.0, 50.0);
        assert!(off_boresight_angle(east, TX, 90.0).unwrap().abs() < 1e-9);
        assert!(off_boresight_angle(north, TX, 0.0).unwrap().abs() < 1e-9);
        assert!((off_boresight_angle(north, TX, 180.0).unwrap() - PI).abs() < 1e-9);
        // Undirected: 90° either side gives the same angle
        let west = Vec3::new(-50.0, 0.0, 0.0);
        let a = off_boresight_angle(east, TX, 0.0).unwrap();
        let b = off_boresight_angle(west, TX, 0.0).unwrap();
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn point_under_antenna_gets_max_gain() {
        let below = Vec3::new(0.0005, 0.0, 0.0);
        assert_eq!(directional_gain(below, TX, 0.0, 30.0, 17.0, GainPattern::Parabolic), 17.0);
        assert!(off_boresight_angle(below, TX, 0.0).is_none());
    }
}
