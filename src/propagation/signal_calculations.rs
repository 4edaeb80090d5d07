//! Radio path loss calculations.
//!
//! Contains helpers for:
//! - 3GPP Urban Macro (UMa) path loss, LOS and NLOS, with log-normal shadowing
//! - Box–Muller shadowing draws from a uniform source
//! - The indoor decomposition: building loss, outdoor-to-indoor loss and wall penetration
//! - Received power and dBm/mW conversions
//!
//! Units:
//! - Power: dBm, mW (conversion provided)
//! - Gain and loss: dB / dBi
//! - Distance: meters, frequency: GHz

use rand::Rng;
use rand_distr::{Distribution, OpenClosed01, Standard};
use serde::Serialize;
use std::f64::consts::PI;

use crate::common::config::PropagationConfig;

use super::geometry::Vec3;

/// Receiver (user terminal) height above ground assumed by the UMa model, in meters.
pub const RX_HEIGHT: f64 = 1.5;

/// Distances are clamped to this before taking logarithms.
pub const MIN_DISTANCE: f64 = 1e-3;

/// Normal-variate source used for shadowing.
///
/// Each draw consumes two uniforms and applies the Box–Muller transform, keeping only
/// the cosine branch.
pub struct Shadowing<R> {
    rng: R,
}

impl<R: Rng> Shadowing<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Sample from N(mean, std_dev). A zero deviation returns `mean` without drawing.
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        if std_dev <= 0.0 {
            return mean;
        }
        // u1 in (0, 1] keeps ln(u1) finite
        let u1: f64 = OpenClosed01.sample(&mut self.rng);
        let u2: f64 = Standard.sample(&mut self.rng);
        let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        mean + z0 * std_dev
    }
}

/// Deterministic part of the 3GPP UMa path loss in dB.
///
/// # Formula
///
/// ```text
/// d2D  = sqrt(d3D² − (h_BS − 1.5)²)
/// dBP  = 4 · h_BS · 1.5 / 0.2
/// LOS  : 28.0 + 22·log10(d3D) + 20·log10(fc)                               (d2D ≤ dBP)
///        28.0 + 40·log10(d3D) + 20·log10(fc) − 9·log10(dBP² + (h_BS−1.5)²)   (d2D > dBP)
/// NLOS : max(PL_LOS, 13.54 + 39.08·log10(d3D) + 20·log10(fc))
/// ```
///
/// The NLOS branch is floored by the LOS value as in 3GPP TR 38.901; the two only
/// differ below ~7 m where the NLOS fit undershoots free-space-like loss.
pub fn uma_path_loss(distance_3d: f64, line_of_sight: bool, tx_height: f64, frequency_ghz: f64) -> f64 {
    let d3 = distance_3d.max(MIN_DISTANCE);
    let dh = tx_height - RX_HEIGHT;
    let d2 = (d3 * d3 - dh * dh).max(0.0).sqrt();
    let frequency_term = 20.0 * frequency_ghz.max(MIN_DISTANCE).log10();

    let breakpoint = 4.0 * tx_height * RX_HEIGHT / 0.2;
    let los = if d2 <= breakpoint {
        28.0 + 22.0 * d3.log10() + frequency_term
    } else {
        28.0 + 40.0 * d3.log10() + frequency_term - 9.0 * (breakpoint * breakpoint + dh * dh).log10()
    };
    if line_of_sight {
        return los;
    }
    let nlos = 13.54 + 39.08 * d3.log10() + frequency_term;
    nlos.max(los)
}

/// Outdoor path loss including a shadowing draw from the config's LOS or NLOS sigma.
pub fn outdoor_path_loss<R: Rng>(distance_3d: f64, line_of_sight: bool, tx_height: f64, config: &PropagationConfig, shadowing: &mut Shadowing<R>) -> f64 {
    let sigma = if line_of_sight { config.shadowing_sigma_los } else { config.shadowing_sigma_nlos };
    uma_path_loss(distance_3d, line_of_sight, tx_height, config.frequency_ghz) + shadowing.normal(0.0, sigma)
}

/// Fixed wall-penetration loss in dB, independent of distance.
///
/// ```text
/// PL_tw = 5 − 10·log10(0.3·10^(−(2 + 0.2·fc)/10) + 0.7·10^(−(5 + 4·fc)/10))
/// ```
pub fn through_wall_loss(frequency_ghz: f64) -> f64 {
    let glass = 0.3 * 10f64.powf(-(2.0 + 0.2 * frequency_ghz) / 10.0);
    let concrete = 0.7 * 10f64.powf(-(5.0 + 4.0 * frequency_ghz) / 10.0);
    5.0 - 10.0 * (glass + concrete).log10()
}

/// Components of the path loss to a point inside a building.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndoorLoss {
    pub total: f64,
    /// Outdoor NLOS loss over the full 3D distance.
    pub pl_building: f64,
    /// Attenuation over the ground-projected penetration depth.
    pub pl_outdoor_to_indoor: f64,
    pub pl_throughwall: f64,
}

/// Path loss for an indoor sample.
///
/// `penetration_3d` is the distance from the sample to the first building boundary
/// along the ray toward the transmitter (0 when there is none). It is scaled to its
/// ground-plane equivalent by the ratio of horizontal to 3D distance.
pub fn indoor_path_loss<R: Rng>(
    distance_3d: f64,
    point: Vec3,
    tx_position: Vec3,
    tx_height: f64,
    penetration_3d: f64,
    config: &PropagationConfig,
    shadowing: &mut Shadowing<R>,
) -> IndoorLoss {
    let pl_building = outdoor_path_loss(distance_3d, false, tx_height, config, shadowing);
    let pl_throughwall = through_wall_loss(config.frequency_ghz);

    let total_3d = distance_3d.max(MIN_DISTANCE);
    let ratio = point.horizontal_distance(tx_position) / total_3d;
    let depth_2d = ratio * penetration_3d.max(0.0);
    let pl_outdoor_to_indoor = config.outdoor_to_indoor_db_per_m * depth_2d;

    IndoorLoss {
        total: pl_building + pl_outdoor_to_indoor + pl_throughwall,
        pl_building,
        pl_outdoor_to_indoor,
        pl_throughwall,
    }
}

/// Received power in dBm for a given antenna gain toward the receiver.
///
/// Formula: P_rx(dBm) = P_tx(dBm) + G_tx(dBi) + G_rx(dBi) − PL(dB)
pub fn received_power(config: &PropagationConfig, tx_gain_dbi: f64, path_loss_db: f64) -> f64 {
    config.tx_power_dbm + tx_gain_dbi + config.rx_gain_dbi - path_loss_db
}

/// Convert power from dBm to milliwatts: `P(mW) = 10^(P(dBm) / 10)`.
pub fn dbm_to_mw(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}

/// Convert power from milliwatts to dBm: `P(dBm) = 10 × log₁₀(P(mW))`.
///
/// Non-positive input yields −∞ or NaN.
pub fn mw_to_dbm(mw: f64) -> f64 {
    10.0 * mw.log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn path_loss_is_monotonic_in_distance() {
        for los in [true, false] {
            for tx_height in [10.0, 25.0, 50.0] {
                let mut previous = f64::NEG_INFINITY;
                let mut d = 1.0;
                while d < 20_000.0 {
                    let pl = uma_path_loss(d, los, tx_height, 2.6);
                    assert!(pl >= previous - 1e-9, "los={} h={} d={} pl={} prev={}", los, tx_height, d, pl, previous);
                    previous = pl;
                    d *= 1.05;
                }
            }
        }
    }

    #[test]
    fn los_never_exceeds_nlos() {
        for fc in [0.8, 2.6, 3.5, 6.0] {
            let mut d = 0.5;
            while d < 10_000.0 {
                assert!(uma_path_loss(d, true, 25.0, fc) <= uma_path_loss(d, false, 25.0, fc));
                d *= 1.1;
            }
        }
    }

    #[test]
    fn los_is_continuous_at_breakpoint() {
        let h: f64 = 25.0;
        let dbp = 4.0 * h * RX_HEIGHT / 0.2;
        let d3_at_bp = (dbp * dbp + (h - RX_HEIGHT).powi(2)).sqrt();
        let before = uma_path_loss(d3_at_bp - 1e-6, true, h, 2.6);
        let after = uma_path_loss(d3_at_bp + 1e-6, true, h, 2.6);
        assert!((before - after).abs() < 1e-3);
    }

    #[test]
    fn zero_distance_is_finite() {
        assert!(uma_path_loss(0.0, true, 25.0, 2.6).is_finite());
        assert!(uma_path_loss(0.0, false, 25.0, 2.6).is_finite());
        assert!(uma_path_loss(-3.0, false, 25.0, 2.6).is_finite());
    }

    #[test]
    fn reference_link_budget() {
        let d3 = (100.0f64.powi(2) + 25.0f64.powi(2)).sqrt();
        let pl = uma_path_loss(d3, true, 25.0, 2.6);
        let expected = 28.0 + 22.0 * d3.log10() + 20.0 * 2.6f64.log10();
        assert!((pl - expected).abs() < 1e-9);
        let strength = received_power(&PropagationConfig::default(), 15.0, pl);
        assert!((strength + 22.9).abs() < 0.5, "strength {}", strength);
    }

    #[test]
    fn shadowing_matches_requested_deviation() {
        let mut shadowing = Shadowing::new(StdRng::seed_from_u64(11));
        let n = 20_000;
        let draws: Vec<f64> = (0..n).map(|_| shadowing.normal(0.0, 4.0)).collect();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.15, "mean {}", mean);
        assert!((var.sqrt() - 4.0).abs() < 0.15, "std {}", var.sqrt());
        assert!(draws.iter().all(|d| d.is_finite()));
        assert_eq!(shadowing.normal(3.0, 0.0), 3.0);
    }

    #[test]
    fn seeded_shadowing_is_reproducible() {
        let mut a = Shadowing::new(StdRng::seed_from_u64(5));
        let mut b = Shadowing::new(StdRng::seed_from_u64(5));
        for _ in 0..10 {
            assert_eq!(a.normal(0.0, 6.0), b.normal(0.0, 6.0));
        }
    }

    #[test]
    fn through_wall_loss_at_reference_frequency() {
        // 0.3·10^(−0.252) + 0.7·10^(−1.54) ≈ 0.16798 + 0.02019
        let expected = 5.0 - 10.0 * (0.3 * 10f64.powf(-0.252) + 0.7 * 10f64.powf(-1.54)).log10();
        assert!((through_wall_loss(2.6) - expected).abs() < 1e-12);
        assert!((through_wall_loss(2.6) - 12.26).abs() < 0.05);
    }

    #[test]
    fn indoor_decomposition_sums_to_total() {
        let config = PropagationConfig::default().without_shadowing();
        let mut shadowing = Shadowing::new(StdRng::seed_from_u64(1));
        let tx = Vec3::new(0.0, 25.0, 0.0);
        let point = Vec3::new(80.0, 5.0, 60.0);
        let d3 = point.distance(tx);
        let loss = indoor_path_loss(d3, point, tx, 25.0, 4.0, &config, &mut shadowing);

        assert!((loss.total - (loss.pl_building + loss.pl_outdoor_to_indoor + loss.pl_throughwall)).abs() < 1e-9);
        assert!((loss.pl_building - uma_path_loss(d3, false, 25.0, 2.6)).abs() < 1e-9);
        let expected_o2i = 0.5 * 4.0 * point.horizontal_distance(tx) / d3;
        assert!((loss.pl_outdoor_to_indoor - expected_o2i).abs() < 1e-9);

        let shallow = indoor_path_loss(d3, point, tx, 25.0, 0.0, &config, &mut shadowing);
        assert_eq!(shallow.pl_outdoor_to_indoor, 0.0);
    }

    #[test]
    fn dbm_mw_conversion_roundtrip_reasonable() {
        for v in [-100.0, -50.0, 0.0, 10.0] {
            assert!((v - mw_to_dbm(dbm_to_mw(v))).abs() < 1e-9);
        }
    }
}
