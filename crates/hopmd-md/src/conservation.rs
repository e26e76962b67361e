//! Conservation law monitoring for MD runs.
//!
//! Tracks total energy, linear momentum and angular momentum to detect
//! numerical drift, thermostat leaks and rescaling errors.

use hopmd_math::Vec3;

/// Total linear momentum: Σ m_i v_i.
pub fn total_momentum(masses: &[f64], v: &[Vec3]) -> Vec3 {
    masses
        .iter()
        .zip(v)
        .fold(Vec3::zeros(), |acc, (&m, vi)| acc + vi * m)
}

/// Total angular momentum about the origin: Σ x_i × m_i v_i.
pub fn total_angular_momentum(masses: &[f64], x: &[Vec3], v: &[Vec3]) -> Vec3 {
    masses
        .iter()
        .zip(x.iter().zip(v))
        .fold(Vec3::zeros(), |acc, (&m, (xi, vi))| acc + xi.cross(&(vi * m)))
}

/// Baseline conservation quantities to track drift.
#[derive(Debug, Clone)]
pub struct ConservationState {
    pub baseline_energy: f64,
    pub baseline_momentum: Vec3,
    pub baseline_angular_momentum: Vec3,
}

impl ConservationState {
    /// Record the baseline from a total energy and the current velocities.
    pub fn new(total_energy: f64, masses: &[f64], x: &[Vec3], v: &[Vec3]) -> Self {
        Self {
            baseline_energy: total_energy,
            baseline_momentum: total_momentum(masses, v),
            baseline_angular_momentum: total_angular_momentum(masses, x, v),
        }
    }
}

/// Conservation errors at the current step.
#[derive(Debug, Clone)]
pub struct ConservationMonitor {
    /// Relative energy error |E - E₀| / |E₀|, absolute when E₀ ≈ 0.
    pub energy_error: f64,
    pub momentum_error: Vec3,
    pub angular_momentum_error: Vec3,
}

impl ConservationMonitor {
    pub fn check(
        baseline: &ConservationState,
        total_energy: f64,
        masses: &[f64],
        x: &[Vec3],
        v: &[Vec3],
    ) -> Self {
        let delta = (total_energy - baseline.baseline_energy).abs();
        let energy_error = if baseline.baseline_energy.abs() > 1e-12 {
            delta / baseline.baseline_energy.abs()
        } else {
            delta
        };

        Self {
            energy_error,
            momentum_error: total_momentum(masses, v) - baseline.baseline_momentum,
            angular_momentum_error: total_angular_momentum(masses, x, v)
                - baseline.baseline_angular_momentum,
        }
    }

    /// True if any law is violated beyond its tolerance.
    pub fn is_violated(&self, energy_tol: f64, momentum_tol: f64, ang_momentum_tol: f64) -> bool {
        self.energy_error > energy_tol
            || self.momentum_error.norm() > momentum_tol
            || self.angular_momentum_error.norm() > ang_momentum_tol
    }
}
