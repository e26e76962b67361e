//! Empirical rate-model coefficients for one donor/acceptor pair.

use serde::{Deserialize, Serialize};

/// `c₀ + c₁R + c₂R²`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quadratic(pub [f64; 3]);

impl Quadratic {
    pub fn eval(&self, r: f64) -> f64 {
        let [c0, c1, c2] = self.0;
        c0 + r * (c1 + r * c2)
    }
}

/// Coefficients keyed by a donor/acceptor subtype pair.
///
/// Energies in kJ/mol, distances in nm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QhopParameters {
    /// Gap correction `alpha + beta R + gamma R²`.
    #[serde(default)]
    pub alpha: f64,
    #[serde(default)]
    pub beta: f64,
    #[serde(default)]
    pub gamma: f64,
    /// Barrier at zero gap, `k_1 exp(-k_2 (R - 0.20)) + k_3`.
    pub k_1: f64,
    pub k_2: f64,
    pub k_3: f64,
    /// Zero-point frequency ħω, `m_1 exp(-m_2 (R - 0.20)) + m_3`.
    pub m_1: f64,
    pub m_2: f64,
    pub m_3: f64,
    /// Steepness of the tunnelling switch.
    pub s: Quadratic,
    /// Plateau of the tunnelling probability.
    pub t: Quadratic,
    /// Midpoint of the tunnelling switch.
    pub v: Quadratic,
    /// Below this gap the tunnelling regime applies.
    pub e12_left: Quadratic,
    /// Above this gap the transition-state regime applies.
    pub e12_right: Quadratic,
}

/// Reference donor-acceptor distance of the exponential fits (nm).
pub const R_REF: f64 = 0.20;

impl QhopParameters {
    /// Empirical correction added to the force-field gap.
    pub fn gap_correction(&self, r: f64) -> f64 {
        self.alpha + self.beta * r + self.gamma * r * r
    }

    /// Barrier height at `E12 = 0`.
    pub fn barrier_at_zero_gap(&self, r: f64) -> f64 {
        self.k_1 * (-self.k_2 * (r - R_REF)).exp() + self.k_3
    }

    /// Zero-point energy ħω of the transferring proton.
    pub fn hbar_omega(&self, r: f64) -> f64 {
        self.m_1 * (-self.m_2 * (r - R_REF)).exp() + self.m_3
    }

    /// Regime boundaries `(E12_left, E12_right)` at distance `r`.
    pub fn boundaries(&self, r: f64) -> (f64, f64) {
        (self.e12_left.eval(r), self.e12_right.eval(r))
    }
}
