//! Hop probability from the empirical rate model.
//!
//! Three regimes, selected by the gap `E12` against the distance-dependent
//! boundaries `E12_left(R) < E12_right(R)`:
//! - below `E12_left`: tunnelling fit, `p = T ½ (1 - tanh(S (E12 - V)))`
//! - above `E12_right`: transition-state theory with a Marcus barrier and
//!   a Wigner tunnelling correction
//! - in between: log-linear interpolation of the two boundary values

use crate::error::{QhopError, Result};
use crate::params::QhopParameters;
use hopmd_md::units::{BOLTZ, PLANCK};
use serde::{Deserialize, Serialize};

/// Regime the probability was computed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    Schroedinger,
    Intermediate,
    Tst,
}

/// Probability of a hop over one cycle, and where it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateEvaluation {
    pub regime: Regime,
    pub probability: f64,
}

/// Turns an energy gap into a hop probability.
pub trait RateModel {
    fn probability(&self, params: &QhopParameters, e12: f64, rda: f64) -> Result<RateEvaluation>;
}

/// The three-regime empirical model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmpiricalRate {
    /// Temperature (K).
    pub temperature: f64,
    /// MD time step (ps).
    pub dt: f64,
    /// Steps between hop cycles.
    pub qhopfreq: u64,
}

impl EmpiricalRate {
    pub fn new(temperature: f64, dt: f64, qhopfreq: u64) -> Self {
        Self {
            temperature,
            dt,
            qhopfreq,
        }
    }

    fn kt(&self) -> f64 {
        BOLTZ * self.temperature
    }

    /// Marcus barrier for gap `e12` given the zero-gap barrier `emb`.
    pub fn barrier(e12: f64, emb: f64) -> f64 {
        if emb <= 0.0 {
            return e12.max(0.0);
        }
        if e12 > 4.0 * emb {
            e12
        } else if e12 < -4.0 * emb {
            0.0
        } else {
            let f = 1.0 + e12 / (4.0 * emb);
            emb * f * f
        }
    }

    /// Transition-state rate (1/ps).
    pub fn tst_rate(&self, params: &QhopParameters, e12: f64, rda: f64) -> f64 {
        let kt = self.kt();
        let eb = Self::barrier(e12, params.barrier_at_zero_gap(rda));
        let hw = params.hbar_omega(rda) / kt;
        let kappa = 1.0 + hw * hw / 24.0;
        kappa * kt / PLANCK * (-eb / kt).exp()
    }

    /// Probability of at least one transition-state hop over `qhopfreq` steps.
    pub fn tst_probability(&self, params: &QhopParameters, e12: f64, rda: f64) -> f64 {
        let per_step = (self.tst_rate(params, e12, rda) * self.dt).min(1.0);
        1.0 - (1.0 - per_step).powf(self.qhopfreq as f64)
    }

    /// Tunnelling-regime probability over `qhopfreq` steps.
    pub fn schroedinger_probability(&self, params: &QhopParameters, e12: f64, rda: f64) -> f64 {
        let s = params.s.eval(rda);
        let t = params.t.eval(rda);
        let v = params.v.eval(rda);
        let p = t * 0.5 * (1.0 - (s * (e12 - v)).tanh());
        (p * self.qhopfreq as f64).clamp(0.0, 1.0)
    }

    /// Log-linear interpolation between the boundary probabilities.
    pub fn interpolated_probability(&self, params: &QhopParameters, e12: f64, rda: f64) -> f64 {
        let (left, right) = params.boundaries(rda);
        let p_left = self.schroedinger_probability(params, left, rda);
        let p_right = self.tst_probability(params, right, rda);
        let w = (e12 - left) / (right - left);
        if p_left > 0.0 && p_right > 0.0 {
            (p_left.ln() + w * (p_right.ln() - p_left.ln())).exp()
        } else {
            p_left + w * (p_right - p_left)
        }
    }
}

impl RateModel for EmpiricalRate {
    fn probability(&self, params: &QhopParameters, e12: f64, rda: f64) -> Result<RateEvaluation> {
        let (left, right) = params.boundaries(rda);
        if left >= right {
            return Err(QhopError::InvalidBoundaries {
                donor: String::new(),
                acceptor: String::new(),
                rda,
                left,
                right,
            });
        }
        let (regime, probability) = if e12 > right {
            (Regime::Tst, self.tst_probability(params, e12, rda))
        } else if e12 < left {
            (Regime::Schroedinger, self.schroedinger_probability(params, e12, rda))
        } else {
            (Regime::Intermediate, self.interpolated_probability(params, e12, rda))
        };
        Ok(RateEvaluation { regime, probability })
    }
}
