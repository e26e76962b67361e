//! Temperature and pressure coupling.
//!
//! Weak coupling (Berendsen) for both temperature and pressure, and the
//! Parrinello-Rahman extended-system barostat. Box matrices are
//! lower-triangular with box vectors as rows; coupling matrices are kept
//! lower-triangular by folding off-diagonal terms into the lower half.

use crate::units::PRESFAC;
use hopmd_math::{Mat3, SimBox, Vec3, scalar_trace};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Lower bound of the Berendsen velocity scaling factor.
pub const TC_LAMBDA_MIN: f64 = 0.8;
/// Upper bound of the Berendsen velocity scaling factor.
pub const TC_LAMBDA_MAX: f64 = 1.25;

/// Relative box change per step above which Parrinello-Rahman warns.
const PR_MAX_CHANGE: f64 = 0.01;

/// Geometry of pressure coupling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureCouplingType {
    #[default]
    Isotropic,
    /// x and y coupled together, z independently.
    Semiisotropic,
    Anisotropic,
}

/// Berendsen velocity scaling factor for one group.
///
/// `λ = sqrt(1 + dt/τ_T (T_ref/T - 1))`, clamped to
/// [[`TC_LAMBDA_MIN`], [`TC_LAMBDA_MAX`]]. No scaling for `T = 0`
/// or a non-positive `τ_T`.
pub fn berendsen_tcoupl(t: f64, t_ref: f64, tau_t: f64, dt: f64) -> f64 {
    if t <= 0.0 || tau_t <= 0.0 {
        return 1.0;
    }
    let reft = t_ref.max(0.0);
    let lambda2 = 1.0 + dt / tau_t * (reft / t - 1.0);
    lambda2.max(0.0).sqrt().clamp(TC_LAMBDA_MIN, TC_LAMBDA_MAX)
}

/// Pressure tensor `P = 2/V · PRESFAC · (E_kin - Ξ)` in bar.
pub fn calc_pressure(volume: f64, ekin: &Mat3, virial: &Mat3) -> Mat3 {
    if volume <= 0.0 {
        return Mat3::zeros();
    }
    (ekin - virial) * (2.0 * PRESFAC / volume)
}

/// Fold the upper off-diagonal elements into the lower triangle.
fn fold_lower(m: &mut Mat3) {
    for d in 0..3 {
        for n in 0..d {
            m[(d, n)] += m[(n, d)];
            m[(n, d)] = 0.0;
        }
    }
}

/// Berendsen box scaling matrix μ.
///
/// `compress` and `ref_p` are full tensors in bar⁻¹ and bar.
pub fn berendsen_pcoupl(
    kind: PressureCouplingType,
    pressure: &Mat3,
    ref_p: &Mat3,
    compress: &Mat3,
    tau_p: f64,
    dt: f64,
) -> Mat3 {
    let factor = |d: usize, n: usize| compress[(d, n)] * dt / tau_p;
    let mut mu = Mat3::zeros();
    match kind {
        PressureCouplingType::Isotropic => {
            let scalar = scalar_trace(pressure);
            for d in 0..3 {
                mu[(d, d)] = 1.0 - factor(d, d) * (ref_p[(d, d)] - scalar) / 3.0;
            }
        }
        PressureCouplingType::Semiisotropic => {
            let xy = 0.5 * (pressure[(0, 0)] + pressure[(1, 1)]);
            for d in 0..2 {
                mu[(d, d)] = 1.0 - factor(d, d) * (ref_p[(d, d)] - xy) / 3.0;
            }
            mu[(2, 2)] = 1.0 - factor(2, 2) * (ref_p[(2, 2)] - pressure[(2, 2)]) / 3.0;
        }
        PressureCouplingType::Anisotropic => {
            for d in 0..3 {
                for n in 0..3 {
                    let delta = if d == n { 1.0 } else { 0.0 };
                    mu[(d, n)] = delta - factor(d, n) * (ref_p[(d, n)] - pressure[(d, n)]) / 3.0;
                }
            }
        }
    }
    fold_lower(&mut mu);
    mu
}

/// Scale coordinates `x ← μᵀx` and the box `B ← B μ`.
pub fn berendsen_pscale(mu: &Mat3, x: &mut [Vec3], sim_box: &mut SimBox) {
    let mu_t = mu.transpose();
    for xi in x.iter_mut() {
        *xi = mu_t * *xi;
    }
    sim_box.scale(mu);
}

/// Parrinello-Rahman box dynamics.
#[derive(Clone, Debug)]
pub struct ParrinelloRahman {
    /// Box velocity, lower-triangular (nm/ps).
    pub boxv: Mat3,
}

/// Result of one Parrinello-Rahman coupling call.
#[derive(Clone, Debug, PartialEq)]
pub struct PrCoupling {
    /// Velocity coupling matrix for the leapfrog update.
    pub m: Mat3,
    /// Coordinate scaling matrix for this step.
    pub mu: Mat3,
    /// Largest relative box change of the step.
    pub max_change: f64,
}

impl Default for ParrinelloRahman {
    fn default() -> Self {
        Self {
            boxv: Mat3::zeros(),
        }
    }
}

impl ParrinelloRahman {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the box velocity from the pressure and return M and μ.
    ///
    /// `pressure` is `None` on the first step, where only M and μ are
    /// computed from the initial box velocity.
    #[allow(clippy::too_many_arguments)]
    pub fn couple(
        &mut self,
        kind: PressureCouplingType,
        pressure: Option<&Mat3>,
        ref_p: &Mat3,
        compress: &Mat3,
        tau_p: f64,
        dt: f64,
        sim_box: &SimBox,
        step: u64,
    ) -> PrCoupling {
        let b = sim_box.matrix;
        let Some(invbox) = sim_box.inverse() else {
            return PrCoupling {
                m: Mat3::zeros(),
                mu: Mat3::identity(),
                max_change: 0.0,
            };
        };
        let vol = sim_box.volume();
        let mut max_change = 0.0;

        if let Some(pres) = pressure {
            let maxl = sim_box.max_diagonal();
            let winv = compress * (4.0 * PI * PI / (3.0 * tau_p * tau_p * maxl));
            let pdiff = pres - ref_p;
            let mut t1 = invbox.transpose() * pdiff;
            fold_lower(&mut t1);

            match kind {
                PressureCouplingType::Anisotropic => {
                    for d in 0..3 {
                        for n in 0..=d {
                            t1[(d, n)] *= winv[(d, n)] * vol;
                        }
                    }
                }
                PressureCouplingType::Isotropic => {
                    // Total volume acceleration
                    let atot = b[(0, 0)] * b[(1, 1)] * t1[(2, 2)]
                        + b[(0, 0)] * t1[(1, 1)] * b[(2, 2)]
                        + t1[(0, 0)] * b[(1, 1)] * b[(2, 2)];
                    let arel = atot / (3.0 * vol);
                    for d in 0..3 {
                        for n in 0..=d {
                            t1[(d, n)] = winv[(0, 0)] * vol * arel * b[(d, n)];
                        }
                    }
                }
                PressureCouplingType::Semiisotropic => {
                    // Same relative acceleration for x and y
                    let atot = b[(0, 0)] * t1[(1, 1)] + t1[(0, 0)] * b[(1, 1)];
                    let arel = atot / (2.0 * b[(0, 0)] * b[(1, 1)]);
                    for d in 0..2 {
                        for n in 0..=d {
                            t1[(d, n)] = winv[(d, n)] * vol * arel * b[(d, n)];
                        }
                    }
                    for n in 0..3 {
                        t1[(2, n)] *= winv[(2, n)] * vol;
                    }
                }
            }

            for d in 0..3 {
                for n in 0..=d {
                    self.boxv[(d, n)] += dt * t1[(d, n)];
                    let change = (dt * self.boxv[(d, n)] / b[(d, d)]).abs();
                    if change > max_change {
                        max_change = change;
                    }
                }
            }
            if max_change > PR_MAX_CHANGE {
                log::warn!(
                    "step {}: pressure scaling more than {:.0}% ({:.2}%)",
                    step,
                    PR_MAX_CHANGE * 100.0,
                    max_change * 100.0
                );
            }
        }

        let t1 = self.boxv * b.transpose();
        let t2 = invbox * t1;
        let m = t2 * invbox.transpose();

        let new_box = b + self.boxv * dt;
        let mu = invbox * new_box;

        PrCoupling { m, mu, max_change }
    }

    /// Advance the box with its velocity.
    pub fn advance_box(&self, sim_box: &mut SimBox, dt: f64) {
        if sim_box.is_periodic() {
            sim_box.matrix += self.boxv * dt;
        }
    }
}

/// Build a tensor from up to six values: xx, yy, zz, xy, xz, yz.
///
/// Isotropic coupling reads one value, semiisotropic two (xy, z).
pub fn coupling_tensor(kind: PressureCouplingType, values: &[f64]) -> Mat3 {
    let get = |k: usize| values.get(k).copied().unwrap_or(0.0);
    match kind {
        PressureCouplingType::Isotropic => Mat3::from_diagonal_element(get(0)),
        PressureCouplingType::Semiisotropic => Mat3::from_diagonal(&Vec3::new(get(0), get(0), get(1))),
        PressureCouplingType::Anisotropic => Mat3::new(
            get(0),
            get(3),
            get(4),
            get(3),
            get(1),
            get(5),
            get(4),
            get(5),
            get(2),
        ),
    }
}
