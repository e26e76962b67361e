//! Constraint solver front end.
//!
//! [`ConstraintSolver`] owns the per-algorithm state, applies pair
//! constraints (SHAKE or LINCS) followed by SETTLE, and turns the
//! accumulated `Σ r ⊗ m Δx` into the constraint virial.

use crate::error::{ConstraintError, Result};
use crate::lincs::{Lincs, LincsDeviation};
use crate::settle::Settle;
use crate::shake::Shake;
use crate::topology::{ConstraintTopology, DeviationStats, deviation_stats};
use hopmd_math::{Mat3, SimBox, Vec3};
use serde::{Deserialize, Serialize};

/// Algorithm used for pair constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmKind {
    Shake,
    #[default]
    Lincs,
}

/// Constraint solver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintParams {
    #[serde(default)]
    pub algorithm: AlgorithmKind,
    /// Relative SHAKE tolerance.
    #[serde(default = "default_shake_tol")]
    pub shake_tol: f64,
    #[serde(default = "default_shake_max_iter")]
    pub shake_max_iter: usize,
    /// Successive over-relaxation factor for SHAKE.
    #[serde(default = "default_shake_sor_omega")]
    pub shake_sor_omega: f64,
    /// Order of the LINCS matrix expansion.
    #[serde(default = "default_lincs_order")]
    pub lincs_order: usize,
    /// Number of LINCS rotation corrections.
    #[serde(default = "default_lincs_iter")]
    pub lincs_iter: usize,
    /// Bond rotation (degrees) above which LINCS warns.
    #[serde(default = "default_lincs_warn_angle")]
    pub lincs_warn_angle: f64,
}

fn default_shake_tol() -> f64 {
    1e-4
}

fn default_shake_max_iter() -> usize {
    1000
}

fn default_shake_sor_omega() -> f64 {
    1.0
}

fn default_lincs_order() -> usize {
    4
}

fn default_lincs_iter() -> usize {
    1
}

fn default_lincs_warn_angle() -> f64 {
    30.0
}

impl Default for ConstraintParams {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmKind::default(),
            shake_tol: default_shake_tol(),
            shake_max_iter: default_shake_max_iter(),
            shake_sor_omega: default_shake_sor_omega(),
            lincs_order: default_lincs_order(),
            lincs_iter: default_lincs_iter(),
            lincs_warn_angle: default_lincs_warn_angle(),
        }
    }
}

/// Read-only inputs shared by the algorithms during one call.
pub(crate) struct SolveContext<'a> {
    pub invmass: &'a [f64],
    /// Target length per pair constraint at the current λ.
    pub lengths: &'a [f64],
    pub inv_dt2: f64,
    pub pbc: &'a SimBox,
}

impl<'a> SolveContext<'a> {
    pub fn new(invmass: &'a [f64], lengths: &'a [f64], dt: f64, pbc: &'a SimBox) -> Self {
        Self {
            invmass,
            lengths,
            inv_dt2: 1.0 / (dt * dt),
            pbc,
        }
    }
}

/// Quantities accumulated by the algorithms during one call.
#[derive(Debug, Clone, Default)]
pub(crate) struct StepAccumulator {
    /// `Σ r ⊗ m Δx` over all displaced atoms.
    pub r_m_dr: Mat3,
    pub dvdlambda: f64,
    pub iterations: usize,
    pub warnings: Vec<RotationWarning>,
    pub lincs_deviation: Option<LincsDeviation>,
}

/// A bond that rotated more than the warning angle in one step.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationWarning {
    pub constraint: usize,
    pub ai: usize,
    pub aj: usize,
    pub angle_deg: f64,
    pub old_length: f64,
    pub new_length: f64,
    pub target_length: f64,
}

/// Result of one constraint call.
#[derive(Debug, Clone, Default)]
pub struct ConstraintOutput {
    /// Constraint contribution to the virial, `-½ Σ r ⊗ f_c`.
    pub virial: Mat3,
    /// ∂V/∂λ from perturbed constraint lengths.
    pub dvdlambda: f64,
    /// Maximum SHAKE iterations used over all blocks.
    pub iterations: usize,
    pub rotation_warnings: Vec<RotationWarning>,
    pub lincs_deviation: Option<LincsDeviation>,
}

/// One constraint back end with its precomputed data.
#[derive(Debug, Clone)]
pub enum ConstraintAlgorithm {
    Shake(Shake),
    Lincs(Lincs),
    Settle(Settle),
}

impl ConstraintAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            ConstraintAlgorithm::Shake(_) => "SHAKE",
            ConstraintAlgorithm::Lincs(_) => "LINCS",
            ConstraintAlgorithm::Settle(_) => "SETTLE",
        }
    }

    pub(crate) fn solve(
        &mut self,
        topology: &ConstraintTopology,
        ctx: &SolveContext<'_>,
        x_old: &[Vec3],
        x_new: &mut [Vec3],
        acc: &mut StepAccumulator,
    ) -> Result<()> {
        match self {
            ConstraintAlgorithm::Shake(shake) => shake.solve(topology, ctx, x_old, x_new, acc),
            ConstraintAlgorithm::Lincs(lincs) => lincs.solve(topology, ctx, x_old, x_new, acc),
            ConstraintAlgorithm::Settle(settle) => settle.solve(ctx, x_old, x_new, acc),
        }
    }
}

/// Applies all holonomic constraints of a system.
#[derive(Debug, Clone)]
pub struct ConstraintSolver {
    topology: ConstraintTopology,
    invmass: Vec<f64>,
    /// Pair algorithm first, SETTLE last.
    algorithms: Vec<ConstraintAlgorithm>,
    lambda: f64,
    total_warnings: usize,
}

impl ConstraintSolver {
    /// Build a solver for `topology`; `invmass` has one entry per atom
    /// (zero for frozen atoms).
    pub fn new(topology: ConstraintTopology, invmass: Vec<f64>, params: &ConstraintParams) -> Result<Self> {
        topology.validate(invmass.len())?;

        let mut algorithms = Vec::new();
        if !topology.constraints().is_empty() {
            algorithms.push(match params.algorithm {
                AlgorithmKind::Shake => ConstraintAlgorithm::Shake(Shake::new(
                    &topology,
                    &invmass,
                    params.shake_tol,
                    params.shake_max_iter,
                    params.shake_sor_omega,
                )),
                AlgorithmKind::Lincs => ConstraintAlgorithm::Lincs(Lincs::new(
                    &topology,
                    &invmass,
                    params.lincs_order,
                    params.lincs_iter,
                    params.lincs_warn_angle,
                )),
            });
        }
        if !topology.settles().is_empty() {
            algorithms.push(ConstraintAlgorithm::Settle(Settle::new(&topology, &invmass)?));
        }

        if !algorithms.is_empty() {
            let names: Vec<&str> = algorithms.iter().map(|a| a.name()).collect();
            log::info!(
                "Constraints: {} pairs, {} rigid waters, using {}",
                topology.constraints().len(),
                topology.settles().len(),
                names.join(" + ")
            );
        }

        Ok(Self {
            topology,
            invmass,
            algorithms,
            lambda: 0.0,
            total_warnings: 0,
        })
    }

    pub fn topology(&self) -> &ConstraintTopology {
        &self.topology
    }

    pub fn natoms(&self) -> usize {
        self.invmass.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topology.is_empty()
    }

    pub fn algorithms(&self) -> &[ConstraintAlgorithm] {
        &self.algorithms
    }

    /// Set the coupling parameter used to interpolate perturbed lengths.
    pub fn set_lambda(&mut self, lambda: f64) {
        self.lambda = lambda;
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Total rotation warnings issued since construction.
    pub fn total_warnings(&self) -> usize {
        self.total_warnings
    }

    /// Relative deviation of the pair constraints in `x`.
    pub fn deviation(&self, x: &[Vec3], pbc: &SimBox) -> DeviationStats {
        let lengths = self.topology.lengths(self.lambda);
        deviation_stats(self.topology.constraints(), &lengths, x, pbc)
    }

    /// Constrain `x_new` using bond directions from the reference `x_old`.
    pub fn apply(&mut self, x_old: &[Vec3], x_new: &mut [Vec3], dt: f64, pbc: &SimBox) -> Result<ConstraintOutput> {
        if x_old.len() != x_new.len() {
            return Err(ConstraintError::LengthMismatch {
                old: x_old.len(),
                new: x_new.len(),
            });
        }
        if x_new.len() != self.invmass.len() {
            return Err(ConstraintError::AtomOutOfRange {
                index: x_new.len(),
                natoms: self.invmass.len(),
            });
        }

        let lengths = self.topology.lengths(self.lambda);
        let ctx = SolveContext::new(&self.invmass, &lengths, dt, pbc);
        let mut acc = StepAccumulator::default();

        for algorithm in &mut self.algorithms {
            algorithm.solve(&self.topology, &ctx, x_old, x_new, &mut acc)?;
        }

        for w in &acc.warnings {
            log::warn!(
                "bond {} ({}-{}) rotated {:.1} degrees: previous length {:.5}, current {:.5}, constraint {:.5}",
                w.constraint,
                w.ai,
                w.aj,
                w.angle_deg,
                w.old_length,
                w.new_length,
                w.target_length
            );
        }
        self.total_warnings += acc.warnings.len();

        Ok(ConstraintOutput {
            virial: acc.r_m_dr * (-0.5 * ctx.inv_dt2),
            dvdlambda: acc.dvdlambda,
            iterations: acc.iterations,
            rotation_warnings: acc.warnings,
            lincs_deviation: acc.lincs_deviation,
        })
    }

    /// Remove velocity components along the constraints at positions `x`.
    ///
    /// Positions are advanced by `v·dt`, constrained against `x`, and the
    /// velocities are recomputed from the constrained displacement.
    pub fn constrain_velocities(
        &mut self,
        x: &[Vec3],
        v: &mut [Vec3],
        dt: f64,
        pbc: &SimBox,
    ) -> Result<ConstraintOutput> {
        let mut x_new: Vec<Vec3> = x.iter().zip(v.iter()).map(|(xi, vi)| xi + vi * dt).collect();
        let output = self.apply(x, &mut x_new, dt, pbc)?;
        let inv_dt = 1.0 / dt;
        for ((vi, xn), xo) in v.iter_mut().zip(&x_new).zip(x) {
            *vi = (xn - xo) * inv_dt;
        }
        Ok(output)
    }
}
