//! SHAKE: iterative Gauss-Seidel bond-length correction.
//!
//! Each block of coupled constraints is swept repeatedly. For a constraint
//! with reference vector `r_ij` (old positions) and trial vector `p_ij`,
//! the correction is
//!
//! ```text
//! acor = ω (d² - p²) / (2 (1/m_i + 1/m_j) r_ij·p_ij)
//! x_i += acor r_ij / m_i,   x_j -= acor r_ij / m_j
//! ```
//!
//! A block has converged when `|p² - d²| / (2d²) < tol` for all of its
//! constraints.

use crate::error::{AtomDump, ConstraintError, Result};
use crate::solver::{SolveContext, StepAccumulator};
use crate::topology::ConstraintTopology;
use hopmd_math::{Vec3, outer};

/// Guards against reference and trial vectors that are (nearly) perpendicular.
const ROTATION_TOLERANCE: f64 = 1e-10;

/// SHAKE solver state.
#[derive(Clone, Debug)]
pub struct Shake {
    blocks: Vec<Vec<usize>>,
    /// `0.5 / (1/m_i + 1/m_j)` per constraint; zero for fully frozen pairs.
    half_reduced_mass: Vec<f64>,
    tolerance: f64,
    max_iterations: usize,
    omega: f64,
    /// Accumulated scaled Lagrange multipliers of the last solve.
    lagrange: Vec<f64>,
}

impl Shake {
    pub fn new(
        topology: &ConstraintTopology,
        invmass: &[f64],
        tolerance: f64,
        max_iterations: usize,
        omega: f64,
    ) -> Self {
        let half_reduced_mass = topology
            .constraints()
            .iter()
            .map(|c| {
                let w = invmass[c.ai] + invmass[c.aj];
                if w > 0.0 { 0.5 / w } else { 0.0 }
            })
            .collect();

        let blocks = topology.blocks();
        log::debug!(
            "SHAKE: {} constraints in {} blocks, tol {:e}",
            topology.constraints().len(),
            blocks.len(),
            tolerance
        );

        Self {
            blocks,
            half_reduced_mass,
            tolerance,
            max_iterations,
            omega,
            lagrange: vec![0.0; topology.constraints().len()],
        }
    }

    pub fn blocks(&self) -> &[Vec<usize>] {
        &self.blocks
    }

    /// Scaled Lagrange multipliers from the last call.
    pub fn lagrange(&self) -> &[f64] {
        &self.lagrange
    }

    pub(crate) fn solve(
        &mut self,
        topology: &ConstraintTopology,
        ctx: &SolveContext<'_>,
        x_old: &[Vec3],
        x_new: &mut [Vec3],
        acc: &mut StepAccumulator,
    ) -> Result<()> {
        let constraints = topology.constraints();
        self.lagrange.iter_mut().for_each(|l| *l = 0.0);

        // Reference vectors from the constrained positions of the previous step
        let rij: Vec<Vec3> = constraints
            .iter()
            .map(|c| ctx.pbc.dx(&x_old[c.aj], &x_old[c.ai]))
            .collect();

        for (block_index, block) in self.blocks.iter().enumerate() {
            let mut iterations = 0;
            let mut converged = false;

            while iterations < self.max_iterations {
                iterations += 1;
                let mut all_within = true;

                for &b in block {
                    let c = &constraints[b];
                    let m2 = self.half_reduced_mass[b];
                    if m2 == 0.0 {
                        continue;
                    }
                    let d = ctx.lengths[b];
                    let toler = d * d;
                    let rpij = ctx.pbc.dx(&x_new[c.aj], &x_new[c.ai]);
                    let diff = toler - rpij.norm_squared();

                    if diff.abs() < 2.0 * self.tolerance * toler {
                        continue;
                    }
                    all_within = false;

                    let rrpr = rij[b].dot(&rpij);
                    if rrpr < toler * ROTATION_TOLERANCE {
                        return Err(ConstraintError::ShakeRotation {
                            constraint: b,
                            ai: c.ai,
                            aj: c.aj,
                            dump: Box::new(AtomDump::from_atoms(
                                block.iter().flat_map(|&k| [constraints[k].ai, constraints[k].aj]),
                                x_old,
                                x_new,
                            )),
                        });
                    }

                    let acor = self.omega * diff * m2 / rrpr;
                    self.lagrange[b] += acor;
                    let xh = rij[b] * acor;
                    x_new[c.ai] += xh * ctx.invmass[c.ai];
                    x_new[c.aj] -= xh * ctx.invmass[c.aj];
                }

                if all_within {
                    converged = true;
                    break;
                }
            }

            // The last sweep may have corrected everything without being re-checked
            if !converged {
                converged = block.iter().all(|&b| {
                    let c = &constraints[b];
                    let d2 = ctx.lengths[b] * ctx.lengths[b];
                    let p2 = ctx.pbc.dx(&x_new[c.aj], &x_new[c.ai]).norm_squared();
                    self.half_reduced_mass[b] == 0.0
                        || (d2 - p2).abs() < 2.0 * self.tolerance * d2
                });
            }

            if !converged {
                let max_deviation = block
                    .iter()
                    .map(|&b| {
                        let c = &constraints[b];
                        let r = ctx.pbc.dx(&x_new[c.aj], &x_new[c.ai]).norm();
                        (r - ctx.lengths[b]).abs() / ctx.lengths[b]
                    })
                    .fold(0.0, f64::max);
                return Err(ConstraintError::ShakeNotConverged {
                    block: block_index,
                    iterations,
                    max_deviation,
                    dump: Box::new(AtomDump::from_atoms(
                        block.iter().flat_map(|&k| [constraints[k].ai, constraints[k].aj]),
                        x_old,
                        x_new,
                    )),
                });
            }

            acc.iterations = acc.iterations.max(iterations);
        }

        for (b, c) in constraints.iter().enumerate() {
            let lagr = self.lagrange[b];
            if lagr == 0.0 {
                continue;
            }
            // m_i Δx_i = acor r_ij for atom i
            acc.r_m_dr += outer(&rij[b], &(rij[b] * lagr));
            // Positive tension pulls the pair together
            let tension = -lagr * rij[b].norm() * ctx.inv_dt2;
            acc.dvdlambda += tension * (c.length_b - c.length_a);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Constraint;
    use approx::assert_relative_eq;
    use hopmd_math::SimBox;

    fn solve(
        topology: &ConstraintTopology,
        invmass: &[f64],
        x_old: &[Vec3],
        x_new: &mut [Vec3],
        tol: f64,
        max_iter: usize,
    ) -> Result<StepAccumulator> {
        let mut shake = Shake::new(topology, invmass, tol, max_iter, 1.0);
        let pbc = SimBox::open();
        let lengths = topology.lengths(0.0);
        let ctx = SolveContext::new(invmass, &lengths, 0.002, &pbc);
        let mut acc = StepAccumulator::default();
        shake.solve(topology, &ctx, x_old, x_new, &mut acc)?;
        Ok(acc)
    }

    #[test]
    fn test_single_bond_stretched() {
        let mut top = ConstraintTopology::new();
        top.add_constraint(Constraint::new(0, 1, 0.1));
        let invmass = [1.0, 1.0];
        let x_old = [Vec3::zeros(), Vec3::new(0.1, 0.0, 0.0)];
        let mut x_new = [Vec3::zeros(), Vec3::new(0.105, 0.0, 0.0)];

        let acc = solve(&top, &invmass, &x_old, &mut x_new, 1e-6, 1000).unwrap();

        let r = (x_new[1] - x_new[0]).norm();
        assert_relative_eq!(r, 0.1, epsilon = 1e-6 * 0.1 * 2.0);
        assert!(acc.iterations <= 5, "took {} iterations", acc.iterations);
        // Equal masses: centre of mass unchanged
        assert_relative_eq!((x_new[0] + x_new[1]).x, 0.105, epsilon = 1e-12);
    }

    #[test]
    fn test_triangle_converges() {
        let mut top = ConstraintTopology::new();
        top.add_constraint(Constraint::new(0, 1, 0.1));
        top.add_constraint(Constraint::new(1, 2, 0.1));
        top.add_constraint(Constraint::new(0, 2, 0.1));
        let invmass = [1.0 / 12.0, 1.0, 1.0 / 16.0];
        let h = 0.1 * 3f64.sqrt() / 2.0;
        let x_old = [
            Vec3::zeros(),
            Vec3::new(0.1, 0.0, 0.0),
            Vec3::new(0.05, h, 0.0),
        ];
        let mut x_new = [
            Vec3::new(0.001, -0.002, 0.0005),
            Vec3::new(0.104, 0.001, 0.0),
            Vec3::new(0.049, h + 0.003, -0.001),
        ];

        solve(&top, &invmass, &x_old, &mut x_new, 1e-8, 1000).unwrap();

        for c in top.constraints() {
            let r = (x_new[c.ai] - x_new[c.aj]).norm();
            assert!((r - 0.1).abs() <= 2e-8 * 0.1, "length {r}");
        }
    }

    #[test]
    fn test_rotated_bond_is_fatal() {
        let mut top = ConstraintTopology::new();
        top.add_constraint(Constraint::new(0, 1, 0.1));
        let invmass = [1.0, 1.0];
        let x_old = [Vec3::zeros(), Vec3::new(0.1, 0.0, 0.0)];
        // Trial bond flipped relative to the reference
        let mut x_new = [Vec3::zeros(), Vec3::new(-0.12, 0.0, 0.0)];

        let err = solve(&top, &invmass, &x_old, &mut x_new, 1e-4, 100).unwrap_err();
        assert!(matches!(err, ConstraintError::ShakeRotation { constraint: 0, .. }));
    }

    #[test]
    fn test_iteration_cap_is_fatal() {
        let mut top = ConstraintTopology::new();
        top.add_constraint(Constraint::new(0, 1, 0.1));
        top.add_constraint(Constraint::new(1, 2, 0.1));
        let invmass = [1.0, 1.0, 1.0];
        let x_old = [
            Vec3::zeros(),
            Vec3::new(0.1, 0.0, 0.0),
            Vec3::new(0.1, 0.1, 0.0),
        ];
        let mut x_new = [
            Vec3::new(-0.01, 0.0, 0.0),
            Vec3::new(0.11, 0.01, 0.0),
            Vec3::new(0.1, 0.12, 0.0),
        ];

        let err = solve(&top, &invmass, &x_old, &mut x_new, 1e-12, 1).unwrap_err();
        match err {
            ConstraintError::ShakeNotConverged { block, dump, .. } => {
                assert_eq!(block, 0);
                assert_eq!(dump.atoms.len(), 3);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_frozen_atom_does_not_move() {
        let mut top = ConstraintTopology::new();
        top.add_constraint(Constraint::new(0, 1, 0.1));
        let invmass = [0.0, 1.0];
        let x_old = [Vec3::zeros(), Vec3::new(0.1, 0.0, 0.0)];
        let mut x_new = [Vec3::zeros(), Vec3::new(0.11, 0.0, 0.0)];

        solve(&top, &invmass, &x_old, &mut x_new, 1e-8, 100).unwrap();

        assert_eq!(x_new[0], Vec3::zeros());
        assert_relative_eq!(x_new[1].x, 0.1, epsilon = 1e-8);
    }
}
