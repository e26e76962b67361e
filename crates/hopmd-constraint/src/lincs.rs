//! LINCS: linear constraint solver with matrix expansion.
//!
//! The constraint equations are linearized along the bond directions of
//! the previous step, `(I - A)⁻¹` is approximated by the series
//! `I + A + A² + ...` truncated at `order`, and `iterations` extra passes
//! correct for the lengthening caused by bond rotation.
//!
//! Coupling rows are stored in two layouts: constraints with at most
//! [`LIGHT_COUPLING_LIMIT`] couplings keep their neighbours inline, the
//! rest use ranges into shared arrays.

use crate::error::Result;
use crate::solver::{RotationWarning, SolveContext, StepAccumulator};
use crate::topology::{ConstraintTopology, DeviationStats, LIGHT_COUPLING_LIMIT, deviation_stats};
use hopmd_math::{Vec3, outer};

#[derive(Clone, Debug)]
struct LightRow {
    b: usize,
    count: usize,
    neighbors: [usize; LIGHT_COUPLING_LIMIT],
    /// `sign / m_shared * blc_b * blc_n`.
    mass_factor: [f64; LIGHT_COUPLING_LIMIT],
    /// `mass_factor * r_b·r_n`, refreshed each step.
    coefficient: [f64; LIGHT_COUPLING_LIMIT],
}

#[derive(Clone, Debug)]
struct HeavyRow {
    b: usize,
    start: usize,
    end: usize,
}

/// LINCS solver state, built once from the topology.
#[derive(Clone, Debug)]
pub struct Lincs {
    order: usize,
    iterations: usize,
    /// Cosine of the warning angle.
    warn_cos: f64,
    /// `1 / sqrt(1/m_i + 1/m_j)` per constraint.
    blc: Vec<f64>,
    light: Vec<LightRow>,
    heavy: Vec<HeavyRow>,
    heavy_neighbors: Vec<usize>,
    heavy_mass_factor: Vec<f64>,
    heavy_coefficient: Vec<f64>,
    // Work arrays
    direction: Vec<Vec3>,
    rhs1: Vec<f64>,
    rhs2: Vec<f64>,
    sol: Vec<f64>,
    mlambda: Vec<f64>,
}

impl Lincs {
    pub fn new(
        topology: &ConstraintTopology,
        invmass: &[f64],
        order: usize,
        iterations: usize,
        warn_angle_deg: f64,
    ) -> Self {
        let constraints = topology.constraints();
        let n = constraints.len();
        let blc: Vec<f64> = constraints
            .iter()
            .map(|c| {
                let w = invmass[c.ai] + invmass[c.aj];
                if w > 0.0 { 1.0 / w.sqrt() } else { 0.0 }
            })
            .collect();

        let graph = topology.coupling_graph();
        let mass_factor = |b: usize, k: usize| {
            let cp = graph.couplings[b][k];
            cp.sign * invmass[cp.shared_atom] * blc[b] * blc[cp.constraint]
        };

        let light = graph
            .light
            .iter()
            .map(|&b| {
                let mut row = LightRow {
                    b,
                    count: graph.couplings[b].len(),
                    neighbors: [0; LIGHT_COUPLING_LIMIT],
                    mass_factor: [0.0; LIGHT_COUPLING_LIMIT],
                    coefficient: [0.0; LIGHT_COUPLING_LIMIT],
                };
                for k in 0..row.count {
                    row.neighbors[k] = graph.couplings[b][k].constraint;
                    row.mass_factor[k] = mass_factor(b, k);
                }
                row
            })
            .collect();

        let mut heavy = Vec::with_capacity(graph.heavy.len());
        let mut heavy_neighbors = Vec::new();
        let mut heavy_mass_factor = Vec::new();
        for &b in &graph.heavy {
            let start = heavy_neighbors.len();
            for k in 0..graph.couplings[b].len() {
                heavy_neighbors.push(graph.couplings[b][k].constraint);
                heavy_mass_factor.push(mass_factor(b, k));
            }
            heavy.push(HeavyRow {
                b,
                start,
                end: heavy_neighbors.len(),
            });
        }

        log::debug!(
            "LINCS: {} constraints ({} light, {} heavy), order {}, {} iterations",
            n,
            graph.light.len(),
            graph.heavy.len(),
            order,
            iterations
        );

        Self {
            order,
            iterations,
            warn_cos: warn_angle_deg.to_radians().cos(),
            blc,
            light,
            heavy,
            heavy_coefficient: vec![0.0; heavy_neighbors.len()],
            heavy_neighbors,
            heavy_mass_factor,
            direction: vec![Vec3::zeros(); n],
            rhs1: vec![0.0; n],
            rhs2: vec![0.0; n],
            sol: vec![0.0; n],
            mlambda: vec![0.0; n],
        }
    }

    /// Number of constraints stored in the heavily coupled layout.
    pub fn heavy_count(&self) -> usize {
        self.heavy.len()
    }

    /// Number of constraints stored in the light layout.
    pub fn light_count(&self) -> usize {
        self.light.len()
    }

    /// Refresh the coupling coefficients for the current bond directions.
    fn update_coefficients(&mut self) {
        let dir = &self.direction;
        for row in &mut self.light {
            for k in 0..row.count {
                row.coefficient[k] = row.mass_factor[k] * dir[row.b].dot(&dir[row.neighbors[k]]);
            }
        }
        for row in &self.heavy {
            for k in row.start..row.end {
                self.heavy_coefficient[k] =
                    self.heavy_mass_factor[k] * dir[row.b].dot(&dir[self.heavy_neighbors[k]]);
            }
        }
    }

    /// Accumulate `sol += A rhs + A² rhs + ...` up to the expansion order.
    fn expand(&mut self) {
        for _ in 0..self.order {
            for row in &self.light {
                let mut mvb = 0.0;
                for k in 0..row.count {
                    mvb += row.coefficient[k] * self.rhs1[row.neighbors[k]];
                }
                self.rhs2[row.b] = mvb;
            }
            for row in &self.heavy {
                let mut mvb = 0.0;
                for k in row.start..row.end {
                    mvb += self.heavy_coefficient[k] * self.rhs1[self.heavy_neighbors[k]];
                }
                self.rhs2[row.b] = mvb;
            }
            for b in 0..self.sol.len() {
                self.sol[b] += self.rhs2[b];
            }
            std::mem::swap(&mut self.rhs1, &mut self.rhs2);
        }
    }

    fn update_atoms(
        &self,
        topology: &ConstraintTopology,
        invmass: &[f64],
        mvb: &[f64],
        x_new: &mut [Vec3],
    ) {
        for (b, c) in topology.constraints().iter().enumerate() {
            let tmp = self.direction[b] * mvb[b];
            x_new[c.ai] -= tmp * invmass[c.ai];
            x_new[c.aj] += tmp * invmass[c.aj];
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
        let constraints = topology.constraints();
        let n = constraints.len();
        if n == 0 {
            return Ok(());
        }

        let before = deviation_stats(constraints, ctx.lengths, x_new, ctx.pbc);

        for (b, c) in constraints.iter().enumerate() {
            let r = ctx.pbc.dx(&x_old[c.aj], &x_old[c.ai]);
            let norm = r.norm();
            self.direction[b] = if norm > 0.0 { r / norm } else { Vec3::zeros() };
        }
        self.update_coefficients();

        for (b, c) in constraints.iter().enumerate() {
            let p = ctx.pbc.dx(&x_new[c.aj], &x_new[c.ai]);
            let mvb = self.blc[b] * (self.direction[b].dot(&p) - ctx.lengths[b]);
            self.rhs1[b] = mvb;
            self.sol[b] = mvb;
        }
        self.expand();

        let mut step: Vec<f64> = (0..n).map(|b| self.blc[b] * self.sol[b]).collect();
        self.mlambda.copy_from_slice(&step);
        self.update_atoms(topology, ctx.invmass, &step, x_new);

        // Correct for centripetal lengthening
        for _ in 0..self.iterations {
            for (b, c) in constraints.iter().enumerate() {
                let len = ctx.lengths[b];
                let len2 = len * len;
                let p = ctx.pbc.dx(&x_new[c.aj], &x_new[c.ai]);
                let dlen2 = 2.0 * len2 - p.norm_squared();
                let mvb = if dlen2 > 0.0 {
                    self.blc[b] * (len - dlen2.sqrt())
                } else {
                    self.blc[b] * len
                };
                self.rhs1[b] = mvb;
                self.sol[b] = mvb;
            }
            self.expand();
            for b in 0..n {
                step[b] = self.blc[b] * self.sol[b];
                self.mlambda[b] += step[b];
            }
            self.update_atoms(topology, ctx.invmass, &step, x_new);
        }

        for (b, c) in constraints.iter().enumerate() {
            let ml = self.mlambda[b];
            let len = ctx.lengths[b];
            // m_i Δx_i = -mlambda r_b for atom i
            acc.r_m_dr -= outer(&self.direction[b], &self.direction[b]) * (ml * len);
            acc.dvdlambda += ml * ctx.inv_dt2 * (c.length_b - c.length_a);

            let p = ctx.pbc.dx(&x_new[c.aj], &x_new[c.ai]);
            let p_len = p.norm();
            if p_len > 0.0 {
                let cosine = self.direction[b].dot(&p) / p_len;
                if cosine < self.warn_cos {
                    acc.warnings.push(RotationWarning {
                        constraint: b,
                        ai: c.ai,
                        aj: c.aj,
                        angle_deg: cosine.clamp(-1.0, 1.0).acos().to_degrees(),
                        old_length: ctx.pbc.dx(&x_old[c.aj], &x_old[c.ai]).norm(),
                        new_length: p_len,
                        target_length: len,
                    });
                }
            }
        }

        let after = deviation_stats(constraints, ctx.lengths, x_new, ctx.pbc);
        acc.lincs_deviation = Some(LincsDeviation { before, after });
        Ok(())
    }
}

/// Deviation statistics recorded around one LINCS call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LincsDeviation {
    pub before: DeviationStats,
    pub after: DeviationStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Constraint;
    use approx::assert_relative_eq;
    use hopmd_math::SimBox;

    fn run(
        topology: &ConstraintTopology,
        invmass: &[f64],
        x_old: &[Vec3],
        x_new: &mut [Vec3],
        order: usize,
        iterations: usize,
    ) -> StepAccumulator {
        let mut lincs = Lincs::new(topology, invmass, order, iterations, 30.0);
        let pbc = SimBox::open();
        let lengths = topology.lengths(0.0);
        let ctx = SolveContext::new(invmass, &lengths, 0.002, &pbc);
        let mut acc = StepAccumulator::default();
        lincs.solve(topology, &ctx, x_old, x_new, &mut acc).unwrap();
        acc
    }

    #[test]
    fn test_isolated_bond_exact() {
        let mut top = ConstraintTopology::new();
        top.add_constraint(Constraint::new(0, 1, 0.1));
        let invmass = [1.0 / 12.0, 1.0];
        let x_old = [Vec3::zeros(), Vec3::new(0.1, 0.0, 0.0)];
        let mut x_new = [
            Vec3::new(0.0, 0.001, 0.0),
            Vec3::new(0.104, 0.006, -0.002),
        ];

        let acc = run(&top, &invmass, &x_old, &mut x_new, 4, 1);

        assert_relative_eq!((x_new[1] - x_new[0]).norm(), 0.1, epsilon = 1e-12);
        let dev = acc.lincs_deviation.unwrap();
        assert!(dev.before.max > 1e-2);
        assert!(dev.after.max < 1e-10);
        assert!(acc.warnings.is_empty());
    }

    #[test]
    fn test_chain_within_tolerance() {
        let mut top = ConstraintTopology::new();
        for i in 0..5 {
            top.add_constraint(Constraint::new(i, i + 1, 0.15));
        }
        let invmass = [1.0 / 12.0, 1.0 / 14.0, 1.0 / 12.0, 1.0 / 16.0, 1.0 / 12.0, 1.0 / 14.0];
        // Zig-zag chain
        let x_old: Vec<Vec3> = (0..6)
            .map(|i| {
                let y = if i % 2 == 0 { 0.0 } else { 0.15 * 0.6 };
                Vec3::new(i as f64 * 0.12, y, 0.0)
            })
            .collect();
        let shifts = [
            Vec3::new(0.002, -0.001, 0.001),
            Vec3::new(-0.001, 0.002, 0.0),
            Vec3::new(0.0, 0.001, -0.002),
            Vec3::new(0.001, 0.0, 0.001),
            Vec3::new(-0.002, 0.001, 0.0),
            Vec3::new(0.001, -0.002, 0.001),
        ];
        let mut x_new: Vec<Vec3> = x_old.iter().zip(&shifts).map(|(x, s)| x + s).collect();

        run(&top, &invmass, &x_old, &mut x_new, 8, 2);

        for c in top.constraints() {
            let r = (x_new[c.ai] - x_new[c.aj]).norm();
            assert!((r - 0.15).abs() < 1e-4, "length {r}");
        }
    }

    #[test]
    fn test_rotation_warning() {
        let mut top = ConstraintTopology::new();
        top.add_constraint(Constraint::new(0, 1, 0.1));
        let invmass = [1.0, 1.0];
        let x_old = [Vec3::zeros(), Vec3::new(0.1, 0.0, 0.0)];
        // Bond turned by ~45 degrees in one step
        let mut x_new = [Vec3::zeros(), Vec3::new(0.0707, 0.0707, 0.0)];

        let acc = run(&top, &invmass, &x_old, &mut x_new, 4, 1);

        assert_eq!(acc.warnings.len(), 1);
        let w = &acc.warnings[0];
        assert_eq!((w.ai, w.aj), (0, 1));
        assert!(w.angle_deg > 30.0, "angle {}", w.angle_deg);
    }

    #[test]
    fn test_heavy_rows_used() {
        let mut top = ConstraintTopology::new();
        for k in 1..=6 {
            top.add_constraint(Constraint::new(0, k, 0.1));
        }
        let mut invmass = vec![1.0; 7];
        invmass[0] = 1.0 / 12.0;
        let lincs = Lincs::new(&top, &invmass, 4, 1, 30.0);
        assert_eq!(lincs.heavy_count(), 6);
        assert_eq!(lincs.light_count(), 0);

        let dirs = [
            Vec3::x(),
            -Vec3::x(),
            Vec3::y(),
            -Vec3::y(),
            Vec3::z(),
            -Vec3::z(),
        ];
        let mut x_old = vec![Vec3::zeros()];
        x_old.extend(dirs.iter().map(|d| d * 0.1));
        let mut x_new: Vec<Vec3> = x_old.clone();
        for (k, x) in x_new.iter_mut().enumerate().skip(1) {
            *x *= 1.0 + 0.01 * k as f64;
        }

        run(&top, &invmass, &x_old, &mut x_new, 8, 2);

        for c in top.constraints() {
            let r = (x_new[c.ai] - x_new[c.aj]).norm();
            assert!((r - 0.1).abs() < 1e-5, "length {r}");
        }
    }
}
