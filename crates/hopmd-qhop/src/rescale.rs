//! Local velocity rescaling after an accepted hop.
//!
//! The kinetic energy is changed by `-ΔE` along a momentum-free direction
//! `d_i = f_i (v_i - V_f)`, with weights `f(r) = 1 - exp(-r/rc)` around the
//! reaction centre and `V_f` the weighted centre-of-mass velocity. The
//! scale factor solves `½Σm d² λ² + Σm v·d λ - ΔK = 0`; velocities are
//! constrained after every pass and the procedure repeats until the kinetic
//! energy change is within tolerance.

use crate::error::Result;
use hopmd_md::{Integrator, SimulationState, Topology};
use hopmd_math::Vec3;

/// Result of a rescaling run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RescaleOutcome {
    pub converged: bool,
    pub iterations: usize,
    /// Kinetic energy change achieved (kJ/mol).
    pub delta_kinetic: f64,
    /// Kinetic energy change requested (kJ/mol).
    pub target: f64,
}

/// Parameters of [`scale_velocities`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RescaleParams {
    /// Decay length of the weights (nm).
    pub rc: f64,
    /// Tolerance on the kinetic energy change (kJ/mol).
    pub tolerance: f64,
    pub max_iter: usize,
}

fn kinetic_energy(masses: &[f64], v: &[Vec3]) -> f64 {
    masses.iter().zip(v).map(|(m, vi)| 0.5 * m * vi.norm_squared()).sum()
}

/// Root of `aλ² + bλ + c = 0` with the smallest magnitude, or the vertex
/// when there is no real root.
fn smallest_root(a: f64, b: f64, c: f64) -> f64 {
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return -b / (2.0 * a);
    }
    let sq = disc.sqrt();
    // Numerically stable pair of roots
    let q = -0.5 * (b + b.signum() * sq);
    if q == 0.0 {
        return 0.0;
    }
    let (r1, r2) = (q / a, c / q);
    if r1.abs() < r2.abs() { r1 } else { r2 }
}

/// Change the kinetic energy by `-de` around `center` while conserving
/// linear momentum and the constraints. Massless and fully frozen atoms get
/// zero weight.
pub fn scale_velocities(
    topology: &Topology,
    state: &mut SimulationState,
    integrator: &mut Integrator,
    center: &Vec3,
    de: f64,
    params: &RescaleParams,
) -> Result<RescaleOutcome> {
    let masses = topology.masses();
    let target = -de;
    let k0 = kinetic_energy(&masses, &state.v);

    let weights: Vec<f64> = state
        .x
        .iter()
        .zip(&masses)
        .zip(integrator.invmass())
        .map(|((x, &m), &invmass)| {
            // Frozen atoms keep their velocities
            if m > 0.0 && invmass > 0.0 {
                let r = state.sim_box.dx(center, x).norm();
                1.0 - (-r / params.rc).exp()
            } else {
                0.0
            }
        })
        .collect();
    let mf: f64 = masses.iter().zip(&weights).map(|(m, f)| m * f).sum();

    let mut iterations = 0;
    while iterations < params.max_iter {
        let delta = kinetic_energy(&masses, &state.v) - k0;
        let remaining = target - delta;
        if remaining.abs() < params.tolerance {
            return Ok(RescaleOutcome {
                converged: true,
                iterations,
                delta_kinetic: delta,
                target,
            });
        }
        if mf <= 0.0 {
            break;
        }

        let vf = masses
            .iter()
            .zip(&weights)
            .zip(&state.v)
            .fold(Vec3::zeros(), |acc, ((m, f), v)| acc + v * (m * f))
            / mf;
        let d: Vec<Vec3> = weights.iter().zip(&state.v).map(|(f, v)| (v - vf) * *f).collect();

        let a: f64 = 0.5 * masses.iter().zip(&d).map(|(m, di)| m * di.norm_squared()).sum::<f64>();
        let b: f64 = masses
            .iter()
            .zip(&state.v)
            .zip(&d)
            .map(|((m, v), di)| m * v.dot(di))
            .sum();
        if a <= f64::EPSILON {
            break;
        }
        let lambda = smallest_root(a, b, -remaining);
        for (v, di) in state.v.iter_mut().zip(&d) {
            *v += di * lambda;
        }
        integrator.constrain_velocities(state)?;
        iterations += 1;
    }

    let delta = kinetic_energy(&masses, &state.v) - k0;
    let converged = (target - delta).abs() < params.tolerance;
    if !converged {
        log::warn!(
            "velocity rescaling did not converge: kinetic energy changed by {:.4} instead of {:.4} kJ/mol",
            delta,
            target
        );
    }
    Ok(RescaleOutcome {
        converged,
        iterations,
        delta_kinetic: delta,
        target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopmd_md::{Atom, IntegratorConfig, total_momentum};
    use hopmd_math::SimBox;
    use approx::assert_relative_eq;

    fn params() -> RescaleParams {
        RescaleParams {
            rc: 0.5,
            tolerance: 1e-3,
            max_iter: 100,
        }
    }

    fn pair(constrained: bool) -> (Topology, SimulationState) {
        let mut top = Topology::new();
        let r = top.add_residue("XX", 1);
        top.add_atom(Atom::new("A", 1.008, 0.0, 0, r)).unwrap();
        top.add_atom(Atom::new("B", 1.008, 0.0, 0, r)).unwrap();
        if constrained {
            top.add_constraint(0, 1, 0.3).unwrap();
        }
        let mut state = SimulationState::from_positions(
            vec![Vec3::new(1.0, 1.0, 1.0), Vec3::new(1.3, 1.0, 1.0)],
            SimBox::rectangular(Vec3::repeat(3.0)),
        );
        state.v = vec![Vec3::new(0.0, 2.0, 0.5), Vec3::new(0.0, -2.0, -0.5)];
        (top, state)
    }

    #[test]
    fn test_smallest_root() {
        // (λ - 1)(λ - 3) = λ² - 4λ + 3
        assert_relative_eq!(smallest_root(1.0, -4.0, 3.0), 1.0, epsilon = 1e-12);
        // (λ + 0.5)(λ - 2)
        assert_relative_eq!(smallest_root(1.0, -1.5, -1.0), -0.5, epsilon = 1e-12);
        // No real root: vertex
        assert_relative_eq!(smallest_root(1.0, 2.0, 5.0), -1.0);
    }

    #[test]
    fn test_symmetric_pair_reaches_target() {
        let (top, mut state) = pair(false);
        let mut integrator = Integrator::new(&top, IntegratorConfig::default()).unwrap();
        let p0 = total_momentum(&top.masses(), &state.v);
        let center = Vec3::new(1.15, 1.0, 1.0);
        let k0 = kinetic_energy(&top.masses(), &state.v);

        // Hop raised the potential by 1 kJ/mol
        let out = scale_velocities(&top, &mut state, &mut integrator, &center, 1.0, &params()).unwrap();

        assert!(out.converged);
        assert!((out.delta_kinetic - out.target).abs() < 1e-3);
        assert_relative_eq!(kinetic_energy(&top.masses(), &state.v), k0 - 1.0, epsilon = 1e-3);
        assert_relative_eq!(total_momentum(&top.masses(), &state.v), p0, epsilon = 1e-10);
    }

    #[test]
    fn test_zero_target_leaves_velocities_untouched() {
        let (top, mut state) = pair(false);
        let mut integrator = Integrator::new(&top, IntegratorConfig::default()).unwrap();
        let v0 = state.v.clone();
        let center = Vec3::new(1.15, 1.0, 1.0);

        let out = scale_velocities(&top, &mut state, &mut integrator, &center, 0.0, &params()).unwrap();

        assert!(out.converged);
        assert_eq!(out.iterations, 0);
        assert_eq!(out.delta_kinetic, 0.0);
        assert_eq!(state.v, v0);
    }

    #[test]
    fn test_frozen_atom_is_not_rescaled() {
        let (mut top, mut state) = pair(false);
        let r = top.residues.len() - 1;
        let mut frozen = Atom::new("C", 12.011, 0.0, 0, r);
        frozen.freeze_group = 1;
        top.add_atom(frozen).unwrap();
        state.x.push(Vec3::new(2.0, 1.0, 1.0));
        state.v.push(Vec3::zeros());
        let config = IntegratorConfig {
            freeze_groups: vec![[false; 3], [true; 3]],
            ..Default::default()
        };
        let mut integrator = Integrator::new(&top, config).unwrap();
        assert_eq!(integrator.invmass()[2], 0.0);
        let p0 = total_momentum(&top.masses(), &state.v);
        // Off-centre so the weighted centre-of-mass velocity is non-zero
        let center = Vec3::new(1.05, 1.0, 1.0);

        let out = scale_velocities(&top, &mut state, &mut integrator, &center, 1.0, &params()).unwrap();

        assert!(out.converged);
        assert_eq!(state.v[2], Vec3::zeros());
        assert_relative_eq!(total_momentum(&top.masses(), &state.v), p0, epsilon = 1e-10);
    }

    #[test]
    fn test_constrained_pair_conserves_momentum() {
        let (top, mut state) = pair(true);
        let mut integrator = Integrator::new(&top, IntegratorConfig::default()).unwrap();
        let center = Vec3::new(1.15, 1.0, 1.0);

        let out = scale_velocities(&top, &mut state, &mut integrator, &center, -0.5, &params()).unwrap();

        assert!(out.converged);
        assert_relative_eq!(out.delta_kinetic, 0.5, epsilon = 1e-3);
        assert!(out.iterations > 0);
        // Constraint corrections are internal forces
        assert_relative_eq!(total_momentum(&top.masses(), &state.v), Vec3::zeros(), epsilon = 1e-9);
        let r = (state.x[1] - state.x[0]).norm();
        assert_relative_eq!(r, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_unreachable_target_reports_failure() {
        let (top, mut state) = pair(false);
        let mut integrator = Integrator::new(&top, IntegratorConfig::default()).unwrap();
        let center = Vec3::new(1.15, 1.0, 1.0);
        let k0 = kinetic_energy(&top.masses(), &state.v);

        // Asking for more kinetic energy than the pair has
        let out = scale_velocities(&top, &mut state, &mut integrator, &center, 10.0 * k0, &params()).unwrap();

        assert!(!out.converged);
        assert!(kinetic_energy(&top.masses(), &state.v) >= 0.0);
    }
}
