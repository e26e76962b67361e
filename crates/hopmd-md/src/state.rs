//! Dynamic simulation state.

use crate::error::{MdError, Result};
use hopmd_math::{Mat3, SimBox, Vec3, outer};

/// Positions, velocities and forces of every atom plus the box.
///
/// Owned by the driver and passed by `&mut` into each step.
#[derive(Clone, Debug)]
pub struct SimulationState {
    pub sim_box: SimBox,
    /// Positions (nm).
    pub x: Vec<Vec3>,
    /// Velocities (nm/ps).
    pub v: Vec<Vec3>,
    /// Forces (kJ mol⁻¹ nm⁻¹) of the last evaluation.
    pub f: Vec<Vec3>,
    /// Berendsen scaling factor per temperature-coupling group.
    pub tc_lambda: Vec<f64>,
    /// Free-energy coupling parameter.
    pub fep_lambda: f64,
    /// Simulation time (ps).
    pub time: f64,
    pub step: u64,
}

impl SimulationState {
    /// State with `natoms` atoms at rest at the origin.
    pub fn new(natoms: usize, sim_box: SimBox) -> Self {
        Self {
            sim_box,
            x: vec![Vec3::zeros(); natoms],
            v: vec![Vec3::zeros(); natoms],
            f: vec![Vec3::zeros(); natoms],
            tc_lambda: vec![1.0],
            fep_lambda: 0.0,
            time: 0.0,
            step: 0,
        }
    }

    /// State from positions, with zero velocities and forces.
    pub fn from_positions(x: Vec<Vec3>, sim_box: SimBox) -> Self {
        let mut state = Self::new(x.len(), sim_box);
        state.x = x;
        state
    }

    pub fn natoms(&self) -> usize {
        self.x.len()
    }

    /// Check that every per-atom array has `natoms` entries.
    pub fn check(&self, natoms: usize) -> Result<()> {
        for len in [self.x.len(), self.v.len(), self.f.len()] {
            if len != natoms {
                return Err(MdError::AtomCountMismatch {
                    expected: natoms,
                    found: len,
                });
            }
        }
        Ok(())
    }

    /// Total kinetic energy ½ Σ m v² (kJ/mol).
    pub fn kinetic_energy(&self, masses: &[f64]) -> f64 {
        kinetic_tensor(masses, &self.v, None).trace()
    }
}

/// Kinetic energy tensor ½ Σ m v ⊗ v, optionally restricted to `atoms`.
pub fn kinetic_tensor(masses: &[f64], v: &[Vec3], atoms: Option<&[usize]>) -> Mat3 {
    let term = |i: usize| outer(&v[i], &v[i]) * (0.5 * masses[i]);
    match atoms {
        Some(list) => list.iter().map(|&i| term(i)).sum(),
        None => (0..v.len()).map(term).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_state_creation() {
        let s = SimulationState::from_positions(vec![Vec3::new(1.0, 2.0, 3.0)], SimBox::open());
        assert_eq!(s.natoms(), 1);
        assert_eq!(s.x[0], Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(s.v[0], Vec3::zeros());
        assert!(s.check(1).is_ok());
        assert!(s.check(2).is_err());
    }

    #[test]
    fn test_kinetic_energy() {
        let mut s = SimulationState::new(2, SimBox::open());
        s.v[0] = Vec3::new(1.0, 0.0, 0.0);
        s.v[1] = Vec3::new(0.0, 2.0, 0.0);
        let masses = [2.0, 1.0];
        assert_relative_eq!(s.kinetic_energy(&masses), 1.0 + 2.0, epsilon = 1e-12);

        let ekin = kinetic_tensor(&masses, &s.v, Some(&[1]));
        assert_relative_eq!(ekin[(1, 1)], 2.0, epsilon = 1e-12);
        assert_relative_eq!(ekin[(0, 0)], 0.0);
    }
}
