//! Force evaluation: the evaluator trait and a reference pair force field.
//!
//! The reference [`PairForceField`] combines
//! - Lennard-Jones C6/C12 interactions per type pair
//! - reaction-field Coulomb with exclusion corrections
//! - harmonic bonds from the topology
//!
//! Everything is cut off at a single radius and found through a Verlet
//! neighbour list.

use crate::error::{MdError, Result};
use crate::neighbor::NeighborList;
use crate::state::SimulationState;
use crate::topology::Topology;
use crate::units::ONE_4PI_EPS0;
use hopmd_math::{Mat3, Vec3, outer};
use serde::{Deserialize, Serialize};

/// Potential energy, forces and virial of one configuration.
#[derive(Clone, Debug)]
pub struct ForceOutput {
    /// Total potential energy (kJ/mol).
    pub potential: f64,
    pub forces: Vec<Vec3>,
    /// Force virial `-½ Σ r_ij ⊗ f_ij`.
    pub virial: Mat3,
}

impl ForceOutput {
    pub fn zeros(natoms: usize) -> Self {
        Self {
            potential: 0.0,
            forces: vec![Vec3::zeros(); natoms],
            virial: Mat3::zeros(),
        }
    }
}

/// Anything that can compute energies and forces for a topology and state.
pub trait ForceEvaluator {
    fn evaluate(&mut self, topology: &Topology, state: &SimulationState) -> Result<ForceOutput>;
}

/// Lennard-Jones 12-6 pair in C6/C12 form: V(r) = C12/r¹² - C6/r⁶.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LennardJones {
    pub c6: f64,
    pub c12: f64,
}

impl LennardJones {
    pub fn new(c6: f64, c12: f64) -> Self {
        Self { c6, c12 }
    }

    /// From well depth ε (kJ/mol) and zero-crossing σ (nm).
    pub fn from_sigma_epsilon(sigma: f64, epsilon: f64) -> Self {
        let s6 = sigma.powi(6);
        Self::new(4.0 * epsilon * s6, 4.0 * epsilon * s6 * s6)
    }

    /// Force on i and potential for `r_ij = x_j - x_i`.
    pub fn compute(&self, r_ij: Vec3) -> (Vec3, f64) {
        let r2 = r_ij.norm_squared();
        if r2 < 1e-20 || (self.c6 == 0.0 && self.c12 == 0.0) {
            return (Vec3::zeros(), 0.0);
        }
        let inv_r2 = 1.0 / r2;
        let inv_r6 = inv_r2 * inv_r2 * inv_r2;
        let potential = (self.c12 * inv_r6 - self.c6) * inv_r6;

        // r dV/dr = -12 C12/r¹² + 6 C6/r⁶
        let r_dv_dr = (6.0 * self.c6 - 12.0 * self.c12 * inv_r6) * inv_r6;
        // F_i = dV/dr * r_ij/r
        (r_ij * (r_dv_dr * inv_r2), potential)
    }
}

/// Symmetric table of Lennard-Jones parameters indexed by atom type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LjTable {
    ntypes: usize,
    params: Vec<LennardJones>,
}

impl LjTable {
    /// All pairs zero.
    pub fn new(ntypes: usize) -> Self {
        Self {
            ntypes,
            params: vec![LennardJones::default(); ntypes * ntypes],
        }
    }

    /// Table from per-type σ/ε using Lorentz-Berthelot combination.
    pub fn from_sigma_epsilon(types: &[(f64, f64)]) -> Self {
        let mut table = Self::new(types.len());
        for (i, &(si, ei)) in types.iter().enumerate() {
            for (j, &(sj, ej)) in types.iter().enumerate() {
                table.params[i * types.len() + j] =
                    LennardJones::from_sigma_epsilon(0.5 * (si + sj), (ei * ej).sqrt());
            }
        }
        table
    }

    pub fn ntypes(&self) -> usize {
        self.ntypes
    }

    pub fn set(&mut self, ti: usize, tj: usize, lj: LennardJones) {
        self.params[ti * self.ntypes + tj] = lj;
        self.params[tj * self.ntypes + ti] = lj;
    }

    #[inline]
    pub fn get(&self, ti: usize, tj: usize) -> LennardJones {
        self.params[ti * self.ntypes + tj]
    }
}

/// Reaction-field electrostatics.
///
/// `V(r) = f q_i q_j (1/r + k_rf r² - c_rf)` with `f = 1/(4πε₀ ε_r)`.
/// An `eps_rf` of zero means a conducting (infinite) dielectric.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReactionField {
    pub cutoff: f64,
    pub eps_r: f64,
    pub eps_rf: f64,
    k_rf: f64,
    c_rf: f64,
}

impl ReactionField {
    pub fn new(cutoff: f64, eps_r: f64, eps_rf: f64) -> Self {
        let rc3 = cutoff.powi(3);
        let k_rf = if eps_rf == 0.0 {
            1.0 / (2.0 * rc3)
        } else {
            (eps_rf - eps_r) / ((2.0 * eps_rf + eps_r) * rc3)
        };
        Self {
            cutoff,
            eps_r,
            eps_rf,
            k_rf,
            c_rf: 1.0 / cutoff + k_rf * cutoff * cutoff,
        }
    }

    pub fn k_rf(&self) -> f64 {
        self.k_rf
    }

    pub fn c_rf(&self) -> f64 {
        self.c_rf
    }

    #[inline]
    fn prefactor(&self) -> f64 {
        ONE_4PI_EPS0 / self.eps_r
    }

    /// Force on i and potential for a non-excluded pair.
    pub fn compute(&self, qq: f64, r_ij: Vec3) -> (Vec3, f64) {
        let r2 = r_ij.norm_squared();
        if qq == 0.0 || r2 < 1e-20 || r2 >= self.cutoff * self.cutoff {
            return (Vec3::zeros(), 0.0);
        }
        let fqq = self.prefactor() * qq;
        let inv_r = 1.0 / r2.sqrt();
        let potential = fqq * (inv_r + self.k_rf * r2 - self.c_rf);
        // (1/r) dV/dr = f qq (-1/r³ + 2 k_rf)
        let dv_dr_over_r = fqq * (-inv_r * inv_r * inv_r + 2.0 * self.k_rf);
        (r_ij * dv_dr_over_r, potential)
    }

    /// Reaction-field correction for an excluded pair: only the RF terms.
    pub fn compute_excluded(&self, qq: f64, r_ij: Vec3) -> (Vec3, f64) {
        let r2 = r_ij.norm_squared();
        if qq == 0.0 || r2 >= self.cutoff * self.cutoff {
            return (Vec3::zeros(), 0.0);
        }
        let fqq = self.prefactor() * qq;
        let potential = fqq * (self.k_rf * r2 - self.c_rf);
        (r_ij * (2.0 * fqq * self.k_rf), potential)
    }
}

/// Harmonic bond potential: V(r) = ½ k (r - r0)².
#[derive(Clone, Debug)]
pub struct HarmonicBond {
    /// Spring constant (kJ mol⁻¹ nm⁻²).
    pub k: f64,
    /// Equilibrium bond length (nm).
    pub r0: f64,
}

impl HarmonicBond {
    pub fn new(k: f64, r0: f64) -> Self {
        Self { k, r0 }
    }

    /// Force on i and potential for `r_ij = x_j - x_i`.
    pub fn compute(&self, r_ij: Vec3) -> (Vec3, f64) {
        let r = r_ij.norm();
        if r < 1e-10 {
            return (Vec3::zeros(), 0.0);
        }

        let dr = r - self.r0;
        let potential = 0.5 * self.k * dr * dr;

        // F_i = dV/dr * r_ij/r = k (r - r0) * r_ij/r
        let force = self.k * dr * r_ij / r;

        (force, potential)
    }
}

/// Settings of the reference force field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PairForceFieldConfig {
    /// Non-bonded cutoff (nm).
    #[serde(default = "default_cutoff")]
    pub cutoff: f64,
    /// Verlet buffer (nm).
    #[serde(default = "default_skin")]
    pub skin: f64,
    #[serde(default = "default_eps_r")]
    pub eps_r: f64,
    /// Reaction-field dielectric; 0 means conducting.
    #[serde(default)]
    pub eps_rf: f64,
}

fn default_cutoff() -> f64 {
    0.9
}

fn default_skin() -> f64 {
    0.1
}

fn default_eps_r() -> f64 {
    1.0
}

impl Default for PairForceFieldConfig {
    fn default() -> Self {
        Self {
            cutoff: default_cutoff(),
            skin: default_skin(),
            eps_r: default_eps_r(),
            eps_rf: 0.0,
        }
    }
}

/// Lennard-Jones + reaction-field + harmonic-bond force field.
#[derive(Clone, Debug)]
pub struct PairForceField {
    pub lj: LjTable,
    pub rf: ReactionField,
    neighbor_list: NeighborList,
}

impl PairForceField {
    pub fn new(lj: LjTable, config: &PairForceFieldConfig) -> Self {
        Self {
            lj,
            rf: ReactionField::new(config.cutoff, config.eps_r, config.eps_rf),
            neighbor_list: NeighborList::new(config.cutoff, config.skin),
        }
    }

    pub fn cutoff(&self) -> f64 {
        self.rf.cutoff
    }

    pub fn neighbor_list(&self) -> &NeighborList {
        &self.neighbor_list
    }
}

impl ForceEvaluator for PairForceField {
    fn evaluate(&mut self, topology: &Topology, state: &SimulationState) -> Result<ForceOutput> {
        let natoms = topology.natoms();
        state.check(natoms)?;
        if let Some(bad) = topology.atoms.iter().find(|a| a.lj_type >= self.lj.ntypes()) {
            return Err(MdError::InvalidTopology(format!(
                "atom {} has LJ type {} but the table has {} types",
                bad.name,
                bad.lj_type,
                self.lj.ntypes()
            )));
        }

        let pbc = &state.sim_box;
        let x = &state.x;
        if self.neighbor_list.needs_rebuild(x, pbc) {
            self.neighbor_list.build(x, pbc);
        }

        let mut out = ForceOutput::zeros(natoms);
        let rc2 = self.rf.cutoff * self.rf.cutoff;
        let add_pair = |out: &mut ForceOutput, i: usize, j: usize, r_ij: Vec3, term: (Vec3, f64)| {
            let (f_i, v) = term;
            out.potential += v;
            out.forces[i] += f_i;
            out.forces[j] -= f_i;
            // -½ (x_i - x_j) ⊗ f_i
            out.virial += outer(&r_ij, &f_i) * 0.5;
        };

        for &(i, j) in &self.neighbor_list.pairs {
            if topology.is_excluded(i, j) {
                continue;
            }
            let r_ij = pbc.dx(&x[i], &x[j]);
            if r_ij.norm_squared() >= rc2 {
                continue;
            }
            let ai = &topology.atoms[i];
            let aj = &topology.atoms[j];
            let (f_lj, v_lj) = self.lj.get(ai.lj_type, aj.lj_type).compute(r_ij);
            let (f_el, v_el) = self.rf.compute(ai.charge * aj.charge, r_ij);
            add_pair(&mut out, i, j, r_ij, (f_lj + f_el, v_lj + v_el));
        }

        for (i, j) in topology.excluded_pairs() {
            let r_ij = pbc.dx(&x[i], &x[j]);
            let qq = topology.atoms[i].charge * topology.atoms[j].charge;
            add_pair(&mut out, i, j, r_ij, self.rf.compute_excluded(qq, r_ij));
        }

        for bond in &topology.bonds {
            let r_ij = pbc.dx(&x[bond.i], &x[bond.j]);
            add_pair(&mut out, bond.i, bond.j, r_ij, bond.potential.compute(r_ij));
        }

        Ok(out)
    }
}
