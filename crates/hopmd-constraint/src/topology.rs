//! Constraint topology: pair constraints, rigid waters, and their coupling graph.

use crate::error::{ConstraintError, Result};
use hopmd_math::{SimBox, Vec3};

/// Maximum number of coupled constraints for a constraint to count as light.
pub const LIGHT_COUPLING_LIMIT: usize = 4;

/// Fixed-length constraint between two atoms.
#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    pub ai: usize,
    pub aj: usize,
    /// Target length in the A state (nm).
    pub length_a: f64,
    /// Target length in the B state (nm).
    pub length_b: f64,
}

impl Constraint {
    /// Constraint with the same length in both states.
    pub fn new(ai: usize, aj: usize, length: f64) -> Self {
        Self {
            ai,
            aj,
            length_a: length,
            length_b: length,
        }
    }

    /// Constraint whose length is interpolated between two states.
    pub fn perturbed(ai: usize, aj: usize, length_a: f64, length_b: f64) -> Self {
        Self {
            ai,
            aj,
            length_a,
            length_b,
        }
    }

    /// Target length at free-energy coupling parameter `lambda`.
    #[inline]
    pub fn length(&self, lambda: f64) -> f64 {
        (1.0 - lambda) * self.length_a + lambda * self.length_b
    }

    pub fn involves(&self, atom: usize) -> bool {
        self.ai == atom || self.aj == atom
    }
}

/// Rigid three-site water handled analytically by SETTLE.
#[derive(Clone, Debug, PartialEq)]
pub struct SettleGroup {
    pub oxygen: usize,
    pub hydrogens: [usize; 2],
    /// O-H distance (nm).
    pub d_oh: f64,
    /// H-H distance (nm).
    pub d_hh: f64,
}

impl SettleGroup {
    pub fn new(oxygen: usize, h1: usize, h2: usize, d_oh: f64, d_hh: f64) -> Self {
        Self {
            oxygen,
            hydrogens: [h1, h2],
            d_oh,
            d_hh,
        }
    }

    pub fn atoms(&self) -> [usize; 3] {
        [self.oxygen, self.hydrogens[0], self.hydrogens[1]]
    }
}

/// Coupling of one constraint to another through a shared atom.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coupling {
    /// Index of the coupled constraint.
    pub constraint: usize,
    /// Atom shared by both constraints.
    pub shared_atom: usize,
    /// -1 when the shared atom has the same role (first/second) in both
    /// constraints, +1 otherwise.
    pub sign: f64,
}

/// Constraint coupling graph, split into light and heavy constraints.
#[derive(Clone, Debug, Default)]
pub struct CouplingGraph {
    pub couplings: Vec<Vec<Coupling>>,
    /// Constraints with at most [`LIGHT_COUPLING_LIMIT`] couplings.
    pub light: Vec<usize>,
    /// Constraints with more than [`LIGHT_COUPLING_LIMIT`] couplings.
    pub heavy: Vec<usize>,
}

/// All constraints of a system.
#[derive(Clone, Debug, Default)]
pub struct ConstraintTopology {
    constraints: Vec<Constraint>,
    settles: Vec<SettleGroup>,
}

impl ConstraintTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn add_settle(&mut self, settle: SettleGroup) {
        self.settles.push(settle);
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn settles(&self) -> &[SettleGroup] {
        &self.settles
    }

    /// Number of degrees of freedom removed (3 per SETTLE water).
    pub fn removed_dof(&self) -> usize {
        self.constraints.len() + 3 * self.settles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty() && self.settles.is_empty()
    }

    /// True when any constraint length differs between A and B state.
    pub fn is_perturbed(&self) -> bool {
        self.constraints.iter().any(|c| c.length_a != c.length_b)
    }

    /// Target lengths at `lambda`.
    pub fn lengths(&self, lambda: f64) -> Vec<f64> {
        self.constraints.iter().map(|c| c.length(lambda)).collect()
    }

    /// Check indices and lengths against the number of atoms.
    pub fn validate(&self, natoms: usize) -> Result<()> {
        let mut in_settle = vec![false; natoms];
        for (index, s) in self.settles.iter().enumerate() {
            for a in s.atoms() {
                if a >= natoms {
                    return Err(ConstraintError::AtomOutOfRange { index: a, natoms });
                }
                if in_settle[a] {
                    return Err(ConstraintError::InvalidSettle {
                        index,
                        reason: format!("atom {a} appears in more than one water"),
                    });
                }
                in_settle[a] = true;
            }
            if !(s.d_oh > 0.0 && s.d_hh > 0.0 && s.d_hh < 2.0 * s.d_oh) {
                return Err(ConstraintError::InvalidSettle {
                    index,
                    reason: format!("impossible geometry d_OH={} d_HH={}", s.d_oh, s.d_hh),
                });
            }
        }
        for (index, c) in self.constraints.iter().enumerate() {
            for a in [c.ai, c.aj] {
                if a >= natoms {
                    return Err(ConstraintError::AtomOutOfRange { index: a, natoms });
                }
            }
            if c.ai == c.aj {
                return Err(ConstraintError::InvalidConstraint {
                    index,
                    reason: format!("atom {} constrained to itself", c.ai),
                });
            }
            if c.length_a <= 0.0 || c.length_b <= 0.0 {
                return Err(ConstraintError::InvalidConstraint {
                    index,
                    reason: format!("non-positive length {} / {}", c.length_a, c.length_b),
                });
            }
            if in_settle[c.ai] || in_settle[c.aj] {
                return Err(ConstraintError::InvalidConstraint {
                    index,
                    reason: "atom is already handled by SETTLE".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Partition constraints into independently solvable blocks.
    ///
    /// Blocks are the connected components of the constraint graph, ordered
    /// by their lowest atom index; constraints inside a block are ordered by
    /// index.
    pub fn blocks(&self) -> Vec<Vec<usize>> {
        let natoms = self
            .constraints
            .iter()
            .map(|c| c.ai.max(c.aj) + 1)
            .max()
            .unwrap_or(0);
        let mut parent: Vec<usize> = (0..natoms).collect();

        fn find(parent: &mut [usize], mut a: usize) -> usize {
            while parent[a] != a {
                parent[a] = parent[parent[a]];
                a = parent[a];
            }
            a
        }

        for c in &self.constraints {
            let ri = find(&mut parent, c.ai);
            let rj = find(&mut parent, c.aj);
            if ri != rj {
                // Root at the lower index so the root is the block's first atom
                let (lo, hi) = if ri < rj { (ri, rj) } else { (rj, ri) };
                parent[hi] = lo;
            }
        }

        let mut by_root: Vec<Option<Vec<usize>>> = vec![None; natoms];
        for (index, c) in self.constraints.iter().enumerate() {
            let root = find(&mut parent, c.ai);
            by_root[root].get_or_insert_with(Vec::new).push(index);
        }
        by_root.into_iter().flatten().collect()
    }

    /// Build the coupling graph used by LINCS.
    pub fn coupling_graph(&self) -> CouplingGraph {
        let natoms = self
            .constraints
            .iter()
            .map(|c| c.ai.max(c.aj) + 1)
            .max()
            .unwrap_or(0);

        let mut atom_constraints: Vec<Vec<usize>> = vec![Vec::new(); natoms];
        for (b, c) in self.constraints.iter().enumerate() {
            atom_constraints[c.ai].push(b);
            atom_constraints[c.aj].push(b);
        }

        let mut couplings = Vec::with_capacity(self.constraints.len());
        let mut light = Vec::new();
        let mut heavy = Vec::new();
        for (b, c) in self.constraints.iter().enumerate() {
            let mut list = Vec::new();
            for (atom, first) in [(c.ai, true), (c.aj, false)] {
                for &other in &atom_constraints[atom] {
                    if other == b {
                        continue;
                    }
                    let oc = &self.constraints[other];
                    let other_first = oc.ai == atom;
                    let sign = if first == other_first { -1.0 } else { 1.0 };
                    list.push(Coupling {
                        constraint: other,
                        shared_atom: atom,
                        sign,
                    });
                }
            }
            if list.len() <= LIGHT_COUPLING_LIMIT {
                light.push(b);
            } else {
                heavy.push(b);
            }
            couplings.push(list);
        }

        CouplingGraph {
            couplings,
            light,
            heavy,
        }
    }
}

/// Relative deviation of constrained lengths from their targets.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DeviationStats {
    /// Root mean square of `|r - d| / d`.
    pub rms: f64,
    /// Largest `|r - d| / d`.
    pub max: f64,
    /// Constraint with the largest deviation.
    pub max_index: Option<usize>,
}

/// Compute deviation statistics for pair constraints with targets `lengths`.
pub fn deviation_stats(
    constraints: &[Constraint],
    lengths: &[f64],
    x: &[Vec3],
    pbc: &SimBox,
) -> DeviationStats {
    let mut stats = DeviationStats::default();
    if constraints.is_empty() {
        return stats;
    }
    let mut sum2 = 0.0;
    for (b, (c, &len)) in constraints.iter().zip(lengths).enumerate() {
        let r = pbc.dx(&x[c.aj], &x[c.ai]).norm();
        let dev = (r - len).abs() / len;
        sum2 += dev * dev;
        if stats.max_index.is_none() || dev > stats.max {
            stats.max = dev;
            stats.max_index = Some(b);
        }
    }
    stats.rms = (sum2 / constraints.len() as f64).sqrt();
    stats
}
