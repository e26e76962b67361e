//! Molecular topology: atoms, residues, bonded terms and exclusions.
//!
//! Charges and Lennard-Jones types are mutable so that protonation changes
//! can be applied in place during a run; everything else is fixed after
//! construction.

use crate::error::{MdError, Result};
use crate::forcefield::HarmonicBond;
use hopmd_constraint::{Constraint, ConstraintTopology, SettleGroup};
use serde::{Deserialize, Serialize};

/// A single atom.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub name: String,
    /// Mass (amu).
    pub mass: f64,
    /// Partial charge (e).
    pub charge: f64,
    /// Lennard-Jones type index.
    pub lj_type: usize,
    /// Index into [`Topology::residues`].
    pub residue: usize,
    #[serde(default)]
    pub tc_group: usize,
    #[serde(default)]
    pub accel_group: usize,
    #[serde(default)]
    pub freeze_group: usize,
}

impl Atom {
    pub fn new(name: &str, mass: f64, charge: f64, lj_type: usize, residue: usize) -> Self {
        Self {
            name: name.to_string(),
            mass,
            charge,
            lj_type,
            residue,
            tc_group: 0,
            accel_group: 0,
            freeze_group: 0,
        }
    }
}

/// A named group of atoms; membership need not be contiguous.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Residue {
    pub name: String,
    pub number: i32,
    pub atoms: Vec<usize>,
}

/// Harmonic bond between two atoms.
#[derive(Clone, Debug)]
pub struct Bond {
    pub i: usize,
    pub j: usize,
    pub potential: HarmonicBond,
}

/// Full system topology.
#[derive(Clone, Debug, Default)]
pub struct Topology {
    pub atoms: Vec<Atom>,
    pub residues: Vec<Residue>,
    pub bonds: Vec<Bond>,
    pub constraints: ConstraintTopology,
    /// Sorted excluded partners per atom.
    exclusions: Vec<Vec<usize>>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn natoms(&self) -> usize {
        self.atoms.len()
    }

    /// Start a new residue and return its index.
    pub fn add_residue(&mut self, name: &str, number: i32) -> usize {
        self.residues.push(Residue {
            name: name.to_string(),
            number,
            atoms: Vec::new(),
        });
        self.residues.len() - 1
    }

    /// Add an atom to its residue and return its index.
    pub fn add_atom(&mut self, atom: Atom) -> Result<usize> {
        let index = self.atoms.len();
        let residue = self.residues.get_mut(atom.residue).ok_or_else(|| {
            MdError::InvalidTopology(format!(
                "atom {} refers to missing residue {}",
                atom.name, atom.residue
            ))
        })?;
        if atom.mass < 0.0 {
            return Err(MdError::InvalidTopology(format!(
                "atom {} has negative mass {}",
                atom.name, atom.mass
            )));
        }
        residue.atoms.push(index);
        self.atoms.push(atom);
        self.exclusions.push(Vec::new());
        Ok(index)
    }

    /// Add a harmonic bond; the pair is excluded from non-bonded interactions.
    pub fn add_bond(&mut self, i: usize, j: usize, k: f64, r0: f64) -> Result<()> {
        self.check_pair(i, j)?;
        self.bonds.push(Bond {
            i,
            j,
            potential: HarmonicBond::new(k, r0),
        });
        self.add_exclusion(i, j)
    }

    /// Add a fixed-length constraint; the pair is excluded.
    pub fn add_constraint(&mut self, i: usize, j: usize, length: f64) -> Result<()> {
        self.check_pair(i, j)?;
        self.constraints.add_constraint(Constraint::new(i, j, length));
        self.add_exclusion(i, j)
    }

    /// Add a rigid water; all three pairs are excluded.
    pub fn add_settle(&mut self, o: usize, h1: usize, h2: usize, d_oh: f64, d_hh: f64) -> Result<()> {
        self.check_pair(o, h1)?;
        self.check_pair(o, h2)?;
        self.check_pair(h1, h2)?;
        self.constraints.add_settle(SettleGroup::new(o, h1, h2, d_oh, d_hh));
        self.add_exclusion(o, h1)?;
        self.add_exclusion(o, h2)?;
        self.add_exclusion(h1, h2)
    }

    pub fn add_exclusion(&mut self, i: usize, j: usize) -> Result<()> {
        self.check_pair(i, j)?;
        for (a, b) in [(i, j), (j, i)] {
            let list = &mut self.exclusions[a];
            if let Err(pos) = list.binary_search(&b) {
                list.insert(pos, b);
            }
        }
        Ok(())
    }

    /// Exclude all pairs within `nrexcl` bonds (bonds and constraints count).
    pub fn exclude_neighbors(&mut self, nrexcl: usize) -> Result<()> {
        let n = self.natoms();
        let mut adjacency = vec![Vec::new(); n];
        for (i, j) in self.bonded_pairs() {
            adjacency[i].push(j);
            adjacency[j].push(i);
        }
        for start in 0..n {
            let mut frontier = vec![start];
            let mut seen = vec![start];
            for _ in 0..nrexcl {
                let mut next = Vec::new();
                for &a in &frontier {
                    for &b in &adjacency[a] {
                        if !seen.contains(&b) {
                            seen.push(b);
                            next.push(b);
                        }
                    }
                }
                frontier = next;
            }
            for &b in seen.iter().skip(1) {
                self.add_exclusion(start, b)?;
            }
        }
        Ok(())
    }

    #[inline]
    pub fn is_excluded(&self, i: usize, j: usize) -> bool {
        self.exclusions[i].binary_search(&j).is_ok()
    }

    pub fn exclusions(&self, i: usize) -> &[usize] {
        &self.exclusions[i]
    }

    /// All excluded pairs with `i < j`.
    pub fn excluded_pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.exclusions
            .iter()
            .enumerate()
            .flat_map(|(i, list)| list.iter().filter(move |&&j| j > i).map(move |&j| (i, j)))
    }

    /// Every pair joined by a bond, a constraint or a rigid water.
    pub fn bonded_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs: Vec<(usize, usize)> = self.bonds.iter().map(|b| (b.i, b.j)).collect();
        pairs.extend(self.constraints.constraints().iter().map(|c| (c.ai, c.aj)));
        for s in self.constraints.settles() {
            let [o, h1, h2] = s.atoms();
            pairs.extend([(o, h1), (o, h2)]);
        }
        pairs
    }

    pub fn masses(&self) -> Vec<f64> {
        self.atoms.iter().map(|a| a.mass).collect()
    }

    pub fn charges(&self) -> Vec<f64> {
        self.atoms.iter().map(|a| a.charge).collect()
    }

    pub fn residue_of(&self, atom: usize) -> usize {
        self.atoms[atom].residue
    }

    /// Find an atom by name within a residue.
    pub fn find_atom(&self, residue: usize, name: &str) -> Option<usize> {
        self.residues[residue]
            .atoms
            .iter()
            .copied()
            .find(|&a| self.atoms[a].name == name)
    }

    fn check_pair(&self, i: usize, j: usize) -> Result<()> {
        let n = self.natoms();
        if i >= n || j >= n {
            return Err(MdError::InvalidTopology(format!(
                "pair ({i}, {j}) out of range for {n} atoms"
            )));
        }
        if i == j {
            return Err(MdError::InvalidTopology(format!("atom {i} paired with itself")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn propane_like() -> Topology {
        let mut top = Topology::new();
        let r = top.add_residue("PRP", 1);
        for name in ["C1", "C2", "C3", "H"] {
            top.add_atom(Atom::new(name, 12.011, 0.0, 0, r)).unwrap();
        }
        top.add_bond(0, 1, 2.0e5, 0.153).unwrap();
        top.add_bond(1, 2, 2.0e5, 0.153).unwrap();
        top.add_constraint(2, 3, 0.109).unwrap();
        top
    }

    #[test]
    fn test_bonds_are_excluded() {
        let top = propane_like();
        assert!(top.is_excluded(0, 1));
        assert!(top.is_excluded(1, 0));
        assert!(top.is_excluded(2, 3));
        assert!(!top.is_excluded(0, 2));
    }

    #[test]
    fn test_exclude_neighbors() {
        let mut top = propane_like();
        top.exclude_neighbors(2).unwrap();
        assert!(top.is_excluded(0, 2));
        assert!(top.is_excluded(1, 3));
        assert!(!top.is_excluded(0, 3));
        let pairs: Vec<_> = top.excluded_pairs().collect();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)]);
    }

    #[test]
    fn test_invalid_pairs_rejected() {
        let mut top = propane_like();
        assert!(top.add_bond(0, 0, 1.0, 0.1).is_err());
        assert!(top.add_bond(0, 9, 1.0, 0.1).is_err());
        assert!(top.add_atom(Atom::new("X", 1.0, 0.0, 0, 7)).is_err());
    }

    #[test]
    fn test_find_atom() {
        let top = propane_like();
        assert_eq!(top.find_atom(0, "C3"), Some(2));
        assert_eq!(top.find_atom(0, "O"), None);
        assert_eq!(top.residues[0].atoms.len(), 4);
    }
}
