//! Energy gap of a candidate hop.
//!
//! The environment energy is the total force-field energy minus the
//! reaction-field self energy of the donor and acceptor residues. The hop
//! is applied inside a snapshot transaction, the energy re-evaluated, and
//! the snapshot restored by plain value copies.

use crate::database::QhopDatabase;
use crate::error::Result;
use crate::hop::Hop;
use crate::residue::{QhopAtom, QhopResidue, ReactiveSites};
use hopmd_md::{ForceEvaluator, ReactionField, SimulationState, Topology};
use hopmd_math::Vec3;

/// Energies of a hop evaluation (kJ/mol).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HopEnergetics {
    /// Total potential before the hop.
    pub e_before: f64,
    /// Total potential after the hop.
    pub e_after: f64,
    pub self_before: f64,
    pub self_after: f64,
    /// Environment gap plus the empirical correction.
    pub e12: f64,
}

impl HopEnergetics {
    /// Change of the full force-field energy caused by the hop.
    pub fn de_ff(&self) -> f64 {
        self.e_after - self.e_before
    }
}

/// Reaction-field Coulomb energy among `atoms`.
///
/// Excluded pairs contribute only the reaction-field terms.
pub fn self_energy(topology: &Topology, state: &SimulationState, atoms: &[usize], rf: &ReactionField) -> f64 {
    let mut energy = 0.0;
    for (k, &i) in atoms.iter().enumerate() {
        for &j in &atoms[k + 1..] {
            let qq = topology.atoms[i].charge * topology.atoms[j].charge;
            let r_ij = state.sim_box.dx(&state.x[i], &state.x[j]);
            let (_, v) = if topology.is_excluded(i, j) {
                rf.compute_excluded(qq, r_ij)
            } else {
                rf.compute(qq, r_ij)
            };
            energy += v;
        }
    }
    energy
}

/// Values a hop may change, for an exact restore.
#[derive(Debug, Clone)]
pub struct ProtonationSnapshot {
    residues: Vec<(usize, QhopResidue, String)>,
    sites: Vec<(usize, QhopAtom)>,
    atoms: Vec<(usize, f64, usize, Vec3, Vec3)>,
}

impl ProtonationSnapshot {
    /// Capture the titratable residues `qres` and all their atoms.
    pub fn capture(sites: &ReactiveSites, topology: &Topology, state: &SimulationState, qres: &[usize]) -> Self {
        let mut snapshot = Self {
            residues: Vec::new(),
            sites: Vec::new(),
            atoms: Vec::new(),
        };
        for &q in qres {
            let res = &sites.residues[q];
            let top_res = &topology.residues[res.residue];
            snapshot.residues.push((q, res.clone(), top_res.name.clone()));
            snapshot.sites.extend(res.sites.iter().map(|&s| (s, sites.atoms[s].clone())));
            snapshot.atoms.extend(top_res.atoms.iter().map(|&a| {
                let atom = &topology.atoms[a];
                (a, atom.charge, atom.lj_type, state.x[a], state.v[a])
            }));
        }
        snapshot
    }

    /// Write every captured value back.
    pub fn restore(self, sites: &mut ReactiveSites, topology: &mut Topology, state: &mut SimulationState) {
        for (q, res, name) in self.residues {
            topology.residues[res.residue].name = name;
            sites.residues[q] = res;
        }
        for (s, site) in self.sites {
            sites.atoms[s] = site;
        }
        for (a, charge, lj_type, x, v) in self.atoms {
            topology.atoms[a].charge = charge;
            topology.atoms[a].lj_type = lj_type;
            state.x[a] = x;
            state.v[a] = v;
        }
    }
}

/// Topology atoms of the donor and acceptor residues.
pub fn reaction_atoms(sites: &ReactiveSites, topology: &Topology, hop: &Hop) -> Vec<usize> {
    let d_res = sites.residues[sites.atoms[hop.donor].residue].residue;
    let a_res = sites.residues[sites.atoms[hop.acceptor].residue].residue;
    let mut atoms = topology.residues[d_res].atoms.clone();
    if a_res != d_res {
        atoms.extend_from_slice(&topology.residues[a_res].atoms);
    }
    atoms
}

/// Evaluate the energy gap of `hop` and leave everything as it was.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_hop<E: ForceEvaluator>(
    sites: &mut ReactiveSites,
    db: &QhopDatabase,
    topology: &mut Topology,
    state: &mut SimulationState,
    evaluator: &mut E,
    rf: &ReactionField,
    hop: &Hop,
    gap_correction: f64,
) -> Result<HopEnergetics> {
    let atoms = reaction_atoms(sites, topology, hop);
    let e_before = evaluator.evaluate(topology, state)?.potential;
    let self_before = self_energy(topology, state, &atoms, rf);

    let qres = [sites.atoms[hop.donor].residue, sites.atoms[hop.acceptor].residue];
    let snapshot = ProtonationSnapshot::capture(sites, topology, state, &qres);
    let after = sites
        .transfer(db, topology, state, hop.donor, hop.slot, hop.acceptor)
        .and_then(|()| Ok(evaluator.evaluate(topology, state)?.potential))
        .map(|e_after| (e_after, self_energy(topology, state, &atoms, rf)));
    snapshot.restore(sites, topology, state);
    let (e_after, self_after) = after?;

    let e12 = (e_after - self_after) - (e_before - self_before) + gap_correction;
    Ok(HopEnergetics {
        e_before,
        e_after,
        self_before,
        self_after,
        e12,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::WATER_DB;
    use crate::residue::tests::hydronium_water;
    use hopmd_md::{LjTable, PairForceField, PairForceFieldConfig};
    use approx::assert_relative_eq;

    fn force_field() -> PairForceField {
        let lj = LjTable::from_sigma_epsilon(&[(0.315, 0.636), (0.0, 0.0), (0.0, 0.0)]);
        PairForceField::new(lj, &PairForceFieldConfig::default())
    }

    fn hop() -> Hop {
        Hop {
            donor: 0,
            acceptor: 1,
            proton: 1,
            slot: 0,
            rda: 0.24,
            angle: 180.0,
            energetics: None,
            regime: None,
            probability: 0.0,
        }
    }

    #[test]
    fn test_self_energy_pair() {
        let (mut top, state) = hydronium_water();
        for a in &mut top.atoms {
            a.charge = 0.0;
        }
        top.atoms[0].charge = 1.0;
        top.atoms[4].charge = -1.0;
        let rf = ReactionField::new(0.9, 1.0, 0.0);
        let expected = rf.compute(-1.0, Vec3::new(0.24, 0.0, 0.0)).1;
        assert_relative_eq!(self_energy(&top, &state, &[0, 4], &rf), expected);
        assert!(expected < 0.0);
    }

    #[test]
    fn test_excluded_pairs_use_rf_terms_only() {
        let (mut top, state) = hydronium_water();
        top.atoms[0].charge = -1.0;
        top.atoms[1].charge = 1.0;
        let rf = ReactionField::new(0.9, 1.0, 0.0);
        // O-HW1 is bonded, hence excluded
        let r = state.x[1] - state.x[0];
        assert_relative_eq!(self_energy(&top, &state, &[0, 1], &rf), rf.compute_excluded(-1.0, r).1);
    }

    #[test]
    fn test_evaluation_restores_exactly() {
        let db = QhopDatabase::from_json(WATER_DB).unwrap();
        let (mut top, mut state) = hydronium_water();
        state.v[1] = Vec3::new(0.5, -0.2, 0.1);
        let mut sites = ReactiveSites::setup(&mut top, &db, 2).unwrap();
        let rf = ReactionField::new(0.9, 1.0, 0.0);
        let mut ff = force_field();

        let top_before = format!("{top:?}");
        let sites_before = sites.clone();
        let x_before = state.x.clone();
        let v_before = state.v.clone();

        let energetics = evaluate_hop(&mut sites, &db, &mut top, &mut state, &mut ff, &rf, &hop(), 0.0).unwrap();

        assert_eq!(format!("{top:?}"), top_before);
        assert_eq!(sites, sites_before);
        assert_eq!(state.x, x_before);
        assert_eq!(state.v, v_before);
        assert!(energetics.e_before != energetics.e_after);
        assert_relative_eq!(
            energetics.e12,
            (energetics.e_after - energetics.self_after) - (energetics.e_before - energetics.self_before)
        );
    }

    #[test]
    fn test_gap_correction_shifts_e12() {
        let db = QhopDatabase::from_json(WATER_DB).unwrap();
        let (mut top, mut state) = hydronium_water();
        let mut sites = ReactiveSites::setup(&mut top, &db, 2).unwrap();
        let rf = ReactionField::new(0.9, 1.0, 0.0);
        let mut ff = force_field();

        let plain = evaluate_hop(&mut sites, &db, &mut top, &mut state, &mut ff, &rf, &hop(), 0.0).unwrap();
        let shifted = evaluate_hop(&mut sites, &db, &mut top, &mut state, &mut ff, &rf, &hop(), 5.0).unwrap();
        assert_relative_eq!(shifted.e12 - plain.e12, 5.0, epsilon = 1e-9);
    }
}
