//! Titratable sites and residues, and the protonation mutation itself.
//!
//! Sites and residues live in flat vectors and refer to each other (and to
//! the topology) by index. A missing proton is a real topology atom with
//! zero charge and the dummy Lennard-Jones type; it keeps its mass and
//! bonds.

use crate::database::QhopDatabase;
use crate::error::{QhopError, Result};
use hopmd_md::{SimulationState, Topology};
use hopmd_math::Vec3;

/// A proton position on a site.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtonSlot {
    /// Topology atom index.
    pub atom: usize,
    pub name: String,
    pub present: bool,
    /// Lennard-Jones type restored when the proton becomes present.
    pub lj_type: usize,
}

/// A heavy atom that can donate and/or accept protons.
#[derive(Debug, Clone, PartialEq)]
pub struct QhopAtom {
    /// Topology atom index.
    pub atom: usize,
    pub name: String,
    /// Index into [`ReactiveSites::residues`].
    pub residue: usize,
    pub slots: Vec<ProtonSlot>,
    /// Sites found within reach by the last candidate search.
    pub partners: Vec<usize>,
    pub donor: bool,
    pub acceptor: bool,
}

impl QhopAtom {
    pub fn n_present(&self) -> usize {
        self.slots.iter().filter(|s| s.present).count()
    }

    pub fn can_donate(&self) -> bool {
        self.donor && self.slots.iter().any(|s| s.present)
    }

    pub fn can_accept(&self) -> bool {
        self.acceptor && self.first_absent().is_some()
    }

    pub fn first_absent(&self) -> Option<usize> {
        self.slots.iter().position(|s| !s.present)
    }
}

/// A titratable residue.
#[derive(Debug, Clone, PartialEq)]
pub struct QhopResidue {
    /// Topology residue index.
    pub residue: usize,
    /// Index of the residue type in the database.
    pub rtype: usize,
    /// Active subtype within the residue type.
    pub subtype: usize,
    pub water_like: bool,
    /// Indices into [`ReactiveSites::atoms`].
    pub sites: Vec<usize>,
}

/// All titratable sites of a system.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReactiveSites {
    pub atoms: Vec<QhopAtom>,
    pub residues: Vec<QhopResidue>,
    /// Lennard-Jones type of absent protons.
    pub dummy_lj_type: usize,
    /// Site index per topology atom.
    site_of_atom: Vec<Option<usize>>,
}

/// A change of one site's proton pattern.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SiteChange {
    Donate { site: usize, slot: usize },
    Accept { site: usize },
}

impl ReactiveSites {
    /// Match topology residues against the database and set charges and
    /// Lennard-Jones types of every titratable residue to its subtype.
    pub fn setup(topology: &mut Topology, db: &QhopDatabase, dummy_lj_type: usize) -> Result<Self> {
        let mut sites = Self {
            dummy_lj_type,
            site_of_atom: vec![None; topology.natoms()],
            ..Default::default()
        };

        for r in 0..topology.residues.len() {
            let Some((rtype, subtype)) = db.subtype_by_name(&topology.residues[r].name) else {
                continue;
            };
            let spec = &db.residues[rtype];
            let present = &spec.subtypes[subtype].protons;
            let qres = sites.residues.len();
            let mut site_ids = Vec::with_capacity(spec.sites.len());

            for site in &spec.sites {
                let find = |name: &str| {
                    topology.find_atom(r, name).ok_or_else(|| QhopError::MissingAtom {
                        residue: r,
                        name: topology.residues[r].name.clone(),
                        atom: name.to_string(),
                    })
                };
                let atom = find(&site.atom)?;
                let slots = site
                    .protons
                    .iter()
                    .map(|p| {
                        Ok(ProtonSlot {
                            atom: find(&p.name)?,
                            name: p.name.clone(),
                            present: present.contains(&p.name),
                            lj_type: p.lj_type,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                let id = sites.atoms.len();
                sites.site_of_atom[atom] = Some(id);
                site_ids.push(id);
                sites.atoms.push(QhopAtom {
                    atom,
                    name: site.atom.clone(),
                    residue: qres,
                    slots,
                    partners: Vec::new(),
                    donor: site.donor,
                    acceptor: site.acceptor,
                });
            }

            sites.residues.push(QhopResidue {
                residue: r,
                rtype,
                subtype,
                water_like: spec.water_like,
                sites: site_ids,
            });
            sites.apply_subtype(db, topology, qres);
        }

        log::info!(
            "qhop: {} titratable residues with {} sites",
            sites.residues.len(),
            sites.atoms.len()
        );
        Ok(sites)
    }

    /// Site index of a topology atom.
    pub fn site_of_atom(&self, atom: usize) -> Option<usize> {
        self.site_of_atom.get(atom).copied().flatten()
    }

    /// Topology atom indices of all sites.
    pub fn heavy_atoms(&self) -> Vec<usize> {
        self.atoms.iter().map(|a| a.atom).collect()
    }

    /// Names of the protons present on all sites of a residue.
    pub fn present_protons(&self, qres: usize) -> Vec<String> {
        self.residues[qres]
            .sites
            .iter()
            .flat_map(|&s| self.atoms[s].slots.iter())
            .filter(|slot| slot.present)
            .map(|slot| slot.name.clone())
            .collect()
    }

    /// Present protons of a residue after applying `change` to one of its sites.
    pub(crate) fn protons_after(&self, qres: usize, change: SiteChange) -> Vec<String> {
        let water_like = self.residues[qres].water_like;
        let mut names = Vec::new();
        for &s in &self.residues[qres].sites {
            let slots = &self.atoms[s].slots;
            let present: Vec<bool> = match change {
                SiteChange::Donate { site, slot } if site == s => {
                    if water_like {
                        // Remaining protons still fill a prefix
                        let n = self.atoms[s].n_present();
                        (0..slots.len()).map(|k| k + 1 < n).collect()
                    } else {
                        slots.iter().enumerate().map(|(k, p)| p.present && k != slot).collect()
                    }
                }
                SiteChange::Accept { site } if site == s => {
                    let first = self.atoms[s].first_absent();
                    slots.iter().enumerate().map(|(k, p)| p.present || Some(k) == first).collect()
                }
                _ => slots.iter().map(|p| p.present).collect(),
            };
            names.extend(
                slots
                    .iter()
                    .zip(present)
                    .filter(|(_, p)| *p)
                    .map(|(slot, _)| slot.name.clone()),
            );
        }
        names
    }

    /// Subtype a residue would take after `change`, if the database has one.
    pub(crate) fn subtype_after(&self, db: &QhopDatabase, qres: usize, change: SiteChange) -> Option<usize> {
        db.find_subtype(self.residues[qres].rtype, &self.protons_after(qres, change))
    }

    /// Set residue name, charges and Lennard-Jones types from the active subtype.
    fn apply_subtype(&self, db: &QhopDatabase, topology: &mut Topology, qres: usize) {
        let res = &self.residues[qres];
        let sub = db.subtype(res.rtype, res.subtype);
        topology.residues[res.residue].name.clone_from(&sub.name);
        for &a in &topology.residues[res.residue].atoms {
            let atom = &mut topology.atoms[a];
            if let Some(&q) = sub.charges.get(&atom.name) {
                atom.charge = q;
            }
        }
        for &s in &res.sites {
            for slot in &self.atoms[s].slots {
                let atom = &mut topology.atoms[slot.atom];
                if slot.present {
                    atom.lj_type = slot.lj_type;
                } else {
                    atom.charge = 0.0;
                    atom.lj_type = self.dummy_lj_type;
                }
            }
        }
    }

    /// Move the proton in `slot` of site `donor` to the first free slot of
    /// site `acceptor`, and switch both residues to their new subtypes.
    ///
    /// On a water-like donor the present slots rotate so that the remaining
    /// protons stay a prefix: slot `k` takes the coordinates of slot
    /// `(k + slot + 1) % n` and the last present slot becomes the dummy.
    pub fn transfer(
        &mut self,
        db: &QhopDatabase,
        topology: &mut Topology,
        state: &mut SimulationState,
        donor: usize,
        slot: usize,
        acceptor: usize,
    ) -> Result<()> {
        let d_res = self.atoms[donor].residue;
        let a_res = self.atoms[acceptor].residue;
        let new_donor = self.resolve_subtype(db, d_res, SiteChange::Donate { site: donor, slot })?;
        let new_acceptor = self.resolve_subtype(db, a_res, SiteChange::Accept { site: acceptor })?;
        let Some(target) = self.atoms[acceptor].first_absent() else {
            return Err(QhopError::NoSubtype {
                residue_type: db.residues[self.residues[a_res].rtype].name.clone(),
                protons: self.present_protons(a_res),
            });
        };

        let proton_atom = self.atoms[donor].slots[slot].atom;
        let (xh, vh) = (state.x[proton_atom], state.v[proton_atom]);

        if self.residues[d_res].water_like {
            let n = self.atoms[donor].n_present();
            let atoms: Vec<usize> = self.atoms[donor].slots[..n].iter().map(|s| s.atom).collect();
            let old: Vec<(Vec3, Vec3)> = atoms.iter().map(|&a| (state.x[a], state.v[a])).collect();
            for (k, &a) in atoms.iter().enumerate() {
                let (x, v) = old[(k + slot + 1) % n];
                state.x[a] = x;
                state.v[a] = v;
            }
            self.atoms[donor].slots[n - 1].present = false;
        } else {
            self.atoms[donor].slots[slot].present = false;
        }

        let target_atom = self.atoms[acceptor].slots[target].atom;
        state.x[target_atom] = xh;
        state.v[target_atom] = vh;
        self.atoms[acceptor].slots[target].present = true;

        self.residues[d_res].subtype = new_donor;
        self.residues[a_res].subtype = new_acceptor;
        self.apply_subtype(db, topology, d_res);
        self.apply_subtype(db, topology, a_res);
        Ok(())
    }

    fn resolve_subtype(&self, db: &QhopDatabase, qres: usize, change: SiteChange) -> Result<usize> {
        self.subtype_after(db, qres, change).ok_or_else(|| QhopError::NoSubtype {
            residue_type: db.residues[self.residues[qres].rtype].name.clone(),
            protons: self.protons_after(qres, change),
        })
    }

    /// Active subtype name of a residue.
    pub fn subtype_name<'a>(&self, db: &'a QhopDatabase, qres: usize) -> &'a str {
        let res = &self.residues[qres];
        &db.subtype(res.rtype, res.subtype).name
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::tests::WATER_DB;
    use hopmd_md::Atom;
    use hopmd_math::SimBox;
    use approx::assert_relative_eq;

    /// Add a water-like residue with OW and three proton slots.
    pub(crate) fn add_water(top: &mut Topology, name: &str, number: i32) -> usize {
        let r = top.add_residue(name, number);
        let o = top.add_atom(Atom::new("OW", 15.9994, 0.0, 0, r)).unwrap();
        for h in ["HW1", "HW2", "HW3"] {
            let a = top.add_atom(Atom::new(h, 1.008, 0.0, 1, r)).unwrap();
            top.add_bond(o, a, 1000.0, 0.1).unwrap();
        }
        r
    }

    /// Hydronium (residue 0) donating HW1 along +x to a water (residue 1)
    /// with O-O = 0.24 nm. HW3 of the water is the dummy.
    pub(crate) fn hydronium_water() -> (Topology, SimulationState) {
        let mut top = Topology::new();
        add_water(&mut top, "H3O", 1);
        add_water(&mut top, "SOL", 2);
        let x = vec![
            // H3O
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(1.1, 1.0, 1.0),
            Vec3::new(0.967, 1.094, 1.0),
            Vec3::new(0.967, 0.953, 0.918),
            // SOL
            Vec3::new(1.24, 1.0, 1.0),
            Vec3::new(1.273, 1.094, 1.0),
            Vec3::new(1.273, 0.953, 1.082),
            Vec3::new(1.34, 1.0, 1.0),
        ];
        (top, SimulationState::from_positions(x, SimBox::rectangular(Vec3::repeat(3.0))))
    }

    #[test]
    fn test_setup_applies_subtypes() {
        let db = QhopDatabase::from_json(WATER_DB).unwrap();
        let (mut top, _) = hydronium_water();
        let sites = ReactiveSites::setup(&mut top, &db, 2).unwrap();

        assert_eq!(sites.residues.len(), 2);
        assert_eq!(sites.atoms.len(), 2);
        assert_eq!(sites.site_of_atom(4), Some(1));
        assert_eq!(sites.atoms[0].n_present(), 3);
        assert!(sites.atoms[1].can_accept());
        assert!(!sites.atoms[0].can_accept());

        // Dummy proton of the water
        assert_eq!(top.atoms[7].charge, 0.0);
        assert_eq!(top.atoms[7].lj_type, 2);
        assert_relative_eq!(top.atoms[4].charge, -0.82);
        let total: f64 = top.atoms.iter().map(|a| a.charge).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_atom_is_an_error() {
        let db = QhopDatabase::from_json(WATER_DB).unwrap();
        let mut top = Topology::new();
        let r = top.add_residue("SOL", 1);
        top.add_atom(Atom::new("OW", 16.0, 0.0, 0, r)).unwrap();
        let err = ReactiveSites::setup(&mut top, &db, 0).unwrap_err();
        assert!(matches!(err, QhopError::MissingAtom { .. }));
    }

    #[test]
    fn test_transfer_rotates_water_slots() {
        let db = QhopDatabase::from_json(WATER_DB).unwrap();
        let (mut top, mut state) = hydronium_water();
        let mut sites = ReactiveSites::setup(&mut top, &db, 2).unwrap();
        let before = state.x.clone();
        state.v[1] = Vec3::new(0.3, 0.0, 0.0);

        // Donate HW1 (slot 0) of the hydronium
        sites.transfer(&db, &mut top, &mut state, 0, 0, 1).unwrap();

        assert_eq!(top.residues[0].name, "SOL");
        assert_eq!(top.residues[1].name, "H3O");
        // Remaining protons moved into HW1 and HW2; HW3 holds the old HW1 spot
        assert_eq!(state.x[1], before[2]);
        assert_eq!(state.x[2], before[3]);
        assert_eq!(state.x[3], before[1]);
        assert_eq!(top.atoms[3].charge, 0.0);
        assert_eq!(top.atoms[3].lj_type, 2);
        // Acceptor's dummy took the proton with its velocity
        assert_eq!(state.x[7], before[1]);
        assert_eq!(state.v[7], Vec3::new(0.3, 0.0, 0.0));
        assert_eq!(top.atoms[7].lj_type, 1);
        assert_relative_eq!(top.atoms[7].charge, 0.5);

        assert_eq!(sites.present_protons(0), vec!["HW1", "HW2"]);
        assert_eq!(sites.subtype_name(&db, 1), "H3O");
        let total: f64 = top.atoms.iter().map(|a| a.charge).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_protons_after_donation_keeps_prefix() {
        let db = QhopDatabase::from_json(WATER_DB).unwrap();
        let (mut top, _) = hydronium_water();
        let sites = ReactiveSites::setup(&mut top, &db, 2).unwrap();
        let after = sites.protons_after(0, SiteChange::Donate { site: 0, slot: 1 });
        assert_eq!(after, vec!["HW1", "HW2"]);
        assert_eq!(sites.subtype_after(&db, 0, SiteChange::Donate { site: 0, slot: 1 }), Some(0));
        // A water cannot lose a proton: no hydroxide subtype
        assert_eq!(sites.subtype_after(&db, 1, SiteChange::Donate { site: 1, slot: 0 }), None);
    }
}
