//! Reactive residue database.
//!
//! A residue type lists its titratable sites and the protonation variants
//! (subtypes) it can take. Each subtype is a topology residue name with its
//! own set of present protons and charges. Hopping parameters are keyed by
//! the subtype names of donor and acceptor before the transfer.
//!
//! ```json
//! {
//!   "residues": [{
//!     "name": "water",
//!     "water_like": true,
//!     "sites": [{ "atom": "OW", "protons": [
//!       { "name": "HW1", "lj_type": 1 },
//!       { "name": "HW2", "lj_type": 1 },
//!       { "name": "HW3", "lj_type": 1 }
//!     ] }],
//!     "subtypes": [
//!       { "name": "SOL", "protons": ["HW1", "HW2"], "charges": { "OW": -0.82, "HW1": 0.41, "HW2": 0.41 } },
//!       { "name": "H3O", "protons": ["HW1", "HW2", "HW3"], "charges": { "OW": -0.5, "HW1": 0.5, "HW2": 0.5, "HW3": 0.5 } }
//!     ]
//!   }],
//!   "parameters": [{ "donor": "H3O", "acceptor": "SOL", "params": { ... } }]
//! }
//! ```

use crate::error::{QhopError, Result};
use crate::params::QhopParameters;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A proton position on a titratable site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtonSlotSpec {
    pub name: String,
    /// Lennard-Jones type while the proton is present.
    #[serde(default)]
    pub lj_type: usize,
}

/// A heavy atom that can donate and/or accept protons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSpec {
    pub atom: String,
    pub protons: Vec<ProtonSlotSpec>,
    #[serde(default = "default_true")]
    pub donor: bool,
    #[serde(default = "default_true")]
    pub acceptor: bool,
}

fn default_true() -> bool {
    true
}

/// One protonation variant of a residue type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidueSubtype {
    /// Residue name in the topology.
    pub name: String,
    /// Names of the protons present in this variant.
    pub protons: Vec<String>,
    /// Charges by atom name; absent protons carry zero charge.
    #[serde(default)]
    pub charges: HashMap<String, f64>,
}

/// A titratable residue type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactiveResidueType {
    pub name: String,
    /// Present protons are kept as a prefix of each site's slot list,
    /// rotating the slots when one is donated.
    #[serde(default)]
    pub water_like: bool,
    pub sites: Vec<SiteSpec>,
    pub subtypes: Vec<ResidueSubtype>,
}

/// Hopping parameters for one donor/acceptor subtype pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEntry {
    pub donor: String,
    pub acceptor: String,
    pub params: QhopParameters,
}

/// Residue types plus hopping parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QhopDatabase {
    pub residues: Vec<ReactiveResidueType>,
    #[serde(default)]
    pub parameters: Vec<ParameterEntry>,
}

fn same_protons(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|name| b.contains(name))
}

impl QhopDatabase {
    pub fn from_json(json: &str) -> Result<Self> {
        let db: Self = serde_json::from_str(json)?;
        db.validate()?;
        Ok(db)
    }

    /// Check internal consistency.
    ///
    /// Subtype names must be unique across the database, every subtype
    /// proton must be a slot of the type, and no two subtypes of a type may
    /// share a proton set. In water-like types each subtype's protons must
    /// fill a prefix of every site's slots.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashMap::new();
        for (t, rtype) in self.residues.iter().enumerate() {
            if rtype.sites.is_empty() || rtype.subtypes.is_empty() {
                return Err(QhopError::InvalidDatabase(format!(
                    "residue type {} needs at least one site and one subtype",
                    rtype.name
                )));
            }
            let slots: Vec<&str> = rtype
                .sites
                .iter()
                .flat_map(|s| s.protons.iter().map(|p| p.name.as_str()))
                .collect();

            for (k, sub) in rtype.subtypes.iter().enumerate() {
                if let Some(prev) = seen.insert(sub.name.as_str(), t) {
                    return Err(QhopError::InvalidDatabase(format!(
                        "subtype {} appears in residue types {} and {}",
                        sub.name, self.residues[prev].name, rtype.name
                    )));
                }
                if let Some(bad) = sub.protons.iter().find(|p| !slots.contains(&p.as_str())) {
                    return Err(QhopError::InvalidDatabase(format!(
                        "subtype {} lists proton {} which is not a slot of {}",
                        sub.name, bad, rtype.name
                    )));
                }
                if rtype.subtypes[..k].iter().any(|o| same_protons(&o.protons, &sub.protons)) {
                    return Err(QhopError::InvalidDatabase(format!(
                        "subtypes of {} share the proton set of {}",
                        rtype.name, sub.name
                    )));
                }
                if rtype.water_like {
                    for site in &rtype.sites {
                        let present: Vec<bool> = site.protons.iter().map(|p| sub.protons.contains(&p.name)).collect();
                        if present.windows(2).any(|w| !w[0] && w[1]) {
                            return Err(QhopError::InvalidDatabase(format!(
                                "water-like subtype {} does not fill a prefix of the slots of {}",
                                sub.name, site.atom
                            )));
                        }
                    }
                }
            }
        }

        for entry in &self.parameters {
            for name in [&entry.donor, &entry.acceptor] {
                if self.subtype_by_name(name).is_none() {
                    return Err(QhopError::InvalidDatabase(format!("parameters refer to unknown subtype {name}")));
                }
            }
        }
        Ok(())
    }

    /// `(type, subtype)` indices of a topology residue name.
    pub fn subtype_by_name(&self, name: &str) -> Option<(usize, usize)> {
        self.residues.iter().enumerate().find_map(|(t, rtype)| {
            rtype
                .subtypes
                .iter()
                .position(|s| s.name == name)
                .map(|k| (t, k))
        })
    }

    /// Subtype of `rtype` whose present protons are exactly `protons`.
    pub fn find_subtype(&self, rtype: usize, protons: &[String]) -> Option<usize> {
        self.residues[rtype]
            .subtypes
            .iter()
            .position(|s| same_protons(&s.protons, protons))
    }

    pub fn subtype(&self, rtype: usize, subtype: usize) -> &ResidueSubtype {
        &self.residues[rtype].subtypes[subtype]
    }

    /// Parameters for a transfer from subtype `donor` to subtype `acceptor`.
    pub fn parameters(&self, donor: &str, acceptor: &str) -> Result<&QhopParameters> {
        self.parameters
            .iter()
            .find(|e| e.donor == donor && e.acceptor == acceptor)
            .map(|e| &e.params)
            .ok_or_else(|| QhopError::MissingParameters {
                donor: donor.to_string(),
                acceptor: acceptor.to_string(),
            })
    }

    /// Check that every parameter set keeps `E12_left < E12_right` on a
    /// grid of donor-acceptor distances up to `r_max`.
    pub fn validate_boundaries(&self, r_min: f64, r_max: f64) -> Result<()> {
        const SAMPLES: usize = 16;
        for entry in &self.parameters {
            for k in 0..=SAMPLES {
                let rda = r_min + (r_max - r_min) * k as f64 / SAMPLES as f64;
                let (left, right) = entry.params.boundaries(rda);
                if left >= right {
                    return Err(QhopError::InvalidBoundaries {
                        donor: entry.donor.clone(),
                        acceptor: entry.acceptor.clone(),
                        rda,
                        left,
                        right,
                    });
                }
            }
        }
        Ok(())
    }
}
