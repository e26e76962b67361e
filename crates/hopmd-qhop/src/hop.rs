//! Candidate proton transfers.

use crate::config::QhopConfig;
use crate::database::QhopDatabase;
use crate::energy::HopEnergetics;
use crate::rate::Regime;
use crate::residue::{ReactiveSites, SiteChange};
use hopmd_md::{NeighborList, SimulationState};
use hopmd_math::angle_deg;

/// A possible transfer of one proton from a donor site to an acceptor site.
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    /// Donor site index.
    pub donor: usize,
    /// Acceptor site index.
    pub acceptor: usize,
    /// Topology atom index of the proton.
    pub proton: usize,
    /// Slot of the proton on the donor.
    pub slot: usize,
    /// Donor-acceptor distance (nm).
    pub rda: f64,
    /// Donor-proton-acceptor angle (degrees).
    pub angle: f64,
    pub energetics: Option<HopEnergetics>,
    pub regime: Option<Regime>,
    pub probability: f64,
}

/// Find every geometrically and chemically allowed hop.
///
/// `nlist` must have been built over the sites' heavy atoms with cutoff
/// `DOO`. The `partners` of every site are refreshed.
pub fn find_acceptors(
    sites: &mut ReactiveSites,
    db: &QhopDatabase,
    state: &SimulationState,
    nlist: &NeighborList,
    config: &QhopConfig,
) -> Vec<Hop> {
    for site in &mut sites.atoms {
        site.partners.clear();
    }

    let pbc = &state.sim_box;
    let x = &state.x;
    let mut hops = Vec::new();
    for (i, j, rda) in nlist.within_cutoff(x, pbc) {
        let (Some(si), Some(sj)) = (sites.site_of_atom(i), sites.site_of_atom(j)) else {
            continue;
        };
        if sites.atoms[si].residue == sites.atoms[sj].residue {
            continue;
        }
        sites.atoms[si].partners.push(sj);
        sites.atoms[sj].partners.push(si);

        for (d, a) in [(si, sj), (sj, si)] {
            let donor = &sites.atoms[d];
            let acceptor = &sites.atoms[a];
            if !donor.can_donate() || !acceptor.can_accept() {
                continue;
            }
            if sites.subtype_after(db, acceptor.residue, SiteChange::Accept { site: a }).is_none() {
                continue;
            }

            // Everything relative to the donor so the geometry is whole
            let xd = x[donor.atom];
            let xa = xd + pbc.dx(&xd, &x[acceptor.atom]);
            for (slot, proton) in donor.slots.iter().enumerate() {
                if !proton.present {
                    continue;
                }
                let xh = xd + pbc.dx(&xd, &x[proton.atom]);
                if (xa - xh).norm() >= config.hbond {
                    continue;
                }
                let angle = angle_deg(&xd, &xh, &xa);
                if angle < config.hopang {
                    continue;
                }
                if sites
                    .subtype_after(db, donor.residue, SiteChange::Donate { site: d, slot })
                    .is_none()
                {
                    continue;
                }
                hops.push(Hop {
                    donor: d,
                    acceptor: a,
                    proton: proton.atom,
                    slot,
                    rda,
                    angle,
                    energetics: None,
                    regime: None,
                    probability: 0.0,
                });
            }
        }
    }
    hops
}
