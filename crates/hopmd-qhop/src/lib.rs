//! Reactive proton transfer by Monte-Carlo hopping.
//!
//! Titratable residues carry a fixed set of proton slots; a protonation
//! state is a subtype selecting which slots are real. Every `qhopfreq`
//! steps the [`HopEngine`]:
//!
//! 1. finds donor-acceptor pairs within `DOO` whose proton points at the
//!    acceptor (`HBOND`, `HOPANG`)
//! 2. draws one candidate and evaluates the energy gap of moving the proton
//! 3. turns the gap into a probability with the empirical rate model
//! 4. commits the hop on success and rescales nearby velocities so the total
//!    energy is conserved
//!
//! Residue types, subtypes and the per-pair rate parameters live in a
//! [`QhopDatabase`] loaded from JSON.

pub mod config;
pub mod database;
pub mod energy;
pub mod engine;
pub mod error;
pub mod hop;
pub mod params;
pub mod rate;
pub mod rescale;
pub mod residue;

pub use config::QhopConfig;
pub use database::{ParameterEntry, ProtonSlotSpec, QhopDatabase, ReactiveResidueType, ResidueSubtype, SiteSpec};
pub use energy::{HopEnergetics, ProtonationSnapshot, evaluate_hop, self_energy};
pub use engine::{CycleOutcome, HopEngine, HopPhase, HopStatistics};
pub use error::{QhopError, Result};
pub use hop::{Hop, find_acceptors};
pub use params::{QhopParameters, Quadratic};
pub use rate::{EmpiricalRate, RateEvaluation, RateModel, Regime};
pub use rescale::{RescaleOutcome, RescaleParams, scale_velocities};
pub use residue::{ProtonSlot, QhopAtom, QhopResidue, ReactiveSites};
