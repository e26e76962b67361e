//! The reactive hop engine.
//!
//! Every `qhopfreq` steps one Monte-Carlo cycle runs:
//!
//! ```text
//! Idle -> CandidateSearch -> EnergyEvaluation -> AcceptReject -> Commit | Rollback -> Idle
//! ```
//!
//! A single candidate is drawn per cycle and tested against a single
//! uniform number, so at most one proton moves per cycle.

use crate::config::QhopConfig;
use crate::database::QhopDatabase;
use crate::energy::evaluate_hop;
use crate::error::{QhopError, Result};
use crate::hop::{Hop, find_acceptors};
use crate::params::R_REF;
use crate::rate::{EmpiricalRate, RateModel};
use crate::rescale::{RescaleOutcome, RescaleParams, scale_velocities};
use crate::residue::ReactiveSites;
use hopmd_md::{ForceEvaluator, Integrator, NeighborList, NoiseSource, ReactionField, SimulationState, Topology};

/// Where the engine is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HopPhase {
    #[default]
    Idle,
    CandidateSearch,
    EnergyEvaluation,
    AcceptReject,
    Commit,
    Rollback,
}

/// Running counters over all cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HopStatistics {
    pub cycles: u64,
    /// Cycles without any candidate.
    pub empty_cycles: u64,
    /// Candidates evaluated and tested.
    pub tested: u64,
    pub accepted: u64,
    /// Accepted hops whose velocity rescaling did not converge.
    pub rescale_failures: u64,
}

/// What one call to [`HopEngine::do_qhop`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Not a hop step.
    Skipped,
    NoCandidates,
    Rejected(Hop),
    Accepted {
        hop: Hop,
        rescale: Option<RescaleOutcome>,
    },
}

/// Reactive proton-transfer engine.
#[derive(Debug)]
pub struct HopEngine<R = EmpiricalRate> {
    config: QhopConfig,
    db: QhopDatabase,
    sites: ReactiveSites,
    rate: R,
    rf: ReactionField,
    noise: NoiseSource,
    nlist: NeighborList,
    candidates: Vec<Hop>,
    phase: HopPhase,
    stats: HopStatistics,
}

impl HopEngine<EmpiricalRate> {
    /// Engine with the empirical rate model for MD time step `dt`.
    pub fn new(topology: &mut Topology, db: QhopDatabase, config: QhopConfig, dt: f64) -> Result<Self> {
        let rate = EmpiricalRate::new(config.temperature, dt, config.qhopfreq);
        Self::with_rate_model(topology, db, config, rate)
    }
}

impl<R: RateModel> HopEngine<R> {
    pub fn with_rate_model(topology: &mut Topology, db: QhopDatabase, config: QhopConfig, rate: R) -> Result<Self> {
        config.validate()?;
        db.validate()?;
        db.validate_boundaries(R_REF, config.doo)?;
        let sites = ReactiveSites::setup(topology, &db, config.dummy_lj_type)?;

        log::info!(
            "qhop: every {} steps, DOO {} nm, HBOND {} nm, HOPANG {} deg, {} parameter sets",
            config.qhopfreq,
            config.doo,
            config.hbond,
            config.hopang,
            db.parameters.len()
        );

        Ok(Self {
            rf: ReactionField::new(config.rf_cutoff, config.eps_r, config.eps_rf),
            noise: NoiseSource::new(config.rng, config.seed),
            nlist: NeighborList::new(config.doo, 0.0),
            config,
            db,
            sites,
            rate,
            candidates: Vec::new(),
            phase: HopPhase::Idle,
            stats: HopStatistics::default(),
        })
    }

    pub fn config(&self) -> &QhopConfig {
        &self.config
    }

    pub fn database(&self) -> &QhopDatabase {
        &self.db
    }

    pub fn sites(&self) -> &ReactiveSites {
        &self.sites
    }

    pub fn phase(&self) -> HopPhase {
        self.phase
    }

    pub fn statistics(&self) -> &HopStatistics {
        &self.stats
    }

    /// Candidates of the last search.
    pub fn candidates(&self) -> &[Hop] {
        &self.candidates
    }

    /// Rebuild the donor-acceptor list and collect all allowed hops.
    pub fn find_acceptors(&mut self, state: &SimulationState) -> &[Hop] {
        self.nlist
            .build_subset(&self.sites.heavy_atoms(), &state.x, &state.sim_box);
        self.candidates = find_acceptors(&mut self.sites, &self.db, state, &self.nlist, &self.config);
        &self.candidates
    }

    /// Fill in energetics, regime and probability of `hop`.
    ///
    /// Topology, sites and state are unchanged afterwards.
    pub fn evaluate<E: ForceEvaluator>(
        &mut self,
        topology: &mut Topology,
        state: &mut SimulationState,
        evaluator: &mut E,
        hop: &mut Hop,
    ) -> Result<()> {
        let donor = self.sites.subtype_name(&self.db, self.sites.atoms[hop.donor].residue);
        let acceptor = self.sites.subtype_name(&self.db, self.sites.atoms[hop.acceptor].residue);
        let params = self.db.parameters(donor, acceptor)?;

        let energetics = evaluate_hop(
            &mut self.sites,
            &self.db,
            topology,
            state,
            evaluator,
            &self.rf,
            hop,
            params.gap_correction(hop.rda),
        )?;
        let rate = self
            .rate
            .probability(params, energetics.e12, hop.rda)
            .map_err(|e| match e {
                QhopError::InvalidBoundaries { rda, left, right, .. } => QhopError::InvalidBoundaries {
                    donor: donor.to_string(),
                    acceptor: acceptor.to_string(),
                    rda,
                    left,
                    right,
                },
                other => other,
            })?;

        hop.energetics = Some(energetics);
        hop.regime = Some(rate.regime);
        hop.probability = rate.probability;
        Ok(())
    }

    /// Run one hop cycle if `state.step` is a hop step.
    pub fn do_qhop<E: ForceEvaluator>(
        &mut self,
        topology: &mut Topology,
        state: &mut SimulationState,
        evaluator: &mut E,
        integrator: &mut Integrator,
    ) -> Result<CycleOutcome> {
        if state.step % self.config.qhopfreq != 0 {
            return Ok(CycleOutcome::Skipped);
        }
        self.stats.cycles += 1;

        self.phase = HopPhase::CandidateSearch;
        let n = self.find_acceptors(state).len();
        if n == 0 {
            self.stats.empty_cycles += 1;
            self.phase = HopPhase::Idle;
            log::debug!("step {}: no hop candidates", state.step);
            return Ok(CycleOutcome::NoCandidates);
        }

        self.phase = HopPhase::EnergyEvaluation;
        let mut hop = self.candidates[self.noise.index(n)].clone();
        self.evaluate(topology, state, evaluator, &mut hop)?;

        self.phase = HopPhase::AcceptReject;
        self.stats.tested += 1;
        let draw = self.noise.uniform();
        log::debug!(
            "step {}: {} candidates, testing {}->{} R = {:.4} nm, E12 = {:.3} kJ/mol, {:?}, P = {:.4e}, draw {:.4}",
            state.step,
            n,
            hop.donor,
            hop.acceptor,
            hop.rda,
            hop.energetics.map_or(0.0, |e| e.e12),
            hop.regime,
            hop.probability,
            draw
        );

        if hop.probability <= draw {
            // The evaluation transaction already restored everything
            self.phase = HopPhase::Rollback;
            log::trace!("step {}: hop rejected", state.step);
            self.phase = HopPhase::Idle;
            return Ok(CycleOutcome::Rejected(hop));
        }

        self.phase = HopPhase::Commit;
        self.sites
            .transfer(&self.db, topology, state, hop.donor, hop.slot, hop.acceptor)?;
        self.stats.accepted += 1;

        let rescale = if self.config.rescale {
            let xd = state.x[self.sites.atoms[hop.donor].atom];
            let xa = state.x[self.sites.atoms[hop.acceptor].atom];
            let center = xd + state.sim_box.dx(&xd, &xa) * 0.5;
            let de = hop.energetics.map_or(0.0, |e| e.de_ff());
            let params = RescaleParams {
                rc: self.config.rescale_rc,
                tolerance: self.config.rescale_tol,
                max_iter: self.config.rescale_max_iter,
            };
            let outcome = scale_velocities(topology, state, integrator, &center, de, &params)?;
            if !outcome.converged {
                self.stats.rescale_failures += 1;
            }
            Some(outcome)
        } else {
            None
        };

        let residue_number = |site: usize| {
            topology.residues[self.sites.residues[self.sites.atoms[site].residue].residue].number
        };
        log::info!(
            "step {}: proton {} hopped from residue {} to residue {}",
            state.step,
            hop.proton,
            residue_number(hop.donor),
            residue_number(hop.acceptor)
        );
        self.phase = HopPhase::Idle;
        Ok(CycleOutcome::Accepted { hop, rescale })
    }
}
