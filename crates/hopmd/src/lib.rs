//! hopmd: constrained molecular dynamics with reactive proton hopping.
//!
//! This is the umbrella crate that provides the [`Simulation`] driver and
//! re-exports core types from the sub-crates.

pub use hopmd_constraint::{self, AlgorithmKind, ConstraintError, ConstraintOutput, ConstraintParams, ConstraintSolver};
pub use hopmd_math::{self, Mat3, SimBox, Vec3};
pub use hopmd_md::{
    self, Atom, ForceEvaluator, ForceOutput, Integrator, IntegratorConfig, MdError, PairForceField,
    PairForceFieldConfig, SimulationState, StepReport, Topology, units,
};
pub use hopmd_qhop::{self, CycleOutcome, HopEngine, HopStatistics, QhopConfig, QhopDatabase, QhopError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Md(#[from] MdError),

    #[error(transparent)]
    Qhop(#[from] QhopError),
}

pub type Result<T> = std::result::Result<T, SimulationError>;

/// What happened during one MD step.
#[derive(Debug, Clone)]
pub struct StepSummary {
    pub report: StepReport,
    /// Potential energy at the start of the step (kJ/mol).
    pub potential: f64,
    pub hop: CycleOutcome,
}

impl StepSummary {
    /// Potential plus half-step kinetic energy.
    pub fn total_energy(&self) -> f64 {
        self.potential + self.report.kinetic_energy
    }
}

/// Main simulation driver.
///
/// Owns topology, state, force evaluator, integrator and optionally the hop
/// engine. A step runs the hop cycle first so that forces always see the
/// current protonation state, then evaluates forces and integrates.
pub struct Simulation<E> {
    topology: Topology,
    state: SimulationState,
    evaluator: E,
    integrator: Integrator,
    engine: Option<HopEngine>,
}

impl<E: ForceEvaluator> Simulation<E> {
    /// Plain constrained MD.
    pub fn new(topology: Topology, state: SimulationState, evaluator: E, config: IntegratorConfig) -> Result<Self> {
        state.check(topology.natoms())?;
        let integrator = Integrator::new(&topology, config)?;
        log::info!(
            "simulation: {} atoms, {} constrained degrees of freedom, dt = {} ps",
            topology.natoms(),
            topology.constraints.removed_dof(),
            integrator.dt()
        );
        Ok(Self {
            topology,
            state,
            evaluator,
            integrator,
            engine: None,
        })
    }

    /// Enable reactive proton hopping.
    pub fn with_qhop(mut self, db: QhopDatabase, config: QhopConfig) -> Result<Self> {
        let engine = HopEngine::new(&mut self.topology, db, config, self.integrator.dt())?;
        self.engine = Some(engine);
        Ok(self)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SimulationState {
        &mut self.state
    }

    pub fn integrator(&self) -> &Integrator {
        &self.integrator
    }

    pub fn engine(&self) -> Option<&HopEngine> {
        self.engine.as_ref()
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// Advance the simulation by one step.
    pub fn step(&mut self) -> Result<StepSummary> {
        let hop = match self.engine.as_mut() {
            Some(engine) => engine.do_qhop(
                &mut self.topology,
                &mut self.state,
                &mut self.evaluator,
                &mut self.integrator,
            )?,
            None => CycleOutcome::Skipped,
        };

        let forces = self.evaluator.evaluate(&self.topology, &self.state)?;
        let report = self.integrator.update(&self.topology, &mut self.state, &forces)?;
        Ok(StepSummary {
            report,
            potential: forces.potential,
            hop,
        })
    }

    /// Run `n` steps and return the summary of the last one.
    pub fn simulate(&mut self, n: usize) -> Result<Option<StepSummary>> {
        let mut last = None;
        for _ in 0..n {
            last = Some(self.step()?);
        }
        if let Some(engine) = &self.engine {
            let stats = engine.statistics();
            log::info!(
                "qhop: {} cycles, {} tested, {} accepted",
                stats.cycles,
                stats.tested,
                stats.accepted
            );
        }
        Ok(last)
    }
}
