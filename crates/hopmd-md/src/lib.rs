//! Constrained molecular dynamics integration.
//!
//! Implements a leapfrog integrator for MD simulation with:
//! - Holonomic constraints (SHAKE, LINCS, SETTLE) via `hopmd-constraint`
//! - Berendsen temperature coupling and Langevin dynamics
//! - Berendsen and Parrinello-Rahman pressure coupling
//! - Freeze groups, acceleration groups and pulsed electric fields
//! - A reference pair force field (Lennard-Jones, reaction-field Coulomb,
//!   harmonic bonds) behind the [`ForceEvaluator`] trait
//!
//! # Example
//!
//! ```
//! use hopmd_md::{ForceOutput, Integrator, IntegratorConfig, SimulationState, Topology, Atom};
//! use hopmd_math::{SimBox, Vec3};
//!
//! // A rigid diatomic
//! let mut topology = Topology::new();
//! let res = topology.add_residue("CO", 1);
//! topology.add_atom(Atom::new("C", 12.011, 0.0, 0, res)).unwrap();
//! topology.add_atom(Atom::new("O", 15.999, 0.0, 0, res)).unwrap();
//! topology.add_constraint(0, 1, 0.1128).unwrap();
//!
//! let mut integrator = Integrator::new(&topology, IntegratorConfig::default()).unwrap();
//! let mut state = SimulationState::from_positions(
//!     vec![Vec3::zeros(), Vec3::new(0.1128, 0.0, 0.0)],
//!     SimBox::open(),
//! );
//! state.v[1] = Vec3::new(0.0, 1.0, 0.0);
//!
//! for _ in 0..100 {
//!     integrator.update(&topology, &mut state, &ForceOutput::zeros(2)).unwrap();
//! }
//! assert!(((state.x[1] - state.x[0]).norm() - 0.1128).abs() < 1e-4);
//! ```

pub mod config;
pub mod conservation;
pub mod coupling;
pub mod error;
pub mod forcefield;
pub mod graph;
pub mod integrator;
pub mod neighbor;
pub mod random;
pub mod state;
pub mod topology;
pub mod units;

pub use config::{
    ElectricField, IntegratorConfig, IntegratorKind, PressureCoupling, TcGroup, TemperatureCoupling,
};
pub use conservation::{ConservationMonitor, ConservationState, total_angular_momentum, total_momentum};
pub use coupling::{
    ParrinelloRahman, PrCoupling, PressureCouplingType, berendsen_pcoupl, berendsen_pscale, berendsen_tcoupl,
    calc_pressure,
};
pub use error::{DumpRow, MdError, Result, StateDump};
pub use forcefield::{
    ForceEvaluator, ForceOutput, HarmonicBond, LennardJones, LjTable, PairForceField, PairForceFieldConfig,
    ReactionField,
};
pub use graph::MolGraph;
pub use integrator::{Integrator, StepReport};
pub use neighbor::NeighborList;
pub use random::{NoiseSource, RngKind};
pub use state::{SimulationState, kinetic_tensor};
pub use topology::{Atom, Bond, Residue, Topology};
