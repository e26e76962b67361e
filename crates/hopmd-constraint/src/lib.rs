//! Holonomic bond constraints for molecular dynamics.
//!
//! Three algorithms are provided behind a single [`ConstraintSolver`]:
//! - [`Shake`]: iterative Gauss-Seidel correction per coupled block
//! - [`Lincs`]: non-iterative matrix expansion with rotation correction
//! - [`Settle`]: analytical solution for rigid three-site waters
//!
//! All of them take the constrained positions of the previous step as
//! reference, correct the unconstrained trial positions in place, and
//! report the constraint virial and ∂V/∂λ.

pub mod error;
pub mod lincs;
pub mod settle;
pub mod shake;
pub mod solver;
pub mod topology;

pub use error::{AtomDump, AtomPositions, ConstraintError, Result};
pub use lincs::{Lincs, LincsDeviation};
pub use settle::Settle;
pub use shake::Shake;
pub use solver::{
    AlgorithmKind, ConstraintAlgorithm, ConstraintOutput, ConstraintParams, ConstraintSolver,
    RotationWarning,
};
pub use topology::{
    Constraint, ConstraintTopology, CouplingGraph, DeviationStats, SettleGroup, deviation_stats,
};
