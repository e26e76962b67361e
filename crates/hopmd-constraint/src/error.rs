//! Error types for hopmd-constraint.

use hopmd_math::Vec3;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConstraintError {
    #[error(
        "SHAKE did not converge in block {block} after {iterations} iterations \
         (max relative deviation {max_deviation:.3e})\n{dump}"
    )]
    ShakeNotConverged {
        block: usize,
        iterations: usize,
        max_deviation: f64,
        dump: Box<AtomDump>,
    },

    #[error("SHAKE constraint {constraint} ({ai}-{aj}) rotated by more than 90 degrees\n{dump}")]
    ShakeRotation {
        constraint: usize,
        ai: usize,
        aj: usize,
        dump: Box<AtomDump>,
    },

    #[error("SETTLE failed for water {group} (O atom {oxygen}): {reason}")]
    SettleFailed {
        group: usize,
        oxygen: usize,
        reason: &'static str,
    },

    #[error("atom index {index} out of range for {natoms} atoms")]
    AtomOutOfRange { index: usize, natoms: usize },

    #[error("invalid constraint {index}: {reason}")]
    InvalidConstraint { index: usize, reason: String },

    #[error("invalid SETTLE group {index}: {reason}")]
    InvalidSettle { index: usize, reason: String },

    #[error("position arrays differ in length: {old} old vs {new} new")]
    LengthMismatch { old: usize, new: usize },
}

pub type Result<T> = std::result::Result<T, ConstraintError>;

/// Positions of the atoms involved in a failed constraint block.
#[derive(Debug, Clone, Default)]
pub struct AtomDump {
    pub atoms: Vec<AtomPositions>,
}

#[derive(Debug, Clone)]
pub struct AtomPositions {
    pub index: usize,
    pub x_old: Vec3,
    pub x_new: Vec3,
}

impl AtomDump {
    pub(crate) fn from_atoms(atoms: impl IntoIterator<Item = usize>, x_old: &[Vec3], x_new: &[Vec3]) -> Self {
        let mut list: Vec<usize> = atoms.into_iter().collect();
        list.sort_unstable();
        list.dedup();
        Self {
            atoms: list
                .into_iter()
                .map(|index| AtomPositions {
                    index,
                    x_old: x_old[index],
                    x_new: x_new[index],
                })
                .collect(),
        }
    }
}

impl fmt::Display for AtomDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>8} {:>36} {:>36}", "atom", "x_old (nm)", "x_new (nm)")?;
        for a in &self.atoms {
            writeln!(
                f,
                "{:>8} {:>11.6} {:>11.6} {:>11.6} {:>11.6} {:>11.6} {:>11.6}",
                a.index, a.x_old.x, a.x_old.y, a.x_old.z, a.x_new.x, a.x_new.y, a.x_new.z
            )?;
        }
        Ok(())
    }
}
