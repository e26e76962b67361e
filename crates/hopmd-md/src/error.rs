//! Error types for hopmd-md.

use hopmd_constraint::ConstraintError;
use hopmd_math::Vec3;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MdError {
    #[error("constraint failure at step {step}: {source}\n{dump}")]
    Constraint {
        step: u64,
        #[source]
        source: ConstraintError,
        dump: Box<StateDump>,
    },

    #[error("constraint setup failed: {0}")]
    ConstraintSetup(#[from] ConstraintError),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    #[error("array length {found} does not match {expected} atoms")]
    AtomCountMismatch { expected: usize, found: usize },
}

pub type Result<T> = std::result::Result<T, MdError>;

/// Per-atom state at the moment of a fatal integration failure.
#[derive(Debug, Clone, Default)]
pub struct StateDump {
    pub rows: Vec<DumpRow>,
}

#[derive(Debug, Clone)]
pub struct DumpRow {
    pub index: usize,
    pub x_old: Vec3,
    pub x_new: Vec3,
    pub v: Vec3,
    pub f: Vec3,
}

impl StateDump {
    pub fn new(x_old: &[Vec3], x_new: &[Vec3], v: &[Vec3], f: &[Vec3]) -> Self {
        let rows = (0..x_old.len())
            .map(|index| DumpRow {
                index,
                x_old: x_old[index],
                x_new: x_new[index],
                v: v[index],
                f: f[index],
            })
            .collect();
        Self { rows }
    }
}

impl fmt::Display for StateDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v3 = |v: &Vec3| format!("{:10.5} {:10.5} {:10.5}", v.x, v.y, v.z);
        writeln!(
            f,
            "{:>7}  {:^32}  {:^32}  {:^32}  {:^32}",
            "atom", "x_old", "x_new", "v", "f"
        )?;
        for row in &self.rows {
            writeln!(
                f,
                "{:>7}  {}  {}  {}  {}",
                row.index,
                v3(&row.x_old),
                v3(&row.x_new),
                v3(&row.v),
                v3(&row.f)
            )?;
        }
        Ok(())
    }
}
