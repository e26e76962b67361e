//! Error types for hopmd-qhop.

use hopmd_md::MdError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QhopError {
    #[error(transparent)]
    Md(#[from] MdError),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid residue database: {0}")]
    InvalidDatabase(String),

    #[error("residue {residue} ({name}) has no atom named {atom}")]
    MissingAtom {
        residue: usize,
        name: String,
        atom: String,
    },

    #[error("no subtype of {residue_type} has protons {protons:?}")]
    NoSubtype {
        residue_type: String,
        protons: Vec<String>,
    },

    #[error("no hopping parameters for donor {donor} and acceptor {acceptor}")]
    MissingParameters { donor: String, acceptor: String },

    #[error("parameters {donor}/{acceptor}: E12 boundaries not ordered at R = {rda:.4} nm ({left:.3} >= {right:.3})")]
    InvalidBoundaries {
        donor: String,
        acceptor: String,
        rda: f64,
        left: f64,
        right: f64,
    },
}

pub type Result<T> = std::result::Result<T, QhopError>;
