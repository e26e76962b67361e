//! Hop engine configuration.

use crate::error::{QhopError, Result};
use hopmd_md::RngKind;
use serde::{Deserialize, Serialize};

/// Settings of the reactive hop engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QhopConfig {
    /// Steps between hop cycles.
    #[serde(default = "default_qhopfreq")]
    pub qhopfreq: u64,
    /// Maximum donor-acceptor distance (nm).
    #[serde(default = "default_doo")]
    pub doo: f64,
    /// Maximum proton-acceptor distance (nm).
    #[serde(default = "default_hbond")]
    pub hbond: f64,
    /// Minimum donor-proton-acceptor angle (degrees).
    #[serde(default = "default_hopang")]
    pub hopang: f64,
    /// Temperature of the rate model (K).
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Lennard-Jones type given to absent protons.
    #[serde(default)]
    pub dummy_lj_type: usize,
    /// Reaction-field cutoff for self energies (nm).
    #[serde(default = "default_rf_cutoff")]
    pub rf_cutoff: f64,
    #[serde(default = "default_eps_r")]
    pub eps_r: f64,
    /// Reaction-field dielectric; 0 means conducting.
    #[serde(default)]
    pub eps_rf: f64,
    /// Rescale velocities after an accepted hop.
    #[serde(default = "default_rescale")]
    pub rescale: bool,
    /// Decay length of the rescaling weights (nm).
    #[serde(default = "default_rescale_rc")]
    pub rescale_rc: f64,
    /// Kinetic energy tolerance of the rescaling (kJ/mol).
    #[serde(default = "default_rescale_tol")]
    pub rescale_tol: f64,
    #[serde(default = "default_rescale_max_iter")]
    pub rescale_max_iter: usize,
    #[serde(default)]
    pub rng: RngKind,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_qhopfreq() -> u64 {
    10
}

fn default_doo() -> f64 {
    0.35
}

fn default_hbond() -> f64 {
    0.26
}

fn default_hopang() -> f64 {
    110.0
}

fn default_temperature() -> f64 {
    300.0
}

fn default_rf_cutoff() -> f64 {
    0.9
}

fn default_eps_r() -> f64 {
    1.0
}

fn default_rescale() -> bool {
    true
}

fn default_rescale_rc() -> f64 {
    0.5
}

fn default_rescale_tol() -> f64 {
    1e-3
}

fn default_rescale_max_iter() -> usize {
    100
}

fn default_seed() -> u64 {
    1993
}

impl Default for QhopConfig {
    fn default() -> Self {
        Self {
            qhopfreq: default_qhopfreq(),
            doo: default_doo(),
            hbond: default_hbond(),
            hopang: default_hopang(),
            temperature: default_temperature(),
            dummy_lj_type: 0,
            rf_cutoff: default_rf_cutoff(),
            eps_r: default_eps_r(),
            eps_rf: 0.0,
            rescale: default_rescale(),
            rescale_rc: default_rescale_rc(),
            rescale_tol: default_rescale_tol(),
            rescale_max_iter: default_rescale_max_iter(),
            rng: RngKind::default(),
            seed: default_seed(),
        }
    }
}

impl QhopConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.qhopfreq == 0 {
            return Err(QhopError::InvalidConfig("qhopfreq must be at least 1".into()));
        }
        if !(self.doo > 0.0 && self.hbond > 0.0) {
            return Err(QhopError::InvalidConfig("DOO and HBOND must be positive".into()));
        }
        if !(self.temperature > 0.0) {
            return Err(QhopError::InvalidConfig("rate temperature must be positive".into()));
        }
        if !(self.rf_cutoff > 0.0 && self.eps_r > 0.0) {
            return Err(QhopError::InvalidConfig("reaction-field cutoff and eps_r must be positive".into()));
        }
        if self.rescale && !(self.rescale_rc > 0.0 && self.rescale_tol > 0.0) {
            return Err(QhopError::InvalidConfig("rescaling length and tolerance must be positive".into()));
        }
        Ok(())
    }
}
