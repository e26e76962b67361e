//! Integrator configuration.
//!
//! Loaded from JSON; every field has a default so a partial document is
//! enough:
//!
//! ```json
//! {
//!   "dt": 0.002,
//!   "tcoupl": "berendsen",
//!   "tc_groups": [{ "ref_t": 300.0, "tau_t": 0.1 }],
//!   "pcoupl": "parrinello-rahman",
//!   "ref_p": [1.0],
//!   "compressibility": [4.5e-5]
//! }
//! ```

use crate::coupling::PressureCouplingType;
use crate::error::{MdError, Result};
use crate::random::RngKind;
use hopmd_constraint::ConstraintParams;
use serde::{Deserialize, Serialize};

/// Equations of motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegratorKind {
    #[default]
    Leapfrog,
    /// Leapfrog with friction and random forces, no velocity scaling.
    Langevin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureCoupling {
    #[default]
    None,
    Berendsen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PressureCoupling {
    #[default]
    None,
    Berendsen,
    ParrinelloRahman,
}

/// Reference temperature and coupling time of one T-coupling group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TcGroup {
    /// Reference temperature (K).
    pub ref_t: f64,
    /// Coupling time constant (ps).
    #[serde(default = "default_tau_t")]
    pub tau_t: f64,
}

/// Time-dependent uniform electric field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElectricField {
    /// Amplitude per dimension (V/nm).
    pub e0: [f64; 3],
    /// Angular frequency (1/ps).
    #[serde(default)]
    pub omega: f64,
    /// Pulse width (ps); zero means no envelope.
    #[serde(default)]
    pub sigma: f64,
}

impl ElectricField {
    /// Field strength along `dim` at time `t`.
    pub fn strength(&self, dim: usize, t: f64) -> f64 {
        let e0 = self.e0[dim];
        if self.sigma > 0.0 {
            e0 * (self.omega * t).cos() * (-t * t / (2.0 * self.sigma * self.sigma)).exp()
        } else {
            e0 * (self.omega * t).cos()
        }
    }
}

/// Integrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegratorConfig {
    /// Time step (ps).
    #[serde(default = "default_dt")]
    pub dt: f64,
    #[serde(default)]
    pub integrator: IntegratorKind,
    #[serde(default)]
    pub tcoupl: TemperatureCoupling,
    /// One entry per temperature-coupling group.
    #[serde(default = "default_tc_groups")]
    pub tc_groups: Vec<TcGroup>,
    #[serde(default)]
    pub pcoupl: PressureCoupling,
    #[serde(default)]
    pub pcoupl_type: PressureCouplingType,
    /// Pressure coupling time constant (ps).
    #[serde(default = "default_tau_p")]
    pub tau_p: f64,
    /// Reference pressure (bar): 1 value isotropic, 2 semiisotropic,
    /// 6 anisotropic (xx yy zz xy xz yz).
    #[serde(default = "default_ref_p")]
    pub ref_p: Vec<f64>,
    /// Compressibility (1/bar), same layout as `ref_p`.
    #[serde(default = "default_compressibility")]
    pub compressibility: Vec<f64>,
    /// Langevin friction (1/ps).
    #[serde(default = "default_langevin_gamma")]
    pub langevin_gamma: f64,
    #[serde(default)]
    pub electric_field: Option<ElectricField>,
    /// Constant acceleration (nm/ps²) per acceleration group.
    #[serde(default = "default_accel_groups")]
    pub accel_groups: Vec<[f64; 3]>,
    /// Frozen dimensions per freeze group.
    #[serde(default = "default_freeze_groups")]
    pub freeze_groups: Vec<[bool; 3]>,
    #[serde(default)]
    pub constraints: ConstraintParams,
    #[serde(default)]
    pub rng: RngKind,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Put molecules whole across the boundary after each step.
    #[serde(default = "default_make_whole")]
    pub make_whole: bool,
}

fn default_dt() -> f64 {
    0.002
}

fn default_tau_t() -> f64 {
    0.1
}

fn default_tc_groups() -> Vec<TcGroup> {
    vec![TcGroup {
        ref_t: 300.0,
        tau_t: default_tau_t(),
    }]
}

fn default_tau_p() -> f64 {
    1.0
}

fn default_ref_p() -> Vec<f64> {
    vec![1.0]
}

fn default_compressibility() -> Vec<f64> {
    vec![4.5e-5]
}

fn default_langevin_gamma() -> f64 {
    1.0
}

fn default_accel_groups() -> Vec<[f64; 3]> {
    vec![[0.0; 3]]
}

fn default_freeze_groups() -> Vec<[bool; 3]> {
    vec![[false; 3]]
}

fn default_seed() -> u64 {
    1993
}

fn default_make_whole() -> bool {
    true
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            dt: default_dt(),
            integrator: IntegratorKind::default(),
            tcoupl: TemperatureCoupling::default(),
            tc_groups: default_tc_groups(),
            pcoupl: PressureCoupling::default(),
            pcoupl_type: PressureCouplingType::default(),
            tau_p: default_tau_p(),
            ref_p: default_ref_p(),
            compressibility: default_compressibility(),
            langevin_gamma: default_langevin_gamma(),
            electric_field: None,
            accel_groups: default_accel_groups(),
            freeze_groups: default_freeze_groups(),
            constraints: ConstraintParams::default(),
            rng: RngKind::default(),
            seed: default_seed(),
            make_whole: default_make_whole(),
        }
    }
}

impl IntegratorConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if !(self.dt > 0.0) {
            return Err(MdError::InvalidConfig(format!("time step must be positive, got {}", self.dt)));
        }
        if self.tc_groups.is_empty() || self.accel_groups.is_empty() || self.freeze_groups.is_empty() {
            return Err(MdError::InvalidConfig(
                "temperature, acceleration and freeze groups need at least one entry each".into(),
            ));
        }
        if self.tcoupl == TemperatureCoupling::Berendsen && self.tc_groups.iter().any(|g| g.tau_t <= 0.0) {
            return Err(MdError::InvalidConfig("tau_t must be positive for Berendsen coupling".into()));
        }
        if self.integrator == IntegratorKind::Langevin && !(self.langevin_gamma > 0.0) {
            return Err(MdError::InvalidConfig("Langevin friction must be positive".into()));
        }
        if self.pcoupl != PressureCoupling::None {
            if !(self.tau_p > 0.0) {
                return Err(MdError::InvalidConfig("tau_p must be positive".into()));
            }
            let needed = match self.pcoupl_type {
                PressureCouplingType::Isotropic => 1,
                PressureCouplingType::Semiisotropic => 2,
                PressureCouplingType::Anisotropic => 6,
            };
            if self.ref_p.len() < needed || self.compressibility.len() < needed {
                return Err(MdError::InvalidConfig(format!(
                    "{:?} pressure coupling needs {} reference pressures and compressibilities",
                    self.pcoupl_type, needed
                )));
            }
        }
        Ok(())
    }
}
