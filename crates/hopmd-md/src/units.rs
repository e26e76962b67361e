//! Physical constants in MD units (nm, ps, amu, kJ/mol, e, K, bar).

/// Boltzmann constant, kJ mol⁻¹ K⁻¹.
pub const BOLTZ: f64 = 0.008_314_462_6;

/// Planck constant, kJ mol⁻¹ ps.
pub const PLANCK: f64 = 0.399_031_271;

/// Electric conversion factor 1/(4πε₀), kJ mol⁻¹ nm e⁻².
pub const ONE_4PI_EPS0: f64 = 138.935_458;

/// Pressure conversion, bar per kJ mol⁻¹ nm⁻³.
pub const PRESFAC: f64 = 16.6054;

/// Field conversion, kJ mol⁻¹ nm⁻¹ e⁻¹ per V/nm.
pub const FIELDFAC: f64 = 96.4853;
