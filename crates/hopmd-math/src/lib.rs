//! Vector, tensor and periodic-box primitives for the hopmd crates.
//!
//! Coordinates are in nm. Tensors (virial, pressure, kinetic energy) are
//! plain 3x3 matrices; box matrices store the box vectors as rows, in the
//! lower-triangular convention (a along x, b in the xy plane).

pub mod pbc;

pub use pbc::SimBox;

use nalgebra as na;

/// 3D vector alias.
pub type Vec3 = na::Vector3<f64>;
/// 3x3 matrix alias.
pub type Mat3 = na::Matrix3<f64>;

/// Outer product a ⊗ b, with `(a ⊗ b)[(i, j)] = a[i] * b[j]`.
#[inline]
pub fn outer(a: &Vec3, b: &Vec3) -> Mat3 {
    a * b.transpose()
}

/// Trace of a tensor divided by three (the scalar pressure of a pressure tensor).
#[inline]
pub fn scalar_trace(m: &Mat3) -> f64 {
    m.trace() / 3.0
}

/// Angle at `b` in the triangle a-b-c, in degrees.
pub fn angle_deg(a: &Vec3, b: &Vec3, c: &Vec3) -> f64 {
    let ba = a - b;
    let bc = c - b;
    let denom = ba.norm() * bc.norm();
    if denom < 1e-300 {
        return 0.0;
    }
    (ba.dot(&bc) / denom).clamp(-1.0, 1.0).acos().to_degrees()
}
