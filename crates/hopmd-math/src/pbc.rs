//! Periodic simulation box.

use crate::{Mat3, Vec3};

/// Simulation box with box vectors stored as matrix rows.
///
/// A box built with [`SimBox::open`] is non-periodic: minimum-image and
/// wrapping become identities and the volume is undefined (reported as 0).
#[derive(Clone, Debug, PartialEq)]
pub struct SimBox {
    /// Box vectors as rows, lower-triangular.
    pub matrix: Mat3,
    periodic: bool,
}

impl SimBox {
    /// Rectangular periodic box with the given edge lengths.
    pub fn rectangular(lengths: Vec3) -> Self {
        Self {
            matrix: Mat3::from_diagonal(&lengths),
            periodic: true,
        }
    }

    /// Triclinic periodic box from box vectors a, b, c.
    ///
    /// The vectors must follow the lower-triangular convention
    /// (`a.y = a.z = b.z = 0`); upper components are dropped.
    pub fn triclinic(a: Vec3, b: Vec3, c: Vec3) -> Self {
        let matrix = Mat3::new(a.x, 0.0, 0.0, b.x, b.y, 0.0, c.x, c.y, c.z);
        Self {
            matrix,
            periodic: true,
        }
    }

    /// Non-periodic (vacuum) box.
    pub fn open() -> Self {
        Self {
            matrix: Mat3::zeros(),
            periodic: false,
        }
    }

    pub fn is_periodic(&self) -> bool {
        self.periodic
    }

    /// Box vector `d` (0 = a, 1 = b, 2 = c).
    #[inline]
    pub fn vector(&self, d: usize) -> Vec3 {
        self.matrix.row(d).transpose()
    }

    /// Box volume (product of the diagonal for a lower-triangular box).
    pub fn volume(&self) -> f64 {
        if !self.periodic {
            return 0.0;
        }
        self.matrix[(0, 0)] * self.matrix[(1, 1)] * self.matrix[(2, 2)]
    }

    /// Longest diagonal element.
    pub fn max_diagonal(&self) -> f64 {
        self.matrix[(0, 0)]
            .max(self.matrix[(1, 1)])
            .max(self.matrix[(2, 2)])
    }

    /// Apply the minimum image convention to a distance vector.
    ///
    /// Box vectors are removed from the highest dimension down so that
    /// triclinic shifts never disturb an already-reduced component.
    pub fn min_image(&self, mut dr: Vec3) -> Vec3 {
        if !self.periodic {
            return dr;
        }
        for d in (0..3).rev() {
            let len = self.matrix[(d, d)];
            if len <= 0.0 {
                continue;
            }
            let shift = (dr[d] / len).round();
            if shift != 0.0 {
                dr -= shift * self.vector(d);
            }
        }
        dr
    }

    /// Shortest periodic vector from `a` to `b`.
    #[inline]
    pub fn dx(&self, a: &Vec3, b: &Vec3) -> Vec3 {
        self.min_image(b - a)
    }

    /// Distance between two points under minimum image.
    #[inline]
    pub fn distance(&self, a: &Vec3, b: &Vec3) -> f64 {
        self.dx(a, b).norm()
    }

    /// Wrap a position into the primary cell.
    pub fn put_in_box(&self, mut x: Vec3) -> Vec3 {
        if !self.periodic {
            return x;
        }
        for d in (0..3).rev() {
            let len = self.matrix[(d, d)];
            if len <= 0.0 {
                continue;
            }
            let shift = (x[d] / len).floor();
            if shift != 0.0 {
                x -= shift * self.vector(d);
            }
        }
        x
    }

    /// Scale the box with a coupling matrix: `B <- B·μ`.
    pub fn scale(&mut self, mu: &Mat3) {
        if self.periodic {
            self.matrix *= mu;
        }
    }

    /// Inverse of the box matrix, if the box is periodic and non-degenerate.
    pub fn inverse(&self) -> Option<Mat3> {
        if !self.periodic {
            return None;
        }
        self.matrix.try_inverse()
    }
}

impl Default for SimBox {
    fn default() -> Self {
        Self::open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_minimum_image_rectangular() {
        let b = SimBox::rectangular(Vec3::new(10.0, 10.0, 10.0));
        let dr = Vec3::new(6.0, 3.0, -7.0);

        let dr_min = b.min_image(dr);

        // 6.0 > 5.0 wraps to -4.0, -7.0 < -5.0 wraps to 3.0
        assert_relative_eq!(dr_min, Vec3::new(-4.0, 3.0, 3.0), epsilon = 1e-12);
    }

    #[test]
    fn test_minimum_image_triclinic() {
        let b = SimBox::triclinic(
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(1.0, 4.0, 0.0),
            Vec3::new(0.0, 0.0, 4.0),
        );
        // Crossing the b boundary also shifts x by b.x
        let dr = Vec3::new(0.0, 3.5, 0.0);
        let dr_min = b.min_image(dr);
        assert_relative_eq!(dr_min, Vec3::new(-1.0, -0.5, 0.0), epsilon = 1e-12);
        assert_relative_eq!(b.volume(), 64.0);
    }

    #[test]
    fn test_open_box_is_identity() {
        let b = SimBox::open();
        let dr = Vec3::new(100.0, -50.0, 3.0);
        assert_eq!(b.min_image(dr), dr);
        assert_eq!(b.put_in_box(dr), dr);
        assert_eq!(b.volume(), 0.0);
    }

    #[test]
    fn test_put_in_box_and_scale() {
        let mut b = SimBox::rectangular(Vec3::new(2.0, 2.0, 2.0));
        let x = b.put_in_box(Vec3::new(-0.5, 4.5, 1.0));
        assert_relative_eq!(x, Vec3::new(1.5, 0.5, 1.0), epsilon = 1e-12);

        b.scale(&(Mat3::identity() * 1.1));
        assert_relative_eq!(b.volume(), 8.0 * 1.1f64.powi(3), epsilon = 1e-12);
    }
}
