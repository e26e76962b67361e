//! SETTLE: analytical reset of rigid three-site waters.
//!
//! Works in a frame spanned by the old molecular plane (`aksz = b0 × c0`)
//! and the new oxygen direction relative to the centre of mass. The
//! canonical triangle is rotated by three angles (φ, ψ, θ) so that the
//! new positions satisfy both O-H and the H-H distance exactly while
//! conserving the centre of mass and linear momentum.

use crate::error::{ConstraintError, Result};
use crate::solver::{SolveContext, StepAccumulator};
use crate::topology::{ConstraintTopology, SettleGroup};
use hopmd_math::{Vec3, outer};

/// Geometry of one water in the canonical frame.
#[derive(Clone, Copy, Debug, PartialEq)]
struct SettleGeometry {
    m_h: f64,
    /// Normalized hydrogen weight `mH / (mO + 2 mH)`.
    w_h: f64,
    /// Distance of O from the centre of mass along the symmetry axis.
    ra: f64,
    /// Distance of the H-H midpoint from the centre of mass.
    rb: f64,
    /// Half the H-H distance.
    rc: f64,
    /// `1 / d_HH`.
    irc2: f64,
}

impl SettleGeometry {
    fn new(m_o: f64, m_h: f64, d_oh: f64, d_hh: f64) -> Self {
        let wohh = m_o + 2.0 * m_h;
        let rc = 0.5 * d_hh;
        let height = (d_oh * d_oh - rc * rc).sqrt();
        let ra = 2.0 * m_h * height / wohh;
        Self {
            m_h,
            w_h: m_h / wohh,
            ra,
            rb: height - ra,
            rc,
            irc2: 1.0 / d_hh,
        }
    }
}

/// SETTLE solver for every rigid water of a topology.
#[derive(Clone, Debug)]
pub struct Settle {
    groups: Vec<SettleGroup>,
    geometry: Vec<SettleGeometry>,
}

impl Settle {
    pub fn new(topology: &ConstraintTopology, invmass: &[f64]) -> Result<Self> {
        let groups = topology.settles().to_vec();
        let mut geometry = Vec::with_capacity(groups.len());
        for (index, g) in groups.iter().enumerate() {
            let [o, h1, h2] = g.atoms();
            if invmass[o] <= 0.0 || invmass[h1] <= 0.0 || invmass[h2] <= 0.0 {
                return Err(ConstraintError::InvalidSettle {
                    index,
                    reason: "SETTLE atoms must have finite, non-zero mass".to_string(),
                });
            }
            if (invmass[h1] - invmass[h2]).abs() > 1e-12 * invmass[h1] {
                return Err(ConstraintError::InvalidSettle {
                    index,
                    reason: "both hydrogens must have the same mass".to_string(),
                });
            }
            geometry.push(SettleGeometry::new(
                1.0 / invmass[o],
                1.0 / invmass[h1],
                g.d_oh,
                g.d_hh,
            ));
        }
        if !groups.is_empty() {
            log::debug!("SETTLE: {} rigid waters", groups.len());
        }
        Ok(Self { groups, geometry })
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub(crate) fn solve(
        &self,
        ctx: &SolveContext<'_>,
        x_old: &[Vec3],
        x_new: &mut [Vec3],
        acc: &mut StepAccumulator,
    ) -> Result<()> {
        for (index, (group, geom)) in self.groups.iter().zip(&self.geometry).enumerate() {
            let [o, h1, h2] = group.atoms();
            let fail = |reason| ConstraintError::SettleFailed {
                group: index,
                oxygen: o,
                reason,
            };

            // Work relative to the oxygen so that periodic images never split a water
            let b0 = ctx.pbc.dx(&x_old[o], &x_old[h1]);
            let c0 = ctx.pbc.dx(&x_old[o], &x_old[h2]);
            let xo = x_new[o];
            let pb = ctx.pbc.dx(&xo, &x_new[h1]);
            let pc = ctx.pbc.dx(&xo, &x_new[h2]);

            let com_rel = (pb + pc) * geom.w_h;
            let a1 = -com_rel;
            let b1 = pb - com_rel;
            let c1 = pc - com_rel;

            let aksz = b0.cross(&c0);
            let aksx = a1.cross(&aksz);
            let aksy = aksz.cross(&aksx);
            let (nz, nx, ny) = (aksz.norm(), aksx.norm(), aksy.norm());
            if nz == 0.0 || nx == 0.0 || ny == 0.0 {
                return Err(fail("degenerate molecular frame"));
            }
            let aksz = aksz / nz;
            let aksx = aksx / nx;
            let aksy = aksy / ny;

            let xb0d = aksx.dot(&b0);
            let yb0d = aksy.dot(&b0);
            let xc0d = aksx.dot(&c0);
            let yc0d = aksy.dot(&c0);

            let za1d = aksz.dot(&a1);
            let xb1d = aksx.dot(&b1);
            let yb1d = aksy.dot(&b1);
            let zb1d = aksz.dot(&b1);
            let xc1d = aksx.dot(&c1);
            let yc1d = aksy.dot(&c1);
            let zc1d = aksz.dot(&c1);

            let sinphi = za1d / geom.ra;
            let tmp = 1.0 - sinphi * sinphi;
            if tmp <= 0.0 {
                return Err(fail("oxygen displaced out of plane beyond the O-COM distance"));
            }
            let cosphi = tmp.sqrt();
            let sinpsi = (zb1d - zc1d) * geom.irc2 / cosphi;
            let tmp2 = 1.0 - sinpsi * sinpsi;
            if tmp2 <= 0.0 {
                return Err(fail("hydrogens tilted beyond the H-H distance"));
            }
            let cospsi = tmp2.sqrt();

            let ya2d = geom.ra * cosphi;
            let xb2d = -geom.rc * cospsi;
            let t1 = -geom.rb * cosphi;
            let t2 = geom.rc * sinpsi * sinphi;
            let yb2d = t1 - t2;
            let yc2d = t1 + t2;

            let alpa = xb2d * (xb0d - xc0d) + yb0d * yb2d + yc0d * yc2d;
            let beta = xb2d * (yc0d - yb0d) + xb0d * yb2d + xc0d * yc2d;
            let gama = xb0d * yb1d - xb1d * yb0d + xc0d * yc1d - xc1d * yc0d;
            let al2be2 = alpa * alpa + beta * beta;
            let disc = al2be2 - gama * gama;
            if al2be2 <= 0.0 || disc < 0.0 {
                return Err(fail("no in-plane rotation satisfies the constraints"));
            }
            let sinthe = (alpa * gama - beta * disc.sqrt()) / al2be2;
            let costhe = (1.0 - sinthe * sinthe).max(0.0).sqrt();

            let a3d = Vec3::new(-ya2d * sinthe, ya2d * costhe, za1d);
            let b3d = Vec3::new(
                xb2d * costhe - yb2d * sinthe,
                xb2d * sinthe + yb2d * costhe,
                zb1d,
            );
            let c3d = Vec3::new(
                -xb2d * costhe - yc2d * sinthe,
                -xb2d * sinthe + yc2d * costhe,
                zc1d,
            );

            let back = |d: Vec3| aksx * d.x + aksy * d.y + aksz * d.z;
            let com = xo + com_rel;
            let new_o = com + back(a3d);
            let new_h1 = new_o + (back(b3d) - back(a3d));
            let new_h2 = new_o + (back(c3d) - back(a3d));

            let dx_o = new_o - xo;
            let dx_h1 = (new_h1 - new_o) - pb + dx_o;
            let dx_h2 = (new_h2 - new_o) - pc + dx_o;

            // Lever arms relative to the old oxygen, whose own term vanishes
            acc.r_m_dr += outer(&b0, &(dx_h1 * geom.m_h)) + outer(&c0, &(dx_h2 * geom.m_h));

            x_new[o] = new_o;
            x_new[h1] += dx_h1;
            x_new[h2] += dx_h2;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hopmd_math::SimBox;

    const D_OH: f64 = 0.1;
    const D_HH: f64 = 0.1633;
    const M_O: f64 = 15.9994;
    const M_H: f64 = 1.008;

    fn water() -> (ConstraintTopology, Vec<f64>, Vec<Vec3>) {
        let mut top = ConstraintTopology::new();
        top.add_settle(SettleGroup::new(0, 1, 2, D_OH, D_HH));
        let invmass = vec![1.0 / M_O, 1.0 / M_H, 1.0 / M_H];
        let half = 0.5 * D_HH;
        let h = (D_OH * D_OH - half * half).sqrt();
        let x = vec![
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(1.0 + half, 1.0 - h, 1.0),
            Vec3::new(1.0 - half, 1.0 - h, 1.0),
        ];
        (top, invmass, x)
    }

    fn com(x: &[Vec3]) -> Vec3 {
        (x[0] * M_O + (x[1] + x[2]) * M_H) / (M_O + 2.0 * M_H)
    }

    fn settle(
        top: &ConstraintTopology,
        invmass: &[f64],
        x_old: &[Vec3],
        x_new: &mut [Vec3],
        pbc: &SimBox,
    ) -> Result<StepAccumulator> {
        let solver = Settle::new(top, invmass)?;
        let lengths = top.lengths(0.0);
        let ctx = SolveContext::new(invmass, &lengths, 0.002, pbc);
        let mut acc = StepAccumulator::default();
        solver.solve(&ctx, x_old, x_new, &mut acc)?;
        Ok(acc)
    }

    #[test]
    fn test_settle_restores_geometry() {
        let (top, invmass, x_old) = water();
        let shifts = [
            Vec3::new(0.001, 0.002, -0.001),
            Vec3::new(-0.003, 0.001, 0.002),
            Vec3::new(0.002, -0.002, 0.001),
        ];
        let mut x_new: Vec<Vec3> = x_old.iter().zip(&shifts).map(|(x, s)| x + s).collect();
        let com_before = com(&x_new);

        settle(&top, &invmass, &x_old, &mut x_new, &SimBox::open()).unwrap();

        assert_relative_eq!((x_new[1] - x_new[0]).norm(), D_OH, epsilon = 1e-10);
        assert_relative_eq!((x_new[2] - x_new[0]).norm(), D_OH, epsilon = 1e-10);
        assert_relative_eq!((x_new[2] - x_new[1]).norm(), D_HH, epsilon = 1e-10);
        assert_relative_eq!(com(&x_new), com_before, epsilon = 1e-12);
    }

    #[test]
    fn test_settle_rigid_motion_untouched() {
        let (top, invmass, x_old) = water();
        let shift = Vec3::new(0.003, -0.001, 0.002);
        let mut x_new: Vec<Vec3> = x_old.iter().map(|x| x + shift).collect();
        let expected = x_new.clone();

        settle(&top, &invmass, &x_old, &mut x_new, &SimBox::open()).unwrap();

        for (a, b) in x_new.iter().zip(&expected) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_settle_across_boundary() {
        let (top, invmass, mut x_old) = water();
        let pbc = SimBox::rectangular(Vec3::new(2.0, 2.0, 2.0));
        // Move the water so that a hydrogen sits in the next image
        for x in &mut x_old {
            *x += Vec3::new(0.95, 0.0, 0.0);
        }
        x_old[1] = pbc.put_in_box(x_old[1]);
        let mut x_new = x_old.clone();
        x_new[0] += Vec3::new(0.0, 0.002, 0.0);

        settle(&top, &invmass, &x_old, &mut x_new, &pbc).unwrap();

        assert_relative_eq!(pbc.distance(&x_new[0], &x_new[1]), D_OH, epsilon = 1e-10);
        assert_relative_eq!(pbc.distance(&x_new[0], &x_new[2]), D_OH, epsilon = 1e-10);
        assert_relative_eq!(pbc.distance(&x_new[1], &x_new[2]), D_HH, epsilon = 1e-10);
    }

    #[test]
    fn test_settle_rejects_massless() {
        let (top, mut invmass, _) = water();
        invmass[1] = 0.0;
        assert!(matches!(
            Settle::new(&top, &invmass),
            Err(ConstraintError::InvalidSettle { index: 0, .. })
        ));
    }
}
