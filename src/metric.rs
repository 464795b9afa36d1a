// src/metric.rs
//
// Geometric metric for reduced-dimension curvilinear builds:
//   Rz (D = 2):        volume/area weight r
//   Spherical (D = 1): volume/area weight r^2
// Cartesian geometries (and every 3D build) leave the coefficients untouched.

use crate::field::MultiFab;
use crate::geometry::{CoordSys, Geometry};
use crate::index::{IndexType, IntVect};
use crate::parallel::{ExecPolicy, for_each_cell, for_each_fab};

#[inline]
fn weight(coord: CoordSys, r: f64) -> f64 {
    match coord {
        CoordSys::Cartesian => 1.0,
        CoordSys::Rz => r,
        CoordSys::Spherical => r * r,
    }
}

/// Metric factor at index `iv` of a field with centring `ix`.
///
/// Radial faces (`Face(0)`) sit at the face radius; everything else at the cell-centre radius.
#[inline]
pub fn metric_factor<const D: usize>(geom: &Geometry<D>, ix: IndexType, iv: IntVect<D>) -> f64 {
    if !geom.has_metric() {
        return 1.0;
    }
    let r = match ix {
        IndexType::Face(0) => geom.face_radius(iv[0]),
        _ => geom.cell_center_radius(iv[0]),
    };
    weight(geom.coord, r)
}

/// Multiply every component of `mf` in place by the metric factor of its centring.
pub fn apply_metric_term<const D: usize>(geom: &Geometry<D>, mf: &mut MultiFab<f64, D>, policy: ExecPolicy) {
    if !geom.has_metric() {
        return;
    }
    let ix = mf.ix_type;
    let layout = &mf.layout;
    for_each_fab(policy, &mut mf.fabs, |i, fab| {
        let vbx = layout.boxes[i].convert(ix);
        for n in 0..fab.ncomp {
            for_each_cell(&vbx, |iv| fab[(iv, n)] *= metric_factor(geom, ix, iv));
        }
    });
}
