// src/robin.rs
//
// Robin-to-Neumann elimination.
//
// For `alpha u - div(beta grad u) = rhs` with `a u + b du/dn = f` on a domain face, the
// discrete boundary condition at the face between the last cell i and its ghost g,
//     a (u_i + u_g)/2 + b (u_g - u_i)/h = f,
// gives the ghost relation
//     u_g = A + B u_i,   B = (b/h - a/2)/(b/h + a/2),   A = f/(b/h + a/2).
// Substituting it into the stencil leaves a homogeneous Neumann stencil with
//     alpha~_i = alpha_i + (1 - B) beta_face / h^2
//     rhs~_i   = rhs_i   + A beta_face / h^2.
// The scalars are folded in here: `a` is later multiplied by `a_scalar`, so its increment
// carries `b_scalar / a_scalar`; the rhs increment carries `b_scalar`.

use crate::bc::{BcTable, BcType};
use crate::field::MultiFab;
use crate::geometry::Geometry;
use crate::index::{IntVect, Orientation, Side};
use crate::layout::BoxLayout;
use crate::parallel::{ExecPolicy, for_each_fab};

/// `(A, B)` of the ghost relation `u_ghost = A + B * u_interior`.
#[inline]
pub fn robin_ghost_relation(a_r: f64, b_r: f64, f_r: f64, h: f64) -> (f64, f64) {
    let denom = b_r / h + 0.5 * a_r;
    let b = (b_r / h - 0.5 * a_r) / denom;
    let a = f_r / denom;
    (a, b)
}

/// One Robin boundary cell: the valid cell next to the domain face, the face index
/// (in direction `dir`) and the ghost cell holding the Robin values.
#[derive(Debug, Clone, Copy)]
struct RobinCell<const D: usize> {
    dir: usize,
    interior: IntVect<D>,
    face: IntVect<D>,
    ghost: IntVect<D>,
}

/// Visit every Robin boundary cell of box `bi` for component `comp`.
fn for_each_robin_cell<const D: usize, F>(
    geom: &Geometry<D>,
    bc: &BcTable<D>,
    layout: &BoxLayout<D>,
    bi: usize,
    comp: usize,
    mut f: F,
) where
    F: FnMut(RobinCell<D>),
{
    let vbx = layout.boxes[bi];
    let domain = geom.domain;
    for dir in 0..D {
        for side in [Side::Lo, Side::Hi] {
            let o = Orientation::new(dir, side);
            if bc.get(comp, o) != BcType::Robin {
                continue;
            }
            let slab = vbx.adj_cell(o);
            if domain.contains_box(&slab) {
                continue;
            }
            for ghost in slab.iter() {
                let (interior, face) = match side {
                    Side::Lo => {
                        let inner = ghost + IntVect::unit(dir);
                        (inner, inner)
                    }
                    Side::Hi => (ghost - IntVect::unit(dir), ghost),
                };
                f(RobinCell {
                    dir,
                    interior,
                    face,
                    ghost,
                });
            }
        }
    }
}

/// Fold the Robin data of every component into the level-0 `a` (single component).
///
/// `robin` holds `(a_r, b_r, f_r)` at components `3*comp..3*comp+3` on the ghost cells.
pub fn apply_robin_a<const D: usize>(
    geom: &Geometry<D>,
    bc: &BcTable<D>,
    robin: &MultiFab<f64, D>,
    b: &[MultiFab<f64, D>; D],
    b_over_a: f64,
    a: &mut MultiFab<f64, D>,
    policy: ExecPolicy,
) {
    let h = geom.cell_sizes();
    let layout = &a.layout;
    let ncomp = bc.ncomp();
    for_each_fab(policy, &mut a.fabs, |bi, afab| {
        for comp in 0..ncomp {
            for_each_robin_cell(geom, bc, layout, bi, comp, |rc| {
                let rfab = &robin.fabs[bi];
                let hd = h[rc.dir];
                let (_, big_b) = robin_ghost_relation(
                    rfab[(rc.ghost, 3 * comp)],
                    rfab[(rc.ghost, 3 * comp + 1)],
                    rfab[(rc.ghost, 3 * comp + 2)],
                    hd,
                );
                let bface = b[rc.dir].fabs[bi][(rc.face, comp)];
                afab[(rc.interior, 0)] += b_over_a * bface * (1.0 - big_b) / (hd * hd);
            });
        }
    });
}

/// Add the inhomogeneous Robin contribution `b_scalar * A * b_face / h^2` to `rhs`.
pub fn apply_robin_rhs<const D: usize>(
    geom: &Geometry<D>,
    bc: &BcTable<D>,
    robin: &MultiFab<f64, D>,
    b: &[MultiFab<f64, D>; D],
    b_scalar: f64,
    rhs: &mut MultiFab<f64, D>,
    policy: ExecPolicy,
) {
    let h = geom.cell_sizes();
    let layout = &rhs.layout;
    let ncomp = bc.ncomp().min(rhs.ncomp);
    for_each_fab(policy, &mut rhs.fabs, |bi, rfab_out| {
        for comp in 0..ncomp {
            for_each_robin_cell(geom, bc, layout, bi, comp, |rc| {
                let rfab = &robin.fabs[bi];
                let hd = h[rc.dir];
                let (big_a, _) = robin_ghost_relation(
                    rfab[(rc.ghost, 3 * comp)],
                    rfab[(rc.ghost, 3 * comp + 1)],
                    rfab[(rc.ghost, 3 * comp + 2)],
                    hd,
                );
                let bface = b[rc.dir].fabs[bi][(rc.face, comp)];
                rfab_out[(rc.interior, comp)] += b_scalar * big_a * bface / (hd * hd);
            });
        }
    });
}
