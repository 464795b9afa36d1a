// src/restrict.rs
//
// Coefficient restriction between levels.
//
// Cell averages: the coarse value is the mean of its ratio^D children. Face averages: the
// coarse face value is the mean of the fine faces lying on it (ratio^(D-1) of them). Both
// work box-by-box against any coarse layout, so the same kernels serve multigrid levels of
// one AMR level (box i maps to box i) and the AMR-to-AMR step (arbitrary overlap).

use crate::field::{Fab, IMultiFab, MultiFab};
use crate::index::{IndexBox, IndexType, IntVect};
use crate::parallel::{ExecPolicy, for_each_cell, for_each_fab};

/// Average component `comp..comp+ncomp` of the cell field `fine` onto `coarse`
/// wherever the coarsened fine boxes overlap the coarse valid boxes.
pub fn average_down_cells<const D: usize>(
    fine: &MultiFab<f64, D>,
    coarse: &mut MultiFab<f64, D>,
    comp: usize,
    ncomp: usize,
    ratio: IntVect<D>,
    policy: ExecPolicy,
) {
    debug_assert_eq!(fine.ix_type, IndexType::Cell);
    let inv = 1.0 / ratio.product() as f64;
    let coarse_boxes = coarse.layout.boxes.clone();
    for_each_fab(policy, &mut coarse.fabs, |ci, cfab| {
        for (fi, ffab) in fine.fabs.iter().enumerate() {
            let Some(region) = fine.layout.boxes[fi].coarsen(ratio).intersect(&coarse_boxes[ci]) else {
                continue;
            };
            let fvalid = fine.layout.boxes[fi];
            for n in comp..comp + ncomp {
                for_each_cell(&region, |civ| {
                    let children = child_cells(civ, ratio);
                    let s: f64 = children
                        .iter()
                        .filter(|fiv| fvalid.contains(*fiv))
                        .map(|fiv| ffab[(fiv, n)])
                        .sum();
                    cfab[(civ, n)] = s * inv;
                });
            }
        }
    });
}

/// Average every component of the face fields `fine[d]` onto `coarse[d]`.
pub fn average_down_faces<const D: usize>(
    fine: &[MultiFab<f64, D>; D],
    coarse: &mut [MultiFab<f64, D>; D],
    ratio: IntVect<D>,
    policy: ExecPolicy,
) {
    for d in 0..D {
        let f = &fine[d];
        let c = &mut coarse[d];
        debug_assert_eq!(f.ix_type, IndexType::Face(d));
        let inv = 1.0 / (ratio.product() / ratio[d]) as f64;
        let coarse_boxes = c.layout.boxes.clone();
        let ncomp = c.ncomp.min(f.ncomp);
        for_each_fab(policy, &mut c.fabs, |ci, cfab| {
            for (fi, ffab) in f.fabs.iter().enumerate() {
                let Some(cells) = f.layout.boxes[fi].coarsen(ratio).intersect(&coarse_boxes[ci]) else {
                    continue;
                };
                let region = cells.surrounding_nodes(d);
                let fvalid = f.layout.boxes[fi].surrounding_nodes(d);
                for n in 0..ncomp {
                    for_each_cell(&region, |civ| {
                        let s: f64 = child_faces(civ, d, ratio)
                            .iter()
                            .filter(|fiv| fvalid.contains(*fiv))
                            .map(|fiv| ffab[(fiv, n)])
                            .sum();
                        cfab[(civ, n)] = s * inv;
                    });
                }
            }
        });
    }
}

fn child_cells<const D: usize>(civ: IntVect<D>, ratio: IntVect<D>) -> IndexBox<D> {
    IndexBox::new(civ.refine(ratio), (civ + IntVect::splat(1)).refine(ratio))
}

/// Fine faces (direction `d`) covering coarse face `civ`.
fn child_faces<const D: usize>(civ: IntVect<D>, d: usize, ratio: IntVect<D>) -> IndexBox<D> {
    let lo = civ.refine(ratio);
    let mut hi = (civ + IntVect::splat(1)).refine(ratio);
    hi[d] = lo[d] + 1;
    IndexBox::new(lo, hi)
}

/// Rescale factor `2r/(r+1)`, `r = 2^mglev`, for faces between an overset and a solved cell.
#[inline]
pub fn overset_rescale_factor(mglev: usize) -> f64 {
    let r = (1u64 << mglev) as f64;
    2.0 * r / (r + 1.0)
}

/// Multiply `b[d]` by `osfac` on every face whose two neighbours are exactly one overset
/// (mask 0) and one solved (mask 1) cell. The mask's ghost cells must be filled.
pub fn overset_rescale_b<const D: usize>(
    b: &mut [MultiFab<f64, D>; D],
    osm: &IMultiFab<D>,
    osfac: f64,
    policy: ExecPolicy,
) {
    for (d, bd) in b.iter_mut().enumerate() {
        let layout = bd.layout.clone();
        for_each_fab(policy, &mut bd.fabs, |i, bfab: &mut Fab<f64, D>| {
            let m = &osm.fabs[i];
            let fbx = layout.boxes[i].surrounding_nodes(d);
            for n in 0..bfab.ncomp {
                for_each_cell(&fbx, |iv| {
                    if m[(iv - IntVect::unit(d), 0)] + m[(iv, 0)] == 1 {
                        bfab[(iv, n)] *= osfac;
                    }
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::BoxLayout;
    use crate::levels::overset_mask_from_fn;

    fn layouts() -> (BoxLayout<2>, BoxLayout<2>) {
        let fine = BoxLayout::new(vec![
            IndexBox::from_size([0, 0], [8, 8]),
            IndexBox::from_size([8, 0], [8, 8]),
        ]);
        let coarse = fine.coarsen(IntVect::new([2, 1]));
        (fine, coarse)
    }

    #[test]
    fn constants_restrict_exactly() {
        let (fl, cl) = layouts();
        let ratio = IntVect::new([2, 1]);
        let mut fa = MultiFab::cell(fl.clone(), 1, 0);
        fa.set_val(2.5);
        let mut ca = MultiFab::cell(cl.clone(), 1, 0);
        average_down_cells(&fa, &mut ca, 0, 1, ratio, ExecPolicy::Threaded);
        assert_eq!(ca.norm0(0, ExecPolicy::Serial), 2.5);
        assert!((ca.sum(0, ExecPolicy::Serial) - 2.5 * 64.0).abs() < 1e-12);

        let fb: [MultiFab<f64, 2>; 2] = std::array::from_fn(|d| {
            let mut mf = MultiFab::face(fl.clone(), d, 2, 0);
            mf.set_val(0.75);
            mf
        });
        let mut cb: [MultiFab<f64, 2>; 2] = std::array::from_fn(|d| MultiFab::face(cl.clone(), d, 2, 0));
        average_down_faces(&fb, &mut cb, ratio, ExecPolicy::Serial);
        for d in 0..2 {
            for n in 0..2 {
                assert_eq!(cb[d].norm0(n, ExecPolicy::Serial), 0.75);
                for (i, fab) in cb[d].fabs.iter().enumerate() {
                    for iv in cb[d].valid_box(i).iter() {
                        assert_eq!(fab[(iv, n)], 0.75);
                    }
                }
            }
        }
    }

    #[test]
    fn face_average_uses_only_coincident_faces() {
        let fl = BoxLayout::new(vec![IndexBox::<2>::from_size([0, 0], [4, 4])]);
        let cl = fl.coarsen(IntVect::splat(2));
        let mut fb: [MultiFab<f64, 2>; 2] = std::array::from_fn(|d| MultiFab::face(fl.clone(), d, 1, 0));
        // x-faces carry their x index; only even ones lie on coarse faces.
        for iv in fb[0].valid_box(0).iter() {
            fb[0].fabs[0][(iv, 0)] = iv[0] as f64 + 10.0 * iv[1] as f64;
        }
        let mut cb: [MultiFab<f64, 2>; 2] = std::array::from_fn(|d| MultiFab::face(cl.clone(), d, 1, 0));
        average_down_faces(&fb, &mut cb, IntVect::splat(2), ExecPolicy::Serial);
        // coarse x-face (1, 0) = mean of fine faces (2, 0) and (2, 1).
        assert_eq!(cb[0].fabs[0][(IntVect::new([1, 0]), 0)], 7.0);
        assert_eq!(cb[0].fabs[0][(IntVect::new([2, 1]), 0)], 29.0);
    }

    #[test]
    fn amr_to_amr_restriction_writes_only_the_covered_region() {
        let cl = BoxLayout::new(vec![IndexBox::<2>::from_size([0, 0], [8, 8])]);
        let fl = BoxLayout::new(vec![IndexBox::<2>::from_size([4, 4], [4, 6])]);
        let mut fa = MultiFab::cell(fl, 1, 0);
        fa.set_val(3.0);
        let mut ca = MultiFab::cell(cl, 1, 0);
        ca.set_val(1.0);
        average_down_cells(&fa, &mut ca, 0, 1, IntVect::splat(2), ExecPolicy::Serial);
        assert_eq!(ca.fabs[0][(IntVect::new([2, 2]), 0)], 3.0);
        assert_eq!(ca.fabs[0][(IntVect::new([3, 4]), 0)], 3.0);
        assert_eq!(ca.fabs[0][(IntVect::new([1, 1]), 0)], 1.0);
        assert_eq!(ca.fabs[0][(IntVect::new([4, 2]), 0)], 1.0);
    }

    #[test]
    fn overset_rescale_touches_only_mixed_faces() {
        let l = BoxLayout::new(vec![IndexBox::<2>::from_size([0, 0], [4, 4])]);
        let osm = overset_mask_from_fn(&l, |iv| iv[0] == 0);
        let mut b: [MultiFab<f64, 2>; 2] = std::array::from_fn(|d| {
            let mut mf = MultiFab::face(l.clone(), d, 1, 0);
            mf.set_val(1.0);
            mf
        });
        let fac = overset_rescale_factor(1);
        assert!((fac - 4.0 / 3.0).abs() < 1e-15);
        overset_rescale_b(&mut b, &osm, fac, ExecPolicy::Serial);
        // x-face between overset column 0 and solved column 1.
        assert_eq!(b[0].fabs[0][(IntVect::new([1, 2]), 0)], fac);
        // domain face next to the overset column (ghost reads as solved).
        assert_eq!(b[0].fabs[0][(IntVect::new([0, 2]), 0)], fac);
        assert_eq!(b[0].fabs[0][(IntVect::new([2, 2]), 0)], 1.0);
        // y-faces inside the overset column join two overset cells.
        assert_eq!(b[1].fabs[0][(IntVect::new([0, 2]), 0)], 1.0);
        assert_eq!(b[1].fabs[0][(IntVect::new([1, 2]), 0)], 1.0);
    }
}
