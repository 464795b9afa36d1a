// src/levels/overset.rs
//
// Overset masks: 1 = cell solved by this operator, 0 = value supplied by an
// overlapping grid. Ghost cells outside every box read as solved.

use crate::field::IMultiFab;
use crate::index::{IndexBox, IndexType, IntVect};
use crate::layout::BoxLayout;

/// Build a mask on `layout` from a predicate (true = overset, i.e. externally supplied).
pub fn overset_mask_from_fn<const D: usize, F>(layout: &BoxLayout<D>, f: F) -> IMultiFab<D>
where
    F: Fn(IntVect<D>) -> bool,
{
    let mut m = IMultiFab::new(layout.clone(), IndexType::Cell, 1, 1);
    m.set_val(1);
    for (i, fab) in m.fabs.iter_mut().enumerate() {
        for iv in layout.boxes[i].iter() {
            fab[(iv, 0)] = if f(iv) { 0 } else { 1 };
        }
    }
    m
}

/// Coarsen a mask: the coarse cell is solved when any of its children is solved.
pub fn coarsen_overset_mask<const D: usize>(
    fine: &IMultiFab<D>,
    coarse_layout: &BoxLayout<D>,
    ratio: IntVect<D>,
) -> IMultiFab<D> {
    let mut c = IMultiFab::new(coarse_layout.clone(), IndexType::Cell, 1, 1);
    c.set_val(1);
    for (i, cfab) in c.fabs.iter_mut().enumerate() {
        let ffab = &fine.fabs[i];
        let fvalid = fine.layout.boxes[i];
        for civ in coarse_layout.boxes[i].iter() {
            let children = IndexBox::new(civ.refine(ratio), (civ + IntVect::splat(1)).refine(ratio));
            let any_solved = children
                .iter()
                .filter(|fiv| fvalid.contains(*fiv))
                .any(|fiv| ffab[(fiv, 0)] != 0);
            cfab[(civ, 0)] = i32::from(any_solved);
        }
    }
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coarse_cell_is_overset_only_when_all_children_are() {
        let l = BoxLayout::new(vec![IndexBox::<2>::from_size([0, 0], [4, 4])]);
        // Overset: the whole 2x2 block at the origin plus one cell of the next block.
        let m = overset_mask_from_fn(&l, |iv| (iv[0] < 2 && iv[1] < 2) || (iv[0] == 2 && iv[1] == 0));
        let cl = l.coarsen(IntVect::splat(2));
        let c = coarsen_overset_mask(&m, &cl, IntVect::splat(2));
        assert_eq!(c.fabs[0][(IntVect::new([0, 0]), 0)], 0);
        assert_eq!(c.fabs[0][(IntVect::new([1, 0]), 0)], 1);
        assert_eq!(c.fabs[0][(IntVect::new([1, 1]), 0)], 1);
        // Ghosts read as solved.
        assert_eq!(c.fabs[0][(IntVect::new([-1, 0]), 0)], 1);
    }
}
