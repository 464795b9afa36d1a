// src/layout.rs

use crate::field::IMultiFab;
use crate::index::{IndexBox, IndexType, IntVect};

/// Disjoint valid boxes of one level plus their ownership map.
///
/// `owner[i]` is the process rank that owns box `i`. This in-process substrate runs
/// as rank 0; boxes owned elsewhere are still allocated but never counted as owned.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxLayout<const D: usize> {
    pub boxes: Vec<IndexBox<D>>,
    pub owner: Vec<usize>,
}

impl<const D: usize> BoxLayout<D> {
    /// All boxes owned by rank 0.
    pub fn new(boxes: Vec<IndexBox<D>>) -> Self {
        let owner = vec![0; boxes.len()];
        Self { boxes, owner }
    }

    pub fn with_owners(boxes: Vec<IndexBox<D>>, owner: Vec<usize>) -> Self {
        assert_eq!(boxes.len(), owner.len(), "one owner per box");
        Self { boxes, owner }
    }

    /// Chop `domain` into boxes of at most `max_size` cells per direction.
    pub fn chopped(domain: IndexBox<D>, max_size: i64) -> Self {
        let mut boxes = vec![domain];
        for d in 0..D {
            let mut next = Vec::new();
            for b in boxes {
                let mut lo = b.lo[d];
                while lo < b.hi[d] {
                    let hi = (lo + max_size).min(b.hi[d]);
                    let mut c = b;
                    c.lo[d] = lo;
                    c.hi[d] = hi;
                    next.push(c);
                    lo = hi;
                }
            }
            boxes = next;
        }
        Self::new(boxes)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    #[inline]
    pub fn is_local(&self, i: usize, rank: usize) -> bool {
        self.owner[i] == rank
    }

    pub fn coarsen(&self, ratio: IntVect<D>) -> Self {
        Self {
            boxes: self.boxes.iter().map(|b| b.coarsen(ratio)).collect(),
            owner: self.owner.clone(),
        }
    }

    pub fn coarsenable(&self, ratio: IntVect<D>, min_width: i64) -> bool {
        self.boxes.iter().all(|b| b.coarsenable(ratio, min_width))
    }

    pub fn num_pts(&self) -> usize {
        self.boxes.iter().map(|b| b.num_pts()).sum()
    }

    /// True if the (disjoint) boxes tile all of `domain`.
    pub fn covers(&self, domain: &IndexBox<D>) -> bool {
        let inside: usize = self
            .boxes
            .iter()
            .filter_map(|b| b.intersect(domain))
            .map(|b| b.num_pts())
            .sum();
        inside == domain.num_pts()
    }

    /// True if cell `iv` lies in any box other than `skip`.
    pub fn covered_by_other(&self, iv: IntVect<D>, skip: usize) -> bool {
        self.boxes
            .iter()
            .enumerate()
            .any(|(j, b)| j != skip && b.contains(iv))
    }
}

/// Per-box covered flags of a cut-cell (embedded boundary) geometry.
///
/// Stored as an integer cell field with one ghost cell: 1 = covered (outside the
/// physical domain, not an unknown), 0 = regular or cut.
#[derive(Debug, Clone)]
pub struct CutCellFlags<const D: usize> {
    pub covered: IMultiFab<D>,
}

/// Mesh factory of a level, tagged by geometry kind.
///
/// Every consumer asks `covered(box, cell)`; there is no need to know which kind
/// of factory it is holding.
#[derive(Debug, Clone)]
pub enum MeshFactory<const D: usize> {
    Regular,
    CutCell(CutCellFlags<D>),
}

impl<const D: usize> MeshFactory<D> {
    /// Build a cut-cell factory from a predicate on cell indices (true = covered).
    pub fn cut_cell_from_fn<F>(layout: &BoxLayout<D>, f: F) -> Self
    where
        F: Fn(IntVect<D>) -> bool,
    {
        let mut covered = IMultiFab::new(layout.clone(), IndexType::Cell, 1, 1);
        for fab in covered.fabs.iter_mut() {
            let bx = fab.bx;
            for iv in bx.iter() {
                fab[(iv, 0)] = i32::from(f(iv));
            }
        }
        MeshFactory::CutCell(CutCellFlags { covered })
    }

    #[inline]
    pub fn covered(&self, box_index: usize, iv: IntVect<D>) -> bool {
        match self {
            MeshFactory::Regular => false,
            MeshFactory::CutCell(flags) => {
                let fab = &flags.covered.fabs[box_index];
                fab.bx.contains(iv) && fab[(iv, 0)] != 0
            }
        }
    }

    #[inline]
    pub fn is_cut_cell(&self) -> bool {
        matches!(self, MeshFactory::CutCell(_))
    }

    /// Factory for the layout coarsened by `ratio`: a coarse cell is covered only when
    /// every child is covered.
    pub fn coarsen(&self, coarse_layout: &BoxLayout<D>, ratio: IntVect<D>) -> Self {
        match self {
            MeshFactory::Regular => MeshFactory::Regular,
            MeshFactory::CutCell(flags) => {
                let fine = &flags.covered;
                let mut covered = IMultiFab::new(coarse_layout.clone(), IndexType::Cell, 1, 1);
                for (bi, cfab) in covered.fabs.iter_mut().enumerate() {
                    let ffab = &fine.fabs[bi];
                    let cbx = cfab.bx;
                    for civ in cbx.iter() {
                        let children = IndexBox::new(civ.refine(ratio), (civ + IntVect::splat(1)).refine(ratio));
                        let all = children
                            .iter()
                            .all(|fiv| !ffab.bx.contains(fiv) || ffab[(fiv, 0)] != 0);
                        cfab[(civ, 0)] = i32::from(all);
                    }
                }
                MeshFactory::CutCell(CutCellFlags { covered })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chopped_layout_covers_domain() {
        let dom = IndexBox::<2>::from_size([0, 0], [10, 6]);
        let l = BoxLayout::chopped(dom, 4);
        assert_eq!(l.len(), 6);
        assert!(l.covers(&dom));
        assert_eq!(l.num_pts(), 60);

        let partial = BoxLayout::new(vec![IndexBox::from_size([0, 0], [4, 6])]);
        assert!(!partial.covers(&dom));
    }

    #[test]
    fn cut_cell_factory_reports_covered_cells() {
        let l = BoxLayout::new(vec![IndexBox::<2>::from_size([0, 0], [4, 4])]);
        let f = MeshFactory::cut_cell_from_fn(&l, |iv| iv[0] >= 2);
        assert!(f.is_cut_cell());
        assert!(f.covered(0, IntVect::new([3, 1])));
        assert!(!f.covered(0, IntVect::new([1, 1])));
        assert!(!MeshFactory::<2>::Regular.covered(0, IntVect::new([3, 1])));

        let cl = l.coarsen(IntVect::splat(2));
        let c = f.coarsen(&cl, IntVect::splat(2));
        assert!(c.covered(0, IntVect::new([1, 0])));
        assert!(!c.covered(0, IntVect::new([0, 0])));
    }
}
