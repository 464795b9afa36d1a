// src/field.rs
//
// Haloed, box-indexed field containers.
//
// A `Fab` holds `ncomp` components over one (grown) box, x fastest, components
// outermost. A `MultiFab` holds one `Fab` per layout box with `ngrow` ghost cells.
// Ghost exchange between boxes of the same level is `fill_boundary`; physical
// boundary ghosts are the job of `bc::BoundaryStencil`.

use crate::geometry::Geometry;
use crate::index::{IndexBox, IndexType, IntVect};
use crate::layout::BoxLayout;
use crate::parallel::{ExecPolicy, for_each_fab, map_reduce_boxes};
use std::ops::{Index, IndexMut};

/// Field data over one box.
#[derive(Debug, Clone, PartialEq)]
pub struct Fab<T, const D: usize> {
    pub bx: IndexBox<D>,
    pub ncomp: usize,
    pub data: Vec<T>,
    stride: [usize; D],
    npts: usize,
}

impl<T: Copy + Default, const D: usize> Fab<T, D> {
    pub fn new(bx: IndexBox<D>, ncomp: usize) -> Self {
        let mut stride = [0usize; D];
        let mut s = 1usize;
        for (d, st) in stride.iter_mut().enumerate() {
            *st = s;
            s *= bx.len(d) as usize;
        }
        let npts = bx.num_pts();
        Self {
            bx,
            ncomp,
            data: vec![T::default(); npts * ncomp],
            stride,
            npts,
        }
    }

    #[inline]
    pub fn offset(&self, iv: IntVect<D>, n: usize) -> usize {
        debug_assert!(self.bx.contains(iv), "{:?} outside {:?}", iv, self.bx);
        debug_assert!(n < self.ncomp);
        let mut off = n * self.npts;
        for d in 0..D {
            off += (iv[d] - self.bx.lo[d]) as usize * self.stride[d];
        }
        off
    }

    pub fn fill(&mut self, v: T) {
        self.data.iter_mut().for_each(|x| *x = v);
    }

    /// Set component `n` to `v` over `region` (clipped to the fab box).
    pub fn set_val_region(&mut self, region: &IndexBox<D>, n: usize, v: T) {
        if let Some(r) = self.bx.intersect(region) {
            for iv in r.iter() {
                let o = self.offset(iv, n);
                self.data[o] = v;
            }
        }
    }

    /// Copy `ncomp` components from `src` over `region` (clipped to both boxes).
    pub fn copy_region(
        &mut self,
        src: &Fab<T, D>,
        region: &IndexBox<D>,
        src_comp: usize,
        dst_comp: usize,
        ncomp: usize,
    ) {
        let Some(r) = self.bx.intersect(region).and_then(|r| r.intersect(&src.bx)) else {
            return;
        };
        for n in 0..ncomp {
            for iv in r.iter() {
                let o = self.offset(iv, dst_comp + n);
                self.data[o] = src[(iv, src_comp + n)];
            }
        }
    }
}

impl<T: Copy + Default, const D: usize> Index<(IntVect<D>, usize)> for Fab<T, D> {
    type Output = T;
    #[inline]
    fn index(&self, (iv, n): (IntVect<D>, usize)) -> &T {
        &self.data[self.offset(iv, n)]
    }
}

impl<T: Copy + Default, const D: usize> IndexMut<(IntVect<D>, usize)> for Fab<T, D> {
    #[inline]
    fn index_mut(&mut self, (iv, n): (IntVect<D>, usize)) -> &mut T {
        let o = self.offset(iv, n);
        &mut self.data[o]
    }
}

/// One `Fab` per box of a layout.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiFab<T, const D: usize> {
    pub layout: BoxLayout<D>,
    pub ix_type: IndexType,
    pub ncomp: usize,
    pub ngrow: i64,
    pub fabs: Vec<Fab<T, D>>,
}

/// Integer-valued field (overset masks, boundary masks, DOF ids).
pub type IMultiFab<const D: usize> = MultiFab<i32, D>;

impl<T: Copy + Default + Send + Sync, const D: usize> MultiFab<T, D> {
    pub fn new(layout: BoxLayout<D>, ix_type: IndexType, ncomp: usize, ngrow: i64) -> Self {
        let fabs = layout
            .boxes
            .iter()
            .map(|b| Fab::new(b.convert(ix_type).grow(ngrow), ncomp))
            .collect();
        Self {
            layout,
            ix_type,
            ncomp,
            ngrow,
            fabs,
        }
    }

    /// Cell-centred field.
    pub fn cell(layout: BoxLayout<D>, ncomp: usize, ngrow: i64) -> Self {
        Self::new(layout, IndexType::Cell, ncomp, ngrow)
    }

    /// Face-centred field in direction `d`.
    pub fn face(layout: BoxLayout<D>, d: usize, ncomp: usize, ngrow: i64) -> Self {
        Self::new(layout, IndexType::Face(d), ncomp, ngrow)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fabs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fabs.is_empty()
    }

    /// Valid (non-ghost) region of box `i` in this field's centring.
    #[inline]
    pub fn valid_box(&self, i: usize) -> IndexBox<D> {
        self.layout.boxes[i].convert(self.ix_type)
    }

    #[inline]
    pub fn grown_box(&self, i: usize) -> IndexBox<D> {
        self.fabs[i].bx
    }

    /// Same layout, centring and component count.
    pub fn same_shape<U>(&self, other: &MultiFab<U, D>) -> bool {
        self.layout == other.layout && self.ix_type == other.ix_type && self.ncomp == other.ncomp
    }

    /// Set every component, including ghosts.
    pub fn set_val(&mut self, v: T) {
        for fab in &mut self.fabs {
            fab.fill(v);
        }
    }

    /// Set component `n`, including ghosts.
    pub fn set_val_comp(&mut self, n: usize, v: T) {
        for fab in &mut self.fabs {
            let bx = fab.bx;
            fab.set_val_region(&bx, n, v);
        }
    }

    /// Copy components `[src_comp, src_comp+ncomp)` of `src` into `[dst_comp, ..)`,
    /// over valid regions grown by `ngrow`. Both fields must share the layout.
    pub fn copy_from(
        &mut self,
        src: &MultiFab<T, D>,
        src_comp: usize,
        dst_comp: usize,
        ncomp: usize,
        ngrow: i64,
    ) {
        assert_eq!(self.layout, src.layout, "copy_from requires identical layouts");
        assert_eq!(self.ix_type, src.ix_type, "copy_from requires identical centring");
        for (i, fab) in self.fabs.iter_mut().enumerate() {
            let region = src.layout.boxes[i].convert(src.ix_type).grow(ngrow);
            fab.copy_region(&src.fabs[i], &region, src_comp, dst_comp, ncomp);
        }
    }

    /// In-process ghost exchange: every ghost cell that lies in another box's valid
    /// region (or a periodic image of it) takes that box's value.
    pub fn fill_boundary(&mut self, geom: &Geometry<D>) {
        if self.ngrow == 0 {
            return;
        }
        let shifts = geom.periodic_shifts();
        let mut updates: Vec<(usize, IntVect<D>, usize, T)> = Vec::new();
        for i in 0..self.fabs.len() {
            let grown = self.fabs[i].bx;
            let own = self.valid_box(i);
            for j in 0..self.fabs.len() {
                let src_valid = self.valid_box(j);
                for s in &shifts {
                    if i == j && s.all_eq(0) {
                        continue;
                    }
                    let Some(r) = grown.intersect(&src_valid.shift(*s)) else {
                        continue;
                    };
                    for iv in r.iter() {
                        if own.contains(iv) {
                            continue;
                        }
                        for n in 0..self.ncomp {
                            updates.push((i, iv, n, self.fabs[j][(iv - *s, n)]));
                        }
                    }
                }
            }
        }
        for (i, iv, n, v) in updates {
            self.fabs[i][(iv, n)] = v;
        }
    }
}

impl<const D: usize> MultiFab<f64, D> {
    /// Sum of component `n` over valid cells.
    pub fn sum(&self, n: usize, policy: ExecPolicy) -> f64 {
        map_reduce_boxes(
            policy,
            self.fabs.len(),
            0.0,
            |i| self.valid_box(i).iter().map(|iv| self.fabs[i][(iv, n)]).sum::<f64>(),
            |a, b| a + b,
        )
    }

    /// Max-norm of component `n` over valid cells.
    pub fn norm0(&self, n: usize, policy: ExecPolicy) -> f64 {
        map_reduce_boxes(
            policy,
            self.fabs.len(),
            0.0,
            |i| {
                self.valid_box(i)
                    .iter()
                    .map(|iv| self.fabs[i][(iv, n)].abs())
                    .fold(0.0, f64::max)
            },
            f64::max,
        )
    }

    /// `self += a * other` over valid regions, all components.
    pub fn saxpy(&mut self, a: f64, other: &MultiFab<f64, D>, policy: ExecPolicy) {
        assert!(self.same_shape(other), "saxpy requires matching shapes");
        let ix = self.ix_type;
        let layout = &other.layout;
        for_each_fab(policy, &mut self.fabs, |i, fab| {
            let vbx = layout.boxes[i].convert(ix);
            for n in 0..fab.ncomp {
                for iv in vbx.iter() {
                    fab[(iv, n)] += a * other.fabs[i][(iv, n)];
                }
            }
        });
    }

    /// Multiply component `n` by `s` over valid regions.
    pub fn mult(&mut self, s: f64, n: usize, policy: ExecPolicy) {
        let ix = self.ix_type;
        let layout = self.layout.clone();
        for_each_fab(policy, &mut self.fabs, |i, fab| {
            for iv in layout.boxes[i].convert(ix).iter() {
                fab[(iv, n)] *= s;
            }
        });
    }
}
