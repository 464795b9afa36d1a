// src/index.rs
//
// Integer index space shared by every level of the hierarchy.
//
// Boxes are half-open in every direction: [lo, hi). A cell-centred box of n cells
// in direction d has hi[d] - lo[d] == n; the face-centred box in direction d
// ("surrounding nodes") has one more index in that direction.

use std::ops::{Add, Index, IndexMut, Sub};

/// Integer index vector in `D` dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntVect<const D: usize>(pub [i64; D]);

impl<const D: usize> IntVect<D> {
    #[inline]
    pub fn new(v: [i64; D]) -> Self {
        Self(v)
    }

    #[inline]
    pub fn splat(v: i64) -> Self {
        Self([v; D])
    }

    #[inline]
    pub fn zero() -> Self {
        Self([0; D])
    }

    /// Unit vector along direction `d`.
    #[inline]
    pub fn unit(d: usize) -> Self {
        let mut v = [0; D];
        v[d] = 1;
        Self(v)
    }

    /// Unit vector scaled by `s` along direction `d`.
    #[inline]
    pub fn scaled_unit(d: usize, s: i64) -> Self {
        let mut v = [0; D];
        v[d] = s;
        Self(v)
    }

    /// Floor division by a per-direction ratio (correct for negative indices).
    #[inline]
    pub fn coarsen(self, ratio: IntVect<D>) -> Self {
        let mut v = self.0;
        for d in 0..D {
            v[d] = v[d].div_euclid(ratio.0[d]);
        }
        Self(v)
    }

    #[inline]
    pub fn refine(self, ratio: IntVect<D>) -> Self {
        let mut v = self.0;
        for d in 0..D {
            v[d] *= ratio.0[d];
        }
        Self(v)
    }

    #[inline]
    pub fn sum(self) -> i64 {
        self.0.iter().sum()
    }

    #[inline]
    pub fn product(self) -> i64 {
        self.0.iter().product()
    }

    #[inline]
    pub fn all_eq(self, v: i64) -> bool {
        self.0.iter().all(|&x| x == v)
    }
}

impl<const D: usize> Index<usize> for IntVect<D> {
    type Output = i64;
    #[inline]
    fn index(&self, d: usize) -> &i64 {
        &self.0[d]
    }
}

impl<const D: usize> IndexMut<usize> for IntVect<D> {
    #[inline]
    fn index_mut(&mut self, d: usize) -> &mut i64 {
        &mut self.0[d]
    }
}

impl<const D: usize> Add for IntVect<D> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        let mut v = self.0;
        for d in 0..D {
            v[d] += rhs.0[d];
        }
        Self(v)
    }
}

impl<const D: usize> Sub for IntVect<D> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        let mut v = self.0;
        for d in 0..D {
            v[d] -= rhs.0[d];
        }
        Self(v)
    }
}

/// Which side of a box a boundary lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Lo,
    Hi,
}

/// A (direction, side) pair naming one of the 2·D faces of a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Orientation {
    pub dir: usize,
    pub side: Side,
}

impl Orientation {
    #[inline]
    pub fn new(dir: usize, side: Side) -> Self {
        Self { dir, side }
    }

    /// Flat index in [0, 2·D): lo faces first, matching `all::<D>()` order per direction.
    #[inline]
    pub fn flat(self) -> usize {
        2 * self.dir + if self.side == Side::Lo { 0 } else { 1 }
    }

    /// All orientations, ordered (0,lo), (0,hi), (1,lo), (1,hi), ...
    pub fn all<const D: usize>() -> impl Iterator<Item = Orientation> {
        (0..D).flat_map(|d| [Orientation::new(d, Side::Lo), Orientation::new(d, Side::Hi)])
    }
}

/// Centring of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    Cell,
    /// Face-centred in the given direction.
    Face(usize),
}

/// Half-open integer box [lo, hi).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBox<const D: usize> {
    pub lo: IntVect<D>,
    pub hi: IntVect<D>,
}

impl<const D: usize> IndexBox<D> {
    #[inline]
    pub fn new(lo: IntVect<D>, hi: IntVect<D>) -> Self {
        Self { lo, hi }
    }

    /// Box with lower corner `lo` and `size[d]` cells per direction.
    pub fn from_size(lo: [i64; D], size: [i64; D]) -> Self {
        let mut hi = lo;
        for d in 0..D {
            hi[d] += size[d];
        }
        Self::new(IntVect(lo), IntVect(hi))
    }

    #[inline]
    pub fn len(&self, d: usize) -> i64 {
        (self.hi[d] - self.lo[d]).max(0)
    }

    #[inline]
    pub fn size(&self) -> IntVect<D> {
        let mut v = [0; D];
        for (d, s) in v.iter_mut().enumerate() {
            *s = self.len(d);
        }
        IntVect(v)
    }

    #[inline]
    pub fn num_pts(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.size().product() as usize
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        (0..D).any(|d| self.hi[d] <= self.lo[d])
    }

    #[inline]
    pub fn contains(&self, iv: IntVect<D>) -> bool {
        (0..D).all(|d| iv[d] >= self.lo[d] && iv[d] < self.hi[d])
    }

    /// True if `other` lies entirely inside `self`.
    pub fn contains_box(&self, other: &IndexBox<D>) -> bool {
        other.is_empty() || (0..D).all(|d| other.lo[d] >= self.lo[d] && other.hi[d] <= self.hi[d])
    }

    /// Intersection of two boxes.
    pub fn intersect(&self, other: &IndexBox<D>) -> Option<IndexBox<D>> {
        let mut lo = self.lo;
        let mut hi = self.hi;
        for d in 0..D {
            lo[d] = lo[d].max(other.lo[d]);
            hi[d] = hi[d].min(other.hi[d]);
            if hi[d] <= lo[d] {
                return None;
            }
        }
        Some(IndexBox::new(lo, hi))
    }

    /// Grow by `n` cells on every side (negative shrinks).
    pub fn grow(&self, n: i64) -> Self {
        Self::new(self.lo - IntVect::splat(n), self.hi + IntVect::splat(n))
    }

    /// Grow by `n` cells on both sides of direction `d` only.
    pub fn grow_dir(&self, d: usize, n: i64) -> Self {
        let mut b = *self;
        b.lo[d] -= n;
        b.hi[d] += n;
        b
    }

    pub fn shift(&self, s: IntVect<D>) -> Self {
        Self::new(self.lo + s, self.hi + s)
    }

    /// Coarsen a cell-centred box: the smallest coarse box covering every fine cell.
    pub fn coarsen(&self, ratio: IntVect<D>) -> Self {
        let mut hi = self.hi;
        for d in 0..D {
            hi[d] = (self.hi[d] - 1).div_euclid(ratio[d]) + 1;
        }
        Self::new(self.lo.coarsen(ratio), hi)
    }

    pub fn refine(&self, ratio: IntVect<D>) -> Self {
        Self::new(self.lo.refine(ratio), self.hi.refine(ratio))
    }

    /// True if coarsening by `ratio` is exact and leaves at least `min_width` cells per direction.
    pub fn coarsenable(&self, ratio: IntVect<D>, min_width: i64) -> bool {
        (0..D).all(|d| {
            let r = ratio[d];
            self.lo[d].rem_euclid(r) == 0
                && self.hi[d].rem_euclid(r) == 0
                && self.len(d) / r >= min_width
        })
    }

    /// Face-centred box in direction `d` for this cell-centred box.
    pub fn surrounding_nodes(&self, d: usize) -> Self {
        let mut b = *self;
        b.hi[d] += 1;
        b
    }

    /// Convert a cell-centred box to the requested centring.
    pub fn convert(&self, ix: IndexType) -> Self {
        match ix {
            IndexType::Cell => *self,
            IndexType::Face(d) => self.surrounding_nodes(d),
        }
    }

    /// The one-cell-thick slab of cells just below the box in direction `d`.
    pub fn adj_cell_lo(&self, d: usize) -> Self {
        let mut b = *self;
        b.hi[d] = self.lo[d];
        b.lo[d] = self.lo[d] - 1;
        b
    }

    /// The one-cell-thick slab of cells just above the box in direction `d`.
    pub fn adj_cell_hi(&self, d: usize) -> Self {
        let mut b = *self;
        b.lo[d] = self.hi[d];
        b.hi[d] = self.hi[d] + 1;
        b
    }

    pub fn adj_cell(&self, o: Orientation) -> Self {
        match o.side {
            Side::Lo => self.adj_cell_lo(o.dir),
            Side::Hi => self.adj_cell_hi(o.dir),
        }
    }

    /// Face slab (in face index space of direction `d`) on the lo boundary.
    pub fn bdry_lo(&self, d: usize) -> Self {
        let mut b = *self;
        b.hi[d] = self.lo[d] + 1;
        b
    }

    /// Face slab (in face index space of direction `d`) on the hi boundary.
    pub fn bdry_hi(&self, d: usize) -> Self {
        let mut b = *self;
        b.lo[d] = self.hi[d];
        b.hi[d] = self.hi[d] + 1;
        b
    }

    /// Iterate every index in x-fastest order.
    pub fn iter(&self) -> BoxIter<D> {
        BoxIter {
            bx: *self,
            cur: self.lo,
            done: self.is_empty(),
        }
    }
}

/// Iterator over the indices of an `IndexBox`, x fastest.
pub struct BoxIter<const D: usize> {
    bx: IndexBox<D>,
    cur: IntVect<D>,
    done: bool,
}

impl<const D: usize> Iterator for BoxIter<D> {
    type Item = IntVect<D>;

    fn next(&mut self) -> Option<IntVect<D>> {
        if self.done {
            return None;
        }
        let out = self.cur;
        let mut d = 0;
        loop {
            if d == D {
                self.done = true;
                break;
            }
            self.cur[d] += 1;
            if self.cur[d] < self.bx.hi[d] {
                break;
            }
            self.cur[d] = self.bx.lo[d];
            d += 1;
        }
        Some(out)
    }
}
