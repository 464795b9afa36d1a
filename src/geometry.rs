// src/geometry.rs

use crate::index::{IndexBox, IntVect};
use serde::{Deserialize, Serialize};

/// Coordinate system of the physical domain.
///
/// `Rz` is the axisymmetric (r, z) formulation of a 2D build, `Spherical` the radial
/// formulation of a 1D build. Both carry a non-unit metric; Cartesian does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordSys {
    Cartesian,
    Rz,
    Spherical,
}

/// Physical geometry of one level: index-space domain, physical extent and cell size.
#[derive(Debug, Clone, Copy)]
pub struct Geometry<const D: usize> {
    pub domain: IndexBox<D>,
    pub prob_lo: [f64; D],
    pub prob_hi: [f64; D],
    pub periodic: [bool; D],
    pub coord: CoordSys,
}

impl<const D: usize> Geometry<D> {
    /// Cartesian, non-periodic geometry.
    pub fn new(domain: IndexBox<D>, prob_lo: [f64; D], prob_hi: [f64; D]) -> Self {
        Self {
            domain,
            prob_lo,
            prob_hi,
            periodic: [false; D],
            coord: CoordSys::Cartesian,
        }
    }

    pub fn with_periodic(mut self, periodic: [bool; D]) -> Self {
        self.periodic = periodic;
        self
    }

    pub fn with_coord(mut self, coord: CoordSys) -> Self {
        self.coord = coord;
        self
    }

    /// Cell size in direction `d`.
    #[inline]
    pub fn cell_size(&self, d: usize) -> f64 {
        (self.prob_hi[d] - self.prob_lo[d]) / (self.domain.len(d) as f64)
    }

    #[inline]
    pub fn cell_sizes(&self) -> [f64; D] {
        let mut h = [0.0; D];
        for (d, hd) in h.iter_mut().enumerate() {
            *hd = self.cell_size(d);
        }
        h
    }

    #[inline]
    pub fn inv_cell_size(&self, d: usize) -> f64 {
        1.0 / self.cell_size(d)
    }

    #[inline]
    pub fn inv_cell_sizes(&self) -> [f64; D] {
        let mut h = [0.0; D];
        for (d, hd) in h.iter_mut().enumerate() {
            *hd = self.inv_cell_size(d);
        }
        h
    }

    #[inline]
    pub fn is_periodic(&self, d: usize) -> bool {
        self.periodic[d]
    }

    #[inline]
    pub fn is_any_periodic(&self) -> bool {
        self.periodic.iter().any(|&p| p)
    }

    /// True when the metric is non-unit (only possible in reduced-dimension builds).
    #[inline]
    pub fn has_metric(&self) -> bool {
        D < 3 && self.coord != CoordSys::Cartesian
    }

    /// Radius (first coordinate) at the centre of cell index `i`.
    #[inline]
    pub fn cell_center_radius(&self, i: i64) -> f64 {
        self.prob_lo[0] + (i as f64 + 0.5) * self.cell_size(0)
    }

    /// Radius (first coordinate) on the lo face of cell index `i`.
    #[inline]
    pub fn face_radius(&self, i: i64) -> f64 {
        self.prob_lo[0] + (i as f64) * self.cell_size(0)
    }

    /// Geometry of the level coarsened by `ratio` (same physical extent).
    pub fn coarsen(&self, ratio: IntVect<D>) -> Self {
        Self {
            domain: self.domain.coarsen(ratio),
            ..*self
        }
    }

    /// Geometry of the level refined by `ratio`.
    pub fn refine(&self, ratio: IntVect<D>) -> Self {
        Self {
            domain: self.domain.refine(ratio),
            ..*self
        }
    }

    /// Periodic image shifts (in cells) of the domain that can touch a box grown by `ngrow`.
    ///
    /// Always contains the zero shift first.
    pub fn periodic_shifts(&self) -> Vec<IntVect<D>> {
        let mut shifts = vec![IntVect::zero()];
        for d in 0..D {
            if !self.periodic[d] {
                continue;
            }
            let len = self.domain.len(d);
            let current = shifts.clone();
            for s in current {
                for sign in [-1i64, 1] {
                    let mut t = s;
                    t[d] += sign * len;
                    shifts.push(t);
                }
            }
        }
        shifts
    }
}
