// src/stencil.rs
//
// Per-box stencil kernels of alpha*a*u - beta*div(b grad u):
//   adotx      y = a_s a x - b_s sum_d dxinv_d^2 (b_hi (x_+ - x) - b_lo (x - x_-))
//   adotx_os   same, with overset cells (mask 0) written as 0
//   normalize  x /= a_s a + b_s sum_d dxinv_d^2 (b_lo + b_hi)
//   flux_*     F_d = b_s b_d (x_i - x_{i-1}) dxinv_d on faces of direction d
//
// Kernels only read ghost cells of `x`; filling them is the caller's job.

use crate::field::Fab;
use crate::index::{IndexBox, IntVect};
use crate::parallel::for_each_cell;

/// Coefficients of one box at one level pair.
pub struct StencilCoeffs<'a, const D: usize> {
    pub a: &'a Fab<f64, D>,
    pub b: [&'a Fab<f64, D>; D],
    pub a_scalar: f64,
    pub b_scalar: f64,
    pub dxinv: [f64; D],
}

impl<const D: usize> StencilCoeffs<'_, D> {
    /// Diagonal of the stencil at `iv` for component `n`.
    #[inline]
    pub fn diagonal(&self, iv: IntVect<D>, n: usize) -> f64 {
        let mut d = self.a_scalar * self.a[(iv, 0)];
        for dir in 0..D {
            let hi = iv + IntVect::unit(dir);
            d += self.b_scalar * self.dxinv[dir] * self.dxinv[dir] * (self.b[dir][(iv, n)] + self.b[dir][(hi, n)]);
        }
        d
    }

    /// Full stencil action at `iv`.
    #[inline]
    pub fn apply_at(&self, x: &Fab<f64, D>, iv: IntVect<D>, n: usize) -> f64 {
        let xc = x[(iv, n)];
        let mut lap = 0.0;
        for dir in 0..D {
            let e = IntVect::unit(dir);
            let blo = self.b[dir][(iv, n)];
            let bhi = self.b[dir][(iv + e, n)];
            lap += self.dxinv[dir] * self.dxinv[dir] * (bhi * (x[(iv + e, n)] - xc) - blo * (xc - x[(iv - e, n)]));
        }
        self.a_scalar * self.a[(iv, 0)] * xc - self.b_scalar * lap
    }
}

pub fn adotx<const D: usize>(bx: &IndexBox<D>, y: &mut Fab<f64, D>, x: &Fab<f64, D>, c: &StencilCoeffs<D>, ncomp: usize) {
    for n in 0..ncomp {
        for_each_cell(bx, |iv| y[(iv, n)] = c.apply_at(x, iv, n));
    }
}

pub fn adotx_os<const D: usize>(
    bx: &IndexBox<D>,
    y: &mut Fab<f64, D>,
    x: &Fab<f64, D>,
    c: &StencilCoeffs<D>,
    osm: &Fab<i32, D>,
    ncomp: usize,
) {
    for n in 0..ncomp {
        for_each_cell(bx, |iv| {
            y[(iv, n)] = if osm[(iv, 0)] == 0 { 0.0 } else { c.apply_at(x, iv, n) };
        });
    }
}

pub fn normalize<const D: usize>(
    bx: &IndexBox<D>,
    x: &mut Fab<f64, D>,
    c: &StencilCoeffs<D>,
    osm: Option<&Fab<i32, D>>,
    ncomp: usize,
) {
    for n in 0..ncomp {
        for_each_cell(bx, |iv| {
            if osm.is_some_and(|m| m[(iv, 0)] == 0) {
                return;
            }
            x[(iv, n)] /= c.diagonal(iv, n);
        });
    }
}

/// Fluxes on every face of direction `d` of the cell box `bx`.
pub fn flux_full<const D: usize>(
    bx: &IndexBox<D>,
    d: usize,
    flux: &mut Fab<f64, D>,
    sol: &Fab<f64, D>,
    b: &Fab<f64, D>,
    fac: f64,
    ncomp: usize,
) {
    let fbx = bx.surrounding_nodes(d);
    let e = IntVect::unit(d);
    for n in 0..ncomp {
        for_each_cell(&fbx, |iv| {
            flux[(iv, n)] = fac * b[(iv, n)] * (sol[(iv, n)] - sol[(iv - e, n)]);
        });
    }
}

/// Fluxes on the lo and hi boundary faces of `bx` in direction `d` only.
pub fn flux_face_only<const D: usize>(
    bx: &IndexBox<D>,
    d: usize,
    flux: &mut Fab<f64, D>,
    sol: &Fab<f64, D>,
    b: &Fab<f64, D>,
    fac: f64,
    ncomp: usize,
) {
    let e = IntVect::unit(d);
    for fbx in [bx.bdry_lo(d), bx.bdry_hi(d)] {
        for n in 0..ncomp {
            for_each_cell(&fbx, |iv| {
                flux[(iv, n)] = fac * b[(iv, n)] * (sol[(iv, n)] - sol[(iv - e, n)]);
            });
        }
    }
}
