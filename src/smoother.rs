// src/smoother.rs
//
// Red-black Gauss-Seidel for alpha*a*u - beta*div(b grad u) = rhs, one colour per call.
//
// A cell is updated when (sum of its indices + colour) is even. The update solves the
// cell's own equation exactly with every neighbour held at its current value, except
// neighbours that are boundary ghosts: those follow u_g = value + f * u (f from the
// boundary stencil), so the f part moves onto the diagonal:
//
//   gamma = a_s a + sum_d dh_d (b_lo + b_hi)             dh_d = b_s / h_d^2
//   delta = sum_d dh_d (b_lo f_lo + b_hi f_hi)          (boundary sides only)
//   rho   = sum_d dh_d (b_lo u_- + b_hi u_+)
//   u    += (rhs - (gamma u - rho)) / (gamma - delta)
//
// Ghost cells must be refreshed by the caller between the two colours.
//
// Line variant: on anisotropically coarsened levels whole lines along the most strongly
// coupled direction are solved at once (tridiagonal, Thomas algorithm); lines are
// coloured by the parity of their transverse indices.

use crate::bc::BoxBoundary;
use crate::field::Fab;
use crate::index::{IndexBox, IntVect, Orientation, Side};
use crate::parallel::for_each_cell;
use crate::stencil::StencilCoeffs;

/// Everything the smoother reads for one box.
pub struct SmoothBox<'a, const D: usize> {
    pub vbx: IndexBox<D>,
    pub coeffs: StencilCoeffs<'a, D>,
    pub bndry: &'a BoxBoundary<D>,
    pub ncomp: usize,
}

impl<const D: usize> SmoothBox<'_, D> {
    #[inline]
    fn dh(&self, d: usize) -> f64 {
        self.coeffs.b_scalar * self.coeffs.dxinv[d] * self.coeffs.dxinv[d]
    }

    /// `f` of the ghost neighbour of `iv` on side `side` of direction `d`, or 0 when that
    /// neighbour is not a boundary ghost.
    #[inline]
    fn ghost_factor(&self, iv: IntVect<D>, d: usize, side: Side, n: usize) -> f64 {
        match side {
            Side::Lo if iv[d] == self.vbx.lo[d] => {
                self.bndry
                    .ghost_factor(Orientation::new(d, Side::Lo), iv - IntVect::unit(d), n)
            }
            Side::Hi if iv[d] == self.vbx.hi[d] - 1 => {
                self.bndry
                    .ghost_factor(Orientation::new(d, Side::Hi), iv + IntVect::unit(d), n)
            }
            _ => 0.0,
        }
    }
}

#[inline]
fn colour_matches(sum: i64, redblack: usize) -> bool {
    (sum + redblack as i64).rem_euclid(2) == 0
}

/// Pointwise red-black update of colour `redblack` (0 or 1). Cells with overset mask 0
/// keep their value.
pub fn gsrb<const D: usize>(
    sb: &SmoothBox<D>,
    sol: &mut Fab<f64, D>,
    rhs: &Fab<f64, D>,
    osm: Option<&Fab<i32, D>>,
    redblack: usize,
) {
    let c = &sb.coeffs;
    for n in 0..sb.ncomp {
        for_each_cell(&sb.vbx, |iv| {
            if !colour_matches(iv.sum(), redblack) {
                return;
            }
            if osm.is_some_and(|m| m[(iv, 0)] == 0) {
                return;
            }
            let gamma = c.diagonal(iv, n);
            let mut delta = 0.0;
            let mut rho = 0.0;
            for d in 0..D {
                let e = IntVect::unit(d);
                let blo = c.b[d][(iv, n)];
                let bhi = c.b[d][(iv + e, n)];
                let dh = sb.dh(d);
                delta += dh
                    * (blo * sb.ghost_factor(iv, d, Side::Lo, n) + bhi * sb.ghost_factor(iv, d, Side::Hi, n));
                rho += dh * (blo * sol[(iv - e, n)] + bhi * sol[(iv + e, n)]);
            }
            let u = sol[(iv, n)];
            let res = rhs[(iv, n)] - (gamma * u - rho);
            sol[(iv, n)] = u + res / (gamma - delta);
        });
    }
}

/// Direction with the strongest coupling `1/h^2`; ties go to the lowest direction.
pub fn line_direction<const D: usize>(dxinv: &[f64; D]) -> usize {
    let mut best = 0;
    for d in 1..D {
        if dxinv[d] > dxinv[best] {
            best = d;
        }
    }
    best
}

/// Red-black line relaxation along `line_direction(dxinv)`.
pub fn gsrb_line<const D: usize>(sb: &SmoothBox<D>, sol: &mut Fab<f64, D>, rhs: &Fab<f64, D>, redblack: usize) {
    let c = &sb.coeffs;
    let ld = line_direction(&c.dxinv);
    let m = sb.vbx.len(ld) as usize;
    let mut starts = sb.vbx;
    starts.hi[ld] = starts.lo[ld] + 1;

    let mut sub = vec![0.0; m];
    let mut diag = vec![0.0; m];
    let mut sup = vec![0.0; m];
    let mut r = vec![0.0; m];

    for n in 0..sb.ncomp {
        for start in starts.iter() {
            if !colour_matches(start.sum() - start[ld], redblack) {
                continue;
            }
            for k in 0..m {
                let iv = start + IntVect::scaled_unit(ld, k as i64);
                let u_old = sol[(iv, n)];
                let mut dg = c.diagonal(iv, n);
                let mut rk = rhs[(iv, n)];
                sub[k] = 0.0;
                sup[k] = 0.0;
                for d in 0..D {
                    let e = IntVect::unit(d);
                    let dh = sb.dh(d);
                    let blo = c.b[d][(iv, n)];
                    let bhi = c.b[d][(iv + e, n)];
                    if d == ld && k > 0 {
                        sub[k] = -dh * blo;
                    } else {
                        let f = sb.ghost_factor(iv, d, Side::Lo, n);
                        rk += dh * blo * (sol[(iv - e, n)] - f * u_old);
                        dg -= dh * blo * f;
                    }
                    if d == ld && k + 1 < m {
                        sup[k] = -dh * bhi;
                    } else {
                        let f = sb.ghost_factor(iv, d, Side::Hi, n);
                        rk += dh * bhi * (sol[(iv + e, n)] - f * u_old);
                        dg -= dh * bhi * f;
                    }
                }
                diag[k] = dg;
                r[k] = rk;
            }
            tridiagonal_solve(&sub, &mut diag, &sup, &mut r);
            for (k, &v) in r.iter().enumerate() {
                sol[(start + IntVect::scaled_unit(ld, k as i64), n)] = v;
            }
        }
    }
}

/// Thomas algorithm; overwrites `diag` and leaves the solution in `r`.
fn tridiagonal_solve(sub: &[f64], diag: &mut [f64], sup: &[f64], r: &mut [f64]) {
    let m = r.len();
    for k in 1..m {
        let w = sub[k] / diag[k - 1];
        diag[k] -= w * sup[k - 1];
        r[k] -= w * r[k - 1];
    }
    r[m - 1] /= diag[m - 1];
    for k in (0..m - 1).rev() {
        r[k] = (r[k] - sup[k] * r[k + 1]) / diag[k];
    }
}
