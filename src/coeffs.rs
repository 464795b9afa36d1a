// src/coeffs.rs
//
// Coefficient storage for alpha*a*u - beta*div(b grad u).
//
// `a` is single-component and cell-centred; `b[d]` is face-centred in direction d with one
// component per solved component. Both exist for every (amrlev, mglev). Setters write a
// raw copy of the mglev = 0 coefficients and mark the store dirty; `prepare_for_solve` /
// `update` rebuild every slot from the raw copy, so metric and Robin transforms never
// stack up.

use crate::error::{AbecError, Result};
use crate::field::MultiFab;
use crate::index::IndexType;
use crate::levels::MlHierarchy;

pub struct CoefficientStore<const D: usize> {
    pub ncomp: usize,
    pub a_scalar: f64,
    pub b_scalar: f64,

    /// `a[amrlev][mglev]`
    pub a: Vec<Vec<MultiFab<f64, D>>>,

    /// `b[amrlev][mglev][dir]`
    pub b: Vec<Vec<[MultiFab<f64, D>; D]>>,

    /// Untransformed mglev = 0 coefficients as last written, per AMR level.
    pub a_raw: Vec<MultiFab<f64, D>>,
    pub b_raw: Vec<[MultiFab<f64, D>; D]>,

    needs_update: bool,
}

impl<const D: usize> CoefficientStore<D> {
    /// Zero `a`, unit `b`, `a_scalar = 0`, `b_scalar = 1`: the plain Laplacian.
    pub fn new(h: &MlHierarchy<D>, ncomp: usize) -> Self {
        assert!(ncomp >= 1, "operator needs at least one component");
        let mut a = Vec::with_capacity(h.num_amr_levels());
        let mut b = Vec::with_capacity(h.num_amr_levels());
        for amrlev in 0..h.num_amr_levels() {
            let mut a_lev = Vec::with_capacity(h.num_mg_levels(amrlev));
            let mut b_lev = Vec::with_capacity(h.num_mg_levels(amrlev));
            for mglev in 0..h.num_mg_levels(amrlev) {
                let layout = &h.grids[amrlev][mglev];
                a_lev.push(MultiFab::cell(layout.clone(), 1, 0));
                b_lev.push(std::array::from_fn(|d| {
                    let mut mf = MultiFab::face(layout.clone(), d, ncomp, 0);
                    mf.set_val(1.0);
                    mf
                }));
            }
            a.push(a_lev);
            b.push(b_lev);
        }
        let a_raw = a.iter().map(|lev| lev[0].clone()).collect();
        let b_raw = b.iter().map(|lev| lev[0].clone()).collect();
        Self {
            ncomp,
            a_scalar: 0.0,
            b_scalar: 1.0,
            a,
            b,
            a_raw,
            b_raw,
            needs_update: true,
        }
    }

    #[inline]
    pub fn num_amr_levels(&self) -> usize {
        self.a.len()
    }

    #[inline]
    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    pub(crate) fn mark_clean(&mut self) {
        self.needs_update = false;
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.needs_update = true;
    }

    /// Overwrite the mglev = 0 slot of every AMR level with the raw coefficients.
    pub(crate) fn reset_finest_from_raw(&mut self) {
        for (lev, raw) in self.a.iter_mut().zip(&self.a_raw) {
            lev[0].copy_from(raw, 0, 0, 1, 0);
        }
        let ncomp = self.ncomp;
        for (lev, raw) in self.b.iter_mut().zip(&self.b_raw) {
            for (dst, src) in lev[0].iter_mut().zip(raw) {
                dst.copy_from(src, 0, 0, ncomp, 0);
            }
        }
    }

    fn check_amrlev(&self, amrlev: usize) -> Result<()> {
        if amrlev < self.num_amr_levels() {
            Ok(())
        } else {
            Err(AbecError::LevelOutOfRange { amrlev, mglev: 0 })
        }
    }

    /// `a_scalar == 0` also zeroes the stored `a` of every AMR level.
    pub fn set_scalars(&mut self, a: f64, b: f64) {
        self.a_scalar = a;
        self.b_scalar = b;
        if a == 0.0 {
            for raw in &mut self.a_raw {
                raw.set_val(0.0);
            }
        }
        self.needs_update = true;
    }

    pub fn set_a_coeffs(&mut self, amrlev: usize, alpha: &MultiFab<f64, D>) -> Result<()> {
        self.check_amrlev(amrlev)?;
        if alpha.ncomp != 1 {
            return Err(AbecError::ShapeMismatch {
                what: "set_a_coeffs",
                expected: 1,
                got: alpha.ncomp,
            });
        }
        let dst = &mut self.a_raw[amrlev];
        if alpha.layout != dst.layout || alpha.ix_type != IndexType::Cell {
            return Err(AbecError::LayoutMismatch { what: "set_a_coeffs" });
        }
        dst.copy_from(alpha, 0, 0, 1, 0);
        self.needs_update = true;
        Ok(())
    }

    pub fn set_a_coeffs_scalar(&mut self, amrlev: usize, alpha: f64) -> Result<()> {
        self.check_amrlev(amrlev)?;
        self.a_raw[amrlev].set_val(alpha);
        self.needs_update = true;
        Ok(())
    }

    /// Per-direction face fields with either `ncomp` components or a single component
    /// broadcast to every solved component.
    pub fn set_b_coeffs(&mut self, amrlev: usize, beta: &[MultiFab<f64, D>; D]) -> Result<()> {
        self.check_amrlev(amrlev)?;
        let ncomp = self.ncomp;
        for (d, src) in beta.iter().enumerate() {
            if src.ncomp != 1 && src.ncomp != ncomp {
                return Err(AbecError::ShapeMismatch {
                    what: "set_b_coeffs",
                    expected: ncomp,
                    got: src.ncomp,
                });
            }
            let dst = &self.b_raw[amrlev][d];
            if src.layout != dst.layout || src.ix_type != IndexType::Face(d) {
                return Err(AbecError::LayoutMismatch { what: "set_b_coeffs" });
            }
        }
        for (d, src) in beta.iter().enumerate() {
            let dst = &mut self.b_raw[amrlev][d];
            for icomp in 0..ncomp {
                let scomp = if src.ncomp == ncomp { icomp } else { 0 };
                dst.copy_from(src, scomp, icomp, 1, 0);
            }
        }
        self.needs_update = true;
        Ok(())
    }

    pub fn set_b_coeffs_scalar(&mut self, amrlev: usize, beta: f64) -> Result<()> {
        self.check_amrlev(amrlev)?;
        for mf in &mut self.b_raw[amrlev] {
            mf.set_val(beta);
        }
        self.needs_update = true;
        Ok(())
    }

    /// One constant per component.
    pub fn set_b_coeffs_vec(&mut self, amrlev: usize, beta: &[f64]) -> Result<()> {
        self.check_amrlev(amrlev)?;
        if beta.len() != self.ncomp {
            return Err(AbecError::ShapeMismatch {
                what: "set_b_coeffs_vec",
                expected: self.ncomp,
                got: beta.len(),
            });
        }
        for mf in &mut self.b_raw[amrlev] {
            for (icomp, &v) in beta.iter().enumerate() {
                mf.set_val_comp(icomp, v);
            }
        }
        self.needs_update = true;
        Ok(())
    }
}
