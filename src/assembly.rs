// src/assembly.rs
//
// Sparse-row export of the cell stencil for an external bottom solver.
//
// Rows are emitted box by box in the IJ layout such solvers take:
//   ncols[r]               number of entries in row r
//   rows[r]                global row id
//   cols / values          entries of all rows, concatenated (diagonal first)
// Unknowns are the owned, non-covered cells of a level; each gets a global id from
// `DofNumbering`. Physical-boundary ghosts are eliminated through the boundary stencil
// (u_ghost = f * u), covered neighbours act as zero-flux walls, overset cells get an
// identity row.

use crate::field::{Fab, MultiFab};
use crate::index::{IntVect, Orientation, Side};
use crate::layout::BoxLayout;
use crate::levels::MlHierarchy;
use crate::operator::AbecLaplacian;
use crate::parallel::for_each_cell;

/// Global DOF ids per cell (-1 = not an unknown of this process).
pub type DofIds<const D: usize> = MultiFab<i64, D>;

pub struct DofNumbering<const D: usize> {
    pub ids: DofIds<D>,
    /// First id of this process.
    pub offset: i64,
    /// Number of unknowns owned by this process.
    pub nrows_local: usize,
}

impl<const D: usize> DofNumbering<D> {
    /// Number the cells of level `(amrlev, mglev)` owned by `rank`, starting at `offset`,
    /// box by box in x-fastest order. Ghost ids are exchanged so every box sees its
    /// neighbours' ids.
    pub fn new(h: &MlHierarchy<D>, amrlev: usize, mglev: usize, rank: usize, offset: i64) -> Self {
        let layout: &BoxLayout<D> = &h.grids[amrlev][mglev];
        let factory = &h.factory[amrlev][mglev];
        let mut ids = DofIds::cell(layout.clone(), 1, 1);
        ids.set_val(-1);
        let mut next = offset;
        for (bi, fab) in ids.fabs.iter_mut().enumerate() {
            if !layout.is_local(bi, rank) {
                continue;
            }
            for_each_cell(&layout.boxes[bi], |iv| {
                if !factory.covered(bi, iv) {
                    fab[(iv, 0)] = next;
                    next += 1;
                }
            });
        }
        ids.fill_boundary(&h.geom[amrlev][mglev]);
        Self {
            ids,
            offset,
            nrows_local: (next - offset) as usize,
        }
    }

    /// Number of unknowns in box `bi`.
    pub fn nrows_box(&self, bi: usize) -> usize {
        let vbx = self.ids.valid_box(bi);
        vbx.iter().filter(|&iv| self.ids.fabs[bi][(iv, 0)] >= 0).count()
    }
}

/// Matrix rows of one box.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IjRows {
    pub ncols: Vec<usize>,
    pub rows: Vec<i64>,
    pub cols: Vec<i64>,
    pub values: Vec<f64>,
}

impl IjRows {
    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    fn push_row(&mut self, row: i64, entries: &[(i64, f64)]) {
        self.rows.push(row);
        self.ncols.push(entries.len());
        for &(c, v) in entries {
            self.cols.push(c);
            self.values.push(v);
        }
    }
}

/// Remove the null space of a singular bottom problem by pinning global row 0.
///
/// Only acts on the box whose first row is global row 0: every off-diagonal entry of
/// that row is zeroed and its right-hand side set to 0.
pub fn pin_singular_row(ij: &mut IjRows, rhs: &mut [f64], is_bottom_singular: bool, adjust_singular_matrix: bool) {
    if !(adjust_singular_matrix && is_bottom_singular) || ij.rows.first() != Some(&0) {
        return;
    }
    let n0 = ij.ncols[0];
    let row0 = ij.rows[0];
    for ic in 0..n0 {
        if ij.cols[ic] != row0 {
            ij.values[ic] = 0.0;
        }
    }
    if let Some(r) = rhs.first_mut() {
        *r = 0.0;
    }
}

impl<const D: usize> AbecLaplacian<D> {
    /// Stencil rows (component 0) of box `bi` on level `(amrlev, mglev)`. Cells whose
    /// `owner_mask` entry is 0 emit no row.
    pub fn fill_ij_matrix(
        &self,
        amrlev: usize,
        mglev: usize,
        bi: usize,
        dof: &DofNumbering<D>,
        owner_mask: Option<&Fab<i32, D>>,
    ) -> IjRows {
        let h = self.hierarchy();
        let vbx = h.grids[amrlev][mglev].boxes[bi];
        let factory = &h.factory[amrlev][mglev];
        let osm = h.overset_mask[amrlev][mglev].as_ref().map(|m| &m.fabs[bi]);
        let bb = &self.boundary_stencil().level(amrlev, mglev)[bi];
        let a = &self.a_coeffs(amrlev, mglev).fabs[bi];
        let b = self.b_coeffs(amrlev, mglev);
        let dxinv = self.geom(amrlev, mglev).inv_cell_sizes();
        let (a_s, b_s) = (self.a_scalar(), self.b_scalar());
        let ids = &dof.ids.fabs[bi];

        let mut ij = IjRows::default();
        let mut entries: Vec<(i64, f64)> = Vec::with_capacity(2 * D + 1);
        for_each_cell(&vbx, |iv| {
            let row = ids[(iv, 0)];
            if row < 0 || owner_mask.is_some_and(|m| m[(iv, 0)] == 0) {
                return;
            }
            if osm.is_some_and(|m| m[(iv, 0)] == 0) {
                ij.push_row(row, &[(row, 1.0)]);
                return;
            }
            entries.clear();
            let mut diag = a_s * a[(iv, 0)];
            for d in 0..D {
                let dh = b_s * dxinv[d] * dxinv[d];
                for side in [Side::Lo, Side::Hi] {
                    let (nb, bface) = match side {
                        Side::Lo => (iv - IntVect::unit(d), b[d].fabs[bi][(iv, 0)]),
                        Side::Hi => (iv + IntVect::unit(d), b[d].fabs[bi][(iv + IntVect::unit(d), 0)]),
                    };
                    let w = dh * bface;
                    if !vbx.contains(nb) {
                        let o = Orientation::new(d, side);
                        if bb.mask(o)[(nb, 0)] > 0 {
                            diag += w * (1.0 - bb.coef(o)[(nb, 0)]);
                            continue;
                        }
                    }
                    let col = ids[(nb, 0)];
                    if col < 0 || factory.covered(bi, nb) {
                        continue;
                    }
                    diag += w;
                    entries.push((col, -w));
                }
            }
            entries.insert(0, (row, diag));
            ij.push_row(row, &entries);
        });
        ij
    }

    /// Right-hand side entries of box `bi` in the row order of `fill_ij_matrix`.
    pub fn fill_ij_rhs(
        &self,
        amrlev: usize,
        mglev: usize,
        bi: usize,
        dof: &DofNumbering<D>,
        owner_mask: Option<&Fab<i32, D>>,
        rhs: &MultiFab<f64, D>,
    ) -> Vec<f64> {
        let vbx = self.hierarchy().grids[amrlev][mglev].boxes[bi];
        let ids = &dof.ids.fabs[bi];
        let mut out = Vec::new();
        for_each_cell(&vbx, |iv| {
            if ids[(iv, 0)] >= 0 && !owner_mask.is_some_and(|m| m[(iv, 0)] == 0) {
                out.push(rhs.fabs[bi][(iv, 0)]);
            }
        });
        out
    }
}

/// All rows of one level gathered in memory, for checking the export against `fapply`
/// and for small direct solves.
pub struct BottomSystem {
    pub n: usize,
    pub rows: Vec<IjRows>,
    pub rhs: Vec<f64>,
}

impl BottomSystem {
    /// Assemble level `(amrlev, mglev)` of `op` as rank 0 with ids starting at 0, pinning
    /// row 0 when the bottom problem is singular and `adjust_singular_matrix` is set.
    pub fn assemble<const D: usize>(
        op: &AbecLaplacian<D>,
        amrlev: usize,
        mglev: usize,
        rhs: &MultiFab<f64, D>,
        adjust_singular_matrix: bool,
    ) -> (Self, DofNumbering<D>) {
        let dof = DofNumbering::new(op.hierarchy(), amrlev, mglev, 0, 0);
        let nbox = op.hierarchy().grids[amrlev][mglev].len();
        let mut rows = Vec::with_capacity(nbox);
        let mut rhs_all = vec![0.0; dof.nrows_local];
        for bi in 0..nbox {
            let mut ij = op.fill_ij_matrix(amrlev, mglev, bi, &dof, None);
            let mut r = op.fill_ij_rhs(amrlev, mglev, bi, &dof, None, rhs);
            pin_singular_row(&mut ij, &mut r, op.is_bottom_singular(), adjust_singular_matrix);
            for (k, &row) in ij.rows.iter().enumerate() {
                rhs_all[row as usize] = r[k];
            }
            rows.push(ij);
        }
        log::debug!(
            "bottom system ({amrlev}, {mglev}): {} unknowns in {} box(es)",
            dof.nrows_local,
            nbox
        );
        (
            Self {
                n: dof.nrows_local,
                rows,
                rhs: rhs_all,
            },
            dof,
        )
    }

    pub fn matvec(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.n, "matvec: vector length");
        let mut y = vec![0.0; self.n];
        for ij in &self.rows {
            let mut k = 0;
            for (r, &nc) in ij.rows.iter().zip(&ij.ncols) {
                let mut s = 0.0;
                for _ in 0..nc {
                    s += ij.values[k] * x[ij.cols[k] as usize];
                    k += 1;
                }
                y[*r as usize] = s;
            }
        }
        y
    }

    /// Dense copy (row-major); only sensible for small levels.
    pub fn to_dense(&self) -> Vec<Vec<f64>> {
        let mut m = vec![vec![0.0; self.n]; self.n];
        for ij in &self.rows {
            let mut k = 0;
            for (r, &nc) in ij.rows.iter().zip(&ij.ncols) {
                for _ in 0..nc {
                    m[*r as usize][ij.cols[k] as usize] += ij.values[k];
                    k += 1;
                }
            }
        }
        m
    }
}

/// Gather component 0 of a level field into DOF order.
pub fn gather<const D: usize>(dof: &DofNumbering<D>, mf: &MultiFab<f64, D>) -> Vec<f64> {
    let mut v = vec![0.0; dof.nrows_local];
    for (bi, fab) in dof.ids.fabs.iter().enumerate() {
        for iv in dof.ids.valid_box(bi).iter() {
            let id = fab[(iv, 0)];
            if id >= 0 {
                v[(id - dof.offset) as usize] = mf.fabs[bi][(iv, 0)];
            }
        }
    }
    v
}

/// Scatter a DOF-ordered vector into component 0 of a level field.
pub fn scatter<const D: usize>(dof: &DofNumbering<D>, v: &[f64], mf: &mut MultiFab<f64, D>) {
    for (bi, fab) in dof.ids.fabs.iter().enumerate() {
        for iv in dof.ids.valid_box(bi).iter() {
            let id = fab[(iv, 0)];
            if id >= 0 {
                mf.fabs[bi][(iv, 0)] = v[(id - dof.offset) as usize];
            }
        }
    }
}
