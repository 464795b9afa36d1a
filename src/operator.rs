// src/operator.rs
//
// Multilevel cell-centred operator alpha*a*u - beta*div(b grad u).
//
// Lifecycle:
//   set_* coefficients, Robin data   -> dirty
//   set_physical_geometry             -> dirty, boundary stencil stale
//   prepare_for_solve()   raw -> metric -> Robin -> average down -> singularity -> clean
//   update(geom_changed)  raw -> metric -> last Robin increment -> average down
//                         -> singularity -> clean
//   fapply / fsmooth / normalize / fflux while clean
//
// Ghost cells of every input field are the caller's responsibility (`fill_ghosts` does
// the in-process exchange plus physical boundaries). Between the two colours of a
// smoothing sweep the caller must refresh them again.

use crate::bc::{BcTable, BoundaryStencil};
use crate::coeffs::CoefficientStore;
use crate::config::MlConfig;
use crate::error::{AbecError, BcError, Result};
use crate::field::{Fab, MultiFab};
use crate::geometry::{CoordSys, Geometry};
use crate::index::{IndexBox, IndexType, IntVect, Orientation};
use crate::levels::MlHierarchy;
use crate::metric::apply_metric_term;
use crate::parallel::{ExecPolicy, for_each_fab};
use crate::restrict::{average_down_cells, average_down_faces, overset_rescale_b, overset_rescale_factor};
use crate::robin::{apply_robin_a, apply_robin_rhs};
use crate::singular::detect_singular_levels;
use crate::smoother::{SmoothBox, gsrb, gsrb_line};
use crate::stencil::{self, StencilCoeffs};
use std::time::Instant;

pub struct AbecLaplacian<const D: usize> {
    hier: MlHierarchy<D>,
    coeffs: CoefficientStore<D>,
    bndry: BoundaryStencil<D>,
    robin: Vec<Option<MultiFab<f64, D>>>,

    /// Robin increment folded into level-0 `a` by the last `prepare_for_solve`.
    robin_da: Vec<Option<MultiFab<f64, D>>>,

    stencil_stale: bool,
    is_singular: Vec<bool>,
    cfg: MlConfig,
}

impl<const D: usize> AbecLaplacian<D> {
    pub fn new(hier: MlHierarchy<D>, bc: BcTable<D>, ncomp: usize, cfg: MlConfig) -> Result<Self> {
        cfg.validate()?;
        let bndry = BoundaryStencil::build(&hier, &bc, ncomp)?;
        let coeffs = CoefficientStore::new(&hier, ncomp);
        let namr = hier.num_amr_levels();
        if cfg.verbose >= 1 {
            log::info!(
                "AbecLaplacian: {} AMR level(s), {} component(s), mg levels {:?}",
                namr,
                ncomp,
                (0..namr).map(|l| hier.num_mg_levels(l)).collect::<Vec<_>>()
            );
        }
        Ok(Self {
            hier,
            coeffs,
            bndry,
            robin: vec![None; namr],
            robin_da: vec![None; namr],
            stencil_stale: false,
            is_singular: vec![false; namr],
            cfg,
        })
    }

    #[inline]
    pub fn ncomp(&self) -> usize {
        self.coeffs.ncomp
    }

    #[inline]
    pub fn hierarchy(&self) -> &MlHierarchy<D> {
        &self.hier
    }

    #[inline]
    pub fn num_amr_levels(&self) -> usize {
        self.hier.num_amr_levels()
    }

    #[inline]
    pub fn num_mg_levels(&self, amrlev: usize) -> usize {
        self.hier.num_mg_levels(amrlev)
    }

    #[inline]
    pub fn geom(&self, amrlev: usize, mglev: usize) -> &Geometry<D> {
        &self.hier.geom[amrlev][mglev]
    }

    #[inline]
    pub fn bc(&self) -> &BcTable<D> {
        &self.bndry.bc
    }

    #[inline]
    pub fn boundary_stencil(&self) -> &BoundaryStencil<D> {
        &self.bndry
    }

    #[inline]
    pub fn config(&self) -> &MlConfig {
        &self.cfg
    }

    #[inline]
    fn policy(&self) -> ExecPolicy {
        self.cfg.exec
    }

    #[inline]
    pub fn a_scalar(&self) -> f64 {
        self.coeffs.a_scalar
    }

    #[inline]
    pub fn b_scalar(&self) -> f64 {
        self.coeffs.b_scalar
    }

    #[inline]
    pub fn needs_update(&self) -> bool {
        self.coeffs.needs_update()
    }

    pub fn a_coeffs(&self, amrlev: usize, mglev: usize) -> &MultiFab<f64, D> {
        &self.coeffs.a[amrlev][mglev]
    }

    pub fn b_coeffs(&self, amrlev: usize, mglev: usize) -> &[MultiFab<f64, D>; D] {
        &self.coeffs.b[amrlev][mglev]
    }

    // ---- setters ----------------------------------------------------------------------

    pub fn set_scalars(&mut self, a: f64, b: f64) {
        self.coeffs.set_scalars(a, b);
    }

    pub fn set_a_coeffs(&mut self, amrlev: usize, alpha: &MultiFab<f64, D>) -> Result<()> {
        self.coeffs.set_a_coeffs(amrlev, alpha)
    }

    pub fn set_a_coeffs_scalar(&mut self, amrlev: usize, alpha: f64) -> Result<()> {
        self.coeffs.set_a_coeffs_scalar(amrlev, alpha)
    }

    pub fn set_b_coeffs(&mut self, amrlev: usize, beta: &[MultiFab<f64, D>; D]) -> Result<()> {
        self.coeffs.set_b_coeffs(amrlev, beta)
    }

    pub fn set_b_coeffs_scalar(&mut self, amrlev: usize, beta: f64) -> Result<()> {
        self.coeffs.set_b_coeffs_scalar(amrlev, beta)
    }

    pub fn set_b_coeffs_vec(&mut self, amrlev: usize, beta: &[f64]) -> Result<()> {
        self.coeffs.set_b_coeffs_vec(amrlev, beta)
    }

    /// Robin data `(a_r, b_r, f_r)` per component on the cells just outside the domain
    /// (3·ncomp components, at least one ghost cell).
    pub fn set_robin_bc_values(&mut self, amrlev: usize, values: MultiFab<f64, D>) -> Result<()> {
        self.hier.check_level(amrlev, 0)?;
        if values.ncomp != 3 * self.ncomp() {
            return Err(AbecError::ShapeMismatch {
                what: "set_robin_bc_values",
                expected: 3 * self.ncomp(),
                got: values.ncomp,
            });
        }
        if values.layout != self.hier.grids[amrlev][0] || values.ix_type != IndexType::Cell || values.ngrow < 1 {
            return Err(AbecError::LayoutMismatch {
                what: "set_robin_bc_values",
            });
        }
        self.robin[amrlev] = Some(values);
        self.coeffs.mark_dirty();
        Ok(())
    }

    /// Move the whole hierarchy to a new physical extent / coordinate system. The next
    /// `prepare_for_solve` or `update` rebuilds the boundary stencil and re-derives the
    /// coefficients on the new cell sizes.
    pub fn set_physical_geometry(&mut self, prob_lo: [f64; D], prob_hi: [f64; D], coord: CoordSys) -> Result<()> {
        self.hier.reset_physical_geometry(prob_lo, prob_hi, coord)?;
        self.stencil_stale = true;
        self.coeffs.mark_dirty();
        Ok(())
    }

    // ---- lifecycle --------------------------------------------------------------------

    pub fn prepare_for_solve(&mut self) -> Result<()> {
        let t0 = Instant::now();
        self.check_robin_ready()?;
        if self.stencil_stale {
            self.rebuild_boundary_stencil()?;
        }
        self.coeffs.reset_finest_from_raw();
        self.apply_metric_terms();
        self.apply_robin_terms();
        self.average_down_coeffs();
        self.detect_singularity();
        self.coeffs.mark_clean();
        log::debug!("prepare_for_solve: {:.3} ms", t0.elapsed().as_secs_f64() * 1e3);
        Ok(())
    }

    /// Re-derive coefficients after a change between solves. The Robin elimination is not
    /// recomputed: the increment from the last `prepare_for_solve` is added back as is, so
    /// new scalars, `b` or Robin data only reach it through `prepare_for_solve`. With
    /// `geometry_changed` the boundary stencil is rebuilt and the derivation runs even
    /// when no coefficient was touched.
    pub fn update(&mut self, geometry_changed: bool) -> Result<()> {
        if !self.needs_update() && !geometry_changed && !self.stencil_stale {
            return Ok(());
        }
        let t0 = Instant::now();
        if geometry_changed || self.stencil_stale {
            self.rebuild_boundary_stencil()?;
        }
        self.coeffs.reset_finest_from_raw();
        self.apply_metric_terms();
        let policy = self.policy();
        for (a, da) in self.coeffs.a.iter_mut().zip(&self.robin_da) {
            if let Some(da) = da {
                a[0].saxpy(1.0, da, policy);
            }
        }
        self.average_down_coeffs();
        self.detect_singularity();
        self.coeffs.mark_clean();
        log::debug!("update: {:.3} ms", t0.elapsed().as_secs_f64() * 1e3);
        Ok(())
    }

    fn rebuild_boundary_stencil(&mut self) -> Result<()> {
        self.bndry = BoundaryStencil::build(&self.hier, &self.bndry.bc, self.ncomp())?;
        self.stencil_stale = false;
        if self.cfg.verbose >= 1 {
            log::info!("boundary stencil rebuilt");
        }
        Ok(())
    }

    fn apply_metric_terms(&mut self) {
        if D == 3 {
            return;
        }
        let policy = self.policy();
        for alev in 0..self.num_amr_levels() {
            let geom = self.hier.geom[alev][0];
            if !geom.has_metric() {
                continue;
            }
            apply_metric_term(&geom, &mut self.coeffs.a[alev][0], policy);
            for bd in self.coeffs.b[alev][0].iter_mut() {
                apply_metric_term(&geom, bd, policy);
            }
        }
    }

    /// Robin sides need one component and data on every AMR level. Checked before any
    /// coefficient is touched.
    fn check_robin_ready(&self) -> Result<()> {
        if !self.bndry.bc.has_robin() {
            return Ok(());
        }
        if self.ncomp() != 1 {
            return Err(BcError::RobinMultiComponent { ncomp: self.ncomp() }.into());
        }
        if let Some(amrlev) = self.robin.iter().position(Option::is_none) {
            return Err(BcError::MissingRobinValues { amrlev }.into());
        }
        Ok(())
    }

    fn apply_robin_terms(&mut self) {
        if !self.bndry.bc.has_robin() {
            self.robin_da.iter_mut().for_each(|da| *da = None);
            return;
        }
        if self.coeffs.a_scalar == 0.0 {
            log::warn!("Robin boundary with a_scalar == 0: using a_scalar = 1");
            self.coeffs.a_scalar = 1.0;
        }
        let b_over_a = self.coeffs.b_scalar / self.coeffs.a_scalar;
        let policy = self.policy();
        for alev in 0..self.num_amr_levels() {
            let Some(robin) = self.robin[alev].as_ref() else {
                continue;
            };
            let geom = self.hier.geom[alev][0];
            let mut da = MultiFab::cell(self.hier.grids[alev][0].clone(), 1, 0);
            apply_robin_a(&geom, &self.bndry.bc, robin, &self.coeffs.b[alev][0], b_over_a, &mut da, policy);
            self.coeffs.a[alev][0].saxpy(1.0, &da, policy);
            self.robin_da[alev] = Some(da);
        }
    }

    /// Add the inhomogeneous Robin contribution to a level-0 right-hand side.
    pub fn apply_robin_rhs(&self, amrlev: usize, rhs: &mut MultiFab<f64, D>) -> Result<()> {
        if !self.bndry.bc.has_robin() {
            return Ok(());
        }
        let robin = self.robin[amrlev]
            .as_ref()
            .ok_or(BcError::MissingRobinValues { amrlev })?;
        apply_robin_rhs(
            &self.hier.geom[amrlev][0],
            &self.bndry.bc,
            robin,
            &self.coeffs.b[amrlev][0],
            self.coeffs.b_scalar,
            rhs,
            self.policy(),
        );
        Ok(())
    }

    /// Restrict `a` and `b` from every level-0 slot down the hierarchy.
    pub fn average_down_coeffs(&mut self) {
        for amrlev in (1..self.num_amr_levels()).rev() {
            self.average_down_same_amr_level(amrlev);
            self.average_down_to_coarse_amr_level(amrlev);
        }
        self.average_down_same_amr_level(0);
    }

    fn average_down_same_amr_level(&mut self, amrlev: usize) {
        let policy = self.policy();
        let a_scalar = self.coeffs.a_scalar;
        for mglev in 1..self.num_mg_levels(amrlev) {
            let ratio = self.hier.coarsen_ratio(amrlev, mglev);
            let (fine_a, crse_a) = self.coeffs.a[amrlev].split_at_mut(mglev);
            if a_scalar == 0.0 {
                crse_a[0].set_val(0.0);
            } else {
                average_down_cells(&fine_a[mglev - 1], &mut crse_a[0], 0, 1, ratio, policy);
            }
            let (fine_b, crse_b) = self.coeffs.b[amrlev].split_at_mut(mglev);
            average_down_faces(&fine_b[mglev - 1], &mut crse_b[0], ratio, policy);
        }
        for mglev in 1..self.num_mg_levels(amrlev) {
            if let Some(osm) = &self.hier.overset_mask[amrlev][mglev] {
                let osfac = overset_rescale_factor(mglev);
                overset_rescale_b(&mut self.coeffs.b[amrlev][mglev], osm, osfac, policy);
            }
        }
    }

    fn average_down_to_coarse_amr_level(&mut self, flev: usize) {
        let policy = self.policy();
        let ratio = IntVect::splat(self.hier.mg_coarsen_ratio);
        let (crse, fine) = self.coeffs.a.split_at_mut(flev);
        if self.coeffs.a_scalar != 0.0 {
            if let (Some(f), Some(c)) = (fine[0].last(), crse[flev - 1].first_mut()) {
                average_down_cells(f, c, 0, 1, ratio, policy);
            }
        }
        let (crse, fine) = self.coeffs.b.split_at_mut(flev);
        if let (Some(f), Some(c)) = (fine[0].last(), crse[flev - 1].first_mut()) {
            average_down_faces(f, c, ratio, policy);
        }
    }

    fn detect_singularity(&mut self) {
        self.is_singular = detect_singular_levels(
            &self.hier,
            &self.bndry.bc,
            self.coeffs.a_scalar,
            &self.coeffs.a,
            self.policy(),
        );
        for (alev, &s) in self.is_singular.iter().enumerate() {
            if s {
                log::info!("AMR level {alev} is singular (pure Neumann, no reaction term)");
            }
        }
    }

    pub fn is_singular(&self, amrlev: usize) -> bool {
        self.is_singular[amrlev]
    }

    /// The bottom level (coarsest AMR level) carries a null space.
    pub fn is_bottom_singular(&self) -> bool {
        self.is_singular[0]
    }

    // ---- kernels ----------------------------------------------------------------------

    fn stencil_coeffs(&self, amrlev: usize, mglev: usize, i: usize) -> StencilCoeffs<'_, D> {
        let b = &self.coeffs.b[amrlev][mglev];
        StencilCoeffs {
            a: &self.coeffs.a[amrlev][mglev].fabs[i],
            b: std::array::from_fn(|d| &b[d].fabs[i]),
            a_scalar: self.coeffs.a_scalar,
            b_scalar: self.coeffs.b_scalar,
            dxinv: self.hier.geom[amrlev][mglev].inv_cell_sizes(),
        }
    }

    fn check_field(&self, what: &str, amrlev: usize, mglev: usize, mf: &MultiFab<f64, D>, ngrow: i64) {
        assert!(
            !self.needs_update(),
            "{what}: coefficients changed, call prepare_for_solve/update first"
        );
        assert!(
            mf.ncomp >= self.ncomp(),
            "{what}: field has {} component(s), operator solves {}",
            mf.ncomp,
            self.ncomp()
        );
        assert!(
            mf.layout == self.hier.grids[amrlev][mglev] && mf.ix_type == IndexType::Cell,
            "{what}: field does not live on level ({amrlev}, {mglev})"
        );
        assert!(mf.ngrow >= ngrow, "{what}: needs {ngrow} ghost cell(s)");
    }

    /// `out = (alpha a - beta div b grad) input` on every valid cell. `input` ghosts must
    /// be filled. Overset cells get 0.
    pub fn fapply(&self, amrlev: usize, mglev: usize, out: &mut MultiFab<f64, D>, input: &MultiFab<f64, D>) {
        self.check_field("fapply", amrlev, mglev, input, 1);
        self.check_field("fapply", amrlev, mglev, out, 0);
        let ncomp = self.ncomp();
        let osm = self.hier.overset_mask[amrlev][mglev].as_ref();
        let layout = &self.hier.grids[amrlev][mglev];
        for_each_fab(self.policy(), &mut out.fabs, |i, yfab| {
            let c = self.stencil_coeffs(amrlev, mglev, i);
            let bx = layout.boxes[i];
            match osm {
                Some(m) => stencil::adotx_os(&bx, yfab, &input.fabs[i], &c, &m.fabs[i], ncomp),
                None => stencil::adotx(&bx, yfab, &input.fabs[i], &c, ncomp),
            }
        });
    }

    /// Divide by the stencil diagonal (overset cells untouched).
    pub fn normalize(&self, amrlev: usize, mglev: usize, mf: &mut MultiFab<f64, D>) {
        self.check_field("normalize", amrlev, mglev, mf, 0);
        let ncomp = self.ncomp();
        let osm = self.hier.overset_mask[amrlev][mglev].as_ref();
        let layout = &self.hier.grids[amrlev][mglev];
        for_each_fab(self.policy(), &mut mf.fabs, |i, fab| {
            let c = self.stencil_coeffs(amrlev, mglev, i);
            stencil::normalize(&layout.boxes[i], fab, &c, osm.map(|m| &m.fabs[i]), ncomp);
        });
    }

    /// One colour (`redblack` 0 or 1) of Gauss-Seidel relaxation.
    pub fn fsmooth(&self, amrlev: usize, mglev: usize, sol: &mut MultiFab<f64, D>, rhs: &MultiFab<f64, D>, redblack: usize) {
        assert!(redblack < 2, "fsmooth: colour must be 0 or 1");
        self.check_field("fsmooth", amrlev, mglev, sol, 1);
        self.check_field("fsmooth", amrlev, mglev, rhs, 0);
        let ncomp = self.ncomp();
        let osm = self.hier.overset_mask[amrlev][mglev].as_ref();
        let regular = self.hier.is_regular_coarsening(amrlev, mglev);
        let layout = &self.hier.grids[amrlev][mglev];
        let bndry = self.bndry.level(amrlev, mglev);
        for_each_fab(self.policy(), &mut sol.fabs, |i, sfab| {
            let sb = SmoothBox {
                vbx: layout.boxes[i],
                coeffs: self.stencil_coeffs(amrlev, mglev, i),
                bndry: &bndry[i],
                ncomp,
            };
            match osm {
                Some(m) => gsrb(&sb, sfab, &rhs.fabs[i], Some(&m.fabs[i]), redblack),
                None if regular => gsrb(&sb, sfab, &rhs.fabs[i], None, redblack),
                None => gsrb_line(&sb, sfab, &rhs.fabs[i], redblack),
            }
        });
    }

    /// Face fluxes `b_scalar * b * du/dx_d` of box `box_index` on the finest multigrid
    /// slot of `amrlev`. `flux[d]` must cover the box's faces in direction d; `sol` needs
    /// one ghost cell.
    pub fn fflux(&self, amrlev: usize, box_index: usize, flux: &mut [Fab<f64, D>; D], sol: &Fab<f64, D>, face_only: bool) -> Result<()> {
        let layout = &self.hier.grids[amrlev][0];
        if box_index >= layout.len() {
            return Err(AbecError::BoxOutOfRange {
                index: box_index,
                len: layout.len(),
            });
        }
        let b = &self.coeffs.b[amrlev][0];
        let bcoef: [&Fab<f64, D>; D] = std::array::from_fn(|d| &b[d].fabs[box_index]);
        fflux_box(
            &layout.boxes[box_index],
            &self.hier.geom[amrlev][0].inv_cell_sizes(),
            self.coeffs.b_scalar,
            bcoef,
            flux,
            sol,
            face_only,
            self.ncomp(),
        );
        Ok(())
    }

    /// Fill ghost cells of a level field: exchange between boxes, then physical and
    /// coarse/fine sides from the boundary stencil (`values` as in
    /// `BoundaryStencil::fill_physical_ghosts`).
    pub fn fill_ghosts(
        &self,
        amrlev: usize,
        mglev: usize,
        mf: &mut MultiFab<f64, D>,
        values: Option<&dyn Fn(Orientation, IntVect<D>, usize) -> f64>,
    ) {
        let geom = &self.hier.geom[amrlev][mglev];
        mf.fill_boundary(geom);
        self.bndry.fill_physical_ghosts(amrlev, mglev, geom, mf, values);
    }
}

/// Flux kernel on an explicit box with explicit coefficients.
#[allow(clippy::too_many_arguments)]
pub fn fflux_box<const D: usize>(
    bx: &IndexBox<D>,
    dxinv: &[f64; D],
    b_scalar: f64,
    bcoef: [&Fab<f64, D>; D],
    flux: &mut [Fab<f64, D>; D],
    sol: &Fab<f64, D>,
    face_only: bool,
    ncomp: usize,
) {
    for d in 0..D {
        let fac = b_scalar * dxinv[d];
        if face_only {
            stencil::flux_face_only(bx, d, &mut flux[d], sol, bcoef[d], fac, ncomp);
        } else {
            stencil::flux_full(bx, d, &mut flux[d], sol, bcoef[d], fac, ncomp);
        }
    }
}
