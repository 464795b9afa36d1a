// src/levels/hierarchy.rs

use crate::config::MlConfig;
use crate::error::{AbecError, Result};
use crate::field::IMultiFab;
use crate::geometry::{CoordSys, Geometry};
use crate::index::IntVect;
use crate::layout::{BoxLayout, MeshFactory};
use crate::levels::overset::coarsen_overset_mask;

/// The (amrlev, mglev) level hierarchy the operator lives on.
///
/// - amrlev 0 is the coarsest AMR level; it is coarsened for multigrid as far as its
///   boxes allow, possibly anisotropically when cells are stretched.
/// - amrlev > 0 carries `log_r(ref_ratio)` multigrid levels coarsened by the uniform
///   `mg_coarsen_ratio`; coarsening its last slot once more lands on the resolution of
///   amrlev-1, which is where the AMR-to-AMR restriction writes.
pub struct MlHierarchy<const D: usize> {
    pub geom: Vec<Vec<Geometry<D>>>,
    pub grids: Vec<Vec<BoxLayout<D>>>,
    pub factory: Vec<Vec<MeshFactory<D>>>,

    /// Refinement ratio between amrlev and amrlev+1.
    pub amr_ref_ratio: Vec<i64>,

    pub mg_coarsen_ratio: i64,

    /// Per-step coarsening ratio of amrlev 0: entry k maps mglev k to mglev k+1.
    pub mg_coarsen_ratio_vec: Vec<IntVect<D>>,

    /// Whether each AMR level's boxes cover its whole domain.
    pub domain_covered: Vec<bool>,

    /// Optional overset mask per level pair (1 = solved here, 0 = value supplied externally).
    pub overset_mask: Vec<Vec<Option<IMultiFab<D>>>>,
}

impl<const D: usize> MlHierarchy<D> {
    pub fn new(
        geoms: Vec<Geometry<D>>,
        grids: Vec<BoxLayout<D>>,
        factories: Vec<MeshFactory<D>>,
        amr_ref_ratio: Vec<i64>,
        cfg: &MlConfig,
    ) -> Result<Self> {
        cfg.validate()?;
        let namr = geoms.len();
        if namr == 0 || grids.len() != namr || factories.len() != namr {
            return Err(AbecError::Config(format!(
                "need one geometry, layout and factory per AMR level (got {}, {}, {})",
                namr,
                grids.len(),
                factories.len()
            )));
        }
        if amr_ref_ratio.len() + 1 != namr {
            return Err(AbecError::Config(format!(
                "need {} AMR refinement ratios, got {}",
                namr - 1,
                amr_ref_ratio.len()
            )));
        }
        let r = cfg.mg_coarsen_ratio;
        if amr_ref_ratio.iter().any(|&rr| rr < r || rr % r != 0) {
            return Err(AbecError::Config(format!(
                "AMR refinement ratios {:?} must be multiples of mg_coarsen_ratio {}",
                amr_ref_ratio, r
            )));
        }

        let mut h = Self {
            geom: Vec::with_capacity(namr),
            grids: Vec::with_capacity(namr),
            factory: Vec::with_capacity(namr),
            amr_ref_ratio,
            mg_coarsen_ratio: r,
            mg_coarsen_ratio_vec: Vec::new(),
            domain_covered: Vec::with_capacity(namr),
            overset_mask: Vec::with_capacity(namr),
        };

        for (amrlev, ((g, ba), fact)) in geoms
            .into_iter()
            .zip(grids)
            .zip(factories)
            .enumerate()
        {
            h.domain_covered.push(ba.covers(&g.domain));

            let mut lev_geom = vec![g];
            let mut lev_grids = vec![ba];
            let mut lev_fact = vec![fact];

            if amrlev == 0 {
                while lev_geom.len() <= cfg.max_coarsening_level {
                    let cur_g = lev_geom[lev_geom.len() - 1];
                    let ratio = anisotropic_ratio(&cur_g, r);
                    let cur_ba = &lev_grids[lev_grids.len() - 1];
                    if !cur_ba.coarsenable(ratio, cfg.min_coarse_width)
                        || !cur_g.domain.coarsenable(ratio, 1)
                    {
                        break;
                    }
                    let next_ba = cur_ba.coarsen(ratio);
                    let next_fact = lev_fact[lev_fact.len() - 1].coarsen(&next_ba, ratio);
                    lev_geom.push(cur_g.coarsen(ratio));
                    lev_grids.push(next_ba);
                    lev_fact.push(next_fact);
                    h.mg_coarsen_ratio_vec.push(ratio);
                }
            } else {
                let ratio = IntVect::splat(r);
                let mut rr = h.amr_ref_ratio[amrlev - 1];
                while rr > r {
                    let cur_ba = &lev_grids[lev_grids.len() - 1];
                    if !cur_ba.coarsenable(ratio, 1) {
                        return Err(AbecError::Config(format!(
                            "AMR level {} boxes cannot be coarsened to the next AMR level",
                            amrlev
                        )));
                    }
                    let next_ba = cur_ba.coarsen(ratio);
                    let next_fact = lev_fact[lev_fact.len() - 1].coarsen(&next_ba, ratio);
                    let cur_g = lev_geom[lev_geom.len() - 1];
                    lev_geom.push(cur_g.coarsen(ratio));
                    lev_grids.push(next_ba);
                    lev_fact.push(next_fact);
                    rr /= r;
                }
                let last = &lev_grids[lev_grids.len() - 1];
                if !last.coarsenable(ratio, 1) {
                    return Err(AbecError::Config(format!(
                        "AMR level {} boxes are not aligned with AMR level {}",
                        amrlev,
                        amrlev - 1
                    )));
                }
            }

            let nmg = lev_geom.len();
            log::debug!("AMR level {amrlev}: {nmg} multigrid level(s)");
            h.geom.push(lev_geom);
            h.grids.push(lev_grids);
            h.factory.push(lev_fact);
            h.overset_mask.push(vec![None; nmg]);
        }

        Ok(h)
    }

    /// Attach an overset mask to every AMR level (given on its finest multigrid slot);
    /// coarser slots receive coarsened copies.
    pub fn with_overset_masks(mut self, masks: Vec<IMultiFab<D>>) -> Result<Self> {
        if masks.len() != self.num_amr_levels() {
            return Err(AbecError::Config(format!(
                "need one overset mask per AMR level, got {}",
                masks.len()
            )));
        }
        for (amrlev, mask) in masks.into_iter().enumerate() {
            if mask.layout != self.grids[amrlev][0] {
                return Err(AbecError::LayoutMismatch {
                    what: "overset mask",
                });
            }
            let mut cur = mask;
            cur.fill_boundary(&self.geom[amrlev][0]);
            for mglev in 1..self.num_mg_levels(amrlev) {
                let ratio = self.coarsen_ratio(amrlev, mglev);
                let mut next = coarsen_overset_mask(&cur, &self.grids[amrlev][mglev], ratio);
                next.fill_boundary(&self.geom[amrlev][mglev]);
                self.overset_mask[amrlev][mglev - 1] = Some(cur);
                cur = next;
            }
            let last = self.num_mg_levels(amrlev) - 1;
            self.overset_mask[amrlev][last] = Some(cur);
        }
        Ok(self)
    }

    #[inline]
    pub fn num_amr_levels(&self) -> usize {
        self.geom.len()
    }

    #[inline]
    pub fn num_mg_levels(&self, amrlev: usize) -> usize {
        self.geom[amrlev].len()
    }

    pub fn check_level(&self, amrlev: usize, mglev: usize) -> Result<()> {
        if amrlev < self.num_amr_levels() && mglev < self.num_mg_levels(amrlev) {
            Ok(())
        } else {
            Err(AbecError::LevelOutOfRange { amrlev, mglev })
        }
    }

    /// Ratio between mglev-1 and mglev of `amrlev` (mglev >= 1).
    pub fn coarsen_ratio(&self, amrlev: usize, mglev: usize) -> IntVect<D> {
        debug_assert!(mglev >= 1);
        if amrlev > 0 {
            IntVect::splat(self.mg_coarsen_ratio)
        } else {
            self.mg_coarsen_ratio_vec[mglev - 1]
        }
    }

    /// False where the finest AMR level's multigrid chain coarsened anisotropically into
    /// this level; the smoother switches to line relaxation there.
    pub fn is_regular_coarsening(&self, amrlev: usize, mglev: usize) -> bool {
        if amrlev == 0 && mglev > 0 {
            self.mg_coarsen_ratio_vec[mglev - 1] == IntVect::splat(self.mg_coarsen_ratio)
        } else {
            true
        }
    }

    /// Move every level to a new physical extent and coordinate system. Index domains,
    /// layouts and the multigrid chain stay; a new cell aspect ratio that would coarsen
    /// amrlev 0 differently is rejected and leaves the hierarchy unchanged.
    pub fn reset_physical_geometry(&mut self, prob_lo: [f64; D], prob_hi: [f64; D], coord: CoordSys) -> Result<()> {
        if (0..D).any(|d| prob_hi[d] <= prob_lo[d]) {
            return Err(AbecError::Config(format!(
                "physical extent {:?}..{:?} is empty in some direction",
                prob_lo, prob_hi
            )));
        }
        let mut geom = self.geom.clone();
        for g in geom.iter_mut().flatten() {
            g.prob_lo = prob_lo;
            g.prob_hi = prob_hi;
            g.coord = coord;
        }
        for (k, &ratio) in self.mg_coarsen_ratio_vec.iter().enumerate() {
            if anisotropic_ratio(&geom[0][k], self.mg_coarsen_ratio) != ratio {
                return Err(AbecError::Config(format!(
                    "new cell aspect ratio changes the coarsening into multigrid level {}",
                    k + 1
                )));
            }
        }
        self.geom = geom;
        Ok(())
    }

    #[inline]
    pub fn has_overset_mask(&self, amrlev: usize, mglev: usize) -> bool {
        self.overset_mask[amrlev][mglev].is_some()
    }
}

/// Coarsen only the directions whose cells are not already much coarser than the finest.
fn anisotropic_ratio<const D: usize>(g: &Geometry<D>, r: i64) -> IntVect<D> {
    let h = g.cell_sizes();
    let hmin = h.iter().cloned().fold(f64::INFINITY, f64::min);
    let mut v = [1i64; D];
    for d in 0..D {
        if h[d] <= 1.5 * hmin {
            v[d] = r;
        }
    }
    IntVect(v)
}
