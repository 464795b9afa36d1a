// src/singular.rs
//
// Null-space detection. An AMR level is singular when nothing pins the solution's
// additive constant: no Dirichlet-like side anywhere, the level covers its whole
// domain, no overset cells act as Dirichlet data, and the reaction term vanishes
// (a_scalar == 0, or sum(a) <= 1e-12 * max|a| on the coarsest multigrid slot).

use crate::bc::BcTable;
use crate::field::MultiFab;
use crate::levels::MlHierarchy;
use crate::parallel::ExecPolicy;

pub const SINGULAR_REL_TOL: f64 = 1e-12;

/// Reaction term numerically absent: `sum <= tol * max|a|`.
pub fn reaction_vanishes<const D: usize>(a: &MultiFab<f64, D>, policy: ExecPolicy) -> bool {
    let asum = a.sum(0, policy);
    let amax = a.norm0(0, policy);
    asum <= amax * SINGULAR_REL_TOL
}

/// One flag per AMR level. `a[amrlev]` is that level's multigrid chain of `a`.
pub fn detect_singular_levels<const D: usize>(
    h: &MlHierarchy<D>,
    bc: &BcTable<D>,
    a_scalar: f64,
    a: &[Vec<MultiFab<f64, D>>],
    policy: ExecPolicy,
) -> Vec<bool> {
    let mut flags = vec![false; h.num_amr_levels()];
    if bc.has_dirichlet_like() {
        return flags;
    }
    for (alev, flag) in flags.iter_mut().enumerate() {
        if !h.domain_covered[alev] || h.has_overset_mask(alev, 0) {
            continue;
        }
        *flag = if a_scalar == 0.0 {
            true
        } else {
            match a[alev].last() {
                Some(coarsest) => reaction_vanishes(coarsest, policy),
                None => false,
            }
        };
    }
    flags
}
