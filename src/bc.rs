// src/bc.rs
//
// Boundary conditions and the per-level boundary stencil data consumed by the
// operator and the smoother.
//
// Cell-centred ghost cells next to a physical boundary are eliminated through the
// linear relation
//     u_ghost = value_part + f * u_interior
// with f = -1 for Dirichlet-like sides (face value 0 for the homogeneous part) and
// f = +1 for Neumann-like sides (zero normal gradient). The smoother needs f to solve
// the local equation exactly even though the ghost it reads is one half-sweep stale.

use crate::error::BcError;
use crate::field::{Fab, MultiFab};
use crate::geometry::Geometry;
use crate::index::{IndexType, IntVect, Orientation, Side};
use crate::layout::BoxLayout;
use crate::levels::MlHierarchy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BcType {
    Dirichlet,
    Neumann,
    Robin,
    Periodic,
    /// Odd reflection: behaves as homogeneous Dirichlet.
    ReflectOdd,
    /// Even reflection: behaves as homogeneous Neumann.
    ReflectEven,
}

impl BcType {
    #[inline]
    pub fn is_dirichlet_like(self) -> bool {
        matches!(self, BcType::Dirichlet | BcType::ReflectOdd)
    }

    /// Coefficient `f` of the interior value in the ghost relation.
    #[inline]
    pub fn ghost_coef(self) -> f64 {
        match self {
            BcType::Dirichlet | BcType::ReflectOdd => -1.0,
            BcType::Neumann | BcType::Robin | BcType::ReflectEven => 1.0,
            BcType::Periodic => 0.0,
        }
    }
}

/// Boundary type per component, per direction, per side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BcTable<const D: usize> {
    #[serde(with = "serde_bc_rows")]
    pub lo: Vec<[BcType; D]>,
    #[serde(with = "serde_bc_rows")]
    pub hi: Vec<[BcType; D]>,
}

impl<const D: usize> BcTable<D> {
    pub fn new(lo: Vec<[BcType; D]>, hi: Vec<[BcType; D]>) -> Self {
        assert_eq!(lo.len(), hi.len(), "lo/hi boundary tables must have equal component counts");
        Self { lo, hi }
    }

    /// Same type on every side of every component.
    pub fn uniform(ncomp: usize, t: BcType) -> Self {
        Self::new(vec![[t; D]; ncomp], vec![[t; D]; ncomp])
    }

    #[inline]
    pub fn ncomp(&self) -> usize {
        self.lo.len()
    }

    #[inline]
    pub fn get(&self, comp: usize, o: Orientation) -> BcType {
        match o.side {
            Side::Lo => self.lo[comp][o.dir],
            Side::Hi => self.hi[comp][o.dir],
        }
    }

    pub fn set(&mut self, comp: usize, o: Orientation, t: BcType) {
        match o.side {
            Side::Lo => self.lo[comp][o.dir] = t,
            Side::Hi => self.hi[comp][o.dir] = t,
        }
    }

    pub fn has_robin(&self) -> bool {
        self.lo.iter().chain(self.hi.iter()).flatten().any(|&t| t == BcType::Robin)
    }

    pub fn has_dirichlet_like(&self) -> bool {
        self.lo
            .iter()
            .chain(self.hi.iter())
            .flatten()
            .any(|t| t.is_dirichlet_like())
    }

    /// Periodic sides must match the geometry's periodicity exactly.
    pub fn validate(&self, geom: &Geometry<D>, ncomp: usize) -> Result<(), BcError> {
        if self.ncomp() != ncomp {
            return Err(BcError::ComponentCount {
                expected: ncomp,
                got: self.ncomp(),
            });
        }
        for comp in 0..ncomp {
            for dir in 0..D {
                let lo_p = self.lo[comp][dir] == BcType::Periodic;
                let hi_p = self.hi[comp][dir] == BcType::Periodic;
                let geom_p = geom.is_periodic(dir);
                if lo_p != geom_p || hi_p != geom_p {
                    return Err(BcError::PeriodicMismatch { comp, dir });
                }
            }
        }
        Ok(())
    }
}

mod serde_bc_rows {
    use super::BcType;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, const D: usize>(rows: &[[BcType; D]], s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let v: Vec<Vec<BcType>> = rows.iter().map(|r| r.to_vec()).collect();
        v.serialize(s)
    }

    pub fn deserialize<'de, De, const D: usize>(de: De) -> Result<Vec<[BcType; D]>, De::Error>
    where
        De: Deserializer<'de>,
    {
        let v: Vec<Vec<BcType>> = Vec::deserialize(de)?;
        v.into_iter()
            .map(|r| {
                <[BcType; D]>::try_from(r).map_err(|r| {
                    serde::de::Error::custom(format!("expected {} boundary types, got {}", D, r.len()))
                })
            })
            .collect()
    }
}

/// Robin data `(a_robin, b_robin, f_robin)` per component on the cells just outside
/// the domain: component `3*comp + k` holds entry k for solution component `comp`.
pub fn robin_values_uniform<const D: usize>(
    layout: &BoxLayout<D>,
    ncomp: usize,
    a: f64,
    b: f64,
    f: f64,
) -> MultiFab<f64, D> {
    let mut mf = MultiFab::cell(layout.clone(), 3 * ncomp, 1);
    for comp in 0..ncomp {
        mf.set_val_comp(3 * comp, a);
        mf.set_val_comp(3 * comp + 1, b);
        mf.set_val_comp(3 * comp + 2, f);
    }
    mf
}

/// Ghost slab classification values.
pub const MASK_COVERED: i32 = 0;
pub const MASK_PHYSICAL: i32 = 1;
pub const MASK_COARSE_FINE: i32 = 2;

/// Boundary stencil data of one box: for each of the 2·D orientations, the mask and
/// ghost coefficient `f` (per component) on the adjacent ghost slab.
#[derive(Debug, Clone)]
pub struct BoxBoundary<const D: usize> {
    pub mask: Vec<Fab<i32, D>>,
    pub coef: Vec<Fab<f64, D>>,
}

impl<const D: usize> BoxBoundary<D> {
    #[inline]
    pub fn mask(&self, o: Orientation) -> &Fab<i32, D> {
        &self.mask[o.flat()]
    }

    #[inline]
    pub fn coef(&self, o: Orientation) -> &Fab<f64, D> {
        &self.coef[o.flat()]
    }

    /// `f` for the ghost neighbour of a valid cell sitting on side `o`, or 0 when the
    /// neighbour is another box's valid cell.
    #[inline]
    pub fn ghost_factor(&self, o: Orientation, ghost: IntVect<D>, comp: usize) -> f64 {
        let m = &self.mask[o.flat()];
        if m[(ghost, 0)] > 0 {
            self.coef[o.flat()][(ghost, comp)]
        } else {
            0.0
        }
    }
}

/// Boundary stencil data for every (amrlev, mglev) and box.
///
/// Owned by the boundary infrastructure; the operator only reads it.
#[derive(Debug, Clone)]
pub struct BoundaryStencil<const D: usize> {
    pub bc: BcTable<D>,
    pub ncomp: usize,
    pub levels: Vec<Vec<Vec<BoxBoundary<D>>>>,
}

impl<const D: usize> BoundaryStencil<D> {
    pub fn build(h: &MlHierarchy<D>, bc: &BcTable<D>, ncomp: usize) -> Result<Self, BcError> {
        bc.validate(&h.geom[0][0], ncomp)?;
        let mut levels = Vec::with_capacity(h.num_amr_levels());
        for amrlev in 0..h.num_amr_levels() {
            let mut mg = Vec::with_capacity(h.num_mg_levels(amrlev));
            for mglev in 0..h.num_mg_levels(amrlev) {
                let geom = &h.geom[amrlev][mglev];
                let layout = &h.grids[amrlev][mglev];
                let boxes = (0..layout.len())
                    .map(|bi| build_box(geom, layout, bi, bc, ncomp))
                    .collect();
                mg.push(boxes);
            }
            levels.push(mg);
        }
        Ok(Self {
            bc: bc.clone(),
            ncomp,
            levels,
        })
    }

    #[inline]
    pub fn level(&self, amrlev: usize, mglev: usize) -> &[BoxBoundary<D>] {
        &self.levels[amrlev][mglev]
    }

    /// Fill every boundary-flagged ghost cell of `field` from the ghost relation.
    ///
    /// `values(o, ghost, comp)` gives the inhomogeneous data: the face value on
    /// Dirichlet-like and coarse/fine sides, the outward normal derivative on Neumann
    /// sides. `None` fills homogeneous ghosts. Robin sides always fill as homogeneous
    /// Neumann; their data is carried by the transformed coefficients and rhs.
    pub fn fill_physical_ghosts(
        &self,
        amrlev: usize,
        mglev: usize,
        geom: &Geometry<D>,
        field: &mut MultiFab<f64, D>,
        values: Option<&dyn Fn(Orientation, IntVect<D>, usize) -> f64>,
    ) {
        assert!(field.ngrow >= 1, "ghost fill needs at least one ghost cell");
        assert_eq!(field.ix_type, IndexType::Cell);
        let ncomp = field.ncomp.min(self.ncomp);
        let h = geom.cell_sizes();
        for (bi, fab) in field.fabs.iter_mut().enumerate() {
            let bb = &self.levels[amrlev][mglev][bi];
            let vbx = field.layout.boxes[bi];
            for o in Orientation::all::<D>() {
                let slab = vbx.adj_cell(o);
                let mask = bb.mask(o);
                let coef = bb.coef(o);
                let inward = match o.side {
                    Side::Lo => IntVect::unit(o.dir),
                    Side::Hi => IntVect::scaled_unit(o.dir, -1),
                };
                for iv in slab.iter() {
                    let m = mask[(iv, 0)];
                    if m == MASK_COVERED {
                        continue;
                    }
                    for n in 0..ncomp {
                        let f = coef[(iv, n)];
                        let interior = fab[(iv + inward, n)];
                        let extra = match values {
                            None => 0.0,
                            Some(vf) => {
                                let t = if m == MASK_COARSE_FINE {
                                    BcType::Dirichlet
                                } else {
                                    self.bc.get(n, o)
                                };
                                match t {
                                    BcType::Robin => 0.0,
                                    t if t.is_dirichlet_like() => 2.0 * vf(o, iv, n),
                                    _ => h[o.dir] * vf(o, iv, n),
                                }
                            }
                        };
                        fab[(iv, n)] = extra + f * interior;
                    }
                }
            }
        }
    }
}

fn build_box<const D: usize>(
    geom: &Geometry<D>,
    layout: &BoxLayout<D>,
    bi: usize,
    bc: &BcTable<D>,
    ncomp: usize,
) -> BoxBoundary<D> {
    let vbx = layout.boxes[bi];
    let mut masks = Vec::with_capacity(2 * D);
    let mut coefs = Vec::with_capacity(2 * D);
    for o in Orientation::all::<D>() {
        let slab = vbx.adj_cell(o);
        let mut mask: Fab<i32, D> = Fab::new(slab, 1);
        let mut coef: Fab<f64, D> = Fab::new(slab, ncomp);
        for iv in slab.iter() {
            let w = wrap_periodic(geom, iv);
            let (m, f) = if !geom.domain.contains(w) {
                (MASK_PHYSICAL, None)
            } else if layout.boxes.iter().any(|b| b.contains(w)) {
                (MASK_COVERED, Some(0.0))
            } else {
                (MASK_COARSE_FINE, Some(-1.0))
            };
            mask[(iv, 0)] = m;
            for n in 0..ncomp {
                coef[(iv, n)] = f.unwrap_or_else(|| bc.get(n, o).ghost_coef());
            }
        }
        masks.push(mask);
        coefs.push(coef);
    }
    BoxBoundary {
        mask: masks,
        coef: coefs,
    }
}

fn wrap_periodic<const D: usize>(geom: &Geometry<D>, iv: IntVect<D>) -> IntVect<D> {
    let mut w = iv;
    for d in 0..D {
        if geom.is_periodic(d) {
            let lo = geom.domain.lo[d];
            let len = geom.domain.len(d);
            w[d] = lo + (w[d] - lo).rem_euclid(len);
        }
    }
    w
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MlConfig;
    use crate::index::IndexBox;
    use crate::layout::MeshFactory;

    fn hierarchy(periodic: [bool; 2]) -> MlHierarchy<2> {
        let dom = IndexBox::from_size([0, 0], [8, 4]);
        let g = Geometry::new(dom, [0.0; 2], [2.0, 1.0]).with_periodic(periodic);
        let layout = BoxLayout::new(vec![
            IndexBox::from_size([0, 0], [4, 4]),
            IndexBox::from_size([4, 0], [4, 4]),
        ]);
        MlHierarchy::new(vec![g], vec![layout], vec![MeshFactory::Regular], vec![], &MlConfig::default())
            .expect("valid hierarchy")
    }

    #[test]
    fn masks_separate_physical_and_interbox_sides() {
        let h = hierarchy([false, false]);
        let bs = BoundaryStencil::build(&h, &BcTable::uniform(1, BcType::Dirichlet), 1).expect("bc");
        let b0 = &bs.level(0, 0)[0];
        let xlo = Orientation::new(0, Side::Lo);
        let xhi = Orientation::new(0, Side::Hi);
        assert_eq!(b0.mask(xlo)[(IntVect::new([-1, 2]), 0)], MASK_PHYSICAL);
        assert_eq!(b0.mask(xhi)[(IntVect::new([4, 2]), 0)], MASK_COVERED);
        assert_eq!(b0.ghost_factor(xlo, IntVect::new([-1, 2]), 0), -1.0);
        assert_eq!(b0.ghost_factor(xhi, IntVect::new([4, 2]), 0), 0.0);
    }

    #[test]
    fn periodic_sides_are_covered() {
        let h = hierarchy([true, false]);
        let mut bc = BcTable::uniform(1, BcType::Neumann);
        bc.lo[0][0] = BcType::Periodic;
        bc.hi[0][0] = BcType::Periodic;
        let bs = BoundaryStencil::build(&h, &bc, 1).expect("bc");
        let b0 = &bs.level(0, 0)[0];
        assert_eq!(b0.mask(Orientation::new(0, Side::Lo))[(IntVect::new([-1, 0]), 0)], MASK_COVERED);
        assert_eq!(b0.ghost_factor(Orientation::new(1, Side::Lo), IntVect::new([0, -1]), 0), 1.0);
    }

    #[test]
    fn periodic_mismatch_is_reported() {
        let h = hierarchy([true, false]);
        let err = BoundaryStencil::build(&h, &BcTable::uniform(1, BcType::Neumann), 1).unwrap_err();
        assert_eq!(err, BcError::PeriodicMismatch { comp: 0, dir: 0 });
    }

    #[test]
    fn dirichlet_ghost_fill_puts_value_on_the_face() {
        let h = hierarchy([false, false]);
        let bs = BoundaryStencil::build(&h, &BcTable::uniform(1, BcType::Dirichlet), 1).expect("bc");
        let mut u = MultiFab::cell(h.grids[0][0].clone(), 1, 1);
        u.set_val(3.0);
        let face_value: &dyn Fn(Orientation, IntVect<2>, usize) -> f64 = &|_, _, _| 1.0;
        bs.fill_physical_ghosts(0, 0, &h.geom[0][0], &mut u, Some(face_value));
        let g = u.fabs[0][(IntVect::new([-1, 1]), 0)];
        // Linear interpolation to the face gives the prescribed value.
        assert!((0.5 * (g + 3.0) - 1.0).abs() < 1e-14);
        // Inter-box ghost left alone.
        assert_eq!(u.fabs[0][(IntVect::new([4, 1]), 0)], 3.0);
    }
}
