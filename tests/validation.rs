// tests/validation.rs
//
// Numerical validation of the operator (stencil, smoother, restriction, Robin, flux,
// singularity, assembly).
// Run with: cargo test
// Or only these tests: cargo test --test validation

use approx::assert_relative_eq;

use abec_mlmg::assembly::{BottomSystem, gather, scatter};
use abec_mlmg::bc::{BcTable, BcType, robin_values_uniform};
use abec_mlmg::config::MlConfig;
use abec_mlmg::field::{Fab, MultiFab};
use abec_mlmg::geometry::Geometry;
use abec_mlmg::index::{IndexBox, IntVect, Orientation, Side};
use abec_mlmg::layout::{BoxLayout, MeshFactory};
use abec_mlmg::levels::{MlHierarchy, overset_mask_from_fn};
use abec_mlmg::operator::AbecLaplacian;
use abec_mlmg::parallel::ExecPolicy;
use abec_mlmg::robin::robin_ghost_relation;

fn serial_cfg() -> MlConfig {
    MlConfig {
        exec: ExecPolicy::Serial,
        ..MlConfig::default()
    }
}

/// Single AMR level on [0, size]^2 with the given boxes.
fn hierarchy(n: [i64; 2], size: [f64; 2], boxes: Vec<IndexBox<2>>, cfg: &MlConfig) -> MlHierarchy<2> {
    let dom = IndexBox::from_size([0, 0], n);
    let g = Geometry::new(dom, [0.0; 2], size);
    MlHierarchy::new(vec![g], vec![BoxLayout::new(boxes)], vec![MeshFactory::Regular], vec![], cfg)
        .expect("valid hierarchy")
}

fn fill_cells(mf: &mut MultiFab<f64, 2>, f: impl Fn(IntVect<2>) -> f64) {
    let layout = mf.layout.clone();
    for (i, fab) in mf.fabs.iter_mut().enumerate() {
        for iv in layout.boxes[i].iter() {
            fab[(iv, 0)] = f(iv);
        }
    }
}

/// Residual max-norm `|rhs - A u|` with homogeneous ghosts.
fn residual_norm(op: &AbecLaplacian<2>, mglev: usize, sol: &mut MultiFab<f64, 2>, rhs: &MultiFab<f64, 2>) -> f64 {
    op.fill_ghosts(0, mglev, sol, None);
    let mut ax = MultiFab::cell(rhs.layout.clone(), 1, 0);
    op.fapply(0, mglev, &mut ax, sol);
    ax.mult(-1.0, 0, ExecPolicy::Serial);
    ax.saxpy(1.0, rhs, ExecPolicy::Serial);
    ax.norm0(0, ExecPolicy::Serial)
}

fn sweep(op: &AbecLaplacian<2>, mglev: usize, sol: &mut MultiFab<f64, 2>, rhs: &MultiFab<f64, 2>) {
    for redblack in 0..2 {
        op.fill_ghosts(0, mglev, sol, None);
        op.fsmooth(0, mglev, sol, rhs, redblack);
    }
}

/// Dense Gaussian elimination with partial pivoting.
fn dense_solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    for k in 0..n {
        let p = (k..n)
            .max_by(|&i, &j| a[i][k].abs().total_cmp(&a[j][k].abs()))
            .unwrap();
        a.swap(k, p);
        b.swap(k, p);
        for i in (k + 1)..n {
            let w = a[i][k] / a[k][k];
            for j in k..n {
                a[i][j] -= w * a[k][j];
            }
            b[i] -= w * b[k];
        }
    }
    let mut x = vec![0.0; n];
    for k in (0..n).rev() {
        let s: f64 = ((k + 1)..n).map(|j| a[k][j] * x[j]).sum();
        x[k] = (b[k] - s) / a[k][k];
    }
    x
}

#[test]
fn zero_a_scalar_makes_apply_independent_of_a() {
    let cfg = serial_cfg();
    let dom = IndexBox::from_size([0, 0], [8, 8]);
    let run = |a_val: f64| {
        let h = hierarchy([8, 8], [1.0, 1.0], vec![dom], &cfg);
        let layout = h.grids[0][0].clone();
        let mut op = AbecLaplacian::new(h, BcTable::uniform(1, BcType::Dirichlet), 1, cfg).unwrap();
        op.set_a_coeffs_scalar(0, a_val).unwrap();
        op.set_scalars(0.0, 1.0);
        op.set_a_coeffs_scalar(0, a_val).unwrap();
        op.prepare_for_solve().unwrap();
        let mut x = MultiFab::cell(layout.clone(), 1, 1);
        fill_cells(&mut x, |iv| (iv[0] * iv[1]) as f64 + 0.5 * iv[0] as f64);
        op.fill_ghosts(0, 0, &mut x, None);
        let mut y = MultiFab::cell(layout, 1, 0);
        op.fapply(0, 0, &mut y, &x);
        y
    };
    assert_eq!(run(0.0), run(17.0));
}

#[test]
fn restriction_reproduces_constants_on_every_level() {
    let cfg = serial_cfg();
    let h = hierarchy([16, 16], [1.0, 1.0], BoxLayout::chopped(IndexBox::from_size([0, 0], [16, 16]), 8).boxes, &cfg);
    let mut op = AbecLaplacian::new(h, BcTable::uniform(1, BcType::Neumann), 1, cfg).unwrap();
    op.set_scalars(1.0, 1.0);
    op.set_a_coeffs_scalar(0, 3.25).unwrap();
    op.set_b_coeffs_scalar(0, 0.4).unwrap();
    op.prepare_for_solve().unwrap();
    assert!(op.num_mg_levels(0) > 2);
    for mglev in 0..op.num_mg_levels(0) {
        let a = op.a_coeffs(0, mglev);
        for (i, fab) in a.fabs.iter().enumerate() {
            for iv in a.valid_box(i).iter() {
                assert_relative_eq!(fab[(iv, 0)], 3.25, epsilon = 1e-14);
            }
        }
        for bd in op.b_coeffs(0, mglev) {
            for (i, fab) in bd.fabs.iter().enumerate() {
                for iv in bd.valid_box(i).iter() {
                    assert_relative_eq!(fab[(iv, 0)], 0.4, epsilon = 1e-14);
                }
            }
        }
    }
}

#[test]
fn robin_closed_form_through_the_operator() {
    // Robin on x-hi only, h = 0.1, a_r = 1, b_r = 0.5, f_r = 2.
    let cfg = serial_cfg();
    let h = hierarchy([10, 10], [1.0, 1.0], vec![IndexBox::from_size([0, 0], [10, 10])], &cfg);
    let layout = h.grids[0][0].clone();
    let mut bc = BcTable::uniform(1, BcType::Neumann);
    bc.set(0, Orientation::new(0, Side::Hi), BcType::Robin);
    let mut op = AbecLaplacian::new(h, bc, 1, cfg).unwrap();
    op.set_scalars(2.0, 3.0);
    op.set_a_coeffs_scalar(0, 1.0).unwrap();
    op.set_b_coeffs_scalar(0, 0.5).unwrap();
    op.set_robin_bc_values(0, robin_values_uniform(&layout, 1, 1.0, 0.5, 2.0)).unwrap();
    op.prepare_for_solve().unwrap();

    let (big_a, big_b) = robin_ghost_relation(1.0, 0.5, 2.0, 0.1);
    assert_relative_eq!(big_b, 4.5 / 5.5, epsilon = 1e-14);
    assert_relative_eq!(big_a, 2.0 / 5.5, epsilon = 1e-14);

    let a = &op.a_coeffs(0, 0).fabs[0];
    let expect = 1.0 + (3.0 / 2.0) * (1.0 - big_b) * 0.5 / 0.01;
    assert_relative_eq!(a[(IntVect::new([9, 3]), 0)], expect, epsilon = 1e-12);
    assert_relative_eq!(a[(IntVect::new([8, 3]), 0)], 1.0, epsilon = 1e-14);
    assert_relative_eq!(a[(IntVect::new([0, 3]), 0)], 1.0, epsilon = 1e-14);

    let mut rhs = MultiFab::cell(layout, 1, 0);
    rhs.set_val(1.0);
    op.apply_robin_rhs(0, &mut rhs).unwrap();
    assert_relative_eq!(rhs.fabs[0][(IntVect::new([9, 6]), 0)], 1.0 + 3.0 * big_a * 0.5 / 0.01, epsilon = 1e-12);
    assert_relative_eq!(rhs.fabs[0][(IntVect::new([4, 6]), 0)], 1.0, epsilon = 1e-14);
}

#[test]
fn robin_with_zero_a_scalar_forces_unit_scalar() {
    let cfg = serial_cfg();
    let h = hierarchy([4, 4], [1.0, 1.0], vec![IndexBox::from_size([0, 0], [4, 4])], &cfg);
    let layout = h.grids[0][0].clone();
    let mut op = AbecLaplacian::new(h, BcTable::uniform(1, BcType::Robin), 1, cfg).unwrap();
    op.set_robin_bc_values(0, robin_values_uniform(&layout, 1, 1.0, 1.0, 0.0)).unwrap();
    op.prepare_for_solve().unwrap();
    assert_eq!(op.a_scalar(), 1.0);
    // Robin a > 0 with b > 0 pins the constant: not singular.
    assert!(!op.is_singular(0));
}

#[test]
fn robin_needs_values_and_single_component() {
    let cfg = serial_cfg();
    let h = hierarchy([4, 4], [1.0, 1.0], vec![IndexBox::from_size([0, 0], [4, 4])], &cfg);
    let mut op = AbecLaplacian::new(h, BcTable::uniform(1, BcType::Robin), 1, cfg).unwrap();
    op.set_scalars(1.0, 1.0);
    assert!(op.prepare_for_solve().is_err());

    let h = hierarchy([4, 4], [1.0, 1.0], vec![IndexBox::from_size([0, 0], [4, 4])], &cfg);
    let mut op = AbecLaplacian::new(h, BcTable::uniform(2, BcType::Robin), 2, cfg).unwrap();
    op.set_scalars(1.0, 1.0);
    let err = op.prepare_for_solve().unwrap_err();
    assert!(err.to_string().contains("single solved component"));
}

#[test]
fn smoother_leaves_the_exact_discrete_solution_alone() {
    let cfg = serial_cfg();
    let h = hierarchy([8, 8], [1.0, 2.0], BoxLayout::chopped(IndexBox::from_size([0, 0], [8, 8]), 4).boxes, &cfg);
    let layout = h.grids[0][0].clone();
    let mut op = AbecLaplacian::new(h, BcTable::uniform(1, BcType::Dirichlet), 1, cfg).unwrap();
    op.set_scalars(0.5, 1.0);
    let mut a = MultiFab::cell(layout.clone(), 1, 0);
    fill_cells(&mut a, |iv| 1.0 + 0.1 * iv[0] as f64);
    op.set_a_coeffs(0, &a).unwrap();
    op.prepare_for_solve().unwrap();

    let mut rhs = MultiFab::cell(layout.clone(), 1, 0);
    fill_cells(&mut rhs, |iv| ((iv[0] + 2 * iv[1]) % 5) as f64 - 2.0);
    let (sys, dof) = BottomSystem::assemble(&op, 0, 0, &rhs, false);
    let x = dense_solve(sys.to_dense(), sys.rhs.clone());

    let mut sol = MultiFab::cell(layout, 1, 1);
    scatter(&dof, &x, &mut sol);
    let before = gather(&dof, &sol);
    assert!(residual_norm(&op, 0, &mut sol, &rhs) < 1e-10);

    sweep(&op, 0, &mut sol, &rhs);
    let after = gather(&dof, &sol);
    for (u0, u1) in before.iter().zip(&after) {
        assert_relative_eq!(*u0, *u1, epsilon = 1e-11);
    }
}

#[test]
fn singularity_detection_cases() {
    let cfg = serial_cfg();
    let dom = IndexBox::from_size([0, 0], [8, 8]);

    let make = |bc: BcTable<2>| {
        let h = hierarchy([8, 8], [1.0, 1.0], vec![dom], &cfg);
        AbecLaplacian::new(h, bc, 1, cfg).unwrap()
    };

    let mut op = make(BcTable::uniform(1, BcType::Neumann));
    op.set_scalars(0.0, 1.0);
    op.prepare_for_solve().unwrap();
    assert!(op.is_singular(0));
    assert!(op.is_bottom_singular());

    let mut bc = BcTable::uniform(1, BcType::Neumann);
    bc.set(0, Orientation::new(1, Side::Lo), BcType::Dirichlet);
    let mut op = make(bc);
    op.set_scalars(0.0, 1.0);
    op.prepare_for_solve().unwrap();
    assert!(!op.is_singular(0));

    let mut op = make(BcTable::uniform(1, BcType::Neumann));
    op.set_scalars(1.0, 1.0);
    op.set_a_coeffs_scalar(0, 1.0).unwrap();
    op.prepare_for_solve().unwrap();
    assert!(!op.is_singular(0));

    // Uncovered domain: never singular.
    let h = hierarchy([8, 8], [1.0, 1.0], vec![IndexBox::from_size([0, 0], [4, 8])], &cfg);
    let mut op = AbecLaplacian::new(h, BcTable::uniform(1, BcType::Neumann), 1, cfg).unwrap();
    op.prepare_for_solve().unwrap();
    assert!(!op.is_singular(0));
}

#[test]
fn face_only_flux_touches_only_box_boundary_faces() {
    let cfg = serial_cfg();
    let bx = IndexBox::from_size([0, 0], [4, 4]);
    let h = hierarchy([4, 4], [1.0, 1.0], vec![bx], &cfg);
    let mut op = AbecLaplacian::new(h, BcTable::uniform(1, BcType::Dirichlet), 1, cfg).unwrap();
    op.set_scalars(0.0, 2.0);
    op.set_b_coeffs_scalar(0, 1.5).unwrap();
    op.prepare_for_solve().unwrap();

    let mut sol = Fab::new(bx.grow(1), 1);
    let gbx = sol.bx;
    for iv in gbx.iter() {
        sol[(iv, 0)] = iv[0] as f64 + 3.0 * iv[1] as f64;
    }
    let sentinel = -99.0;
    let mut flux: [Fab<f64, 2>; 2] = std::array::from_fn(|d| {
        let mut f = Fab::new(bx.surrounding_nodes(d), 1);
        f.fill(sentinel);
        f
    });

    // dxinv = 4: F_x = 2 * 1.5 * 1 * 4, F_y = 2 * 1.5 * 3 * 4
    let (fx, fy) = (12.0, 36.0);
    op.fflux(0, 0, &mut flux, &sol, true).unwrap();
    for (d, want) in [(0usize, fx), (1, fy)] {
        let fbx = bx.surrounding_nodes(d);
        for iv in fbx.iter() {
            let on_boundary = iv[d] == fbx.lo[d] || iv[d] == fbx.hi[d] - 1;
            let got = flux[d][(iv, 0)];
            if on_boundary {
                assert_relative_eq!(got, want, epsilon = 1e-12);
            } else {
                assert_eq!(got, sentinel);
            }
        }
    }

    op.fflux(0, 0, &mut flux, &sol, false).unwrap();
    assert!(flux[0].data.iter().all(|&v| (v - fx).abs() < 1e-12));
    assert!(flux[1].data.iter().all(|&v| (v - fy).abs() < 1e-12));
}

#[test]
fn dirichlet_poisson_4x4_converges_to_direct_solution() {
    let cfg = serial_cfg();
    let bx = IndexBox::from_size([0, 0], [4, 4]);
    let h = hierarchy([4, 4], [1.0, 1.0], vec![bx], &cfg);
    let layout = h.grids[0][0].clone();
    let mut op = AbecLaplacian::new(h, BcTable::uniform(1, BcType::Dirichlet), 1, cfg).unwrap();
    op.set_scalars(0.0, 1.0);
    op.set_b_coeffs_scalar(0, 1.0).unwrap();
    op.prepare_for_solve().unwrap();

    // Hand-built 5-point matrix, h = 1/4, ghost = -u on every wall.
    let n = 4usize;
    let w = 16.0;
    let idx = |i: usize, j: usize| i + n * j;
    let mut m = vec![vec![0.0; n * n]; n * n];
    for j in 0..n {
        for i in 0..n {
            let r = idx(i, j);
            for (di, dj) in [(-1i64, 0i64), (1, 0), (0, -1), (0, 1)] {
                let (ni, nj) = (i as i64 + di, j as i64 + dj);
                if ni < 0 || nj < 0 || ni >= n as i64 || nj >= n as i64 {
                    m[r][r] += 2.0 * w;
                } else {
                    m[r][r] += w;
                    m[r][idx(ni as usize, nj as usize)] -= w;
                }
            }
        }
    }
    let exact = dense_solve(m, vec![1.0; n * n]);

    let mut rhs = MultiFab::cell(layout.clone(), 1, 0);
    rhs.set_val(1.0);
    let mut sol = MultiFab::cell(layout, 1, 1);
    for _ in 0..200 {
        sweep(&op, 0, &mut sol, &rhs);
    }
    for j in 0..n {
        for i in 0..n {
            let got = sol.fabs[0][(IntVect::new([i as i64, j as i64]), 0)];
            assert_relative_eq!(got, exact[idx(i, j)], epsilon = 1e-8);
        }
    }
    // Symmetry of the discrete solution.
    let s = &sol.fabs[0];
    assert_relative_eq!(s[(IntVect::new([0, 0]), 0)], s[(IntVect::new([3, 3]), 0)], epsilon = 1e-10);
    assert_relative_eq!(s[(IntVect::new([1, 2]), 0)], s[(IntVect::new([2, 1]), 0)], epsilon = 1e-10);
}

#[test]
fn two_box_relaxation_matches_single_box() {
    let cfg = serial_cfg();
    let run = |boxes: Vec<IndexBox<2>>| {
        let h = hierarchy([8, 8], [1.0, 1.0], boxes, &cfg);
        let layout = h.grids[0][0].clone();
        let mut op = AbecLaplacian::new(h, BcTable::uniform(1, BcType::Dirichlet), 1, cfg).unwrap();
        op.prepare_for_solve().unwrap();
        let mut rhs = MultiFab::cell(layout.clone(), 1, 0);
        fill_cells(&mut rhs, |iv| (iv[0] + iv[1]) as f64);
        let mut sol = MultiFab::cell(layout, 1, 1);
        for _ in 0..400 {
            sweep(&op, 0, &mut sol, &rhs);
        }
        assert!(residual_norm(&op, 0, &mut sol, &rhs) < 1e-9);
        let mut out = vec![0.0; 64];
        for (i, fab) in sol.fabs.iter().enumerate() {
            for iv in sol.valid_box(i).iter() {
                out[(iv[0] + 8 * iv[1]) as usize] = fab[(iv, 0)];
            }
        }
        out
    };
    let one = run(vec![IndexBox::from_size([0, 0], [8, 8])]);
    let two = run(vec![IndexBox::from_size([0, 0], [4, 8]), IndexBox::from_size([4, 0], [4, 8])]);
    for (a, b) in one.iter().zip(&two) {
        assert_relative_eq!(*a, *b, epsilon = 1e-9);
    }
}

#[test]
fn line_relaxation_converges_on_anisotropic_level() {
    // dy = 4 dx: the first multigrid level coarsens x only and uses line relaxation.
    let cfg = serial_cfg();
    let h = hierarchy([16, 16], [1.0, 4.0], vec![IndexBox::from_size([0, 0], [16, 16])], &cfg);
    assert!(!h.is_regular_coarsening(0, 1));
    let coarse = h.grids[0][1].clone();
    let mut op = AbecLaplacian::new(h, BcTable::uniform(1, BcType::Dirichlet), 1, cfg).unwrap();
    op.set_scalars(0.0, 1.0);
    op.prepare_for_solve().unwrap();

    let mut rhs = MultiFab::cell(coarse.clone(), 1, 0);
    fill_cells(&mut rhs, |iv| 1.0 + 0.25 * iv[1] as f64);
    let mut sol = MultiFab::cell(coarse, 1, 1);
    let r0 = residual_norm(&op, 1, &mut sol, &rhs);
    for _ in 0..300 {
        sweep(&op, 1, &mut sol, &rhs);
    }
    let r1 = residual_norm(&op, 1, &mut sol, &rhs);
    assert!(r1 < 1e-10 * r0, "line relaxation stalled: {r0:e} -> {r1:e}");
}

#[test]
fn overset_cells_are_frozen_and_applied_as_zero() {
    let cfg = serial_cfg();
    let dom = IndexBox::from_size([0, 0], [8, 8]);
    let h = hierarchy([8, 8], [1.0, 1.0], vec![dom], &cfg);
    let layout = h.grids[0][0].clone();
    let is_overset = |iv: IntVect<2>| iv[0] >= 3 && iv[0] < 5 && iv[1] >= 3 && iv[1] < 5;
    let mask = overset_mask_from_fn(&layout, is_overset);
    let h = h.with_overset_masks(vec![mask]).unwrap();
    let mut op = AbecLaplacian::new(h, BcTable::uniform(1, BcType::Neumann), 1, cfg).unwrap();
    op.set_scalars(0.0, 1.0);
    op.prepare_for_solve().unwrap();
    // Overset cells act as Dirichlet data.
    assert!(!op.is_singular(0));

    let mut sol = MultiFab::cell(layout.clone(), 1, 1);
    fill_cells(&mut sol, |iv| if is_overset(iv) { 5.0 } else { 0.0 });
    let rhs = MultiFab::cell(layout.clone(), 1, 0);
    for _ in 0..20 {
        sweep(&op, 0, &mut sol, &rhs);
    }
    assert_eq!(sol.fabs[0][(IntVect::new([3, 4]), 0)], 5.0);
    assert!(sol.fabs[0][(IntVect::new([2, 4]), 0)] > 0.0);

    op.fill_ghosts(0, 0, &mut sol, None);
    let mut y = MultiFab::cell(layout, 1, 0);
    y.set_val(1.0);
    op.fapply(0, 0, &mut y, &sol);
    assert_eq!(y.fabs[0][(IntVect::new([4, 4]), 0)], 0.0);
}

#[test]
fn assembled_rows_match_fapply() {
    let cfg = serial_cfg();
    let boxes = BoxLayout::chopped(IndexBox::from_size([0, 0], [8, 6]), 4).boxes;
    let h = hierarchy([8, 6], [2.0, 1.0], boxes, &cfg);
    let layout = h.grids[0][0].clone();
    let mut bc = BcTable::uniform(1, BcType::Dirichlet);
    bc.set(0, Orientation::new(0, Side::Hi), BcType::Neumann);
    let mut op = AbecLaplacian::new(h, bc, 1, cfg).unwrap();
    op.set_scalars(0.7, 1.3);
    let mut a = MultiFab::cell(layout.clone(), 1, 0);
    fill_cells(&mut a, |iv| 1.0 + (iv[0] % 3) as f64);
    op.set_a_coeffs(0, &a).unwrap();
    op.prepare_for_solve().unwrap();

    let mut x = MultiFab::cell(layout.clone(), 1, 1);
    fill_cells(&mut x, |iv| ((3 * iv[0] + iv[1]) % 7) as f64 - 3.0);
    op.fill_ghosts(0, 0, &mut x, None);
    let mut y = MultiFab::cell(layout.clone(), 1, 0);
    op.fapply(0, 0, &mut y, &x);

    let rhs = MultiFab::cell(layout, 1, 0);
    let (sys, dof) = BottomSystem::assemble(&op, 0, 0, &rhs, true);
    assert_eq!(sys.n, 48);
    // Every row starts with its diagonal.
    for ij in &sys.rows {
        let mut k = 0;
        for (r, &nc) in ij.rows.iter().zip(&ij.ncols) {
            assert_eq!(ij.cols[k], *r);
            k += nc;
        }
    }
    let ax = sys.matvec(&gather(&dof, &x));
    for (got, want) in ax.iter().zip(gather(&dof, &y)) {
        assert_relative_eq!(*got, want, epsilon = 1e-10, max_relative = 1e-12);
    }
    // Symmetric operator.
    let m = sys.to_dense();
    for i in 0..sys.n {
        for j in 0..sys.n {
            assert_relative_eq!(m[i][j], m[j][i], epsilon = 1e-12);
        }
    }
}

#[test]
fn cut_cell_assembly_drops_covered_cells() {
    let cfg = serial_cfg();
    let dom = IndexBox::from_size([0, 0], [4, 4]);
    let g = Geometry::new(dom, [0.0; 2], [1.0; 2]);
    let layout = BoxLayout::new(vec![dom]);
    let covered = |iv: IntVect<2>| iv[0] == 3 && iv[1] == 3;
    let factory = MeshFactory::cut_cell_from_fn(&layout, covered);
    let h = MlHierarchy::new(vec![g], vec![layout.clone()], vec![factory], vec![], &cfg).unwrap();
    let mut op = AbecLaplacian::new(h, BcTable::uniform(1, BcType::Dirichlet), 1, cfg).unwrap();
    op.prepare_for_solve().unwrap();

    let rhs = MultiFab::cell(layout, 1, 0);
    let (sys, dof) = BottomSystem::assemble(&op, 0, 0, &rhs, false);
    assert_eq!(sys.n, 15);
    assert_eq!(dof.ids.fabs[0][(IntVect::new([3, 3]), 0)], -1);

    // (2, 3) keeps its west, south and wall couplings only: diag = 16 * (1 + 1 + 2).
    let r = dof.ids.fabs[0][(IntVect::new([2, 3]), 0)] as usize;
    let m = sys.to_dense();
    assert_relative_eq!(m[r][r], 64.0, epsilon = 1e-12);
    assert_eq!(m[r].iter().filter(|v| **v != 0.0).count(), 3);
}
