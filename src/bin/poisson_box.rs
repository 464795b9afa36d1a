// src/bin/poisson_box.rs
//
// Single-level Poisson smoke run on two boxes:
//   Domain: [0,1]^2, 32x32 cells, split into two 16x32 boxes
//   a_scalar = 0, b_scalar = 1, b = 1, homogeneous Dirichlet on every side
//   rhs = 2 pi^2 sin(pi x) sin(pi y)  (exact u = sin(pi x) sin(pi y))
//
// Relaxes with red-black Gauss-Seidel (ghosts refreshed between colours) and logs the
// max-norm residual every few sweeps.
//
// Run:
//   cargo run --release --bin poisson_box
//   ABEC_MG_EXEC=serial ABEC_MG_VERBOSE=2 cargo run --release --bin poisson_box
//
// Output:
//   out/poisson_box/config.json
//   out/poisson_box/solution.png
//   out/poisson_box/residual.png

use std::f64::consts::PI;
use std::fs::create_dir_all;
use std::path::Path;

use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

use abec_mlmg::bc::{BcTable, BcType};
use abec_mlmg::config::{MlConfig, RunConfig};
use abec_mlmg::field::MultiFab;
use abec_mlmg::geometry::Geometry;
use abec_mlmg::index::IndexBox;
use abec_mlmg::layout::{BoxLayout, MeshFactory};
use abec_mlmg::levels::MlHierarchy;
use abec_mlmg::operator::AbecLaplacian;
use abec_mlmg::visualisation::{save_field_plot, save_residual_plot};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = MlConfig::from_env();
    let level = match cfg.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(
        level,
        ConfigBuilder::new().set_time_level(LevelFilter::Off).build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    let n: i64 = 32;
    let n_sweeps: usize = 2000;
    let report_every: usize = 200;

    let domain = IndexBox::from_size([0, 0], [n, n]);
    let geom = Geometry::new(domain, [0.0, 0.0], [1.0, 1.0]);
    let layout = BoxLayout::new(vec![
        IndexBox::from_size([0, 0], [n / 2, n]),
        IndexBox::from_size([n / 2, 0], [n / 2, n]),
    ]);
    let hier = MlHierarchy::new(vec![geom], vec![layout.clone()], vec![MeshFactory::Regular], vec![], &cfg)?;

    let mut op = AbecLaplacian::new(hier, BcTable::uniform(1, BcType::Dirichlet), 1, cfg)?;
    op.set_scalars(0.0, 1.0);
    op.set_b_coeffs_scalar(0, 1.0)?;
    op.prepare_for_solve()?;

    let h = geom.cell_sizes();
    let mut rhs = MultiFab::cell(layout.clone(), 1, 0);
    for (i, fab) in rhs.fabs.iter_mut().enumerate() {
        for iv in layout.boxes[i].iter() {
            let x = (iv[0] as f64 + 0.5) * h[0];
            let y = (iv[1] as f64 + 0.5) * h[1];
            fab[(iv, 0)] = 2.0 * PI * PI * (PI * x).sin() * (PI * y).sin();
        }
    }

    let mut sol = MultiFab::cell(layout.clone(), 1, 1);
    let mut ax = MultiFab::cell(layout.clone(), 1, 0);
    let mut residuals = Vec::with_capacity(n_sweeps);

    for sweep in 0..n_sweeps {
        for redblack in 0..2 {
            op.fill_ghosts(0, 0, &mut sol, None);
            op.fsmooth(0, 0, &mut sol, &rhs, redblack);
        }

        // r = rhs - A u
        op.fill_ghosts(0, 0, &mut sol, None);
        op.fapply(0, 0, &mut ax, &sol);
        ax.mult(-1.0, 0, cfg.exec);
        ax.saxpy(1.0, &rhs, cfg.exec);
        let res = ax.norm0(0, cfg.exec);
        residuals.push(res);

        if sweep % report_every == 0 || sweep + 1 == n_sweeps {
            log::info!("sweep {:5}  |r|_inf = {:.6e}", sweep, res);
        }
    }

    // Discretisation error against the continuous solution
    let mut err_max: f64 = 0.0;
    for (i, fab) in sol.fabs.iter().enumerate() {
        for iv in layout.boxes[i].iter() {
            let x = (iv[0] as f64 + 0.5) * h[0];
            let y = (iv[1] as f64 + 0.5) * h[1];
            let exact = (PI * x).sin() * (PI * y).sin();
            err_max = err_max.max((fab[(iv, 0)] - exact).abs());
        }
    }
    log::info!("max |u - u_exact| = {:.6e}", err_max);

    let out_dir = Path::new("out").join("poisson_box");
    create_dir_all(&out_dir)?;

    let run = RunConfig {
        binary: "poisson_box".to_string(),
        dims: 2,
        n_cells: vec![n, n],
        n_boxes: layout.len(),
        a_scalar: op.a_scalar(),
        b_scalar: op.b_scalar(),
        sweeps: n_sweeps,
        final_residual: residuals.last().copied().unwrap_or(f64::NAN),
        ml: cfg,
    };
    run.write_to_dir(&out_dir)?;

    let sol_png = out_dir.join("solution.png");
    let res_png = out_dir.join("residual.png");
    save_field_plot(&sol, 0, "u (red-black GS)", &sol_png.to_string_lossy())?;
    save_residual_plot(&residuals, &res_png.to_string_lossy())?;

    log::info!("wrote {}", out_dir.display());
    Ok(())
}
