// src/visualisation.rs

use crate::field::MultiFab;
use plotters::prelude::*;

/// Map a value to a blue–white–red colour using the field's own min/max,
/// so small variations are still visible.
///
/// min maps to blue, max maps to red, midpoint to white.
fn value_to_color(v: f64, min_v: f64, max_v: f64) -> RGBColor {
    // Protect against min ≈ max (e.g. a uniform field)
    let mut lo = min_v;
    let mut hi = max_v;
    if !lo.is_finite() || !hi.is_finite() || (hi - lo).abs() < 1e-300 {
        lo = min_v - 1.0;
        hi = min_v + 1.0;
    }

    let x = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);

    // blue–white–red: x=0 -> blue, x=0.5 -> white, x=1 -> red
    let r = (255.0 * x) as u8;
    let b = (255.0 * (1.0 - x)) as u8;
    let g = (255.0 * (1.0 - (2.0 * (x - 0.5).abs()))).clamp(0.0, 255.0) as u8;

    RGBColor(r, g, b)
}

/// Save one component of a 2D cell-centred level field as a PNG heat map.
/// - x/y axes are cell indices of the level domain
/// - every box is drawn; gaps between boxes stay white
pub fn save_field_plot(
    mf: &MultiFab<f64, 2>,
    comp: usize,
    title: &str,
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if mf.is_empty() {
        return Ok(()); // nothing to plot
    }

    // First pass: min/max and the index extent over all boxes
    let mut min_v = f64::INFINITY;
    let mut max_v = f64::NEG_INFINITY;
    let mut lo = [i64::MAX; 2];
    let mut hi = [i64::MIN; 2];
    for (i, fab) in mf.fabs.iter().enumerate() {
        let vbx = mf.valid_box(i);
        for d in 0..2 {
            lo[d] = lo[d].min(vbx.lo[d]);
            hi[d] = hi[d].max(vbx.hi[d]);
        }
        for iv in vbx.iter() {
            let v = fab[(iv, comp)];
            if v.is_finite() {
                min_v = min_v.min(v);
                max_v = max_v.max(v);
            }
        }
    }
    if !min_v.is_finite() || !max_v.is_finite() {
        min_v = -1.0;
        max_v = 1.0;
    }

    let root = BitMapBackend::new(filename, (800, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(40)
        .caption(title, ("sans-serif", 20))
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(lo[0]..hi[0], lo[1]..hi[1])?;

    chart
        .configure_mesh()
        .x_desc("i (cell index)")
        .y_desc("j (cell index)")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    // One coloured rectangle per cell
    for (i, fab) in mf.fabs.iter().enumerate() {
        let vbx = mf.valid_box(i);
        chart.draw_series(vbx.iter().map(|iv| {
            let color = value_to_color(fab[(iv, comp)], min_v, max_v);
            Rectangle::new([(iv[0], iv[1]), (iv[0] + 1, iv[1] + 1)], color.filled())
        }))?;
    }

    chart.draw_series(std::iter::once(Text::new(
        format!("[{:.3e}, {:.3e}]", min_v, max_v),
        (lo[0], hi[1]),
        ("sans-serif", 15),
    )))?;

    Ok(())
}

/// Plot a residual history (max-norm per sweep) on a log10 axis.
pub fn save_residual_plot(residuals: &[f64], filename: &str) -> Result<(), Box<dyn std::error::Error>> {
    let pts: Vec<(f64, f64)> = residuals
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_finite() && **r > 0.0)
        .map(|(k, r)| (k as f64, r.log10()))
        .collect();
    if pts.is_empty() {
        return Ok(()); // nothing to plot
    }

    let root = BitMapBackend::new(filename, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let x_max = pts.last().map(|p| p.0).unwrap_or(1.0).max(1.0);
    let mut y_min = pts.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let mut y_max = pts.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
    if (y_max - y_min).abs() < 1e-12 {
        y_min -= 1.0;
        y_max += 1.0;
    }

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("Residual vs sweep", ("sans-serif", 30))
        .set_left_and_bottom_label_area_size(60)
        .build_cartesian_2d(0.0..x_max, (y_min - 0.5)..(y_max + 0.5))?;

    chart
        .configure_mesh()
        .x_desc("red-black sweep")
        .y_desc("log10 max |rhs - A u|")
        .x_labels(10)
        .y_labels(10)
        .label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()?;

    chart.draw_series(LineSeries::new(pts, &BLUE))?;

    Ok(())
}
