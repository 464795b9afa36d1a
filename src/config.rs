// src/config.rs
//
// Operator configuration.
//
// Defaults are tuned for cell-centred AMR multigrid with refinement ratio 2.
// Every knob can be overridden without recompiling:
//   ABEC_MG_MAX_COARSENING_LEVEL=<n>   (default 30)
//   ABEC_MG_MIN_WIDTH=<cells>          (default 2; smallest box width after coarsening)
//   ABEC_MG_EXEC=serial|threaded       (default threaded)
//   ABEC_MG_VERBOSE=0|1|2              (default 0)
// or from a JSON document with the same field names.

use crate::error::{AbecError, Result};
use crate::parallel::ExecPolicy;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlConfig {
    /// Maximum number of multigrid coarsenings of the coarsest AMR level.
    pub max_coarsening_level: usize,

    /// Uniform multigrid coarsening ratio (also used between AMR levels).
    pub mg_coarsen_ratio: i64,

    /// A box may only be coarsened if it keeps at least this many cells per direction.
    pub min_coarse_width: i64,

    /// Execution of per-box kernels.
    pub exec: ExecPolicy,

    /// 0 = quiet, 1 = lifecycle summaries, 2 = per-level detail.
    pub verbose: u8,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            max_coarsening_level: 30,
            mg_coarsen_ratio: 2,
            min_coarse_width: 2,
            exec: ExecPolicy::Threaded,
            verbose: 0,
        }
    }
}

impl MlConfig {
    /// Defaults overridden by `ABEC_MG_*` environment variables.
    pub fn from_env() -> Self {
        fn get_usize(name: &str) -> Option<usize> {
            std::env::var(name)
                .ok()
                .and_then(|s| s.trim().parse::<usize>().ok())
        }

        let mut cfg = Self::default();
        if let Some(v) = get_usize("ABEC_MG_MAX_COARSENING_LEVEL") {
            cfg.max_coarsening_level = v.min(64);
        }
        if let Some(v) = get_usize("ABEC_MG_MIN_WIDTH") {
            cfg.min_coarse_width = v.clamp(1, 64) as i64;
        }
        if let Ok(v) = std::env::var("ABEC_MG_EXEC") {
            if let Some(p) = ExecPolicy::from_str(&v) {
                cfg.exec = p;
            }
        }
        if let Some(v) = get_usize("ABEC_MG_VERBOSE") {
            cfg.verbose = v.min(2) as u8;
        }
        cfg
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let cfg: Self = serde_json::from_reader(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mg_coarsen_ratio != 2 && self.mg_coarsen_ratio != 4 {
            return Err(AbecError::Config(format!(
                "mg_coarsen_ratio must be 2 or 4, got {}",
                self.mg_coarsen_ratio
            )));
        }
        if self.min_coarse_width < 1 {
            return Err(AbecError::Config("min_coarse_width must be >= 1".into()));
        }
        Ok(())
    }
}

/// Provenance of a demo run, written next to its outputs.
#[derive(Serialize)]
pub struct RunConfig {
    pub binary: String,
    pub dims: usize,
    pub n_cells: Vec<i64>,
    pub n_boxes: usize,
    pub a_scalar: f64,
    pub b_scalar: f64,
    pub sweeps: usize,
    pub final_residual: f64,
    pub ml: MlConfig,
}

impl RunConfig {
    pub fn write_to_dir(&self, out_dir: &Path) -> Result<()> {
        let path = out_dir.join("config.json");
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
