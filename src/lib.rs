// src/lib.rs

pub mod assembly;
pub mod bc;
pub mod coeffs;
pub mod config;
pub mod error;
pub mod field;
pub mod geometry;
pub mod index;
pub mod layout;
pub mod levels;
pub mod metric;
pub mod operator;
pub mod parallel;
pub mod restrict;
pub mod robin;
pub mod singular;
pub mod smoother;
pub mod stencil;
pub mod visualisation;

pub use bc::{BcTable, BcType};
pub use config::MlConfig;
pub use error::{AbecError, BcError, Result};
pub use field::{Fab, IMultiFab, MultiFab};
pub use levels::MlHierarchy;
pub use operator::AbecLaplacian;
