// src/levels/mod.rs

pub mod hierarchy;
pub mod overset;

pub use hierarchy::MlHierarchy;
pub use overset::{coarsen_overset_mask, overset_mask_from_fn};
