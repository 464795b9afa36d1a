// src/error.rs

use thiserror::Error;

/// Errors surfaced to the driver by setters, construction and configuration.
///
/// Programming errors inside the apply/smooth/flux kernels (wrong component counts,
/// applying before `prepare_for_solve`) are assertions, not variants here.
#[derive(Debug, Error)]
pub enum AbecError {
    #[error("shape mismatch in {what}: expected {expected} component(s), got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{what}: field layout does not match the stored coefficient layout")]
    LayoutMismatch { what: &'static str },

    #[error("level ({amrlev}, {mglev}) out of range")]
    LevelOutOfRange { amrlev: usize, mglev: usize },

    #[error("box index {index} out of range (level has {len} boxes)")]
    BoxOutOfRange { index: usize, len: usize },

    #[error("boundary conditions: {0}")]
    Bc(#[from] BcError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BcError {
    #[error("component {comp}, direction {dir}: periodic boundary on a non-periodic domain (or vice versa)")]
    PeriodicMismatch { comp: usize, dir: usize },

    #[error("expected boundary types for {expected} component(s), got {got}")]
    ComponentCount { expected: usize, got: usize },

    #[error("Robin boundary present but no Robin values were set for AMR level {amrlev}")]
    MissingRobinValues { amrlev: usize },

    #[error("Robin boundaries need a single solved component (got {ncomp})")]
    RobinMultiComponent { ncomp: usize },
}

pub type Result<T> = std::result::Result<T, AbecError>;
