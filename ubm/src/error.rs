use std::path::PathBuf;

use thiserror::Error;

use crate::model::Phase;

/// Errors returned by ubm operations.
#[derive(Debug, Error)]
pub enum UbmError {
    #[error("ubm: file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("ubm: io: {0}")]
    Io(String),

    #[error("ubm: invalid format: {0}")]
    InvalidFormat(String),

    #[error("ubm: invalid config: {0}")]
    InvalidConfig(String),

    #[error("ubm: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("ubm: dataset is empty")]
    EmptyDataset,

    #[error("ubm: {components} components requested but data has only {distinct} distinct frames")]
    TooManyComponents { components: usize, distinct: usize },

    #[error("ubm: component {component} has no assigned samples")]
    EmptyCluster { component: usize },

    #[error("ubm: component {component} has zero responsibility mass")]
    ZeroMass { component: usize },

    #[error("ubm: sample {sample} has zero likelihood under every component")]
    ZeroLikelihood { sample: usize },

    #[error("ubm: component {component} has zero variance in dimension {dim}")]
    ZeroVariance { component: usize, dim: usize },

    #[error("ubm: cohort of {count} scores has zero standard deviation")]
    DegenerateCohort { count: usize },

    #[error("ubm: model has no usable score normalization (std = {std})")]
    NotCalibrated { std: f64 },

    #[error("ubm: model is {got}, expected {expected}")]
    Phase { expected: &'static str, got: Phase },
}

impl UbmError {
    /// Maps an io error on `path`, turning `NotFound` into [`UbmError::NotFound`].
    pub(crate) fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            UbmError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            UbmError::Io(format!("{}: {err}", path.display()))
        }
    }
}
