use serde::{Deserialize, Serialize};

use crate::UbmError;

/// Shape of a mixture model.
///
/// Fixed when a [`MixtureModel`](crate::MixtureModel) is created. There are no
/// setters: a different shape means a new model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Feature vector dimension (e.g. 12 MFCC coefficients).
    pub dim: usize,

    /// Number of Gaussian components.
    pub num_components: usize,
}

impl Config {
    /// Creates a validated config.
    pub fn new(dim: usize, num_components: usize) -> Result<Self, UbmError> {
        let cfg = Self { dim, num_components };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks that both sizes are positive.
    pub fn validate(&self) -> Result<(), UbmError> {
        if self.dim == 0 {
            return Err(UbmError::InvalidConfig("dim must be positive".into()));
        }
        if self.num_components == 0 {
            return Err(UbmError::InvalidConfig(
                "num_components must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dim: 12,
            num_components: 100,
        }
    }
}
