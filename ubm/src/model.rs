use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Config, UbmError};

/// Training phase reached by a [`MixtureModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Means seeded by k-means++; variances and weights are not set yet.
    Initialized,
    /// K-means has converged; variances and weights are cluster statistics.
    Clustered,
    /// EM has run, or the model was loaded from disk.
    Trained,
    /// Means were MAP-adapted from a background model.
    Adapted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Clustered => write!(f, "clustered"),
            Self::Trained => write!(f, "trained"),
            Self::Adapted => write!(f, "adapted"),
        }
    }
}

/// One diagonal-covariance Gaussian of the mixture.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianComponent {
    /// Mean vector.
    pub mean: Vec<f64>,

    /// Diagonal of the covariance matrix.
    pub var: Vec<f64>,

    /// Mixture weight in [0, 1].
    pub weight: f64,

    /// Samples assigned during the last k-means pass. Zero outside clustering.
    pub count: usize,
}

impl GaussianComponent {
    /// Creates a component centred on `mean` with zero variance and weight.
    pub fn at(mean: Vec<f64>) -> Self {
        let dim = mean.len();
        Self {
            mean,
            var: vec![0.0; dim],
            weight: 0.0,
            count: 0,
        }
    }

    /// Natural log of the diagonal Gaussian density at `x`, floored at
    /// `ln(f64::MIN_POSITIVE)`.
    ///
    /// Evaluated as `-0.5 * sum((x - mean)^2 / var) - 0.5 * sum(ln(2 pi var))`,
    /// so tiny variances neither underflow the normalisation term nor turn
    /// the result into NaN. Variances must be positive; see
    /// [`MixtureModel::check_variances`].
    pub fn log_density(&self, x: &[f64]) -> f64 {
        self.raw_log_density(x).max(LOG_MIN_DENSITY)
    }

    /// Evaluates the diagonal Gaussian density at `x`.
    ///
    /// A result that underflows to zero is returned as `f64::MIN_POSITIVE`.
    /// Very narrow components can overflow to infinity; prefer
    /// [`GaussianComponent::log_density`] when combining densities.
    pub fn density(&self, x: &[f64]) -> f64 {
        let out = self.raw_log_density(x).exp();
        if out == 0.0 { f64::MIN_POSITIVE } else { out }
    }

    fn raw_log_density(&self, x: &[f64]) -> f64 {
        let mut sum = 0.0;
        let mut log_norm = 0.0;
        for ((&xd, &md), &vd) in x.iter().zip(&self.mean).zip(&self.var) {
            let diff = xd - md;
            sum += diff * diff / vd;
            log_norm += (2.0 * PI * vd).ln();
        }
        -0.5 * (sum + log_norm)
    }
}

/// `ln(f64::MIN_POSITIVE)`: the floor applied to every log density.
pub(crate) const LOG_MIN_DENSITY: f64 = -708.3964185322641;

/// `ln(sum(exp(v)))` without overflow. Returns negative infinity when every
/// term is negative infinity, including for an empty input.
pub(crate) fn log_sum_exp(values: impl IntoIterator<Item = f64>) -> f64 {
    // Single pass: `sum` is kept relative to the running maximum.
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for v in values {
        if v == f64::NEG_INFINITY {
            continue;
        }
        if v <= max {
            sum += (v - max).exp();
        } else {
            sum = sum * (max - v).exp() + 1.0;
            max = v;
        }
    }
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + sum.ln()
}

/// Z-normalisation parameters calibrated from a cohort.
///
/// `std` is a standard deviation, not a variance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: f64,
    pub std: f64,
}

/// A diagonal-covariance Gaussian mixture.
///
/// The number of components and the dimension never change after
/// construction. Parameter values are updated in place by clustering, EM
/// and persistence; adaptation produces a new model.
#[derive(Debug, Clone, PartialEq)]
pub struct MixtureModel {
    config: Config,
    components: Vec<GaussianComponent>,
    normalization: Normalization,
    phase: Phase,
}

impl MixtureModel {
    /// Creates a model whose components sit at `centers`.
    pub(crate) fn seeded(config: Config, centers: Vec<Vec<f64>>) -> Self {
        debug_assert_eq!(centers.len(), config.num_components);
        Self {
            config,
            components: centers.into_iter().map(GaussianComponent::at).collect(),
            normalization: Normalization::default(),
            phase: Phase::Initialized,
        }
    }

    /// Builds a trained model from explicit components.
    ///
    /// Every mean and variance must have length `dim`.
    pub fn from_components(
        dim: usize,
        components: Vec<GaussianComponent>,
    ) -> Result<Self, UbmError> {
        let config = Config::new(dim, components.len())?;
        for c in &components {
            for len in [c.mean.len(), c.var.len()] {
                if len != dim {
                    return Err(UbmError::DimensionMismatch {
                        expected: dim,
                        got: len,
                    });
                }
            }
        }
        Ok(Self {
            config,
            components,
            normalization: Normalization::default(),
            phase: Phase::Trained,
        })
    }

    pub fn config(&self) -> Config {
        self.config
    }

    pub fn dim(&self) -> usize {
        self.config.dim
    }

    pub fn num_components(&self) -> usize {
        self.config.num_components
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn components(&self) -> &[GaussianComponent] {
        &self.components
    }

    pub(crate) fn components_mut(&mut self) -> &mut [GaussianComponent] {
        &mut self.components
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    pub fn set_normalization(&mut self, norm: Normalization) {
        self.normalization = norm;
    }

    /// Returns the mixture weights in component order.
    pub fn weights(&self) -> Vec<f64> {
        self.components.iter().map(|c| c.weight).collect()
    }

    /// Weighted likelihood of one frame: sum of `density * weight`.
    pub fn likelihood(&self, x: &[f64]) -> f64 {
        self.log_likelihood(x).exp()
    }

    /// Log of [`MixtureModel::likelihood`], computed without leaving log space.
    pub fn log_likelihood(&self, x: &[f64]) -> f64 {
        log_sum_exp(
            self.components
                .iter()
                .map(|c| c.weight.ln() + c.log_density(x)),
        )
    }

    /// Fails unless clustering has completed.
    pub fn ensure_trained(&self) -> Result<(), UbmError> {
        if self.phase < Phase::Clustered {
            return Err(UbmError::Phase {
                expected: "clustered, trained or adapted",
                got: self.phase,
            });
        }
        Ok(())
    }

    /// Fails with [`UbmError::ZeroVariance`] on the first variance that is
    /// not a positive finite number.
    pub fn check_variances(&self) -> Result<(), UbmError> {
        for (i, c) in self.components.iter().enumerate() {
            if let Some(d) = c.var.iter().position(|&v| !(v > 0.0 && v.is_finite())) {
                return Err(UbmError::ZeroVariance {
                    component: i,
                    dim: d,
                });
            }
        }
        Ok(())
    }

    /// Checks that the model may be evaluated: trained, with positive variances.
    pub(crate) fn ensure_scorable(&self) -> Result<(), UbmError> {
        self.ensure_trained()?;
        self.check_variances()
    }

    /// Fails unless `dim` equals the model dimension.
    pub(crate) fn check_dim(&self, dim: usize) -> Result<(), UbmError> {
        if dim != self.config.dim {
            return Err(UbmError::DimensionMismatch {
                expected: self.config.dim,
                got: dim,
            });
        }
        Ok(())
    }

    /// Returns a serialisable snapshot of every parameter.
    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            dim: self.dim(),
            num_components: self.num_components(),
            phase: self.phase,
            normalization: self.normalization,
            weights: self.weights(),
            means: self.components.iter().map(|c| c.mean.clone()).collect(),
            variances: self.components.iter().map(|c| c.var.clone()).collect(),
            cluster_sizes: self.components.iter().map(|c| c.count).collect(),
        }
    }
}

/// Diagnostic dump of a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub dim: usize,
    pub num_components: usize,
    pub phase: Phase,
    pub normalization: Normalization,
    pub weights: Vec<f64>,
    pub means: Vec<Vec<f64>>,
    pub variances: Vec<Vec<f64>>,
    pub cluster_sizes: Vec<usize>,
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "dim={} components={} phase={} norm_mean={} norm_std={}",
            self.dim, self.num_components, self.phase, self.normalization.mean, self.normalization.std
        )?;
        writeln!(f, "weights:")?;
        for (i, w) in self.weights.iter().enumerate() {
            writeln!(f, "  {i}: {w}")?;
        }
        writeln!(f, "means:")?;
        for (i, m) in self.means.iter().enumerate() {
            writeln!(f, "  {i}: {}", join(m))?;
        }
        writeln!(f, "variances:")?;
        for (i, v) in self.variances.iter().enumerate() {
            writeln!(f, "  {i}: {}", join(v))?;
        }
        writeln!(f, "cluster sizes:")?;
        for (i, n) in self.cluster_sizes.iter().enumerate() {
            writeln!(f, "  {i}: {n}")?;
        }
        Ok(())
    }
}

fn join(v: &[f64]) -> String {
    v.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(" ")
}
