//! Likelihood scoring and cohort z-normalisation.
//!
//! The raw score of a sequence is the log of the *average* per-frame
//! likelihood, not the average of per-frame log-likelihoods. The sum is
//! taken in log space, so very narrow or very distant components give a
//! finite score. Callers that need a different aggregate can compute it
//! from [`MixtureModel::log_likelihood`] directly.

use std::path::Path;

use crate::dataset::load_cohort;
use crate::model::{MixtureModel, Normalization, log_sum_exp};
use crate::{Dataset, UbmError};

/// Returns `ln(mean_t(sum_i density_i(x_t) * w_i))` for the frames of `data`.
pub fn raw_score(model: &MixtureModel, data: &Dataset) -> Result<f64, UbmError> {
    model.ensure_scorable()?;
    model.check_dim(data.dim())?;
    if data.is_empty() {
        return Err(UbmError::EmptyDataset);
    }
    let log_total = log_sum_exp(data.frames().map(|x| model.log_likelihood(x)));
    Ok(log_total - (data.len() as f64).ln())
}

/// Returns `(raw - mean) / std` using the model's calibrated normalisation.
pub fn normalized_score(model: &MixtureModel, data: &Dataset) -> Result<f64, UbmError> {
    let norm = model.normalization();
    norm.check()?;
    Ok(norm.apply(raw_score(model, data)?))
}

impl Normalization {
    /// Population mean and standard deviation (divide by N) of `scores`.
    ///
    /// Fails if the deviation is zero, which includes cohorts of one.
    pub fn from_scores(scores: &[f64]) -> Result<Self, UbmError> {
        let count = scores.len();
        if count == 0 {
            return Err(UbmError::DegenerateCohort { count });
        }
        let n = count as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let var = scores.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n;
        let std = var.sqrt();
        if !(std > 0.0 && std.is_finite() && mean.is_finite()) {
            return Err(UbmError::DegenerateCohort { count });
        }
        Ok(Self { mean, std })
    }

    /// Fails unless `std` is a positive finite number.
    pub fn check(&self) -> Result<(), UbmError> {
        if self.std > 0.0 && self.std.is_finite() {
            Ok(())
        } else {
            Err(UbmError::NotCalibrated { std: self.std })
        }
    }

    /// Z-normalises a raw score. Call [`Normalization::check`] first.
    pub fn apply(&self, raw: f64) -> f64 {
        (raw - self.mean) / self.std
    }
}

/// Scores every cohort recording and stores their mean and deviation on `model`.
///
/// The model is left unchanged on error.
pub fn calibrate(model: &mut MixtureModel, cohort: &[Dataset]) -> Result<Normalization, UbmError> {
    let scores = cohort
        .iter()
        .map(|rec| raw_score(model, rec))
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!("ubm: cohort scores {:?}", scores);
    let norm = Normalization::from_scores(&scores)?;
    model.set_normalization(norm);
    tracing::info!(
        "ubm: calibrated on {} recordings: mean={} std={}",
        scores.len(),
        norm.mean,
        norm.std
    );
    Ok(norm)
}

/// Loads every file in `dir` as a cohort recording and calls [`calibrate`].
pub fn calibrate_dir(
    model: &mut MixtureModel,
    dir: impl AsRef<Path>,
) -> Result<Normalization, UbmError> {
    let cohort = load_cohort(dir, model.dim())?;
    calibrate(model, &cohort)
}
