//! MAP adaptation of a background model to one speaker.
//!
//! Only the means move. Each adapted mean is the background mean pulled
//! toward the speaker's responsibility-weighted mean, by an amount that
//! grows with the component's soft count:
//!
//! ```text
//! coef_i     = n_i / (n_i + r)
//! adapted_i  = coef_i * Ex_i + (1 - coef_i) * mean_i
//!            = (sum_t g_it * x_t + r * mean_i) / (n_i + r)
//! ```
//!
//! The second form is the one evaluated. It yields `mean_i` exactly for a
//! component with no soft count and `Ex_i` exactly when `r = 0`.

use crate::em::Responsibilities;
use crate::model::{MixtureModel, Normalization, Phase};
use crate::{Dataset, UbmError};

/// Relevance factor used by [`adapt`].
pub const RELEVANCE_FACTOR: f64 = 16.0;

/// Sufficient statistics of a personal corpus under a background model.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptationStats {
    /// Soft count `n_i` of each component.
    pub counts: Vec<f64>,

    /// Responsibility-weighted sum of samples for each component.
    pub sums: Vec<Vec<f64>>,
}

impl AdaptationStats {
    /// Expected sample `Ex_i` under component `i`, or `None` if `n_i` is 0.
    pub fn expected(&self, i: usize) -> Option<Vec<f64>> {
        let n = self.counts[i];
        if n > 0.0 {
            Some(self.sums[i].iter().map(|s| s / n).collect())
        } else {
            None
        }
    }
}

/// Computes `n_i` and the first-order sums of `data` under `background`.
pub fn statistics(background: &MixtureModel, data: &Dataset) -> Result<AdaptationStats, UbmError> {
    if data.is_empty() {
        return Err(UbmError::EmptyDataset);
    }
    let resp = Responsibilities::compute(background, data)?;
    let dim = background.dim();
    let mut counts = Vec::with_capacity(background.num_components());
    let mut sums = Vec::with_capacity(background.num_components());
    for i in 0..background.num_components() {
        let row = resp.row(i);
        let mut sum = vec![0.0; dim];
        for (x, &g) in data.frames().zip(row) {
            for (s, &xd) in sum.iter_mut().zip(x) {
                *s += g * xd;
            }
        }
        counts.push(row.iter().sum());
        sums.push(sum);
    }
    Ok(AdaptationStats { counts, sums })
}

/// Adapts `background` to `data` with [`RELEVANCE_FACTOR`].
pub fn adapt(background: &MixtureModel, data: &Dataset) -> Result<MixtureModel, UbmError> {
    adapt_with_relevance(background, data, RELEVANCE_FACTOR)
}

/// Adapts `background` to `data` with relevance factor `r`.
///
/// The background is not modified. The result is a new model in
/// [`Phase::Adapted`] with the background's variances and weights and no
/// normalisation parameters.
pub fn adapt_with_relevance(
    background: &MixtureModel,
    data: &Dataset,
    r: f64,
) -> Result<MixtureModel, UbmError> {
    if !(r >= 0.0 && r.is_finite()) {
        return Err(UbmError::InvalidConfig(format!(
            "relevance factor must be finite and non-negative, got {r}"
        )));
    }
    let stats = statistics(background, data)?;
    Ok(apply(background, &stats, r))
}

/// Blends `stats` into a copy of `background`.
pub fn apply(background: &MixtureModel, stats: &AdaptationStats, r: f64) -> MixtureModel {
    let mut model = background.clone();
    for ((c, &n), sum) in model
        .components_mut()
        .iter_mut()
        .zip(&stats.counts)
        .zip(&stats.sums)
    {
        let denom = n + r;
        if denom == 0.0 {
            continue;
        }
        for (m, &s) in c.mean.iter_mut().zip(sum) {
            *m = (s + r * *m) / denom;
        }
    }
    model.set_phase(Phase::Adapted);
    model.set_normalization(Normalization::default());
    tracing::debug!(
        "ubm: adapted {} components, soft counts {:?}",
        model.num_components(),
        stats.counts
    );
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GaussianComponent;

    fn background() -> MixtureModel {
        MixtureModel::from_components(
            2,
            vec![
                GaussianComponent {
                    mean: vec![0.0, 0.0],
                    var: vec![1.0, 1.0],
                    weight: 0.5,
                    count: 0,
                },
                GaussianComponent {
                    mean: vec![10.0, 10.0],
                    var: vec![1.0, 1.0],
                    weight: 0.5,
                    count: 0,
                },
            ],
        )
        .unwrap()
    }

    fn speaker() -> Dataset {
        Dataset::from_frames(2, [[1.0, 0.5], [0.5, 1.5], [1.5, 1.0], [10.5, 9.5]]).unwrap()
    }

    #[test]
    fn only_means_change() {
        let bg = background();
        let adapted = adapt(&bg, &speaker()).unwrap();
        assert_eq!(adapted.phase(), Phase::Adapted);
        assert_eq!(adapted.num_components(), 2);
        for (a, b) in adapted.components().iter().zip(bg.components()) {
            assert_eq!(a.var, b.var);
            assert_eq!(a.weight, b.weight);
            assert_ne!(a.mean, b.mean);
        }
        // Background untouched.
        assert_eq!(bg, background());
    }

    #[test]
    fn matches_coefficient_form() {
        let bg = background();
        let data = speaker();
        let stats = statistics(&bg, &data).unwrap();
        let adapted = adapt(&bg, &data).unwrap();
        for i in 0..2 {
            let n = stats.counts[i];
            let coef = n / (n + RELEVANCE_FACTOR);
            let ex = stats.expected(i).unwrap();
            for d in 0..2 {
                let want = coef * ex[d] + (1.0 - coef) * bg.components()[i].mean[d];
                assert!((adapted.components()[i].mean[d] - want).abs() < 1e-12);
            }
        }
        let total: f64 = stats.counts.iter().sum();
        assert!((total - 4.0).abs() < 1e-9);
    }

    #[test]
    fn zero_relevance_gives_expected_mean() {
        let bg = background();
        let data = speaker();
        let stats = statistics(&bg, &data).unwrap();
        let adapted = adapt_with_relevance(&bg, &data, 0.0).unwrap();
        for i in 0..2 {
            assert_eq!(adapted.components()[i].mean, stats.expected(i).unwrap());
        }
    }

    #[test]
    fn huge_relevance_keeps_background_means() {
        let bg = background();
        let adapted = adapt_with_relevance(&bg, &speaker(), 1e12).unwrap();
        for (a, b) in adapted.components().iter().zip(bg.components()) {
            for (x, y) in a.mean.iter().zip(&b.mean) {
                assert!((x - y).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn zero_count_component_is_untouched() {
        let bg = background();
        let stats = AdaptationStats {
            counts: vec![2.0, 0.0],
            sums: vec![vec![2.0, 4.0], vec![0.0, 0.0]],
        };
        assert!(stats.expected(1).is_none());
        let adapted = apply(&bg, &stats, 0.0);
        assert_eq!(adapted.components()[0].mean, vec![1.0, 2.0]);
        assert_eq!(adapted.components()[1].mean, vec![10.0, 10.0]);
    }

    #[test]
    fn rejects_bad_input() {
        let bg = background();
        assert!(matches!(
            adapt_with_relevance(&bg, &speaker(), -1.0),
            Err(UbmError::InvalidConfig(_))
        ));
        assert!(matches!(
            adapt_with_relevance(&bg, &speaker(), f64::NAN),
            Err(UbmError::InvalidConfig(_))
        ));
        assert!(matches!(adapt(&bg, &Dataset::new(2)), Err(UbmError::EmptyDataset)));
        let wrong_dim = Dataset::from_frames(3, [[1.0, 1.0, 1.0]]).unwrap();
        assert!(matches!(
            adapt(&bg, &wrong_dim),
            Err(UbmError::DimensionMismatch { expected: 2, got: 3 })
        ));
    }
}
