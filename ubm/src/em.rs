//! Expectation-maximisation for a diagonal-covariance mixture.

use crate::model::{GaussianComponent, MixtureModel, Phase, log_sum_exp};
use crate::observer::TrainObserver;
use crate::{Dataset, UbmError};

/// EM stops once the total absolute parameter change drops below this.
pub const EM_THRESHOLD: f64 = 0.002;

/// Upper bound on EM iterations.
pub const EM_MAX_ITER: usize = 4000;

/// Posterior probability of each component for each sample.
///
/// Stored component-major: row `i` holds Pr(component i | sample j) for
/// every sample `j`. Every column sums to 1.
#[derive(Debug, Clone)]
pub struct Responsibilities {
    num_components: usize,
    num_samples: usize,
    values: Vec<f64>,
}

impl Responsibilities {
    /// Allocates a zeroed matrix.
    pub fn new(num_components: usize, num_samples: usize) -> Self {
        Self {
            num_components,
            num_samples,
            values: vec![0.0; num_components * num_samples],
        }
    }

    /// Computes posteriors of `data` under `model` in one pass.
    pub fn compute(model: &MixtureModel, data: &Dataset) -> Result<Self, UbmError> {
        model.ensure_scorable()?;
        model.check_dim(data.dim())?;
        let mut r = Self::new(model.num_components(), data.len());
        r.fill(model, data)?;
        Ok(r)
    }

    /// E-step: overwrites the matrix with posteriors under `model`.
    /// Variances must already be known to be positive.
    pub(crate) fn fill(&mut self, model: &MixtureModel, data: &Dataset) -> Result<(), UbmError> {
        debug_assert_eq!(self.num_components, model.num_components());
        debug_assert_eq!(self.num_samples, data.len());
        let n = self.num_samples;
        let mut log_p = vec![0.0; self.num_components];
        for (j, x) in data.frames().enumerate() {
            for (lp, c) in log_p.iter_mut().zip(model.components()) {
                *lp = c.weight.ln() + c.log_density(x);
            }
            let log_denominator = log_sum_exp(log_p.iter().copied());
            if !log_denominator.is_finite() {
                return Err(UbmError::ZeroLikelihood { sample: j });
            }
            for (i, &lp) in log_p.iter().enumerate() {
                self.values[i * n + j] = (lp - log_denominator).exp();
            }
        }
        Ok(())
    }

    pub fn num_components(&self) -> usize {
        self.num_components
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Pr(component | sample).
    pub fn get(&self, component: usize, sample: usize) -> f64 {
        self.values[component * self.num_samples + sample]
    }

    /// All posteriors of one component.
    pub fn row(&self, component: usize) -> &[f64] {
        let n = self.num_samples;
        &self.values[component * n..(component + 1) * n]
    }

    /// Soft count of one component: the sum of its row.
    pub fn mass(&self, component: usize) -> f64 {
        self.row(component).iter().sum()
    }
}

/// Outcome of [`train`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmReport {
    /// Iterations run.
    pub iterations: usize,
    /// Total parameter change of the last iteration.
    pub change: f64,
    /// True if the threshold was reached before the iteration cap.
    pub converged: bool,
}

/// M-step: re-estimates every parameter from `resp` and returns the summed
/// absolute change of all means, variances and weights.
///
/// Nothing is written to the model unless every component is well defined.
pub(crate) fn m_step(
    model: &mut MixtureModel,
    data: &Dataset,
    resp: &Responsibilities,
) -> Result<f64, UbmError> {
    let dim = model.dim();
    let total = data.len() as f64;
    let mut updated: Vec<GaussianComponent> = Vec::with_capacity(model.num_components());

    for (i, old) in model.components().iter().enumerate() {
        let row = resp.row(i);
        let mass: f64 = row.iter().sum();
        if !(mass > 0.0) {
            return Err(UbmError::ZeroMass { component: i });
        }

        let mut mean = vec![0.0; dim];
        for (x, &g) in data.frames().zip(row) {
            for (m, &xd) in mean.iter_mut().zip(x) {
                *m += xd * g;
            }
        }
        for m in mean.iter_mut() {
            *m /= mass;
        }

        let mut var = vec![0.0; dim];
        for (x, &g) in data.frames().zip(row) {
            for ((v, &xd), &md) in var.iter_mut().zip(x).zip(&mean) {
                *v += g * (xd - md) * (xd - md);
            }
        }
        for (d, v) in var.iter_mut().enumerate() {
            *v /= mass;
            if !(*v > 0.0 && v.is_finite()) {
                return Err(UbmError::ZeroVariance { component: i, dim: d });
            }
        }

        updated.push(GaussianComponent {
            mean,
            var,
            weight: mass / total,
            count: old.count,
        });
    }

    let mut change = 0.0;
    for (c, new) in model.components_mut().iter_mut().zip(updated) {
        change += abs_diff(&c.mean, &new.mean);
        change += abs_diff(&c.var, &new.var);
        change += (new.weight - c.weight).abs();
        *c = new;
    }
    Ok(change)
}

fn abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

/// Runs EM until the total change falls below [`EM_THRESHOLD`] or
/// [`EM_MAX_ITER`] iterations pass. The model becomes [`Phase::Trained`].
///
/// There is no divergence check; the observer sees each iteration's change.
/// On error the model keeps the parameters of the last completed iteration.
pub fn train<O>(model: &mut MixtureModel, data: &Dataset, obs: &mut O) -> Result<EmReport, UbmError>
where
    O: TrainObserver + ?Sized,
{
    if !matches!(model.phase(), Phase::Clustered | Phase::Trained) {
        return Err(UbmError::Phase {
            expected: "clustered or trained",
            got: model.phase(),
        });
    }
    model.check_dim(data.dim())?;
    if data.is_empty() {
        return Err(UbmError::EmptyDataset);
    }
    model.check_variances()?;

    let mut resp = Responsibilities::new(model.num_components(), data.len());
    let mut iterations = 0;
    let mut change;
    loop {
        iterations += 1;
        resp.fill(model, data)?;
        change = m_step(model, data, &resp)?;
        obs.em_iteration(iterations, change);
        if change < EM_THRESHOLD || iterations >= EM_MAX_ITER {
            break;
        }
    }

    model.set_phase(Phase::Trained);
    obs.phase_done(Phase::Trained, model);
    Ok(EmReport {
        iterations,
        change,
        converged: change < EM_THRESHOLD,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use crate::kmeans::{self, tests::two_blobs};
    use crate::observer::NopObserver;
    use crate::observer::tests::Recorder;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn comp(mean: &[f64], var: &[f64], weight: f64) -> GaussianComponent {
        GaussianComponent {
            mean: mean.to_vec(),
            var: var.to_vec(),
            weight,
            count: 0,
        }
    }

    fn clustered(data: &Dataset, k: usize, seed: u64) -> MixtureModel {
        let cfg = Config::new(data.dim(), k).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut model = kmeans::initialize(cfg, data, &mut rng, &mut NopObserver).unwrap();
        kmeans::cluster(&mut model, data, &mut NopObserver).unwrap();
        model
    }

    #[test]
    fn columns_sum_to_one() {
        let model = MixtureModel::from_components(
            2,
            vec![
                comp(&[0.0, 0.0], &[1.0, 2.0], 0.3),
                comp(&[3.0, -1.0], &[0.5, 0.5], 0.5),
                comp(&[40.0, 40.0], &[0.01, 0.01], 0.2),
            ],
        )
        .unwrap();
        let data =
            Dataset::from_frames(2, [[0.1, 0.2], [2.9, -1.1], [100.0, -100.0], [40.0, 40.0]])
                .unwrap();
        let resp = Responsibilities::compute(&model, &data).unwrap();
        assert_eq!(resp.num_components(), 3);
        assert_eq!(resp.num_samples(), 4);
        for j in 0..data.len() {
            let s: f64 = (0..3).map(|i| resp.get(i, j)).sum();
            assert!((s - 1.0).abs() < 1e-9, "sample {j}: sum {s}");
        }
        assert!(resp.get(2, 3) > 0.99);
    }

    #[test]
    fn narrow_components_give_finite_posteriors() {
        let model = MixtureModel::from_components(
            2,
            vec![
                comp(&[0.0, 0.0], &[1e-170, 1e-170], 0.5),
                comp(&[1.0, 1.0], &[1e-170, 1e-170], 0.5),
            ],
        )
        .unwrap();
        let data = Dataset::from_frames(2, [[0.0, 0.0], [1.0, 1.0], [0.5, 0.5]]).unwrap();
        let resp = Responsibilities::compute(&model, &data).unwrap();
        assert_eq!(resp.get(0, 0), 1.0);
        assert_eq!(resp.get(1, 1), 1.0);
        // Both densities hit the floor: posteriors follow the weights.
        assert!((resp.get(0, 2) - 0.5).abs() < 1e-12);
        for j in 0..3 {
            assert!(resp.get(0, j).is_finite() && resp.get(1, j).is_finite());
        }
    }

    #[test]
    fn all_zero_weights_is_zero_likelihood() {
        let model = MixtureModel::from_components(1, vec![comp(&[0.0], &[1.0], 0.0)]).unwrap();
        let data = Dataset::from_frames(1, [[0.5]]).unwrap();
        assert!(matches!(
            Responsibilities::compute(&model, &data),
            Err(UbmError::ZeroLikelihood { sample: 0 })
        ));
    }

    #[test]
    fn compute_rejects_unclustered_model() {
        let data = two_blobs(0.0, 10.0, 5);
        let cfg = Config::new(2, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let model = kmeans::initialize(cfg, &data, &mut rng, &mut NopObserver).unwrap();
        assert!(matches!(
            Responsibilities::compute(&model, &data),
            Err(UbmError::Phase { .. })
        ));
    }

    #[test]
    fn em_on_two_blobs() {
        let data = two_blobs(0.0, 10.0, 50);
        let mut model = clustered(&data, 2, 9);
        let mut rec = Recorder::default();
        let report = train(&mut model, &data, &mut rec).unwrap();

        assert!(report.converged, "{report:?}");
        assert_eq!(rec.em.len(), report.iterations);
        assert_eq!(rec.phases, vec![Phase::Trained]);
        assert_eq!(model.phase(), Phase::Trained);

        let total: f64 = model.weights().iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
        for c in model.components() {
            assert!((c.weight - 0.5).abs() < 1e-6);
            assert!(c.var.iter().all(|&v| v > 0.0));
            let center = if c.mean[0] < 5.0 { 0.0 } else { 10.0 };
            for &m in &c.mean {
                assert!((m - center).abs() < 0.1);
            }
        }
    }

    #[test]
    fn em_on_overlapping_mixture_keeps_invariants() {
        let mut data = Dataset::new(1);
        for i in 0..200 {
            let t = i as f64 / 200.0;
            data.push(&[1.0 + (t * 37.0).sin() * 2.0 + t]).unwrap();
        }
        let mut model = clustered(&data, 3, 5);
        train(&mut model, &data, &mut NopObserver).unwrap();
        let total: f64 = model.weights().iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(model.check_variances().is_ok());
    }

    #[test]
    fn zero_weight_component_has_zero_mass() {
        let data = Dataset::from_frames(1, [[1.0], [2.0], [3.0]]).unwrap();
        let mut model = MixtureModel::from_components(
            1,
            vec![comp(&[2.0], &[1.0], 1.0), comp(&[5.0], &[1.0], 0.0)],
        )
        .unwrap();
        let before = model.clone();
        let err = train(&mut model, &data, &mut NopObserver).unwrap_err();
        assert!(matches!(err, UbmError::ZeroMass { component: 1 }), "got {err:?}");
        assert_eq!(model, before);
    }

    #[test]
    fn zero_variance_blocks_em() {
        let data = Dataset::from_frames(2, [[1.0, 1.0], [1.0, 1.0]]).unwrap();
        let mut model = clustered(&data, 1, 0);
        assert!(matches!(
            train(&mut model, &data, &mut NopObserver),
            Err(UbmError::ZeroVariance { component: 0, .. })
        ));
        assert_eq!(model.phase(), Phase::Clustered);
    }

    #[test]
    fn m_step_reports_change() {
        let data = Dataset::from_frames(1, [[1.0], [3.0]]).unwrap();
        let mut model =
            MixtureModel::from_components(1, vec![comp(&[0.0], &[1.0], 1.0)]).unwrap();
        let resp = Responsibilities::compute(&model, &data).unwrap();
        let change = m_step(&mut model, &data, &resp).unwrap();
        // mean 0 -> 2, var 1 -> 1, weight unchanged.
        let c = &model.components()[0];
        assert_eq!(c.mean, vec![2.0]);
        assert_eq!(c.var, vec![1.0]);
        assert_eq!(c.weight, 1.0);
        assert!((change - 2.0).abs() < 1e-12);
    }
}
