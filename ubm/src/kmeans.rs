//! K-means++ seeding and k-means clustering.
//!
//! Clustering produces the starting point for EM: hard-assigned cluster
//! means, per-cluster diagonal variances and size-proportional weights.

use rand::Rng;

use crate::model::{MixtureModel, Phase};
use crate::observer::TrainObserver;
use crate::{Config, Dataset, UbmError};

/// Candidate draws per k-means++ center; the one with the lowest potential wins.
pub const SEED_TRIALS: usize = 3;

/// K-means stops once the summed squared mean shift drops below this.
pub const KMEANS_THRESHOLD: f64 = 1e-4;

/// Upper bound on k-means iterations.
pub const KMEANS_MAX_ITER: usize = 1000;

/// Outcome of [`cluster`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KmeansReport {
    /// Iterations run.
    pub iterations: usize,
    /// Mean shift of the last iteration.
    pub change: f64,
    /// True if the threshold was reached before the iteration cap.
    pub converged: bool,
}

/// Squared Euclidean distance.
pub(crate) fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Checks that `data` can seed a model of shape `cfg`.
pub fn check_corpus(cfg: &Config, data: &Dataset) -> Result<(), UbmError> {
    cfg.validate()?;
    if data.dim() != cfg.dim {
        return Err(UbmError::DimensionMismatch {
            expected: cfg.dim,
            got: data.dim(),
        });
    }
    if data.is_empty() {
        return Err(UbmError::EmptyDataset);
    }
    let distinct = data.distinct_frames(cfg.num_components);
    if distinct < cfg.num_components {
        return Err(UbmError::TooManyComponents {
            components: cfg.num_components,
            distinct,
        });
    }
    Ok(())
}

/// Picks `k` initial centers from `data` with k-means++.
///
/// The first center is uniform. Each later center is the best of
/// [`SEED_TRIALS`] D²-weighted draws, judged by the total squared distance
/// of all samples to their nearest center if that draw were committed.
/// Callers must run [`check_corpus`] first.
pub fn seed_centers<R, O>(data: &Dataset, k: usize, rng: &mut R, obs: &mut O) -> Vec<Vec<f64>>
where
    R: Rng,
    O: TrainObserver + ?Sized,
{
    let n = data.len();
    let mut centers = Vec::with_capacity(k);

    let first = data.frame(rng.gen_range(0..n));
    centers.push(first.to_vec());

    // dist[i]: squared distance from sample i to its nearest center.
    let mut dist: Vec<f64> = data.frames().map(|f| sq_dist(f, first)).collect();
    let mut potential: f64 = dist.iter().sum();
    let mut trial = vec![0.0; n];
    let mut best = vec![0.0; n];
    obs.seed_center(0, potential);

    for c in 1..k {
        let mut best_potential = f64::INFINITY;
        let mut best_idx = 0;
        for _ in 0..SEED_TRIALS {
            let idx = sample_index(&dist, potential, rng);
            let cand = data.frame(idx);
            let mut s = 0.0;
            for (i, f) in data.frames().enumerate() {
                let d = sq_dist(f, cand).min(dist[i]);
                trial[i] = d;
                s += d;
            }
            if s < best_potential {
                best_potential = s;
                best_idx = idx;
                std::mem::swap(&mut trial, &mut best);
            }
        }
        centers.push(data.frame(best_idx).to_vec());
        std::mem::swap(&mut dist, &mut best);
        potential = best_potential;
        obs.seed_center(c, potential);
    }
    centers
}

/// Draws an index with probability proportional to `dist`.
///
/// Samples at zero distance (already chosen locations) are never drawn.
fn sample_index<R: Rng>(dist: &[f64], total: f64, rng: &mut R) -> usize {
    let threshold = rng.r#gen::<f64>() * total;
    let mut acc = 0.0;
    for (i, &d) in dist.iter().enumerate() {
        acc += d;
        if acc > threshold && d > 0.0 {
            return i;
        }
    }
    // Rounding left the threshold just past the accumulated sum.
    dist.iter().rposition(|&d| d > 0.0).unwrap_or(dist.len() - 1)
}

/// Validates the corpus, seeds centers and returns an [`Phase::Initialized`] model.
pub fn initialize<R, O>(
    cfg: Config,
    data: &Dataset,
    rng: &mut R,
    obs: &mut O,
) -> Result<MixtureModel, UbmError>
where
    R: Rng,
    O: TrainObserver + ?Sized,
{
    check_corpus(&cfg, data)?;
    let centers = seed_centers(data, cfg.num_components, rng, obs);
    let model = MixtureModel::seeded(cfg, centers);
    obs.phase_done(Phase::Initialized, &model);
    Ok(model)
}

/// Hard assignment of samples to components.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Assignment {
    pub labels: Vec<usize>,
    pub counts: Vec<usize>,
}

/// Assigns each sample to its nearest mean; ties go to the lower index.
pub(crate) fn assign(model: &MixtureModel, data: &Dataset) -> Assignment {
    let mut labels = Vec::with_capacity(data.len());
    let mut counts = vec![0usize; model.num_components()];
    for f in data.frames() {
        let mut min = f64::INFINITY;
        let mut min_id = 0;
        for (i, c) in model.components().iter().enumerate() {
            let d = sq_dist(f, &c.mean);
            if d < min {
                min = d;
                min_id = i;
            }
        }
        labels.push(min_id);
        counts[min_id] += 1;
    }
    Assignment { labels, counts }
}

/// Moves every mean to the average of its samples and returns the summed
/// squared shift. Fails without touching the model if a cluster is empty.
pub(crate) fn update_means(
    model: &mut MixtureModel,
    data: &Dataset,
    asg: &Assignment,
) -> Result<f64, UbmError> {
    if let Some(component) = asg.counts.iter().position(|&n| n == 0) {
        return Err(UbmError::EmptyCluster { component });
    }

    let dim = model.dim();
    let mut sums = vec![vec![0.0; dim]; model.num_components()];
    for (f, &l) in data.frames().zip(&asg.labels) {
        for (s, &x) in sums[l].iter_mut().zip(f) {
            *s += x;
        }
    }

    let mut change = 0.0;
    for ((c, mut mean), &n) in model.components_mut().iter_mut().zip(sums).zip(&asg.counts) {
        let n = n as f64;
        for v in mean.iter_mut() {
            *v /= n;
        }
        change += sq_dist(&mean, &c.mean);
        c.mean = mean;
    }
    Ok(change)
}

/// Sets per-cluster variances (population, divided by cluster size),
/// weights (cluster size over corpus size) and sample counts.
fn update_stats(model: &mut MixtureModel, data: &Dataset, asg: &Assignment) {
    let dim = model.dim();
    let total = data.len() as f64;
    let mut sq = vec![vec![0.0; dim]; model.num_components()];
    for (f, &l) in data.frames().zip(&asg.labels) {
        let mean = &model.components()[l].mean;
        for ((s, &x), &m) in sq[l].iter_mut().zip(f).zip(mean) {
            *s += (x - m) * (x - m);
        }
    }
    for ((c, mut var), &n) in model.components_mut().iter_mut().zip(sq).zip(&asg.counts) {
        for v in var.iter_mut() {
            *v /= n as f64;
        }
        c.var = var;
        c.weight = n as f64 / total;
        c.count = n;
    }
}

/// Runs k-means from the model's current means until the mean shift falls
/// below [`KMEANS_THRESHOLD`] or [`KMEANS_MAX_ITER`] iterations pass, then
/// derives variances and weights. The model becomes [`Phase::Clustered`].
///
/// Zero variances (a cluster of identical samples) are left in place; they
/// are reported when the model is next evaluated.
pub fn cluster<O>(
    model: &mut MixtureModel,
    data: &Dataset,
    obs: &mut O,
) -> Result<KmeansReport, UbmError>
where
    O: TrainObserver + ?Sized,
{
    if model.phase() > Phase::Clustered {
        return Err(UbmError::Phase {
            expected: "initialized or clustered",
            got: model.phase(),
        });
    }
    model.check_dim(data.dim())?;
    if data.is_empty() {
        return Err(UbmError::EmptyDataset);
    }

    let mut iterations = 0;
    let mut change;
    let mut asg;
    loop {
        iterations += 1;
        asg = assign(model, data);
        change = update_means(model, data, &asg)?;
        obs.kmeans_iteration(iterations, change);
        if change < KMEANS_THRESHOLD || iterations >= KMEANS_MAX_ITER {
            break;
        }
    }

    update_stats(model, data, &asg);
    model.set_phase(Phase::Clustered);
    obs.phase_done(Phase::Clustered, model);
    Ok(KmeansReport {
        iterations,
        change,
        converged: change < KMEANS_THRESHOLD,
    })
}
