//! Training progress callbacks.
//!
//! The numeric routines never print. They report to a [`TrainObserver`] at
//! fixed checkpoints: after every k-means and EM iteration, and at the end
//! of each phase. The default implementation forwards to `tracing`.

use crate::model::{MixtureModel, Phase};

/// Receives training checkpoints. All methods default to no-ops.
pub trait TrainObserver {
    /// Called after each k-means++ center is committed.
    fn seed_center(&mut self, _index: usize, _potential: f64) {}

    /// Called after each k-means iteration with the summed squared mean shift.
    fn kmeans_iteration(&mut self, _iteration: usize, _change: f64) {}

    /// Called after each EM iteration with the total absolute parameter change.
    fn em_iteration(&mut self, _iteration: usize, _change: f64) {}

    /// Called when a phase completes.
    fn phase_done(&mut self, _phase: Phase, _model: &MixtureModel) {}
}

/// Observer that logs through the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TrainObserver for TracingObserver {
    fn seed_center(&mut self, index: usize, potential: f64) {
        tracing::trace!("ubm: seeded center {} potential={}", index, potential);
    }

    fn kmeans_iteration(&mut self, iteration: usize, change: f64) {
        tracing::debug!("ubm: k-means iteration {} change={}", iteration, change);
    }

    fn em_iteration(&mut self, iteration: usize, change: f64) {
        tracing::debug!("ubm: EM iteration {} change={}", iteration, change);
    }

    fn phase_done(&mut self, phase: Phase, model: &MixtureModel) {
        let sizes: Vec<usize> = model.components().iter().map(|c| c.count).collect();
        tracing::info!(
            "ubm: {} model ready: {} components x {} dims",
            phase,
            model.num_components(),
            model.dim()
        );
        tracing::debug!("ubm: weights={:?}", model.weights());
        if phase == Phase::Clustered {
            tracing::debug!("ubm: cluster sizes={:?}", sizes);
        }
    }
}

/// Observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopObserver;

impl TrainObserver for NopObserver {}

impl<T: TrainObserver + ?Sized> TrainObserver for &mut T {
    fn seed_center(&mut self, index: usize, potential: f64) {
        (**self).seed_center(index, potential)
    }

    fn kmeans_iteration(&mut self, iteration: usize, change: f64) {
        (**self).kmeans_iteration(iteration, change)
    }

    fn em_iteration(&mut self, iteration: usize, change: f64) {
        (**self).em_iteration(iteration, change)
    }

    fn phase_done(&mut self, phase: Phase, model: &MixtureModel) {
        (**self).phase_done(phase, model)
    }
}
