use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::dataset::CorpusSource;
use crate::em::{self, EmReport};
use crate::kmeans::{self, KmeansReport};
use crate::model::MixtureModel;
use crate::observer::{TracingObserver, TrainObserver};
use crate::{Config, Dataset, UbmError};

/// Runs the background-model pipeline: k-means++ seeding, k-means, EM.
///
/// Owns the model shape, the random source used for seeding and the
/// observer that receives progress checkpoints.
pub struct Trainer<O = TracingObserver> {
    config: Config,
    rng: StdRng,
    observer: O,
}

impl Trainer<TracingObserver> {
    /// Creates a trainer seeded from the OS entropy source.
    pub fn new(config: Config) -> Result<Self, UbmError> {
        config.validate()?;
        Ok(Self {
            config,
            rng: StdRng::from_entropy(),
            observer: TracingObserver,
        })
    }

    /// Creates a trainer whose seeding is reproducible.
    pub fn with_seed(config: Config, seed: u64) -> Result<Self, UbmError> {
        config.validate()?;
        Ok(Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            observer: TracingObserver,
        })
    }
}

impl<O: TrainObserver> Trainer<O> {
    /// Replaces the observer.
    pub fn with_observer<P: TrainObserver>(self, observer: P) -> Trainer<P> {
        Trainer {
            config: self.config,
            rng: self.rng,
            observer,
        }
    }

    pub fn config(&self) -> Config {
        self.config
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Loads a corpus with this trainer's dimension.
    pub fn load_corpus(&self, source: &dyn CorpusSource) -> Result<Dataset, UbmError> {
        source.load(self.config.dim)
    }

    /// Seeds a new model from `data`.
    pub fn initialize(&mut self, data: &Dataset) -> Result<MixtureModel, UbmError> {
        kmeans::initialize(self.config, data, &mut self.rng, &mut self.observer)
    }

    /// Runs k-means on a seeded model.
    pub fn cluster(
        &mut self,
        model: &mut MixtureModel,
        data: &Dataset,
    ) -> Result<KmeansReport, UbmError> {
        kmeans::cluster(model, data, &mut self.observer)
    }

    /// Runs EM on a clustered model.
    pub fn em(&mut self, model: &mut MixtureModel, data: &Dataset) -> Result<EmReport, UbmError> {
        em::train(model, data, &mut self.observer)
    }

    /// Runs all three phases and returns the trained background model.
    pub fn train(&mut self, data: &Dataset) -> Result<MixtureModel, UbmError> {
        let mut model = self.initialize(data)?;
        let km = self.cluster(&mut model, data)?;
        if !km.converged {
            tracing::warn!(
                "ubm: k-means stopped after {} iterations, change={}",
                km.iterations,
                km.change
            );
        }
        let report = self.em(&mut model, data)?;
        if !report.converged {
            tracing::warn!(
                "ubm: EM stopped after {} iterations, change={}",
                report.iterations,
                report.change
            );
        }
        Ok(model)
    }
}
