//! Background model training.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use serde::{Deserialize, Serialize};

use giztoy_ubm::{Config, Dataset, Trainer};

use super::{load_config_file, print_json, save_model};
use crate::Cli;

/// Train a UBM: k-means++ seeding, k-means, then EM.
#[derive(Args)]
pub struct TrainCommand {
    /// Feature corpus file
    corpus: PathBuf,

    /// Where to write the model
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Training config file (YAML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Feature dimension (overrides config file)
    #[arg(long)]
    dim: Option<usize>,

    /// Number of Gaussian components (overrides config file)
    #[arg(long)]
    components: Option<usize>,

    /// Random seed for k-means++ (overrides config file)
    #[arg(long)]
    seed: Option<u64>,
}

/// Training settings read from `--config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl TrainSettings {
    /// Applies command-line overrides on top of file settings.
    fn merge(self, cmd: &TrainCommand) -> Self {
        Self {
            dim: cmd.dim.or(self.dim),
            components: cmd.components.or(self.components),
            seed: cmd.seed.or(self.seed),
        }
    }

    /// Resolves the model shape, falling back to [`Config::default`].
    fn model_config(&self) -> anyhow::Result<Config> {
        let defaults = Config::default();
        let cfg = Config::new(
            self.dim.unwrap_or(defaults.dim),
            self.components.unwrap_or(defaults.num_components),
        )?;
        Ok(cfg)
    }
}

#[derive(Serialize)]
struct TrainOutput<'a> {
    model: &'a str,
    frames: usize,
    dim: usize,
    components: usize,
}

impl TrainCommand {
    fn settings(&self) -> anyhow::Result<TrainSettings> {
        let file = match &self.config {
            Some(path) => load_config_file(path)?,
            None => TrainSettings::default(),
        };
        Ok(file.merge(self))
    }

    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let settings = self.settings()?;
        let cfg = settings.model_config()?;

        let corpus = Dataset::load_training(&self.corpus, cfg.dim)
            .with_context(|| format!("load corpus {}", self.corpus.display()))?;
        tracing::info!(
            "training {} components on {} frames of dim {}",
            cfg.num_components,
            corpus.len(),
            cfg.dim
        );

        let mut trainer = match settings.seed {
            Some(seed) => Trainer::with_seed(cfg, seed)?,
            None => Trainer::new(cfg)?,
        };
        let model = trainer.train(&corpus).context("train background model")?;
        save_model(&model, &self.output)?;

        if cli.json {
            print_json(&TrainOutput {
                model: &self.output.to_string_lossy(),
                frames: corpus.len(),
                dim: cfg.dim,
                components: cfg.num_components,
            })?;
        } else {
            println!("model written to {}", self.output.display());
        }
        Ok(())
    }
}
