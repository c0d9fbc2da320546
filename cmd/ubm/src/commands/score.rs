//! Scoring.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;

use giztoy_ubm::{score, Dataset};

use super::{load_model, print_json};
use crate::Cli;

/// Score a feature file: log of the average frame likelihood, optionally
/// z-normalized with the model's cohort parameters.
#[derive(Args)]
pub struct ScoreCommand {
    /// Model file
    model: PathBuf,

    /// Feature file to score
    corpus: PathBuf,

    /// Apply cohort z-normalization
    #[arg(long)]
    normalized: bool,
}

impl ScoreCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let model = load_model(&self.model)?;
        let data = Dataset::load(&self.corpus, model.dim())
            .with_context(|| format!("load corpus {}", self.corpus.display()))?;

        let value = if self.normalized {
            score::normalized_score(&model, &data)?
        } else {
            score::raw_score(&model, &data)?
        };

        if cli.json {
            print_json(&serde_json::json!({
                "score": value,
                "normalized": self.normalized,
                "frames": data.len(),
            }))?;
        } else {
            println!("{value}");
        }
        Ok(())
    }
}
