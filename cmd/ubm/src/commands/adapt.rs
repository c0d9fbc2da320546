//! Speaker adaptation.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;

use giztoy_ubm::{adapt, Dataset};

use super::{load_model, print_json, save_model};
use crate::Cli;

/// MAP-adapt the means of a background model to one speaker.
#[derive(Args)]
pub struct AdaptCommand {
    /// Background model file
    model: PathBuf,

    /// Speaker enrollment feature file
    corpus: PathBuf,

    /// Where to write the speaker model
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Relevance factor
    #[arg(long, default_value_t = adapt::RELEVANCE_FACTOR)]
    relevance: f64,
}

impl AdaptCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let ubm = load_model(&self.model)?;
        let enroll = Dataset::load(&self.corpus, ubm.dim())
            .with_context(|| format!("load corpus {}", self.corpus.display()))?;

        let speaker = adapt::adapt_with_relevance(&ubm, &enroll, self.relevance)
            .context("adapt background model")?;
        save_model(&speaker, &self.output)?;

        if cli.json {
            print_json(&serde_json::json!({
                "model": self.output.to_string_lossy(),
                "frames": enroll.len(),
                "relevance": self.relevance,
            }))?;
        } else {
            println!(
                "adapted {} components from {} frames, written to {}",
                speaker.num_components(),
                enroll.len(),
                self.output.display()
            );
        }
        Ok(())
    }
}
