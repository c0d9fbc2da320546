//! Model inspection.

use std::path::PathBuf;

use clap::Args;

use super::{load_model, print_json};
use crate::Cli;

/// Print weights, means, variances and normalization of a model.
#[derive(Args)]
pub struct ShowCommand {
    /// Model file
    model: PathBuf,
}

impl ShowCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let summary = load_model(&self.model)?.summary();
        if cli.json {
            print_json(&summary)?;
        } else {
            print!("{summary}");
        }
        Ok(())
    }
}
