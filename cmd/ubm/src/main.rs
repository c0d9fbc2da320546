//! ubm CLI - train, adapt, calibrate and score GMM-UBM speaker models.

use clap::{Parser, Subcommand};

mod commands;

use commands::{AdaptCommand, CalibrateCommand, ScoreCommand, ShowCommand, TrainCommand};

/// ubm CLI - Gaussian mixture background models for speaker verification.
///
/// Typical flow:
///   ubm train background.txt -o ubm.model --dim 12 --components 64
///   ubm adapt ubm.model alice.txt -o alice.model
///   ubm calibrate alice.model cohort/
///   ubm score alice.model probe.txt --normalized
#[derive(Parser)]
#[command(name = "ubm")]
#[command(about = "GMM-UBM speaker model tool")]
#[command(version)]
pub struct Cli {
    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a background model from a feature corpus
    Train(TrainCommand),
    /// MAP-adapt a background model to a speaker
    Adapt(AdaptCommand),
    /// Compute z-normalization parameters from a cohort directory
    Calibrate(CalibrateCommand),
    /// Score a feature file against a model
    Score(ScoreCommand),
    /// Print model parameters
    Show(ShowCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Train(cmd) => cmd.run(&cli),
        Commands::Adapt(cmd) => cmd.run(&cli),
        Commands::Calibrate(cmd) => cmd.run(&cli),
        Commands::Score(cmd) => cmd.run(&cli),
        Commands::Show(cmd) => cmd.run(&cli),
    }
}
