//! Cohort z-normalization.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;

use giztoy_ubm::score;

use super::{load_model, print_json, save_model};
use crate::Cli;

/// Score every file in a cohort directory and store the score mean and
/// standard deviation in the model.
#[derive(Args)]
pub struct CalibrateCommand {
    /// Model file, rewritten in place unless -o is given
    model: PathBuf,

    /// Directory with one feature file per cohort recording
    cohort: PathBuf,

    /// Write the calibrated model here instead
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

impl CalibrateCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let mut model = load_model(&self.model)?;
        let norm = score::calibrate_dir(&mut model, &self.cohort)
            .with_context(|| format!("calibrate on {}", self.cohort.display()))?;
        let out = self.output.as_ref().unwrap_or(&self.model);
        save_model(&model, out)?;

        if cli.json {
            print_json(&norm)?;
        } else {
            println!("mean={} std={}", norm.mean, norm.std);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Commands;
    use clap::Parser;
    use giztoy_ubm::{GaussianComponent, MixtureModel, Normalization};

    fn standard_normal() -> MixtureModel {
        MixtureModel::from_components(
            1,
            vec![GaussianComponent {
                mean: vec![0.0],
                var: vec![1.0],
                weight: 1.0,
                count: 0,
            }],
        )
        .unwrap()
    }

    fn run(args: &[&str]) -> anyhow::Result<()> {
        let cli = Cli::parse_from(args.iter().copied());
        match &cli.command {
            Commands::Calibrate(cmd) => cmd.run(&cli),
            _ => unreachable!("not a calibrate command"),
        }
    }

    #[test]
    fn rewrites_model_or_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let cohort = dir.path().join("cohort");
        std::fs::create_dir(&cohort).unwrap();
        std::fs::write(cohort.join("r1.txt"), "0.5\n").unwrap();
        std::fs::write(cohort.join("r2.txt"), "1.5\n2.5\n").unwrap();

        let model_path = dir.path().join("speaker.model");
        save_model(&standard_normal(), &model_path).unwrap();
        let cohort_arg = cohort.to_str().unwrap();
        let model_arg = model_path.to_str().unwrap();

        // Separate output: the input model keeps its parameters.
        let out = dir.path().join("calibrated.model");
        run(&["ubm", "calibrate", model_arg, cohort_arg, "-o", out.to_str().unwrap()]).unwrap();
        assert_eq!(load_model(&model_path).unwrap().normalization(), Normalization::default());
        let calibrated = load_model(&out).unwrap().normalization();
        assert!(calibrated.std > 0.0);

        // In place.
        run(&["ubm", "calibrate", model_arg, cohort_arg]).unwrap();
        assert_eq!(load_model(&model_path).unwrap().normalization(), calibrated);
    }

    #[test]
    fn degenerate_cohort_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let cohort = dir.path().join("cohort");
        std::fs::create_dir(&cohort).unwrap();
        std::fs::write(cohort.join("only.txt"), "0.5\n").unwrap();

        let model_path = dir.path().join("speaker.model");
        save_model(&standard_normal(), &model_path).unwrap();
        let before = std::fs::read_to_string(&model_path).unwrap();

        let err = run(&[
            "ubm",
            "calibrate",
            model_path.to_str().unwrap(),
            cohort.to_str().unwrap(),
        ])
        .unwrap_err();
        assert!(format!("{err:#}").contains("zero standard deviation"), "{err:#}");
        assert_eq!(std::fs::read_to_string(&model_path).unwrap(), before);
    }
}
