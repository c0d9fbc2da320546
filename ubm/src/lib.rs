//! Gaussian mixture universal background model (GMM-UBM) for speaker
//! verification.
//!
//! # Pipeline
//!
//! ```text
//! feature corpus ──► k-means++ seeding ──► k-means ──► EM ──► background model
//!                                                                  │
//! speaker corpus ──────────────► MAP adaptation (means only) ◄─────┘
//!                                        │
//! test frames ──► raw score ──► z-normalised score (cohort mean / std)
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use giztoy_ubm::{adapt, persist, score, Config, Dataset, Trainer};
//!
//! # fn main() -> Result<(), giztoy_ubm::UbmError> {
//! let cfg = Config::new(12, 64)?;
//! let corpus = Dataset::load_training("background.txt", cfg.dim)?;
//! let ubm = Trainer::new(cfg)?.train(&corpus)?;
//! persist::save_file(&ubm, "ubm.model")?;
//!
//! let enroll = Dataset::load("alice.txt", cfg.dim)?;
//! let mut alice = adapt::adapt(&ubm, &enroll)?;
//! score::calibrate_dir(&mut alice, "cohort/")?;
//!
//! let probe = Dataset::load("probe.txt", cfg.dim)?;
//! let z = score::normalized_score(&alice, &probe)?;
//! # let _ = z;
//! # Ok(())
//! # }
//! ```
//!
//! # Feature files
//!
//! Whitespace-separated reals, `dim` per frame. Frames whose first value is
//! exactly zero are dropped when loading.
//!
//! # Failure modes
//!
//! Degenerate statistics (an empty k-means cluster, a component with no
//! EM mass, a zero variance, a cohort with no spread) are returned as
//! [`UbmError`] values and never written into a model as NaN or infinity.

pub mod adapt;
mod config;
pub mod dataset;
pub mod em;
mod error;
pub mod kmeans;
mod model;
pub mod observer;
pub mod persist;
pub mod score;
mod trainer;

pub use config::Config;
pub use dataset::{load_cohort, CorpusSource, Dataset, FeatureFile};
pub use em::{EmReport, Responsibilities};
pub use error::UbmError;
pub use kmeans::KmeansReport;
pub use model::{GaussianComponent, MixtureModel, ModelSummary, Normalization, Phase};
pub use observer::{NopObserver, TrainObserver, TracingObserver};
pub use trainer::Trainer;
