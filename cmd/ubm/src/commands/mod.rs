//! CLI commands module.

mod adapt;
mod calibrate;
mod score;
mod show;
mod train;
mod util;

pub use adapt::AdaptCommand;
pub use calibrate::CalibrateCommand;
pub use score::ScoreCommand;
pub use show::ShowCommand;
pub use train::TrainCommand;

pub(crate) use util::*;
