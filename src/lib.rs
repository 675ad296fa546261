//! Analysis toolkit for qubit sensor measurements: instrument file readers, pulsed signal
//! extraction, least squares fits and a configurable extract/analyse/write pipeline.

pub mod adapters;
pub mod analysis;
pub mod config;
pub mod core;
pub mod domain;
pub mod fit;
pub mod io;
pub mod utils;

pub use adapters::LocalStorage;
#[cfg(feature = "cli")]
pub use config::CliArgs;
pub use config::AnalysisConfig;
pub use core::{etl::AnalysisEngine, pipeline::AnalysisPipeline};
pub use domain::model::{AnalysisOutput, Column, Dataset, Grid2D, Table};
pub use fit::{AnalysisLogic, FitMethod, FitModel};
pub use io::DataFormat;
pub use utils::error::{AnalysisError, Result};
