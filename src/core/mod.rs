pub mod etl;
pub mod pipeline;

pub use crate::domain::model::{AnalysisOutput, Dataset};
pub use crate::domain::ports::{Pipeline, Storage};
pub use crate::utils::error::Result;
pub use etl::AnalysisEngine;
pub use pipeline::{run_analysis, AnalysisPipeline};
