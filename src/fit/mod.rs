//! Least squares fitting of the measurement models: sines with and without decay,
//! exponential decays, Gaussian and Lorentzian lines, saturation curves, antibunching
//! and a two dimensional Gaussian.

pub mod estimators;
pub mod fourier;
pub mod logic;
pub mod models;
pub mod params;
pub mod result;
pub mod solver;

pub use fourier::{compute_ft, ft_windows, FtWindow};
pub use logic::{AnalysisLogic, Fit2dOutput, FitMethod, FitOutput};
pub use models::{Estimator, FitModel};
pub use params::{FitParameters, Parameter};
pub use result::{ModelResult, ResultEntry, Units};
