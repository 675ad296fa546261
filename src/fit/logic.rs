use super::estimators::{estimate, estimate_2d};
use super::models::{Estimator, FitModel};
use super::params::FitParameters;
use super::result::{build_results, ModelResult, Units};
use super::solver::{least_squares, SolverOptions};
use crate::domain::model::{Grid2D, Table};
use crate::io::qudi::linspace;
use crate::utils::error::{AnalysisError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of fit curve points per data point.
const UPSAMPLING: usize = 10;

/// A fit function together with the estimator providing its start values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitMethod {
    pub model: FitModel,
    pub estimator: Estimator,
}

impl FitMethod {
    pub fn new(model: FitModel, estimator: Estimator) -> Result<Self> {
        if !model.supports(estimator) {
            return Err(AnalysisError::UnsupportedEstimator {
                method: model.name().to_string(),
                estimator: estimator.name().to_string(),
            });
        }
        Ok(Self { model, estimator })
    }

    /// The method with its default estimator, e.g. `lorentziandouble` with `N15`.
    pub fn default_for(model: FitModel) -> Self {
        Self {
            model,
            estimator: model.default_estimator(),
        }
    }

    pub fn parse(name: &str, estimator: Option<&str>) -> Result<Self> {
        let model: FitModel = name.parse()?;
        match estimator {
            Some(estimator) => Self::new(model, estimator.parse()?),
            None => Ok(Self::default_for(model)),
        }
    }
}

impl fmt::Display for FitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.model, self.estimator)
    }
}

#[derive(Debug, Clone)]
pub struct FitOutput {
    pub fit_x: Vec<f64>,
    pub fit_y: Vec<f64>,
    pub result: ModelResult,
}

#[derive(Debug, Clone)]
pub struct Fit2dOutput {
    /// Best fit evaluated on the grid, same shape as the data.
    pub fit: DMatrix<f64>,
    pub result: ModelResult,
}

/// Estimates start values, fits and collects the result of a one dimensional model.
/// `add_params` override the estimated parameters of the same name.
pub(crate) fn fit_model(
    model: FitModel,
    estimator: Estimator,
    x: &[f64],
    y: &[f64],
    add_params: Option<&FitParameters>,
    units: &Units,
) -> Result<ModelResult> {
    let mut init = estimate(model, estimator, x, y)?;
    if let Some(update) = add_params {
        init.substitute(update);
    }
    let init_fit = model.eval(x, &init.values());
    let solution = least_squares(
        |p| model.eval(x, p),
        y,
        &init,
        SolverOptions::default(),
    );
    if !solution.success {
        tracing::warn!("The {} fit did not work: {}", model, solution.message);
    }

    let best_fit = model.eval(x, &solution.params.values());
    let results = build_results(model, &solution.params, units);
    Ok(ModelResult {
        model,
        estimator,
        params: solution.params,
        init_params: init,
        best_fit,
        init_fit,
        residual: solution.residual,
        chisqr: solution.chisqr,
        redchi: solution.redchi,
        nfev: solution.nfev,
        ndata: solution.ndata,
        nvarys: solution.nvarys,
        success: solution.success,
        message: solution.message,
        results,
    })
}

fn fit_model_2d(grid: &Grid2D, estimator: Estimator, units: &Units) -> Result<ModelResult> {
    let model = FitModel::TwoDGaussian;
    let points = grid.points();
    let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.1).collect();
    let values: Vec<f64> = points.iter().map(|p| p.2).collect();

    let init = estimate_2d(&xs, &ys, &values)?;
    let init_fit = model.eval_2d(&xs, &ys, &init.values());
    let solution = least_squares(
        |p| model.eval_2d(&xs, &ys, p),
        &values,
        &init,
        SolverOptions::default(),
    );
    if !solution.success {
        tracing::warn!("The {} fit did not work: {}", model, solution.message);
    }

    let best_fit = model.eval_2d(&xs, &ys, &solution.params.values());
    let results = build_results(model, &solution.params, units);
    Ok(ModelResult {
        model,
        estimator,
        params: solution.params,
        init_params: init,
        best_fit,
        init_fit,
        residual: solution.residual,
        chisqr: solution.chisqr,
        redchi: solution.redchi,
        nfev: solution.nfev,
        ndata: solution.ndata,
        nvarys: solution.nvarys,
        success: solution.success,
        message: solution.message,
        results,
    })
}

/// Front end to the fit functions.
#[derive(Debug, Clone, Default)]
pub struct AnalysisLogic {
    units: Units,
}

impl AnalysisLogic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Labels results with the given axis units (`s` on x reports frequencies in Hz).
    pub fn with_units(x: impl Into<String>, y: impl Into<String>) -> Self {
        Self {
            units: Units {
                x: x.into(),
                y: y.into(),
            },
        }
    }

    /// Fits `y(x)` and evaluates the best fit on ten times as many points between the
    /// first and last x value.
    pub fn perform_fit(
        &self,
        x: &[f64],
        y: &[f64],
        model: FitModel,
        estimator: Estimator,
    ) -> Result<FitOutput> {
        let method = FitMethod::new(model, estimator)?;
        if model.is_2d() {
            return Err(AnalysisError::FitError {
                method: model.name().to_string(),
                message: "use fit_2d for two dimensional data".to_string(),
            });
        }
        tracing::debug!("Fitting {} to {} points", method, x.len());

        let result = fit_model(model, estimator, x, y, None, &self.units).map_err(|e| match e {
            AnalysisError::ValidationError { message } => AnalysisError::FitError {
                method: model.name().to_string(),
                message,
            },
            other => other,
        })?;

        let fit_x = linspace(x[0], x[x.len() - 1], x.len() * UPSAMPLING);
        let fit_y = result.eval(&fit_x);
        Ok(FitOutput {
            fit_x,
            fit_y,
            result,
        })
    }

    /// Fits two columns of a table.
    pub fn fit(&self, x: &str, y: &str, data: &Table, method: FitMethod) -> Result<FitOutput> {
        if method.model.is_2d() {
            return Err(AnalysisError::FitError {
                method: method.model.name().to_string(),
                message: "two dimensional fits need grid data".to_string(),
            });
        }
        let x_values = data.floats(x)?;
        let y_values = data.floats(y)?;
        self.perform_fit(x_values, y_values, method.model, method.estimator)
    }

    pub fn fit_2d(&self, grid: &Grid2D, method: FitMethod) -> Result<Fit2dOutput> {
        if !method.model.is_2d() {
            return Err(AnalysisError::FitError {
                method: method.model.name().to_string(),
                message: "one dimensional fits need column data".to_string(),
            });
        }
        FitMethod::new(method.model, method.estimator)?;
        let result = fit_model_2d(grid, method.estimator, &self.units).map_err(|e| match e {
            AnalysisError::ValidationError { message } => AnalysisError::FitError {
                method: method.model.name().to_string(),
                message,
            },
            other => other,
        })?;
        let fit = DMatrix::from_row_slice(grid.x.len(), grid.y.len(), &result.best_fit);
        Ok(Fit2dOutput { fit, result })
    }

    /// Names of the available one and two dimensional fits.
    pub fn get_all_fits(&self) -> (Vec<&'static str>, Vec<&'static str>) {
        let (two_d, one_d): (Vec<FitModel>, Vec<FitModel>) =
            FitModel::ALL.iter().partition(|m| m.is_2d());
        let one_d: Vec<&'static str> = one_d.iter().map(|m| m.name()).collect();
        let two_d: Vec<&'static str> = two_d.iter().map(|m| m.name()).collect();
        tracing::info!("1d fits: {:?}", one_d);
        tracing::info!("2d fits: {:?}", two_d);
        (one_d, two_d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Column;
    use std::f64::consts::PI;

    fn axis(n: usize, step: f64) -> Vec<f64> {
        (0..n).map(|i| i as f64 * step).collect()
    }

    #[test]
    fn test_fit_method_validation() {
        assert!(FitMethod::new(FitModel::Sine, Estimator::Dip).is_err());
        let method = FitMethod::parse("lorentziandouble", None).unwrap();
        assert_eq!(method.estimator, Estimator::N15);
        assert!(matches!(
            FitMethod::parse("quadratic", None),
            Err(AnalysisError::UnknownFitFunction { .. })
        ));
        assert_eq!(method.to_string(), "lorentziandouble (N15)");
    }

    #[test]
    fn test_get_all_fits() {
        let (one_d, two_d) = AnalysisLogic::new().get_all_fits();
        assert_eq!(one_d.len(), 21);
        assert_eq!(two_d, vec!["twoDgaussian"]);
    }

    #[test]
    fn test_perform_sine_fit() {
        let x = axis(100, 0.01);
        let y: Vec<f64> = x
            .iter()
            .map(|t| 1.0 + 0.4 * (2.0 * PI * 3.0 * t + 0.5).sin())
            .collect();

        let output = AnalysisLogic::with_units("s", "counts")
            .perform_fit(&x, &y, FitModel::Sine, Estimator::Generic)
            .unwrap();

        assert_eq!(output.fit_x.len(), 1000);
        assert_eq!(output.fit_x[0], 0.0);
        assert!((output.fit_x[999] - 0.99).abs() < 1e-12);
        let result = &output.result;
        assert!(result.success, "{}", result.message);
        assert!((result.value("frequency") - 3.0).abs() < 1e-3);
        assert!((result.value("amplitude").abs() - 0.4).abs() < 1e-3);
        assert!((result.value("offset") - 1.0).abs() < 1e-3);
        assert_eq!(result.results["Frequency"].unit, "Hz");
        assert!(result.chisqr < 1e-10);
    }

    #[test]
    fn test_fit_from_table_columns() {
        let x = axis(30, 1.0);
        let y: Vec<f64> = x.iter().map(|v| 0.5 * v - 2.0).collect();
        let mut table = Table::new();
        table.push_column("time", Column::Float(x)).unwrap();
        table.push_column("signal", Column::Float(y)).unwrap();

        let output = AnalysisLogic::new()
            .fit("time", "signal", &table, FitMethod::default_for(FitModel::Linear))
            .unwrap();
        assert!((output.result.value("slope") - 0.5).abs() < 1e-9);
        assert!((output.result.value("offset") + 2.0).abs() < 1e-9);

        assert!(matches!(
            AnalysisLogic::new().fit("time", "missing", &table, FitMethod::default_for(FitModel::Linear)),
            Err(AnalysisError::ColumnError { .. })
        ));
        assert!(AnalysisLogic::new()
            .fit("time", "signal", &table, FitMethod::default_for(FitModel::TwoDGaussian))
            .is_err());
    }

    #[test]
    fn test_too_few_points_is_a_fit_error() {
        let err = AnalysisLogic::new()
            .perform_fit(&[0.0, 1.0], &[1.0, 2.0], FitModel::Sine, Estimator::Generic)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::FitError { .. }));
    }

    #[test]
    fn test_fit_2d_gaussian() {
        let x = axis(15, 1.0);
        let y = axis(12, 1.0);
        let values = DMatrix::from_fn(15, 12, |i, j| {
            let (xi, yj) = (i as f64, j as f64);
            0.5 + 4.0 * (-((xi - 7.0).powi(2) / 8.0 + (yj - 5.0).powi(2) / 4.5)).exp()
        });
        let grid = Grid2D { x, y, values };

        let output = AnalysisLogic::new()
            .fit_2d(&grid, FitMethod::default_for(FitModel::TwoDGaussian))
            .unwrap();
        assert_eq!(output.fit.shape(), (15, 12));
        assert!((output.result.value("center_x") - 7.0).abs() < 1e-3);
        assert!((output.result.value("center_y") - 5.0).abs() < 1e-3);
        assert!((output.result.value("amplitude") - 4.0).abs() < 1e-3);
    }
}
