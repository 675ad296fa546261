//! Bounded Levenberg-Marquardt least squares.
//!
//! Bounded parameters are mapped to an unbounded internal space with the MINUIT
//! transforms, so the solver itself never sees a bound. Standard errors come from the
//! covariance matrix `(JᵀJ)⁻¹` in external space scaled by the reduced chi-square.

use super::params::{FitParameters, Parameter};
use nalgebra::{DMatrix, DVector};

const SQRT_EPS: f64 = 1.490_116_119_384_765_6e-8;

#[derive(Debug, Clone, Copy)]
pub struct SolverOptions {
    pub ftol: f64,
    pub xtol: f64,
    /// Defaults to `2000 * (nvarys + 1)` when unset.
    pub max_nfev: Option<usize>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            ftol: 1e-10,
            xtol: 1e-10,
            max_nfev: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub params: FitParameters,
    pub residual: Vec<f64>,
    pub chisqr: f64,
    pub redchi: f64,
    pub nfev: usize,
    pub ndata: usize,
    pub nvarys: usize,
    pub success: bool,
    pub message: String,
}

fn to_internal(p: &Parameter) -> f64 {
    let value = p.clamped();
    match (p.min.is_finite(), p.max.is_finite()) {
        (true, true) => {
            let ratio = (2.0 * (value - p.min) / (p.max - p.min) - 1.0).clamp(-1.0, 1.0);
            ratio.asin()
        }
        (true, false) => ((value - p.min + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
        (false, true) => ((p.max - value + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
        (false, false) => value,
    }
}

fn to_external(p: &Parameter, internal: f64) -> f64 {
    match (p.min.is_finite(), p.max.is_finite()) {
        (true, true) => p.min + (internal.sin() + 1.0) * (p.max - p.min) / 2.0,
        (true, false) => p.min - 1.0 + (internal * internal + 1.0).sqrt(),
        (false, true) => p.max + 1.0 - (internal * internal + 1.0).sqrt(),
        (false, false) => internal,
    }
}

/// Evaluates parameters and keeps count of the calls.
struct Problem<'a, F> {
    model: F,
    data: &'a [f64],
    template: &'a FitParameters,
    varying: Vec<usize>,
    nfev: usize,
}

impl<F> Problem<'_, F>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    fn external(&self, internal: &DVector<f64>) -> Vec<f64> {
        let mut values: Vec<f64> = self.template.iter().map(|p| p.clamped()).collect();
        let params: Vec<&Parameter> = self.template.iter().collect();
        for (slot, &index) in self.varying.iter().enumerate() {
            values[index] = to_external(params[index], internal[slot]);
        }
        values
    }

    fn residual_of(&mut self, values: &[f64]) -> DVector<f64> {
        self.nfev += 1;
        let model = (self.model)(values);
        DVector::from_iterator(
            self.data.len(),
            model.iter().zip(self.data).map(|(m, d)| m - d),
        )
    }

    fn residual(&mut self, internal: &DVector<f64>) -> DVector<f64> {
        let values = self.external(internal);
        self.residual_of(&values)
    }

    /// Forward difference Jacobian with respect to the internal variables.
    fn jacobian(&mut self, internal: &DVector<f64>, r0: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(r0.len(), internal.len());
        for j in 0..internal.len() {
            let h = step(internal[j]);
            let mut shifted = internal.clone();
            shifted[j] += h;
            let r = self.residual(&shifted);
            jac.set_column(j, &((r - r0) / h));
        }
        jac
    }

    /// Forward difference Jacobian with respect to the external values.
    fn external_jacobian(&mut self, values: &[f64], r0: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(r0.len(), self.varying.len());
        for (slot, &index) in self.varying.clone().iter().enumerate() {
            let h = step(values[index]);
            let mut shifted = values.to_vec();
            shifted[index] += h;
            let r = self.residual_of(&shifted);
            jac.set_column(slot, &((r - r0) / h));
        }
        jac
    }
}

fn step(value: f64) -> f64 {
    if value == 0.0 {
        SQRT_EPS
    } else {
        SQRT_EPS * value.abs()
    }
}

fn all_finite(v: &DVector<f64>) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// Minimises `sum((model(p) - data)^2)` over the varying parameters of `params`.
///
/// `model` receives the values of every parameter in `params` order and returns one value
/// per data point.
pub fn least_squares<F>(model: F, data: &[f64], params: &FitParameters, options: SolverOptions) -> Solution
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let varying: Vec<usize> = params
        .iter()
        .enumerate()
        .filter(|(_, p)| p.vary)
        .map(|(i, _)| i)
        .collect();
    let nvarys = varying.len();
    let ndata = data.len();
    let max_nfev = options.max_nfev.unwrap_or(2000 * (nvarys + 1));

    let mut problem = Problem {
        model,
        data,
        template: params,
        varying,
        nfev: 0,
    };
    let all: Vec<&Parameter> = params.iter().collect();
    let mut internal = DVector::from_iterator(
        nvarys,
        problem.varying.iter().map(|&i| to_internal(all[i])),
    );

    let mut residual = problem.residual(&internal);
    let mut chisqr = residual.norm_squared();
    let mut success = chisqr.is_finite();
    let mut message = if success {
        String::from("Fit succeeded.")
    } else {
        String::from("The model returned non-finite values for the initial parameters.")
    };

    if success && nvarys > 0 {
        let mut lambda = 1e-3;
        let mut converged = false;
        let mut accepted = 0usize;
        let mut failure: Option<String> = None;
        'outer: while problem.nfev < max_nfev {
            let jac = problem.jacobian(&internal, &residual);
            let jtj = jac.transpose() * &jac;
            let gradient = jac.transpose() * &residual;

            loop {
                let mut damped = jtj.clone();
                for i in 0..nvarys {
                    let d = jtj[(i, i)].max(1e-12);
                    damped[(i, i)] += lambda * d;
                }
                let delta = match damped.lu().solve(&(-&gradient)) {
                    Some(delta) if all_finite(&delta) => delta,
                    _ => {
                        lambda *= 10.0;
                        if lambda > 1e16 {
                            failure = Some(String::from(
                                "Fit aborted: the damped normal equations have no finite solution.",
                            ));
                            break 'outer;
                        }
                        continue;
                    }
                };

                let candidate = &internal + &delta;
                let trial = problem.residual(&candidate);
                let trial_chisqr = trial.norm_squared();

                if trial_chisqr.is_finite() && trial_chisqr <= chisqr {
                    let reduction = (chisqr - trial_chisqr) / chisqr.max(f64::MIN_POSITIVE);
                    let step_size = delta.norm() / (internal.norm() + options.xtol);
                    internal = candidate;
                    residual = trial;
                    chisqr = trial_chisqr;
                    accepted += 1;
                    lambda = (lambda / 10.0).max(1e-12);
                    if reduction <= options.ftol || step_size <= options.xtol || chisqr == 0.0 {
                        converged = true;
                        break 'outer;
                    }
                    break;
                }

                lambda *= 10.0;
                if lambda > 1e16 {
                    // No downhill step exists: a minimum if the fit already moved.
                    if accepted > 0 {
                        converged = true;
                    } else {
                        failure = Some(String::from(
                            "Fit aborted: no step from the initial parameters reduced chi-square.",
                        ));
                    }
                    break 'outer;
                }
                if problem.nfev >= max_nfev {
                    break 'outer;
                }
            }
        }

        if !converged {
            success = false;
            message = failure.unwrap_or_else(|| {
                format!("Fit aborted: number of function evaluations > {}", max_nfev)
            });
        }
    }

    let values = problem.external(&internal);
    let nfree = ndata.saturating_sub(nvarys).max(1);
    let redchi = chisqr / nfree as f64;

    let mut fitted = params.clone();
    for (p, value) in fitted.iter_mut().zip(&values) {
        p.value = *value;
        p.stderr = None;
    }

    if success && nvarys > 0 {
        let r0 = problem.residual_of(&values);
        let jac = problem.external_jacobian(&values, &r0);
        let jtj = jac.transpose() * &jac;
        if let Some(covariance) = jtj.try_inverse() {
            let mut targets: Vec<&mut Parameter> = fitted.iter_mut().collect();
            for (slot, &index) in problem.varying.iter().enumerate() {
                let variance = covariance[(slot, slot)] * redchi;
                if variance.is_finite() && variance >= 0.0 {
                    targets[index].stderr = Some(variance.sqrt());
                }
            }
        }
    }

    Solution {
        params: fitted,
        residual: residual.iter().copied().collect(),
        chisqr,
        redchi,
        nfev: problem.nfev,
        ndata,
        nvarys,
        success,
        message,
    }
}
