use super::models::{Estimator, FitModel, GAUSSIAN_FWHM};
use super::params::FitParameters;
use crate::domain::model::{FitSummary, FitValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// One human readable fit result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub value: f64,
    pub error: Option<f64>,
    pub unit: String,
}

impl ResultEntry {
    fn new(value: f64, error: Option<f64>, unit: impl Into<String>) -> Self {
        Self {
            value,
            error,
            unit: unit.into(),
        }
    }
}

/// Axis units used to label results.
#[derive(Debug, Clone, PartialEq)]
pub struct Units {
    pub x: String,
    pub y: String,
}

impl Default for Units {
    fn default() -> Self {
        Self {
            x: "arb. unit".to_string(),
            y: "arb. unit".to_string(),
        }
    }
}

impl Units {
    fn frequency(&self) -> String {
        if self.x == "s" {
            "Hz".to_string()
        } else {
            format!("1/{}", self.x)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelResult {
    pub model: FitModel,
    pub estimator: Estimator,
    pub params: FitParameters,
    pub init_params: FitParameters,
    pub best_fit: Vec<f64>,
    pub init_fit: Vec<f64>,
    pub residual: Vec<f64>,
    pub chisqr: f64,
    pub redchi: f64,
    pub nfev: usize,
    pub ndata: usize,
    pub nvarys: usize,
    pub success: bool,
    pub message: String,
    pub results: BTreeMap<String, ResultEntry>,
}

impl ModelResult {
    pub fn value(&self, name: &str) -> f64 {
        self.params.value(name)
    }

    /// Evaluates the best fit of a one dimensional model on new x values.
    pub fn eval(&self, x: &[f64]) -> Vec<f64> {
        self.model.eval(x, &self.params.values())
    }

    pub fn summary(&self, input: &str) -> FitSummary {
        FitSummary {
            input: input.to_string(),
            method: self.model.name().to_string(),
            estimator: self.estimator.name().to_string(),
            success: self.success,
            message: self.message.clone(),
            chisqr: Some(self.chisqr),
            redchi: Some(self.redchi),
            parameters: self
                .params
                .iter()
                .map(|p| {
                    (
                        p.name.clone(),
                        FitValue {
                            value: p.value,
                            stderr: p.stderr,
                        },
                    )
                })
                .collect(),
            results: self.results.clone(),
        }
    }
}

fn scaled(err: Option<f64>, factor: f64) -> Option<f64> {
    err.map(|e| e * factor)
}

/// Contrast in percent of a sine of amplitude `a` on top of offset `o`.
fn sine_contrast(a: f64, a_err: Option<f64>, o: f64, o_err: Option<f64>) -> ResultEntry {
    let sum = o + a;
    let value = 2.0 * a / sum * 100.0;
    let error = match (a_err, o_err) {
        (Some(ae), Some(oe)) => Some(
            ((2.0 * a / (sum * sum) * oe).abs() + ((2.0 / sum + 2.0 * a / (sum * sum)) * ae).abs())
                * 100.0,
        ),
        _ => None,
    };
    ResultEntry::new(value, error, "%")
}

/// Depth of a dip or height of a peak relative to the offset, in percent.
fn peak_contrast(a: f64, a_err: Option<f64>, o: f64, o_err: Option<f64>) -> ResultEntry {
    let ratio = (a / o).abs();
    let error = match (a_err, o_err) {
        (Some(ae), Some(oe)) => Some(ratio * ((ae / a).powi(2) + (oe / o).powi(2)).sqrt() * 100.0),
        _ => None,
    };
    ResultEntry::new(ratio * 100.0, error, "%")
}

struct Builder<'a> {
    params: &'a FitParameters,
    units: &'a Units,
    out: BTreeMap<String, ResultEntry>,
}

impl Builder<'_> {
    fn plain(&mut self, key: String, name: &str, unit: String) {
        self.out.insert(
            key,
            ResultEntry::new(self.params.value(name), self.params.stderr(name), unit),
        );
    }

    fn sine(&mut self, prefix: &str, suffix: &str) {
        let p = self.params;
        let frequency_name = format!("{}frequency", prefix);
        let frequency = p.value(&frequency_name);
        let frequency_err = p.stderr(&frequency_name);
        let period = 1.0 / frequency;
        let period_err = frequency_err.map(|e| e / (frequency * frequency));
        self.out.insert(
            format!("Period{}", suffix),
            ResultEntry::new(
                if period.is_finite() { period } else { 0.0 },
                period_err,
                self.units.x.clone(),
            ),
        );
        self.out.insert(
            format!("Frequency{}", suffix),
            ResultEntry::new(frequency, frequency_err, self.units.frequency()),
        );

        let phase_name = format!("{}phase", prefix);
        self.out.insert(
            format!("Phase{}", suffix),
            ResultEntry::new(
                p.value(&phase_name) * 180.0 / PI,
                scaled(p.stderr(&phase_name), 180.0 / PI),
                "deg",
            ),
        );

        let amplitude_name = format!("{}amplitude", prefix);
        self.plain(format!("Amplitude{}", suffix), &amplitude_name, self.units.y.clone());
        self.out.insert(
            format!("Contrast{}", suffix),
            sine_contrast(
                p.value(&amplitude_name),
                p.stderr(&amplitude_name),
                p.value("offset"),
                p.stderr("offset"),
            ),
        );
    }

    fn peak(&mut self, prefix: &str, suffix: &str, fwhm_factor: f64) {
        let p = self.params;
        let sigma_name = format!("{}sigma", prefix);
        self.out.insert(
            format!("FWHM{}", suffix),
            ResultEntry::new(
                p.value(&sigma_name) * fwhm_factor,
                scaled(p.stderr(&sigma_name), fwhm_factor),
                self.units.x.clone(),
            ),
        );
        self.plain(format!("Center{}", suffix), &format!("{}center", prefix), self.units.x.clone());
        let amplitude_name = format!("{}amplitude", prefix);
        self.plain(format!("Amplitude{}", suffix), &amplitude_name, self.units.y.clone());
        self.out.insert(
            format!("Contrast{}", suffix),
            peak_contrast(
                p.value(&amplitude_name),
                p.stderr(&amplitude_name),
                p.value("offset"),
                p.stderr("offset"),
            ),
        );
    }
}

fn suffix(index: usize, count: usize) -> String {
    if count == 1 {
        String::new()
    } else {
        format!(" {}", index + 1)
    }
}

/// Builds the result map of a fit, keyed by display name.
pub fn build_results(model: FitModel, params: &FitParameters, units: &Units) -> BTreeMap<String, ResultEntry> {
    let mut b = Builder {
        params,
        units,
        out: BTreeMap::new(),
    };
    let x_unit = units.x.clone();
    let y_unit = units.y.clone();

    match model {
        FitModel::Sine
        | FitModel::SineDouble
        | FitModel::SineTriple
        | FitModel::SineExponentialDecay
        | FitModel::SineStretchedExponentialDecay
        | FitModel::SineDoubleWithExpDecay
        | FitModel::SineTripleWithExpDecay => {
            let count = model.sine_components();
            for i in 0..count {
                let prefix = if count == 1 { String::new() } else { format!("s{}_", i + 1) };
                b.sine(&prefix, &suffix(i, count));
            }
            if params.get("lifetime").is_some() {
                b.plain("Lifetime".into(), "lifetime", x_unit);
            }
            if params.get("beta").is_some() {
                b.plain("Beta".into(), "beta", String::new());
            }
        }
        FitModel::SineDoubleWithTwoExpDecay | FitModel::SineTripleWithThreeExpDecay => {
            let count = model.sine_components();
            for i in 0..count {
                let prefix = format!("e{}_", i + 1);
                let suffix = suffix(i, count);
                b.sine(&prefix, &suffix);
                b.plain(format!("Lifetime{}", suffix), &format!("{}lifetime", prefix), x_unit.clone());
            }
        }
        FitModel::DecayExponential | FitModel::DecayExponentialStretched => {
            b.plain("Amplitude".into(), "amplitude", y_unit.clone());
            b.plain("Lifetime".into(), "lifetime", x_unit);
            if params.get("beta").is_some() {
                b.plain("Beta".into(), "beta", String::new());
            }
        }
        FitModel::Biexponential => {
            for i in 0..2 {
                let suffix = suffix(i, 2);
                b.plain(format!("Amplitude{}", suffix), &format!("e{}_amplitude", i), y_unit.clone());
                b.plain(format!("Lifetime{}", suffix), &format!("e{}_lifetime", i), x_unit.clone());
            }
        }
        FitModel::Gaussian | FitModel::GaussianLinearOffset => {
            b.peak("", "", GAUSSIAN_FWHM);
            if params.get("slope").is_some() {
                b.plain("Slope".into(), "slope", format!("{}/{}", y_unit, x_unit));
            }
        }
        FitModel::GaussianDouble => {
            for i in 0..2 {
                b.peak(&format!("g{}_", i), &suffix(i, 2), GAUSSIAN_FWHM);
            }
        }
        FitModel::Lorentzian => b.peak("", "", 2.0),
        FitModel::LorentzianDouble | FitModel::LorentzianTriple => {
            let count = if model == FitModel::LorentzianDouble { 2 } else { 3 };
            for i in 0..count {
                b.peak(&format!("l{}_", i), &suffix(i, count), 2.0);
            }
        }
        FitModel::Linear => {
            b.plain("Slope".into(), "slope", format!("{}/{}", y_unit, x_unit));
        }
        FitModel::HyperbolicSaturation => {
            b.plain("I_saturation".into(), "I_saturation", y_unit.clone());
            b.plain("P_saturation".into(), "P_saturation", x_unit);
            b.plain("Slope".into(), "slope", String::new());
        }
        FitModel::Antibunching => {
            b.plain("Amplitude".into(), "amplitude", y_unit.clone());
            b.plain("Emitters".into(), "emitters", String::new());
            b.plain("Center".into(), "center", x_unit.clone());
            b.plain("Lifetime".into(), "lifetime", x_unit);
        }
        FitModel::TwoDGaussian => {
            b.plain("Amplitude".into(), "amplitude", y_unit.clone());
            b.plain("Center x".into(), "center_x", x_unit.clone());
            b.plain("Center y".into(), "center_y", x_unit.clone());
            b.plain("Sigma x".into(), "sigma_x", x_unit.clone());
            b.plain("Sigma y".into(), "sigma_y", x_unit);
            b.out.insert(
                "Theta".into(),
                ResultEntry::new(
                    params.value("theta") * 180.0 / PI,
                    scaled(params.stderr("theta"), 180.0 / PI),
                    "deg",
                ),
            );
        }
    }

    if params.get("offset").is_some() {
        b.plain("Offset".into(), "offset", y_unit);
    }
    b.out
}
