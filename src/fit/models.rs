//! Model functions available for fitting.
//!
//! Every model evaluates from a flat slice of parameter values ordered like
//! [`FitModel::param_names`]. Composite models prefix the parameters of each component
//! (`s1_`, `s2_` for summed sines, `e1_` for sines with their own decay, `l0_` for
//! Lorentzians, `g0_` for Gaussians).

use crate::utils::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Conversion between Gaussian sigma and full width at half maximum.
pub const GAUSSIAN_FWHM: f64 = 2.354_820_045_030_949;

/// Hyperfine splitting of the NV centre with a nitrogen-14 nucleus, in Hz.
pub const N14_SPLITTING: f64 = 2.15e6;

/// Hyperfine splitting of the NV centre with a nitrogen-15 nucleus, in Hz.
pub const N15_SPLITTING: f64 = 3.03e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FitModel {
    #[serde(rename = "antibunching")]
    Antibunching,
    #[serde(rename = "biexponential")]
    Biexponential,
    #[serde(rename = "decayexponential")]
    DecayExponential,
    #[serde(rename = "decayexponentialstretched")]
    DecayExponentialStretched,
    #[serde(rename = "gaussian")]
    Gaussian,
    #[serde(rename = "gaussiandouble")]
    GaussianDouble,
    #[serde(rename = "gaussianlinearoffset")]
    GaussianLinearOffset,
    #[serde(rename = "hyperbolicsaturation")]
    HyperbolicSaturation,
    #[serde(rename = "linear")]
    Linear,
    #[serde(rename = "lorentzian")]
    Lorentzian,
    #[serde(rename = "lorentziandouble")]
    LorentzianDouble,
    #[serde(rename = "lorentziantriple")]
    LorentzianTriple,
    #[serde(rename = "sine")]
    Sine,
    #[serde(rename = "sinedouble")]
    SineDouble,
    #[serde(rename = "sinedoublewithexpdecay")]
    SineDoubleWithExpDecay,
    #[serde(rename = "sinedoublewithtwoexpdecay")]
    SineDoubleWithTwoExpDecay,
    #[serde(rename = "sineexponentialdecay")]
    SineExponentialDecay,
    #[serde(rename = "sinestretchedexponentialdecay")]
    SineStretchedExponentialDecay,
    #[serde(rename = "sinetriple")]
    SineTriple,
    #[serde(rename = "sinetriplewithexpdecay")]
    SineTripleWithExpDecay,
    #[serde(rename = "sinetriplewiththreeexpdecay")]
    SineTripleWithThreeExpDecay,
    #[serde(rename = "twoDgaussian")]
    TwoDGaussian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Estimator {
    #[serde(rename = "generic")]
    Generic,
    #[serde(rename = "dip")]
    Dip,
    #[serde(rename = "peak")]
    Peak,
    #[serde(rename = "N14")]
    N14,
    #[serde(rename = "N15")]
    N15,
}

impl Estimator {
    pub fn name(&self) -> &'static str {
        match self {
            Estimator::Generic => "generic",
            Estimator::Dip => "dip",
            Estimator::Peak => "peak",
            Estimator::N14 => "N14",
            Estimator::N15 => "N15",
        }
    }
}

impl fmt::Display for Estimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Estimator {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "generic" => Ok(Estimator::Generic),
            "dip" => Ok(Estimator::Dip),
            "peak" => Ok(Estimator::Peak),
            "N14" => Ok(Estimator::N14),
            "N15" => Ok(Estimator::N15),
            other => Err(AnalysisError::ValidationError {
                message: format!("Unknown estimator '{}'", other),
            }),
        }
    }
}

const SINE: [&str; 3] = ["amplitude", "frequency", "phase"];
const SINE_DECAY: [&str; 4] = ["amplitude", "frequency", "phase", "lifetime"];
const PEAK: [&str; 3] = ["amplitude", "center", "sigma"];

fn prefixed(prefixes: &[&str], names: &[&str], tail: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    for prefix in prefixes {
        for name in names {
            out.push(format!("{}{}", prefix, name));
        }
    }
    out.extend(tail.iter().map(|s| s.to_string()));
    out
}

fn sine(x: f64, amplitude: f64, frequency: f64, phase: f64) -> f64 {
    amplitude * (2.0 * PI * frequency * x + phase).sin()
}

fn decay(x: f64, lifetime: f64) -> f64 {
    (-x / lifetime).exp()
}

fn stretched_decay(x: f64, lifetime: f64, beta: f64) -> f64 {
    (-(x / lifetime).powf(beta)).exp()
}

fn gaussian(x: f64, amplitude: f64, center: f64, sigma: f64) -> f64 {
    amplitude * (-(x - center).powi(2) / (2.0 * sigma * sigma)).exp()
}

fn lorentzian(x: f64, amplitude: f64, center: f64, sigma: f64) -> f64 {
    amplitude * sigma * sigma / ((x - center).powi(2) + sigma * sigma)
}

/// Sum of sines in groups of (amplitude, frequency, phase).
fn sine_sum(x: f64, p: &[f64]) -> f64 {
    p.chunks_exact(3).map(|s| sine(x, s[0], s[1], s[2])).sum()
}

/// Sum of damped sines in groups of (amplitude, frequency, phase, lifetime).
fn damped_sine_sum(x: f64, p: &[f64]) -> f64 {
    p.chunks_exact(4)
        .map(|s| sine(x, s[0], s[1], s[2]) * decay(x, s[3]))
        .sum()
}

fn peak_sum(x: f64, p: &[f64], shape: fn(f64, f64, f64, f64) -> f64) -> f64 {
    p.chunks_exact(3).map(|s| shape(x, s[0], s[1], s[2])).sum()
}

impl FitModel {
    pub const ALL: [FitModel; 22] = [
        FitModel::Antibunching,
        FitModel::Biexponential,
        FitModel::DecayExponential,
        FitModel::DecayExponentialStretched,
        FitModel::Gaussian,
        FitModel::GaussianDouble,
        FitModel::GaussianLinearOffset,
        FitModel::HyperbolicSaturation,
        FitModel::Linear,
        FitModel::Lorentzian,
        FitModel::LorentzianDouble,
        FitModel::LorentzianTriple,
        FitModel::Sine,
        FitModel::SineDouble,
        FitModel::SineDoubleWithExpDecay,
        FitModel::SineDoubleWithTwoExpDecay,
        FitModel::SineExponentialDecay,
        FitModel::SineStretchedExponentialDecay,
        FitModel::SineTriple,
        FitModel::SineTripleWithExpDecay,
        FitModel::SineTripleWithThreeExpDecay,
        FitModel::TwoDGaussian,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FitModel::Antibunching => "antibunching",
            FitModel::Biexponential => "biexponential",
            FitModel::DecayExponential => "decayexponential",
            FitModel::DecayExponentialStretched => "decayexponentialstretched",
            FitModel::Gaussian => "gaussian",
            FitModel::GaussianDouble => "gaussiandouble",
            FitModel::GaussianLinearOffset => "gaussianlinearoffset",
            FitModel::HyperbolicSaturation => "hyperbolicsaturation",
            FitModel::Linear => "linear",
            FitModel::Lorentzian => "lorentzian",
            FitModel::LorentzianDouble => "lorentziandouble",
            FitModel::LorentzianTriple => "lorentziantriple",
            FitModel::Sine => "sine",
            FitModel::SineDouble => "sinedouble",
            FitModel::SineDoubleWithExpDecay => "sinedoublewithexpdecay",
            FitModel::SineDoubleWithTwoExpDecay => "sinedoublewithtwoexpdecay",
            FitModel::SineExponentialDecay => "sineexponentialdecay",
            FitModel::SineStretchedExponentialDecay => "sinestretchedexponentialdecay",
            FitModel::SineTriple => "sinetriple",
            FitModel::SineTripleWithExpDecay => "sinetriplewithexpdecay",
            FitModel::SineTripleWithThreeExpDecay => "sinetriplewiththreeexpdecay",
            FitModel::TwoDGaussian => "twoDgaussian",
        }
    }

    pub fn is_2d(&self) -> bool {
        matches!(self, FitModel::TwoDGaussian)
    }

    /// Estimators accepted by this model, the default first.
    pub fn estimators(&self) -> &'static [Estimator] {
        use Estimator::*;
        match self {
            FitModel::Antibunching => &[Dip],
            FitModel::Gaussian | FitModel::GaussianDouble | FitModel::GaussianLinearOffset => {
                &[Dip, Peak]
            }
            FitModel::Lorentzian => &[Dip, Peak],
            FitModel::LorentzianDouble => &[N15, Dip, Peak],
            FitModel::LorentzianTriple => &[N14, Dip],
            _ => &[Generic],
        }
    }

    pub fn default_estimator(&self) -> Estimator {
        self.estimators()[0]
    }

    pub fn supports(&self, estimator: Estimator) -> bool {
        self.estimators().contains(&estimator)
    }

    /// Number of summed sine components for the sine family.
    pub fn sine_components(&self) -> usize {
        match self {
            FitModel::Sine
            | FitModel::SineExponentialDecay
            | FitModel::SineStretchedExponentialDecay => 1,
            FitModel::SineDouble
            | FitModel::SineDoubleWithExpDecay
            | FitModel::SineDoubleWithTwoExpDecay => 2,
            FitModel::SineTriple
            | FitModel::SineTripleWithExpDecay
            | FitModel::SineTripleWithThreeExpDecay => 3,
            _ => 0,
        }
    }

    pub fn param_names(&self) -> Vec<String> {
        match self {
            FitModel::Antibunching => prefixed(&[""], &["amplitude", "emitters", "center", "lifetime"], &[]),
            FitModel::Biexponential => {
                prefixed(&["e0_", "e1_"], &["amplitude", "lifetime"], &["offset"])
            }
            FitModel::DecayExponential => prefixed(&[""], &["amplitude", "lifetime"], &["offset"]),
            FitModel::DecayExponentialStretched => {
                prefixed(&[""], &["amplitude", "lifetime", "beta"], &["offset"])
            }
            FitModel::Gaussian | FitModel::Lorentzian => prefixed(&[""], &PEAK, &["offset"]),
            FitModel::GaussianDouble => prefixed(&["g0_", "g1_"], &PEAK, &["offset"]),
            FitModel::GaussianLinearOffset => prefixed(&[""], &PEAK, &["slope", "offset"]),
            FitModel::HyperbolicSaturation => prefixed(
                &[""],
                &["I_saturation", "P_saturation"],
                &["slope", "offset"],
            ),
            FitModel::Linear => prefixed(&[""], &["slope"], &["offset"]),
            FitModel::LorentzianDouble => prefixed(&["l0_", "l1_"], &PEAK, &["offset"]),
            FitModel::LorentzianTriple => prefixed(&["l0_", "l1_", "l2_"], &PEAK, &["offset"]),
            FitModel::Sine => prefixed(&[""], &SINE, &["offset"]),
            FitModel::SineDouble => prefixed(&["s1_", "s2_"], &SINE, &["offset"]),
            FitModel::SineDoubleWithExpDecay => {
                prefixed(&["s1_", "s2_"], &SINE, &["lifetime", "offset"])
            }
            FitModel::SineDoubleWithTwoExpDecay => {
                prefixed(&["e1_", "e2_"], &SINE_DECAY, &["offset"])
            }
            FitModel::SineExponentialDecay => prefixed(&[""], &SINE_DECAY, &["offset"]),
            FitModel::SineStretchedExponentialDecay => {
                prefixed(&[""], &SINE_DECAY, &["beta", "offset"])
            }
            FitModel::SineTriple => prefixed(&["s1_", "s2_", "s3_"], &SINE, &["offset"]),
            FitModel::SineTripleWithExpDecay => {
                prefixed(&["s1_", "s2_", "s3_"], &SINE, &["lifetime", "offset"])
            }
            FitModel::SineTripleWithThreeExpDecay => {
                prefixed(&["e1_", "e2_", "e3_"], &SINE_DECAY, &["offset"])
            }
            FitModel::TwoDGaussian => prefixed(
                &[""],
                &["amplitude", "center_x", "center_y", "sigma_x", "sigma_y", "theta"],
                &["offset"],
            ),
        }
    }

    /// Model value at a single point of a one dimensional model.
    pub fn value_at(&self, x: f64, p: &[f64]) -> f64 {
        match self {
            FitModel::Antibunching => {
                let (amplitude, emitters, center, lifetime) = (p[0], p[1], p[2], p[3]);
                amplitude * (1.0 - decay((x - center).abs(), lifetime) / emitters)
            }
            FitModel::Biexponential => {
                p[0] * decay(x, p[1]) + p[2] * decay(x, p[3]) + p[4]
            }
            FitModel::DecayExponential => p[0] * decay(x, p[1]) + p[2],
            FitModel::DecayExponentialStretched => p[0] * stretched_decay(x, p[1], p[2]) + p[3],
            FitModel::Gaussian => gaussian(x, p[0], p[1], p[2]) + p[3],
            FitModel::GaussianDouble => peak_sum(x, &p[..6], gaussian) + p[6],
            FitModel::GaussianLinearOffset => gaussian(x, p[0], p[1], p[2]) + p[3] * x + p[4],
            FitModel::HyperbolicSaturation => p[0] * x / (x + p[1]) + p[2] * x + p[3],
            FitModel::Linear => p[0] * x + p[1],
            FitModel::Lorentzian => lorentzian(x, p[0], p[1], p[2]) + p[3],
            FitModel::LorentzianDouble => peak_sum(x, &p[..6], lorentzian) + p[6],
            FitModel::LorentzianTriple => peak_sum(x, &p[..9], lorentzian) + p[9],
            FitModel::Sine => sine_sum(x, &p[..3]) + p[3],
            FitModel::SineDouble => sine_sum(x, &p[..6]) + p[6],
            FitModel::SineTriple => sine_sum(x, &p[..9]) + p[9],
            FitModel::SineDoubleWithExpDecay => sine_sum(x, &p[..6]) * decay(x, p[6]) + p[7],
            FitModel::SineTripleWithExpDecay => sine_sum(x, &p[..9]) * decay(x, p[9]) + p[10],
            FitModel::SineExponentialDecay => damped_sine_sum(x, &p[..4]) + p[4],
            FitModel::SineDoubleWithTwoExpDecay => damped_sine_sum(x, &p[..8]) + p[8],
            FitModel::SineTripleWithThreeExpDecay => damped_sine_sum(x, &p[..12]) + p[12],
            FitModel::SineStretchedExponentialDecay => {
                sine(x, p[0], p[1], p[2]) * stretched_decay(x, p[3], p[4]) + p[5]
            }
            FitModel::TwoDGaussian => f64::NAN,
        }
    }

    /// Evaluates a one dimensional model over `x`.
    pub fn eval(&self, x: &[f64], p: &[f64]) -> Vec<f64> {
        x.iter().map(|&xi| self.value_at(xi, p)).collect()
    }

    /// Evaluates the rotated two dimensional Gaussian over paired coordinates.
    pub fn eval_2d(&self, x: &[f64], y: &[f64], p: &[f64]) -> Vec<f64> {
        let (amplitude, x0, y0, sigma_x, sigma_y, theta, offset) =
            (p[0], p[1], p[2], p[3], p[4], p[5], p[6]);
        let (sin_t, cos_t) = theta.sin_cos();
        let sx2 = 2.0 * sigma_x * sigma_x;
        let sy2 = 2.0 * sigma_y * sigma_y;
        let a = cos_t * cos_t / sx2 + sin_t * sin_t / sy2;
        let b = -(2.0 * theta).sin() / (2.0 * sx2) + (2.0 * theta).sin() / (2.0 * sy2);
        let c = sin_t * sin_t / sx2 + cos_t * cos_t / sy2;
        x.iter()
            .zip(y)
            .map(|(&xi, &yi)| {
                let dx = xi - x0;
                let dy = yi - y0;
                offset + amplitude * (-(a * dx * dx + 2.0 * b * dx * dy + c * dy * dy)).exp()
            })
            .collect()
    }
}

impl fmt::Display for FitModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FitModel {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        FitModel::ALL
            .iter()
            .copied()
            .find(|m| m.name() == s)
            .ok_or_else(|| AnalysisError::UnknownFitFunction {
                name: s.to_string(),
            })
    }
}
