//! Initial parameter estimates for every fit model.

use super::fourier::{compute_ft, FtWindow};
use super::logic::fit_model;
use super::models::{Estimator, FitModel, GAUSSIAN_FWHM, N14_SPLITTING, N15_SPLITTING};
use super::params::FitParameters;
use super::result::{ModelResult, Units};
use crate::utils::error::{AnalysisError, Result};
use std::f64::consts::{LN_2, PI};

fn invalid(message: impl Into<String>) -> AnalysisError {
    AnalysisError::ValidationError {
        message: message.into(),
    }
}

/// Checks that the data can be fitted with `nparams` free parameters.
pub fn check_1d_input(x: &[f64], y: &[f64], nparams: usize) -> Result<()> {
    if x.len() != y.len() {
        return Err(invalid(format!(
            "x and y have different lengths ({} and {})",
            x.len(),
            y.len()
        )));
    }
    if x.len() < nparams.max(2) {
        return Err(invalid(format!(
            "{} data points are not enough to fit {} parameters",
            x.len(),
            nparams
        )));
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(invalid("data contains NaN or infinite values"));
    }
    Ok(())
}

fn sorted(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut pairs: Vec<(f64, f64)> = x.iter().copied().zip(y.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    pairs.into_iter().unzip()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold(0, |best, (i, v)| if *v > values[best] { i } else { best })
}

fn argmin(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold(0, |best, (i, v)| if *v < values[best] { i } else { best })
}

/// Smallest spacing between neighbouring x values, skipping repeated points.
fn min_x_spacing(x: &[f64]) -> Result<f64> {
    x.windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .filter(|d| *d > 1e-12)
        .min_by(|a, b| a.total_cmp(b))
        .ok_or_else(|| invalid("the x axis contains only identical values, cannot estimate a sine"))
}

fn level(y: &[f64], offset: f64) -> Vec<f64> {
    y.iter().map(|v| v - offset).collect()
}

/// Scans the phase of a sine of known amplitude and frequency; returns the phase in
/// `[-pi, pi)` at which the summed deviation peaks, shifted by pi.
fn scan_phase(x: &[f64], data: &[f64], amplitude: f64, frequency: f64, min_x_diff: f64) -> f64 {
    let steps = 1.0 / (frequency * min_x_diff);
    let iter_steps = if steps.is_finite() {
        (steps as usize).clamp(1, 100_000)
    } else {
        1
    };
    let sum_res: Vec<f64> = (0..iter_steps)
        .map(|s| {
            let shift = s as f64 / iter_steps as f64 * 2.0 * PI;
            x.iter()
                .zip(data)
                .map(|(xi, d)| (d - amplitude * (2.0 * PI * frequency * xi + shift).sin()).abs())
                .sum()
        })
        .collect();
    argmax(&sum_res) as f64 / iter_steps as f64 * 2.0 * PI - PI
}

/// Amplitude, frequency and phase of a sine without offset.
fn estimate_sine_without_offset(x: &[f64], data: &[f64], params: &mut FitParameters, prefix: &str) -> Result<()> {
    let (x, data) = sorted(x, data);
    let amplitude = data
        .iter()
        .fold(0.0f64, |acc, v| acc.max(v.abs()));

    let (dft_x, dft_y) = compute_ft(&x, &data, 1, FtWindow::None, true, false)?;
    let stepsize = x[1] - x[0];

    // Logarithm of the positive part of the spectrum; its maximum is the dominant frequency.
    let frequency = dft_x
        .iter()
        .zip(&dft_y)
        .filter(|(_, a)| **a > 0.0)
        .max_by(|a, b| a.1.ln().total_cmp(&b.1.ln()))
        .map(|(f, _)| f.abs())
        .ok_or_else(|| invalid("the data has no oscillating component"))?;

    let min_x_diff = min_x_spacing(&x)?;
    let phase = scan_phase(&x, &data, amplitude, frequency, min_x_diff);

    params.set(&format!("{}amplitude", prefix), amplitude);
    params.set_bounded(&format!("{}frequency", prefix), frequency, 0.0, 3.0 / stepsize);
    params.set_bounded(&format!("{}phase", prefix), phase, -PI, PI);
    Ok(())
}

fn estimate_sine(x: &[f64], y: &[f64], params: &mut FitParameters) -> Result<()> {
    let offset = mean(y);
    estimate_sine_without_offset(x, &level(y, offset), params, "")?;
    params.set("offset", offset);
    Ok(())
}

/// Sine with exponential decay. The lifetime follows from the width of the spectrum after
/// all components below one standard deviation are dropped.
fn estimate_sine_exponential_decay(x: &[f64], y: &[f64], params: &mut FitParameters) -> Result<()> {
    let (x, y) = sorted(x, y);
    let offset = mean(&y);
    let data = level(&y, offset);
    let amplitude = data.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));

    let (dft_x, mut dft_y) = compute_ft(&x, &data, 1, FtWindow::None, true, false)?;
    if dft_x.len() < 4 {
        return Err(invalid("at least four points are needed to estimate a decaying sine"));
    }
    let stepsize = x[1] - x[0];
    let frequency = dft_x[argmax(&dft_y)].abs();

    let threshold = std_dev(&dft_y);
    for value in dft_y.iter_mut() {
        if *value <= threshold {
            *value = 0.0;
        }
    }
    let df = (dft_x[1] - dft_x[0]).abs();
    let peak = dft_y.iter().fold(0.0f64, |acc, v| acc.max(*v));
    let span = x[x.len() - 1] - x[0];
    let width: f64 = dft_y.iter().map(|v| v * df / peak).sum();
    let lifetime = if width > 0.0 && width.is_finite() {
        0.5 / width
    } else {
        span / 2.0
    };

    let min_x_diff = min_x_spacing(&x)?;
    let phase = scan_phase(&x, &data, amplitude, frequency, min_x_diff).rem_euclid(2.0 * PI);

    let dft_max = dft_x.iter().fold(0.0f64, |acc, v| acc.max(*v));
    params.set_bounded(
        "frequency",
        frequency,
        (0.1 / span).min(dft_x[3]),
        (0.5 / stepsize).min(dft_max - (dft_x[2] - dft_x[0]).abs()),
    );
    params.set_bounded("phase", phase, -2.0 * PI, 2.0 * PI);
    params.set_min("amplitude", amplitude, 0.0);
    params.set("offset", offset);
    params.set_bounded("lifetime", lifetime, 2.0 * stepsize, 1.0 / (df * 0.5));
    Ok(())
}

fn sub_fit(model: FitModel, x: &[f64], y: &[f64]) -> Result<ModelResult> {
    fit_model(model, Estimator::Generic, x, y, None, &Units::default())
}

/// Fits one component at a time, subtracting each best fit before the next.
fn successive_fits(model: FitModel, x: &[f64], y: &[f64], count: usize) -> Result<Vec<ModelResult>> {
    let mut remaining = y.to_vec();
    let mut results = Vec::with_capacity(count);
    for _ in 0..count {
        let result = sub_fit(model, x, &remaining)?;
        for (r, b) in remaining.iter_mut().zip(&result.best_fit) {
            *r -= b;
        }
        results.push(result);
    }
    Ok(results)
}

fn copy_sine(params: &mut FitParameters, prefix: &str, from: &ModelResult) {
    for name in ["amplitude", "frequency", "phase"] {
        params.set(&format!("{}{}", prefix, name), from.value(name));
    }
}

fn estimate_sine_sum(model: FitModel, x: &[f64], y: &[f64], params: &mut FitParameters) -> Result<()> {
    let count = model.sine_components();
    let stepsize = (x[1] - x[0]).abs();
    match model {
        FitModel::SineDouble | FitModel::SineTriple => {
            for (i, result) in successive_fits(FitModel::Sine, x, y, count)?.iter().enumerate() {
                copy_sine(params, &format!("s{}_", i + 1), result);
            }
        }
        FitModel::SineDoubleWithExpDecay | FitModel::SineTripleWithExpDecay => {
            let results = successive_fits(FitModel::SineExponentialDecay, x, y, count)?;
            for (i, result) in results.iter().enumerate() {
                copy_sine(params, &format!("s{}_", i + 1), result);
            }
            let lifetime = results.iter().map(|r| r.value("lifetime")).sum::<f64>() / count as f64;
            params.set_min("lifetime", lifetime, 2.0 * stepsize);
        }
        _ => {
            let results = successive_fits(FitModel::SineExponentialDecay, x, y, count)?;
            for (i, result) in results.iter().enumerate() {
                let prefix = format!("e{}_", i + 1);
                copy_sine(params, &prefix, result);
                params.set_min(&format!("{}lifetime", prefix), result.value("lifetime"), 2.0 * stepsize);
            }
        }
    }
    params.set("offset", mean(y));
    Ok(())
}

/// Amplitude and lifetime from a linear regression of the log of the levelled data.
fn estimate_decay(x: &[f64], y: &[f64], params: &mut FitParameters) -> Result<(f64, f64, f64)> {
    let (x, y) = sorted(x, y);
    let tail = (x.len() / 10).max(1);
    let offset = mean(&y[y.len() - tail..]);
    let sign = if y[0] < offset { -1.0 } else { 1.0 };

    let points: Vec<(f64, f64)> = x
        .iter()
        .zip(&y)
        .filter_map(|(xi, yi)| {
            let levelled = sign * (yi - offset);
            (levelled > 0.0).then(|| (*xi, levelled.ln()))
        })
        .collect();

    let span = x[x.len() - 1] - x[0];
    let spacing = min_x_spacing(&x).unwrap_or(span);
    let (mut amplitude, mut lifetime) = (sign * (y[0] - offset).abs(), span / 2.0);
    if points.len() >= 2 {
        let (slope, intercept) = linear_regression(&points);
        if slope < 0.0 && slope.is_finite() {
            lifetime = -1.0 / slope;
            amplitude = sign * intercept.exp();
        }
    }

    params.set("amplitude", amplitude);
    params.set_min("lifetime", lifetime.max(spacing), spacing);
    params.set("offset", offset);
    Ok((amplitude, lifetime, offset))
}

fn linear_regression(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let my = points.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|p| (p.0 - mx).powi(2)).sum();
    let sxy: f64 = points.iter().map(|p| (p.0 - mx) * (p.1 - my)).sum();
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    (slope, my - slope * mx)
}

/// Position, amplitude and full width at half maximum of the strongest feature, ignoring
/// the indices in `excluded`.
struct Feature {
    index: usize,
    amplitude: f64,
    fwhm: f64,
}

fn find_feature(x: &[f64], y: &[f64], offset: f64, dip: bool, excluded: &[(f64, f64)]) -> Option<Feature> {
    let allowed = |i: usize| !excluded.iter().any(|(lo, hi)| x[i] >= *lo && x[i] <= *hi);
    let candidates = (0..y.len()).filter(|i| allowed(*i));
    let index = if dip {
        candidates.min_by(|a, b| y[*a].total_cmp(&y[*b]))?
    } else {
        candidates.max_by(|a, b| y[*a].total_cmp(&y[*b]))?
    };

    let amplitude = y[index] - offset;
    let half = offset + amplitude / 2.0;
    let beyond = |i: usize| if dip { y[i] < half } else { y[i] > half };
    let mut left = index;
    while left > 0 && beyond(left - 1) {
        left -= 1;
    }
    let mut right = index;
    while right + 1 < y.len() && beyond(right + 1) {
        right += 1;
    }
    let mut fwhm = x[right] - x[left];
    if fwhm <= 0.0 {
        fwhm = (x[x.len() - 1] - x[0]) / (x.len() - 1) as f64;
    }
    Some(Feature {
        index,
        amplitude,
        fwhm,
    })
}

fn set_peak(params: &mut FitParameters, prefix: &str, x: &[f64], center: f64, amplitude: f64, sigma: f64, dip: bool) {
    let (lo, hi) = (x[0], x[x.len() - 1]);
    let spacing = (hi - lo) / (x.len() - 1) as f64;
    let (amp_min, amp_max) = if dip {
        (f64::NEG_INFINITY, 0.0)
    } else {
        (0.0, f64::INFINITY)
    };
    params.set_bounded(&format!("{}amplitude", prefix), amplitude, amp_min, amp_max);
    params.set_bounded(&format!("{}center", prefix), center, lo, hi);
    params.set_bounded(
        &format!("{}sigma", prefix),
        sigma.clamp(spacing / 2.0, hi - lo),
        spacing / 2.0,
        hi - lo,
    );
}

/// Gaussian and Lorentzian dips or peaks; `count` features are located one after the
/// other, each excluding one width around the previous ones.
fn estimate_peaks(
    x: &[f64],
    y: &[f64],
    params: &mut FitParameters,
    count: usize,
    dip: bool,
    prefixes: &[&str],
    fwhm_factor: f64,
) -> Result<()> {
    let (x, y) = sorted(x, y);
    let offset = median(&y);
    let mut excluded = Vec::new();
    for prefix in prefixes.iter().take(count) {
        let feature = find_feature(&x, &y, offset, dip, &excluded)
            .ok_or_else(|| invalid("not enough data to locate every peak"))?;
        let center = x[feature.index];
        set_peak(params, prefix, &x, center, feature.amplitude, feature.fwhm / fwhm_factor, dip);
        excluded.push((center - feature.fwhm, center + feature.fwhm));
    }
    params.set("offset", offset);
    Ok(())
}

fn nearest(x: &[f64], y: &[f64], position: f64, outside: f64) -> f64 {
    if position < x[0] || position > x[x.len() - 1] {
        return outside;
    }
    let index = x
        .iter()
        .enumerate()
        .min_by(|a, b| (a.1 - position).abs().total_cmp(&(b.1 - position).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0);
    y[index]
}

/// Lorentzian dips split by a fixed hyperfine splitting. The deepest point is placed at
/// the arrangement whose other dips sit on the lowest data.
fn estimate_hyperfine(x: &[f64], y: &[f64], params: &mut FitParameters, count: usize, splitting: f64) -> Result<()> {
    let (x, y) = sorted(x, y);
    let offset = median(&y);
    let feature = find_feature(&x, &y, offset, true, &[])
        .ok_or_else(|| invalid("no dip found in the data"))?;
    let deepest = x[feature.index];

    let best_first = (0..count)
        .map(|slot| deepest - slot as f64 * splitting)
        .min_by(|a, b| {
            let depth = |first: f64| -> f64 {
                (0..count)
                    .map(|k| nearest(&x, &y, first + k as f64 * splitting, offset))
                    .sum()
            };
            depth(*a).total_cmp(&depth(*b))
        })
        .unwrap_or(deepest);

    for k in 0..count {
        set_peak(
            params,
            &format!("l{}_", k),
            &x,
            best_first + k as f64 * splitting,
            feature.amplitude,
            feature.fwhm / 2.0,
            true,
        );
    }
    params.set("offset", offset);
    Ok(())
}

fn estimate_antibunching(x: &[f64], y: &[f64], params: &mut FitParameters) -> Result<()> {
    let (x, y) = sorted(x, y);
    let baseline = median(&y);
    let feature = find_feature(&x, &y, baseline, true, &[])
        .ok_or_else(|| invalid("no antibunching dip found"))?;
    let depth = 1.0 - y[feature.index] / baseline;
    let emitters = if depth > 0.0 { (1.0 / depth).clamp(0.5, 1000.0) } else { 1.0 };
    let spacing = min_x_spacing(&x)?;

    params.set_min("amplitude", baseline, 0.0);
    params.set_bounded("emitters", emitters, 0.5, 1000.0);
    params.set("center", x[feature.index]);
    params.set_min("lifetime", (feature.fwhm / 2.0 / LN_2).max(spacing), spacing / 10.0);
    Ok(())
}

fn estimate_hyperbolic_saturation(x: &[f64], y: &[f64], params: &mut FitParameters) -> Result<()> {
    let (x, y) = sorted(x, y);
    let offset = y[0];
    let saturation = y.iter().fold(f64::NEG_INFINITY, |acc, v| acc.max(*v)) - offset;
    let half = offset + saturation / 2.0;
    let p_saturation = x
        .iter()
        .zip(&y)
        .find(|(_, yi)| **yi >= half)
        .map(|(xi, _)| *xi)
        .filter(|p| *p > 0.0)
        .unwrap_or((x[x.len() - 1] - x[0]) / 2.0);

    params.set("I_saturation", saturation);
    params.set_min("P_saturation", p_saturation, 0.0);
    params.set("slope", 0.0);
    params.set("offset", offset);
    Ok(())
}

fn estimate_linear(x: &[f64], y: &[f64], params: &mut FitParameters) -> Result<()> {
    let points: Vec<(f64, f64)> = x.iter().copied().zip(y.iter().copied()).collect();
    let (slope, intercept) = linear_regression(&points);
    params.set("slope", slope);
    params.set("offset", intercept);
    Ok(())
}

/// Fills `params` with initial values for a one dimensional model.
pub fn estimate(model: FitModel, estimator: Estimator, x: &[f64], y: &[f64]) -> Result<FitParameters> {
    let mut params = FitParameters::from_names(&model.param_names());
    check_1d_input(x, y, params.nvarys())?;
    let dip = estimator != Estimator::Peak;

    match model {
        FitModel::Sine => estimate_sine(x, y, &mut params)?,
        FitModel::SineExponentialDecay => estimate_sine_exponential_decay(x, y, &mut params)?,
        FitModel::SineStretchedExponentialDecay => {
            estimate_sine_exponential_decay(x, y, &mut params)?;
            params.set_bounded("beta", 2.0, 0.0, 10.0);
        }
        FitModel::SineDouble
        | FitModel::SineTriple
        | FitModel::SineDoubleWithExpDecay
        | FitModel::SineTripleWithExpDecay
        | FitModel::SineDoubleWithTwoExpDecay
        | FitModel::SineTripleWithThreeExpDecay => estimate_sine_sum(model, x, y, &mut params)?,
        FitModel::DecayExponential => {
            estimate_decay(x, y, &mut params)?;
        }
        FitModel::DecayExponentialStretched => {
            estimate_decay(x, y, &mut params)?;
            params.set_bounded("beta", 1.0, 0.0, 10.0);
        }
        FitModel::Biexponential => {
            let mut single = FitParameters::from_names(&FitModel::DecayExponential.param_names());
            let (amplitude, lifetime, offset) = estimate_decay(x, y, &mut single)?;
            let floor = single.get("lifetime").map(|p| p.min).unwrap_or(0.0);
            params.set("e0_amplitude", amplitude / 2.0);
            params.set_min("e0_lifetime", (lifetime / 3.0).max(floor), floor);
            params.set("e1_amplitude", amplitude / 2.0);
            params.set_min("e1_lifetime", lifetime * 3.0, floor);
            params.set("offset", offset);
        }
        FitModel::Gaussian | FitModel::GaussianLinearOffset => {
            estimate_peaks(x, y, &mut params, 1, dip, &[""], GAUSSIAN_FWHM)?;
            params.set("slope", 0.0);
        }
        FitModel::GaussianDouble => {
            estimate_peaks(x, y, &mut params, 2, dip, &["g0_", "g1_"], GAUSSIAN_FWHM)?
        }
        FitModel::Lorentzian => estimate_peaks(x, y, &mut params, 1, dip, &[""], 2.0)?,
        FitModel::LorentzianDouble => match estimator {
            Estimator::N15 => estimate_hyperfine(x, y, &mut params, 2, N15_SPLITTING)?,
            _ => estimate_peaks(x, y, &mut params, 2, dip, &["l0_", "l1_"], 2.0)?,
        },
        FitModel::LorentzianTriple => match estimator {
            Estimator::N14 => estimate_hyperfine(x, y, &mut params, 3, N14_SPLITTING)?,
            _ => estimate_peaks(x, y, &mut params, 3, dip, &["l0_", "l1_", "l2_"], 2.0)?,
        },
        FitModel::Antibunching => estimate_antibunching(x, y, &mut params)?,
        FitModel::HyperbolicSaturation => estimate_hyperbolic_saturation(x, y, &mut params)?,
        FitModel::Linear => estimate_linear(x, y, &mut params)?,
        FitModel::TwoDGaussian => {
            return Err(AnalysisError::FitError {
                method: model.name().to_string(),
                message: "two dimensional model needs grid data".to_string(),
            })
        }
    }
    Ok(params)
}

/// Initial values for the two dimensional Gaussian from the moments of the data.
pub fn estimate_2d(x: &[f64], y: &[f64], values: &[f64]) -> Result<FitParameters> {
    let model = FitModel::TwoDGaussian;
    let mut params = FitParameters::from_names(&model.param_names());
    if x.len() != values.len() || y.len() != values.len() {
        return Err(invalid("grid coordinates and values differ in length"));
    }
    if values.len() < params.len() {
        return Err(invalid(format!(
            "{} data points are not enough to fit {} parameters",
            values.len(),
            params.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(invalid("data contains NaN or infinite values"));
    }

    let offset = values.iter().fold(f64::INFINITY, |acc, v| acc.min(*v));
    let top = argmax(values);
    let amplitude = values[top] - offset;
    let weights: Vec<f64> = values.iter().map(|v| v - offset).collect();
    let total: f64 = weights.iter().sum();
    let (cx, cy) = (x[top], y[top]);
    let moment = |coords: &[f64], center: f64| -> f64 {
        if total > 0.0 {
            (coords
                .iter()
                .zip(&weights)
                .map(|(c, w)| w * (c - center).powi(2))
                .sum::<f64>()
                / total)
                .sqrt()
        } else {
            0.0
        }
    };
    let span = |coords: &[f64]| {
        let lo = coords.iter().fold(f64::INFINITY, |acc, v| acc.min(*v));
        let hi = coords.iter().fold(f64::NEG_INFINITY, |acc, v| acc.max(*v));
        (lo, hi)
    };
    let (x_lo, x_hi) = span(x);
    let (y_lo, y_hi) = span(y);
    let sigma_x = moment(x, cx).max((x_hi - x_lo) / 100.0);
    let sigma_y = moment(y, cy).max((y_hi - y_lo) / 100.0);

    params.set_min("amplitude", amplitude, 0.0);
    params.set_bounded("center_x", cx, x_lo, x_hi);
    params.set_bounded("center_y", cy, y_lo, y_hi);
    params.set_min("sigma_x", sigma_x, 0.0);
    params.set_min("sigma_y", sigma_y, 0.0);
    params.set_bounded("theta", 0.0, -PI, PI);
    params.set("offset", offset);
    Ok(params)
}
