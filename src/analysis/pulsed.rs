//! Signal extraction from pulsed measurements.
//!
//! Laser data holds one row per laser pulse and one column per time bin of the photon
//! counter. Each extractor turns every row into one signal value and its measurement
//! error, using a signal window and, for the referenced variants, a normalisation window
//! later in the pulse.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_SIGNAL_START: f64 = 100e-9;
pub const DEFAULT_SIGNAL_END: f64 = 300e-9;
pub const DEFAULT_NORM_START: f64 = 1000e-9;
pub const DEFAULT_NORM_END: f64 = 2000e-9;
pub const DEFAULT_BIN_WIDTH: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PulsedMethod {
    /// Mean of the signal window.
    #[default]
    Mean,
    /// Signal window mean minus reference window mean.
    MeanReference,
    /// Signal window mean divided by reference window mean.
    MeanNorm,
}

impl fmt::Display for PulsedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PulsedMethod::Mean => "mean",
            PulsedMethod::MeanReference => "mean-reference",
            PulsedMethod::MeanNorm => "mean-norm",
        };
        f.write_str(name)
    }
}

/// Time windows in seconds plus the counter bin width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulsedWindows {
    #[serde(default = "default_signal_start")]
    pub signal_start: f64,
    #[serde(default = "default_signal_end")]
    pub signal_end: f64,
    #[serde(default = "default_norm_start")]
    pub norm_start: f64,
    #[serde(default = "default_norm_end")]
    pub norm_end: f64,
    #[serde(default = "default_bin_width")]
    pub bin_width: f64,
}

fn default_signal_start() -> f64 {
    DEFAULT_SIGNAL_START
}

fn default_signal_end() -> f64 {
    DEFAULT_SIGNAL_END
}

fn default_norm_start() -> f64 {
    DEFAULT_NORM_START
}

fn default_norm_end() -> f64 {
    DEFAULT_NORM_END
}

fn default_bin_width() -> f64 {
    DEFAULT_BIN_WIDTH
}

impl Default for PulsedWindows {
    fn default() -> Self {
        Self {
            signal_start: DEFAULT_SIGNAL_START,
            signal_end: DEFAULT_SIGNAL_END,
            norm_start: DEFAULT_NORM_START,
            norm_end: DEFAULT_NORM_END,
            bin_width: DEFAULT_BIN_WIDTH,
        }
    }
}

/// Signal and error per laser pulse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulsedSignal {
    pub signal: Vec<f64>,
    pub error: Vec<f64>,
}

impl PulsedSignal {
    fn zeros(n: usize) -> Self {
        Self {
            signal: vec![0.0; n],
            error: vec![0.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.signal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signal.is_empty()
    }
}

pub fn analyse(method: PulsedMethod, laser_data: &DMatrix<f64>, windows: &PulsedWindows) -> PulsedSignal {
    match method {
        PulsedMethod::Mean => analyse_mean(
            laser_data,
            windows.signal_start,
            windows.signal_end,
            windows.bin_width,
        ),
        PulsedMethod::MeanReference => analyse_mean_reference(
            laser_data,
            windows.signal_start,
            windows.signal_end,
            windows.norm_start,
            windows.norm_end,
            windows.bin_width,
        ),
        PulsedMethod::MeanNorm => analyse_mean_norm(
            laser_data,
            windows.signal_start,
            windows.signal_end,
            windows.norm_start,
            windows.norm_end,
            windows.bin_width,
        ),
    }
}

fn valid_bin_width(bin_width: f64) -> bool {
    bin_width.is_finite() && bin_width > 0.0
}

/// Converts a time in seconds to a bin index, rounding half to even.
fn to_bin(time: f64, bin_width: f64) -> i64 {
    (time / bin_width).round_ties_even() as i64
}

/// Values of `row` in `[start, end)`, clamped to the row like a slice.
fn window(row: &[f64], start: i64, end: i64) -> &[f64] {
    let len = row.len() as i64;
    let clamp = |idx: i64| -> usize {
        let idx = if idx < 0 { (idx + len).max(0) } else { idx.min(len) };
        idx as usize
    };
    let (start, end) = (clamp(start), clamp(end));
    if start >= end {
        &[]
    } else {
        &row[start..end]
    }
}

fn mean_or_zero(values: &[f64]) -> (f64, f64) {
    let sum: f64 = values.iter().sum();
    let mean = if values.is_empty() {
        0.0
    } else {
        sum / values.len() as f64
    };
    (sum, mean)
}

fn rows(laser_data: &DMatrix<f64>) -> impl Iterator<Item = Vec<f64>> + '_ {
    laser_data.row_iter().map(|row| row.iter().copied().collect())
}

/// Mean photon count of the signal window for every laser pulse.
pub fn analyse_mean(
    laser_data: &DMatrix<f64>,
    signal_start: f64,
    signal_end: f64,
    bin_width: f64,
) -> PulsedSignal {
    let num_of_lasers = laser_data.nrows();
    if !valid_bin_width(bin_width) {
        return PulsedSignal::zeros(num_of_lasers);
    }

    let start_bin = to_bin(signal_start, bin_width);
    let end_bin = to_bin(signal_end, bin_width);

    let mut result = PulsedSignal::zeros(num_of_lasers);
    for (ii, row) in rows(laser_data).enumerate() {
        let values = window(&row, start_bin, end_bin);
        let sum: f64 = values.iter().sum();
        let signal = if values.is_empty() {
            f64::NAN
        } else {
            sum / values.len() as f64
        };
        let signal_error = sum.sqrt() / (end_bin - start_bin) as f64;

        // Negative or NaN means leave the zero placeholder in place.
        if signal < 0.0 || signal.is_nan() {
            continue;
        }
        result.signal[ii] = signal;
        result.error[ii] = signal_error;
    }
    result
}

/// Signal window mean minus reference window mean. The error follows Gaussian error
/// propagation of both window sums.
pub fn analyse_mean_reference(
    laser_data: &DMatrix<f64>,
    signal_start: f64,
    signal_end: f64,
    norm_start: f64,
    norm_end: f64,
    bin_width: f64,
) -> PulsedSignal {
    let num_of_lasers = laser_data.nrows();
    if !valid_bin_width(bin_width) {
        return PulsedSignal::zeros(num_of_lasers);
    }

    let signal_start_bin = to_bin(signal_start, bin_width);
    let signal_end_bin = to_bin(signal_end, bin_width);
    let norm_start_bin = to_bin(norm_start, bin_width);
    let norm_end_bin = to_bin(norm_end, bin_width);

    let mut result = PulsedSignal::zeros(num_of_lasers);
    for (ii, row) in rows(laser_data).enumerate() {
        let (reference_sum, reference_mean) =
            mean_or_zero(window(&row, norm_start_bin, norm_end_bin));
        let (signal_sum, signal_mean) =
            mean_or_zero(window(&row, signal_start_bin, signal_end_bin));

        let signal = signal_mean - reference_mean;
        result.signal[ii] = signal;
        result.error[ii] = if signal_sum != 0.0 && reference_sum != 0.0 {
            signal * (1.0 / signal_sum.abs() + 1.0 / reference_sum.abs()).sqrt()
        } else {
            0.0
        };
    }
    result
}

/// Signal window mean normalised by the reference window mean.
pub fn analyse_mean_norm(
    laser_data: &DMatrix<f64>,
    signal_start: f64,
    signal_end: f64,
    norm_start: f64,
    norm_end: f64,
    bin_width: f64,
) -> PulsedSignal {
    let num_of_lasers = laser_data.nrows();
    if !valid_bin_width(bin_width) {
        return PulsedSignal::zeros(num_of_lasers);
    }

    let signal_start_bin = to_bin(signal_start, bin_width);
    let signal_end_bin = to_bin(signal_end, bin_width);
    let norm_start_bin = to_bin(norm_start, bin_width);
    let norm_end_bin = to_bin(norm_end, bin_width);

    let mut result = PulsedSignal::zeros(num_of_lasers);
    for (ii, row) in rows(laser_data).enumerate() {
        let (reference_sum, reference_mean) =
            mean_or_zero(window(&row, norm_start_bin, norm_end_bin));
        let (signal_sum, signal_mean) =
            mean_or_zero(window(&row, signal_start_bin, signal_end_bin));

        let signal = if reference_mean > 0.0 && signal_mean >= 0.0 {
            signal_mean / reference_mean
        } else {
            0.0
        };
        result.signal[ii] = signal;
        result.error[ii] = if reference_sum > 0.0 && signal_sum > 0.0 {
            signal * (1.0 / signal_sum + 1.0 / reference_sum).sqrt()
        } else {
            0.0
        };
    }
    result
}
