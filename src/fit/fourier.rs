//! Amplitude spectra used by the sine estimators.

use crate::utils::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::str::FromStr;

/// Window functions applied to the data before the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FtWindow {
    #[default]
    None,
    Hamming,
    Hann,
    Blackman,
    Triang,
    Flattop,
    Bartlett,
    Parzen,
    Bohman,
    Blackmanharris,
    Nuttall,
    Barthann,
}

impl FtWindow {
    pub const ALL: [FtWindow; 12] = [
        FtWindow::None,
        FtWindow::Hamming,
        FtWindow::Hann,
        FtWindow::Blackman,
        FtWindow::Triang,
        FtWindow::Flattop,
        FtWindow::Bartlett,
        FtWindow::Parzen,
        FtWindow::Bohman,
        FtWindow::Blackmanharris,
        FtWindow::Nuttall,
        FtWindow::Barthann,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FtWindow::None => "none",
            FtWindow::Hamming => "hamming",
            FtWindow::Hann => "hann",
            FtWindow::Blackman => "blackman",
            FtWindow::Triang => "triang",
            FtWindow::Flattop => "flattop",
            FtWindow::Bartlett => "bartlett",
            FtWindow::Parzen => "parzen",
            FtWindow::Bohman => "bohman",
            FtWindow::Blackmanharris => "blackmanharris",
            FtWindow::Nuttall => "nuttall",
            FtWindow::Barthann => "barthann",
        }
    }

    /// Factor restoring the amplitude lost to the window's mean value.
    pub fn amplitude_norm(&self) -> f64 {
        match self {
            FtWindow::None => 1.0,
            FtWindow::Hamming => 1.0 / 0.54,
            FtWindow::Hann => 1.0 / 0.5,
            FtWindow::Blackman => 1.0 / 0.42,
            FtWindow::Triang => 1.0 / 0.5,
            FtWindow::Flattop => 1.0 / 0.2156,
            FtWindow::Bartlett => 1.0 / 0.5,
            FtWindow::Parzen => 1.0 / 0.375,
            FtWindow::Bohman => 1.0 / 0.405_284_7,
            FtWindow::Blackmanharris => 1.0 / 0.35875,
            FtWindow::Nuttall => 1.0 / 0.363_581_9,
            FtWindow::Barthann => 1.0 / 0.5,
        }
    }

    /// Symmetric window of length `m`.
    pub fn values(&self, m: usize) -> Vec<f64> {
        if m <= 1 {
            return vec![1.0; m];
        }
        let last = (m - 1) as f64;
        let cosine = |coefficients: &[f64]| -> Vec<f64> {
            (0..m)
                .map(|n| {
                    coefficients
                        .iter()
                        .enumerate()
                        .map(|(k, a)| {
                            let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                            sign * a * (2.0 * PI * k as f64 * n as f64 / last).cos()
                        })
                        .sum()
                })
                .collect()
        };

        match self {
            FtWindow::None => vec![1.0; m],
            FtWindow::Hamming => cosine(&[0.54, 0.46]),
            FtWindow::Hann => cosine(&[0.5, 0.5]),
            FtWindow::Blackman => cosine(&[0.42, 0.5, 0.08]),
            FtWindow::Flattop => cosine(&[
                0.215_578_95,
                0.416_631_58,
                0.277_263_158,
                0.083_578_947,
                0.006_947_368,
            ]),
            FtWindow::Blackmanharris => cosine(&[0.35875, 0.48829, 0.14128, 0.01168]),
            FtWindow::Nuttall => cosine(&[0.363_581_9, 0.489_177_5, 0.136_599_5, 0.010_641_1]),
            FtWindow::Triang => {
                let denom = if m % 2 == 1 { (m + 1) as f64 } else { m as f64 };
                (0..m)
                    .map(|n| 1.0 - (2.0 * n as f64 - last).abs() / denom)
                    .collect()
            }
            FtWindow::Bartlett => (0..m)
                .map(|n| 1.0 - (2.0 * n as f64 - last).abs() / last)
                .collect(),
            FtWindow::Parzen => {
                let half = m as f64 / 2.0;
                (0..m)
                    .map(|n| {
                        let k = (n as f64 - last / 2.0).abs();
                        let r = k / half;
                        if k <= last / 4.0 {
                            1.0 - 6.0 * r * r + 6.0 * r * r * r
                        } else {
                            2.0 * (1.0 - r).powi(3)
                        }
                    })
                    .collect()
            }
            FtWindow::Bohman => (0..m)
                .map(|n| {
                    let fac = (-1.0 + 2.0 * n as f64 / last).abs();
                    if fac >= 1.0 {
                        0.0
                    } else {
                        (1.0 - fac) * (PI * fac).cos() + (PI * fac).sin() / PI
                    }
                })
                .collect(),
            FtWindow::Barthann => (0..m)
                .map(|n| {
                    let fac = (n as f64 / last - 0.5).abs();
                    0.62 - 0.48 * fac + 0.38 * (2.0 * PI * fac).cos()
                })
                .collect(),
        }
    }
}

impl FromStr for FtWindow {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        FtWindow::ALL
            .iter()
            .copied()
            .find(|w| w.name() == s)
            .ok_or_else(|| AnalysisError::ValidationError {
                message: format!("Unknown window function '{}'", s),
            })
    }
}

/// Every available window with its amplitude normalisation factor.
pub fn ft_windows() -> Vec<(FtWindow, f64)> {
    FtWindow::ALL
        .iter()
        .map(|w| (*w, w.amplitude_norm()))
        .collect()
}

/// Non-negative half of the amplitude spectrum of `y` sampled on `x`.
///
/// `zeropad` appends `len(y) * zeropad` zeros (sinc interpolation of the spectrum).
/// With `psd` the squared amplitude is returned. The frequency spacing is derived from the
/// last two x values, rounded to 12 decimals.
pub fn compute_ft(
    x: &[f64],
    y: &[f64],
    zeropad: usize,
    window: FtWindow,
    base_corr: bool,
    psd: bool,
) -> Result<(Vec<f64>, Vec<f64>)> {
    if x.len() < 2 || x.len() != y.len() {
        return Err(AnalysisError::ValidationError {
            message: format!(
                "Fourier transform needs at least two points and matching lengths (x: {}, y: {})",
                x.len(),
                y.len()
            ),
        });
    }

    let n = y.len();
    let mean = y.iter().sum::<f64>() / n as f64;
    let window_values = window.values(n);
    let mut padded = vec![0.0; n * (zeropad + 1)];
    for (i, value) in y.iter().enumerate() {
        let corrected = if base_corr { value - mean } else { *value };
        padded[i] = corrected * window_values[i];
    }

    let total = padded.len();
    let middle = total.div_ceil(2);
    let spacing = ((x[n - 1] - x[n - 2]) * 1e12).round() / 1e12;
    let power = if psd { 2 } else { 1 };
    let scale = 2.0 / n as f64 * window.amplitude_norm();

    let mut freqs = Vec::with_capacity(middle);
    let mut amplitudes = Vec::with_capacity(middle);
    for k in 0..middle {
        let (mut re, mut im) = (0.0, 0.0);
        for (t, value) in padded.iter().enumerate().take(n) {
            let angle = -2.0 * PI * (k * t % total) as f64 / total as f64;
            re += value * angle.cos();
            im += value * angle.sin();
        }
        freqs.push((k as f64 / (total as f64 * spacing)).abs());
        amplitudes.push((scale * re.hypot(im)).powi(power));
    }
    Ok((freqs, amplitudes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_windows_match_known_values() {
        assert_eq!(FtWindow::Triang.values(3), vec![0.5, 1.0, 0.5]);
        assert_eq!(FtWindow::Triang.values(4), vec![0.25, 0.75, 0.75, 0.25]);
        let hann = FtWindow::Hann.values(5);
        assert!(close(hann[0], 0.0, 1e-12));
        assert!(close(hann[2], 1.0, 1e-12));
        let hamming = FtWindow::Hamming.values(5);
        assert!(close(hamming[0], 0.08, 1e-12));
        let bohman = FtWindow::Bohman.values(5);
        assert_eq!(bohman[0], 0.0);
        assert!(close(bohman[2], 1.0, 1e-12));
        assert_eq!(ft_windows().len(), 12);
        assert_eq!("flattop".parse::<FtWindow>().unwrap(), FtWindow::Flattop);
    }

    #[test]
    fn test_compute_ft_finds_sine_frequency_and_amplitude() {
        let n = 200;
        let dt = 1e-3;
        let x: Vec<f64> = (0..n).map(|i| i as f64 * dt).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|t| 3.0 + 2.0 * (2.0 * PI * 50.0 * t).sin())
            .collect();

        let (freqs, amps) = compute_ft(&x, &y, 0, FtWindow::None, true, false).unwrap();
        assert_eq!(freqs.len(), 100);
        let peak = amps
            .iter()
            .enumerate()
            .fold(0, |best, (i, a)| if *a > amps[best] { i } else { best });
        assert!(close(freqs[peak], 50.0, 1e-6));
        assert!(close(amps[peak], 2.0, 1e-6));
        // Baseline correction removes the offset.
        assert!(amps[0] < 1e-9);
    }

    #[test]
    fn test_zeropad_doubles_resolution() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y = vec![1.0; 10];
        let (freqs, _) = compute_ft(&x, &y, 1, FtWindow::Hann, true, true).unwrap();
        assert_eq!(freqs.len(), 10);
        assert!(close(freqs[1], 0.05, 1e-12));
    }

    #[test]
    fn test_compute_ft_rejects_short_input() {
        assert!(compute_ft(&[1.0], &[1.0], 0, FtWindow::None, true, false).is_err());
    }
}
