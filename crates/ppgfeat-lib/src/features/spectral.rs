use crate::config::SpectralConfig;
use crate::error::{PipelineError, PipelineResult};
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub const NAMES: [&str; 4] = ["psd_resp", "psd_motion", "band_ratio", "spectral_entropy"];

const LOG_FLOOR: f64 = 1e-12;

/// One-sided power spectral density.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Psd {
    pub freqs: Vec<f64>,
    pub power: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpectralFeatures {
    /// Respiratory-band share of total power
    pub psd_resp: f64,
    /// Motion-band share of total power
    pub psd_motion: f64,
    pub band_ratio: f64,
    pub spectral_entropy: f64,
}

impl SpectralFeatures {
    pub fn values(&self) -> [f64; 4] {
        [self.psd_resp, self.psd_motion, self.band_ratio, self.spectral_entropy]
    }

    fn undefined() -> Self {
        Self {
            psd_resp: f64::NAN,
            psd_motion: f64::NAN,
            band_ratio: f64::NAN,
            spectral_entropy: f64::NAN,
        }
    }
}

/// Welch average of periodic-Hann periodograms with 50 % overlap,
/// per-segment mean removal and density scaling.
pub fn welch(signal: &[f64], fs: f64, nperseg: usize) -> PipelineResult<Psd> {
    let n = signal.len();
    let window = nperseg.min(n);
    if window < 2 {
        return Err(PipelineError::InsufficientData { needed: 2, got: window });
    }
    let step = window - window / 2;
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(window);
    let window_func = hann(window);
    let scale = 1.0 / (fs * window_func.iter().map(|w| w * w).sum::<f64>());
    let bins = window / 2 + 1;
    let freqs: Vec<f64> = (0..bins).map(|k| k as f64 * fs / window as f64).collect();
    let mut power = vec![0.0; bins];
    let mut spectrum = r2c.make_output_vec();
    let mut pos = 0;
    let mut segments = 0;
    while pos + window <= n {
        let slice = &signal[pos..pos + window];
        let mean = slice.iter().sum::<f64>() / window as f64;
        let mut frame: Vec<f64> = slice
            .iter()
            .zip(window_func.iter())
            .map(|(x, w)| (x - mean) * w)
            .collect();
        r2c.process(&mut frame, &mut spectrum)
            .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
        for (k, val) in spectrum.iter().enumerate() {
            let density = if k == 0 || (window % 2 == 0 && k == window / 2) {
                val.norm_sqr()
            } else {
                2.0 * val.norm_sqr()
            } * scale;
            power[k] += density;
        }
        segments += 1;
        pos += step;
    }
    for p in power.iter_mut() {
        *p /= segments as f64;
    }
    Ok(Psd { freqs, power })
}

/// Trapezoidal integral of `y` over the abscissa `x`.
pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum()
}

/// Integrated power of the bins inside `[lo, hi]`.
pub fn band_power(psd: &Psd, band: [f64; 2]) -> f64 {
    let start = psd.freqs.partition_point(|&f| f < band[0]);
    let end = psd.freqs.partition_point(|&f| f <= band[1]);
    if start >= end {
        return 0.0;
    }
    trapezoid(&psd.freqs[start..end], &psd.power[start..end])
}

pub fn spectral_features(window: &[f64], fs: f64, cfg: &SpectralConfig) -> SpectralFeatures {
    let nperseg = cfg.nperseg.unwrap_or(window.len());
    let psd = match welch(window, fs, nperseg) {
        Ok(psd) => psd,
        Err(_) => return SpectralFeatures::undefined(),
    };
    let eps = cfg.epsilon;
    let total = trapezoid(&psd.freqs, &psd.power) + eps;
    let resp = band_power(&psd, cfg.resp_band);
    let motion = band_power(&psd, cfg.motion_band);
    let spectral_entropy = -psd
        .power
        .iter()
        .map(|p| {
            let share = p / total;
            share * (share + LOG_FLOOR).ln()
        })
        .sum::<f64>();
    SpectralFeatures {
        psd_resp: resp / total,
        psd_motion: motion / total,
        band_ratio: (resp + eps) / (motion + eps),
        spectral_entropy,
    }
}

fn hann(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / (size as f64)).cos()))
        .collect()
}
