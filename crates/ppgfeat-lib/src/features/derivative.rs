use super::spectral::welch;
use serde::{Deserialize, Serialize};

pub const NAMES: [&str; 3] = ["d1", "d2", "lf_pow"];

/// Shortest Welch segment used for the low-frequency power.
const MIN_SEGMENT: usize = 64;

/// Slope statistics and low-frequency power of one window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DerivativeFeatures {
    /// Mean first derivative (per sample)
    pub d1: f64,
    /// Mean second derivative (per sample squared)
    pub d2: f64,
    /// Summed Welch PSD bins inside the low-frequency band
    pub lf_pow: f64,
}

impl DerivativeFeatures {
    pub fn values(&self) -> [f64; 3] {
        [self.d1, self.d2, self.lf_pow]
    }
}

/// Central differences in the interior, one-sided differences at both ends.
pub fn gradient(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n < 2 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(n);
    out.push(x[1] - x[0]);
    out.extend(x.windows(3).map(|w| (w[2] - w[0]) / 2.0));
    out.push(x[n - 1] - x[n - 2]);
    out
}

fn mean(x: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    x.iter().sum::<f64>() / x.len() as f64
}

/// Low-frequency power uses segments of `max(64, len / 2)` samples, capped at
/// the window length.
pub fn derivative_features(window: &[f64], fs: f64, lf_band: [f64; 2]) -> DerivativeFeatures {
    let d1 = gradient(window);
    let d2 = gradient(&d1);
    let lf_pow = match welch(window, fs, MIN_SEGMENT.max(window.len() / 2)) {
        Ok(psd) => psd
            .freqs
            .iter()
            .zip(psd.power.iter())
            .filter(|(f, _)| (lf_band[0]..=lf_band[1]).contains(*f))
            .map(|(_, p)| p)
            .sum(),
        Err(_) => f64::NAN,
    };
    DerivativeFeatures {
        d1: mean(&d1),
        d2: mean(&d2),
        lf_pow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn tone(freq: f64) -> Vec<f64> {
        (0..250)
            .map(|i| (2.0 * PI * freq * i as f64 / 25.0).sin())
            .collect()
    }

    #[test]
    fn gradient_of_square_sequence() {
        let x = [0.0, 1.0, 4.0, 9.0, 16.0];
        assert_eq!(gradient(&x), vec![1.0, 2.0, 4.0, 6.0, 7.0]);
        let f = derivative_features(&x, 25.0, [0.7, 2.0]);
        assert!((f.d1 - 4.0).abs() < 1e-12);
        assert!((f.d2 - 1.4).abs() < 1e-12);
    }

    #[test]
    fn ramp_has_constant_slope() {
        let x: Vec<f64> = (0..100).map(|i| 0.5 * i as f64).collect();
        let f = derivative_features(&x, 25.0, [0.7, 2.0]);
        assert!((f.d1 - 0.5).abs() < 1e-12);
        assert!(f.d2.abs() < 1e-12);
    }

    #[test]
    fn lf_power_follows_the_band() {
        let inside = derivative_features(&tone(1.2), 25.0, [0.7, 2.0]).lf_pow;
        let outside = derivative_features(&tone(5.0), 25.0, [0.7, 2.0]).lf_pow;
        assert!(inside > 100.0 * outside, "{inside} vs {outside}");
    }

    #[test]
    fn single_sample_is_undefined() {
        let f = derivative_features(&[1.0], 25.0, [0.7, 2.0]);
        assert!(f.d1.is_nan() && f.d2.is_nan() && f.lf_pow.is_nan());
    }
}
