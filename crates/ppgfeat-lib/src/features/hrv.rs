use crate::signal::{Events, IntervalSeries};
use serde::{Deserialize, Serialize};

pub const NAMES: [&str; 6] = ["n_peaks", "rr_mean", "hr_mean", "sdnn", "rmssd", "pnn50"];

/// Time-domain variability of the pulse intervals inside one window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HrvFeatures {
    pub n_peaks: usize,
    /// Mean interval (ms)
    pub rr_mean: f64,
    /// Beats per minute
    pub hr_mean: f64,
    /// Population standard deviation of the intervals (ms)
    pub sdnn: f64,
    /// Root mean square of successive interval differences (ms)
    pub rmssd: f64,
    /// Fraction of successive differences above 50 ms
    pub pnn50: f64,
}

impl HrvFeatures {
    pub fn values(&self) -> [f64; 6] {
        [
            self.n_peaks as f64,
            self.rr_mean,
            self.hr_mean,
            self.sdnn,
            self.rmssd,
            self.pnn50,
        ]
    }
}

/// Interval statistics need two peaks; successive-difference statistics need three.
pub fn hrv_features(peaks: &Events, fs: f64) -> HrvFeatures {
    let rr = IntervalSeries::from_events(peaks, fs);
    let n = rr.len();
    let (rr_mean, hr_mean, sdnn) = if n >= 1 {
        let mean = rr.intervals_ms.iter().sum::<f64>() / n as f64;
        let var = rr.intervals_ms.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        (mean, 60_000.0 / mean, var.sqrt())
    } else {
        (f64::NAN, f64::NAN, f64::NAN)
    };
    let (rmssd, pnn50) = if n >= 2 {
        let diffs: Vec<f64> = rr.intervals_ms.windows(2).map(|w| w[1] - w[0]).collect();
        let m = diffs.len() as f64;
        let rmssd = (diffs.iter().map(|d| d * d).sum::<f64>() / m).sqrt();
        let pnn50 = diffs.iter().filter(|d| d.abs() > 50.0).count() as f64 / m;
        (rmssd, pnn50)
    } else {
        (f64::NAN, f64::NAN)
    };
    HrvFeatures {
        n_peaks: peaks.len(),
        rr_mean,
        hr_mean,
        sdnn,
        rmssd,
        pnn50,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_train() {
        let peaks = Events::from_indices((0..10).map(|k| k * 20).collect());
        let hrv = hrv_features(&peaks, 25.0);
        assert_eq!(hrv.n_peaks, 10);
        assert!((hrv.rr_mean - 800.0).abs() < 1e-9);
        assert!((hrv.hr_mean - 75.0).abs() < 1e-9);
        assert!(hrv.sdnn.abs() < 1e-9);
        assert!(hrv.rmssd.abs() < 1e-9);
        assert_eq!(hrv.pnn50, 0.0);
    }

    #[test]
    fn successive_differences() {
        // intervals 1000, 800, 1000 ms
        let peaks = Events::from_indices(vec![0, 25, 45, 70]);
        let hrv = hrv_features(&peaks, 25.0);
        assert!((hrv.rmssd - 200.0).abs() < 1e-9);
        assert_eq!(hrv.pnn50, 1.0);
        let mean = 2800.0 / 3.0;
        let sdnn = ((2.0 * (1000.0f64 - mean).powi(2) + (800.0f64 - mean).powi(2)) / 3.0).sqrt();
        assert!((hrv.sdnn - sdnn).abs() < 1e-9);
    }

    #[test]
    fn too_few_peaks_are_undefined() {
        let none = hrv_features(&Events::default(), 25.0);
        assert_eq!(none.n_peaks, 0);
        assert!(none.values()[1..].iter().all(|v| v.is_nan()));

        let two = hrv_features(&Events::from_indices(vec![3, 28]), 25.0);
        assert_eq!(two.hr_mean, 60.0);
        assert_eq!(two.sdnn, 0.0);
        assert!(two.rmssd.is_nan());
        assert!(two.pnn50.is_nan());
    }
}
