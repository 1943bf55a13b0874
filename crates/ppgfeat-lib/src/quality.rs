use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::filter::{Band, TransferFunction};
use serde::{Deserialize, Serialize};

/// Outcome of scoring one window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SqiResult {
    /// `20 * log10(signal_rms / (noise_rms + epsilon))`
    pub sqi_db: f64,
    pub signal_rms: f64,
    pub noise_rms: f64,
    pub accepted: bool,
}

pub fn rms(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    (data.iter().map(|x| x * x).sum::<f64>() / data.len() as f64).sqrt()
}

/// RMS after removing the mean (the AC component).
pub fn ac_rms(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mean = data.iter().copied().sum::<f64>() / data.len() as f64;
    (data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / data.len() as f64).sqrt()
}

/// One-shot accept/reject decision against a fixed dB threshold.
#[derive(Debug, Clone)]
pub struct QualityGate {
    enabled: bool,
    threshold_db: f64,
    epsilon: f64,
    noise_filter: TransferFunction,
}

impl QualityGate {
    pub fn from_config(cfg: &PipelineConfig) -> PipelineResult<Self> {
        let noise_filter = TransferFunction::butterworth(
            cfg.quality.noise_order,
            Band::Highpass(cfg.noise_cutoff_hz()),
            cfg.sample_rate_hz,
        )?;
        Ok(Self {
            enabled: cfg.quality.enabled,
            threshold_db: cfg.quality.threshold_db,
            epsilon: cfg.quality.epsilon,
            noise_filter,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Ratio of physiological power to high-frequency residual power, in dB.
    pub fn evaluate(&self, window: &[f64]) -> PipelineResult<SqiResult> {
        let signal_rms = ac_rms(window);
        let noise_rms = rms(&self.noise_filter.filtfilt(window)?);
        let sqi_db = 20.0 * (signal_rms / (noise_rms + self.epsilon)).log10();
        Ok(SqiResult {
            sqi_db,
            signal_rms,
            noise_rms,
            accepted: sqi_db >= self.threshold_db,
        })
    }

    /// Gate decision; a window too short to score is rejected.
    pub fn accepts(&self, window: &[f64]) -> bool {
        if !self.enabled {
            return true;
        }
        self.evaluate(window).map(|r| r.accepted).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::f64::consts::PI;

    fn sinusoid(fs: f64, freq: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    fn gate() -> QualityGate {
        QualityGate::from_config(&PipelineConfig::default()).unwrap()
    }

    #[test]
    fn clean_sinusoid_scores_high() {
        let result = gate().evaluate(&sinusoid(25.0, 1.2, 250)).unwrap();
        assert!(result.sqi_db > 20.0, "sqi {}", result.sqi_db);
        assert!(result.accepted);
    }

    #[test]
    fn added_noise_lowers_quality() {
        let gate = gate();
        let clean = sinusoid(25.0, 1.2, 250);
        let mut rng = StdRng::seed_from_u64(7);
        let mut previous = gate.evaluate(&clean).unwrap().sqi_db;
        for amplitude in [0.05, 0.2, 0.8] {
            let noisy: Vec<f64> = clean
                .iter()
                .map(|x| x + amplitude * rng.gen_range(-1.0..1.0))
                .collect();
            let sqi = gate.evaluate(&noisy).unwrap().sqi_db;
            assert!(sqi < previous, "{sqi} !< {previous} at amplitude {amplitude}");
            previous = sqi;
        }
    }

    #[test]
    fn score_is_rms_ratio_in_db() {
        let r = gate().evaluate(&sinusoid(25.0, 2.0, 200)).unwrap();
        let expected = 20.0 * (r.signal_rms / (r.noise_rms + 1e-8)).log10();
        assert_eq!(r.sqi_db, expected);
        assert!((r.signal_rms - 0.5f64.sqrt()).abs() < 1e-3);
    }

    #[test]
    fn flat_window_is_rejected() {
        // no AC power at all: 20*log10(0) = -inf
        let result = gate().evaluate(&[1.0; 100]).unwrap();
        assert!(result.sqi_db.is_infinite() && result.sqi_db < 0.0);
        assert!(!result.accepted);
    }

    #[test]
    fn disabled_gate_accepts_everything() {
        let mut cfg = PipelineConfig::default();
        cfg.quality.enabled = false;
        let gate = QualityGate::from_config(&cfg).unwrap();
        assert!(gate.accepts(&[0.0; 3]));
    }

    #[test]
    fn short_window_is_rejected() {
        assert!(!gate().accepts(&[0.1, -0.2, 0.3]));
    }

    #[test]
    fn rms_helpers() {
        assert!((rms(&[3.0, 4.0]) - (12.5f64).sqrt()).abs() < 1e-12);
        assert!(ac_rms(&[2.0; 8]).abs() < 1e-12);
    }
}
