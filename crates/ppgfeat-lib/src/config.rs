use crate::error::{PipelineError, PipelineResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Every tunable of the pipeline in one immutable value.
///
/// Components take the pieces they need by reference; nothing reads
/// process-wide state. Fields missing from a TOML file keep their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Nominal sampling rate of the recordings (Hz)
    pub sample_rate_hz: f64,
    /// Channel read from JSON/CSV recordings
    pub channel: String,
    /// Settling period dropped from the start of each recording (s)
    pub warmup_s: f64,
    pub window: WindowConfig,
    pub filter: FilterConfig,
    pub quality: QualityConfig,
    pub peaks: PeakConfig,
    pub spectral: SpectralConfig,
    pub features: FeatureSet,
    /// Store the conditioned window samples alongside the features
    pub keep_raw: bool,
    /// Replace NaN/inf feature values with 0 before rows enter the dataset
    pub impute_undefined: bool,
    pub physio: Option<PhysioGate>,
    pub augment: Option<AugmentConfig>,
    pub labels: LabelConfig,
    /// Worker threads for assembly; `None` uses available parallelism
    pub workers: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 25.0,
            channel: "green".into(),
            warmup_s: 0.0,
            window: WindowConfig::default(),
            filter: FilterConfig::default(),
            quality: QualityConfig::default(),
            peaks: PeakConfig::default(),
            spectral: SpectralConfig::default(),
            features: FeatureSet::default(),
            keep_raw: false,
            impute_undefined: true,
            physio: None,
            augment: None,
            labels: LabelConfig::default(),
            workers: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window length (s)
    pub seconds: f64,
    /// Fraction of a window shared with the next one, in [0, 1)
    pub overlap: f64,
    /// Maximum start-offset perturbation as a fraction of the step; 0 disables jitter
    pub jitter_fraction: f64,
    /// Seed for jitter draws
    pub seed: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            seconds: 10.0,
            overlap: 0.5,
            jitter_fraction: 0.0,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub low_hz: f64,
    pub high_hz: f64,
    pub order: usize,
    /// Remove the least-squares line before filtering
    pub detrend: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            low_hz: 0.5,
            high_hz: 5.0,
            order: 3,
            detrend: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub enabled: bool,
    pub threshold_db: f64,
    /// High-pass cutoff isolating noise; defaults to the band-pass upper edge
    pub noise_cutoff_hz: Option<f64>,
    pub noise_order: usize,
    pub epsilon: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_db: -5.0,
            noise_cutoff_hz: None,
            noise_order: 2,
            epsilon: 1e-8,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    /// Minimum spacing between detected peaks (s)
    pub min_distance_s: f64,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            min_distance_s: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// Welch segment length in samples; `None` uses the whole window
    pub nperseg: Option<usize>,
    pub resp_band: [f64; 2],
    pub motion_band: [f64; 2],
    /// Band summed into `lf_pow` by the derivative family
    pub lf_band: [f64; 2],
    pub epsilon: f64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            nperseg: None,
            resp_band: [0.1, 0.4],
            motion_band: [0.4, 2.0],
            lf_band: [0.7, 2.0],
            epsilon: 1e-9,
        }
    }
}

/// Feature families included in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSet {
    pub basic: bool,
    pub hrv: bool,
    pub morphology: bool,
    pub spectral: bool,
    /// Mean gradients and low-frequency power; off unless requested
    pub derivative: bool,
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self {
            basic: true,
            hrv: true,
            morphology: true,
            spectral: true,
            derivative: false,
        }
    }
}

/// Physiological plausibility bounds applied to extracted windows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysioGate {
    pub hr_min: f64,
    pub hr_max: f64,
    pub rr_min_ms: f64,
    pub rr_max_ms: f64,
    pub max_peaks: usize,
}

impl Default for PhysioGate {
    fn default() -> Self {
        Self {
            hr_min: 40.0,
            hr_max: 120.0,
            rr_min_ms: 500.0,
            rr_max_ms: 1500.0,
            max_peaks: 30,
        }
    }
}

/// Training-time augmentation of feature windows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Augmented copies emitted per accepted window
    pub repeats: usize,
    /// Standard deviation of additive Gaussian noise
    pub noise_std: f64,
    /// Magnitude scale drawn from `1 ± scale`
    pub scale: f64,
    pub seed: u64,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            repeats: 2,
            noise_std: 0.005,
            scale: 0.05,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Extra `synonym -> canonical` entries merged over the built-in map
    pub synonyms: BTreeMap<String, String>,
}

impl PipelineConfig {
    /// Check the numeric ranges every component relies on.
    pub fn validate(&self) -> PipelineResult<()> {
        let nyq = self.sample_rate_hz / 2.0;
        let invalid = |msg: String| Err(PipelineError::InvalidInput(msg));
        if !(self.sample_rate_hz > 0.0) {
            return invalid(format!("sample rate must be positive, got {}", self.sample_rate_hz));
        }
        if !(self.window.seconds > 0.0) {
            return invalid(format!("window length must be positive, got {}", self.window.seconds));
        }
        if !(0.0..1.0).contains(&self.window.overlap) {
            return invalid(format!("overlap must be in [0, 1), got {}", self.window.overlap));
        }
        if !(0.0..=1.0).contains(&self.window.jitter_fraction) {
            return invalid(format!(
                "jitter fraction must be in [0, 1], got {}",
                self.window.jitter_fraction
            ));
        }
        if !(self.filter.low_hz > 0.0 && self.filter.low_hz < self.filter.high_hz && self.filter.high_hz < nyq) {
            return invalid(format!(
                "band {}-{} Hz does not fit below Nyquist {} Hz",
                self.filter.low_hz, self.filter.high_hz, nyq
            ));
        }
        if self.filter.order == 0 || self.quality.noise_order == 0 {
            return invalid("filter order must be at least 1".into());
        }
        if !(self.peaks.min_distance_s > 0.0) {
            return invalid("peak distance must be positive".into());
        }
        Ok(())
    }

    pub fn window_len(&self) -> usize {
        (self.window.seconds * self.sample_rate_hz).floor() as usize
    }

    pub fn noise_cutoff_hz(&self) -> f64 {
        self.quality.noise_cutoff_hz.unwrap_or(self.filter.high_hz)
    }
}

/// Load a TOML configuration file; absent keys fall back to defaults.
pub fn read_config(path: &Path) -> Result<PipelineConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.window_len(), 250);
        assert_eq!(cfg.noise_cutoff_hz(), 5.0);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: PipelineConfig = toml::from_str(
            r#"
            sample_rate_hz = 50.0
            [window]
            seconds = 15.0
            [quality]
            threshold_db = -10.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sample_rate_hz, 50.0);
        assert_eq!(cfg.window.seconds, 15.0);
        assert_eq!(cfg.window.overlap, 0.5);
        assert_eq!(cfg.quality.threshold_db, -10.0);
        assert!(cfg.quality.enabled);
        assert_eq!(cfg.filter.order, 3);
    }

    #[test]
    fn rejects_band_above_nyquist() {
        let mut cfg = PipelineConfig::default();
        cfg.filter.high_hz = 13.0;
        assert!(matches!(cfg.validate(), Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn rejects_full_overlap() {
        let mut cfg = PipelineConfig::default();
        cfg.window.overlap = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        fs::write(&path, "warmup_s = 5.0\n[augment]\nrepeats = 3\n").unwrap();
        let cfg = read_config(&path).unwrap();
        assert_eq!(cfg.warmup_s, 5.0);
        let augment = cfg.augment.unwrap();
        assert_eq!(augment.repeats, 3);
        assert_eq!(augment.noise_std, 0.005);
    }
}
