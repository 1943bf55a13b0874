use crate::config::AugmentConfig;
use crate::error::{PipelineError, PipelineResult};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Seeded perturbation of training windows: additive Gaussian noise followed
/// by a random magnitude scale.
pub struct Augmenter {
    repeats: usize,
    scale: f64,
    noise: Normal<f64>,
    rng: StdRng,
}

impl Augmenter {
    /// `stream` separates the random sequences of different recordings.
    pub fn new(cfg: &AugmentConfig, stream: u64) -> PipelineResult<Self> {
        if !(cfg.noise_std >= 0.0) {
            return Err(PipelineError::InvalidInput(format!(
                "augmentation noise std must be non-negative, got {}",
                cfg.noise_std
            )));
        }
        let noise = Normal::new(0.0, cfg.noise_std).map_err(|e| {
            PipelineError::InvalidInput(format!("augmentation noise std {}: {e}", cfg.noise_std))
        })?;
        if !(0.0..1.0).contains(&cfg.scale) {
            return Err(PipelineError::InvalidInput(format!(
                "augmentation scale must be in [0, 1), got {}",
                cfg.scale
            )));
        }
        Ok(Self {
            repeats: cfg.repeats,
            scale: cfg.scale,
            noise,
            rng: StdRng::seed_from_u64(cfg.seed.wrapping_add(stream)),
        })
    }

    pub fn augment(&mut self, window: &[f64]) -> Vec<f64> {
        let gain = if self.scale > 0.0 {
            self.rng.gen_range(1.0 - self.scale..=1.0 + self.scale)
        } else {
            1.0
        };
        let mut out = Vec::with_capacity(window.len());
        for x in window {
            out.push((x + self.noise.sample(&mut self.rng)) * gain);
        }
        out
    }

    /// `repeats` independent perturbations of the same window.
    pub fn copies(&mut self, window: &[f64]) -> Vec<Vec<f64>> {
        (0..self.repeats).map(|_| self.augment(window)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_streams_are_reproducible() {
        let cfg = AugmentConfig::default();
        let window = vec![1.0; 100];
        let a = Augmenter::new(&cfg, 3).unwrap().copies(&window);
        let b = Augmenter::new(&cfg, 3).unwrap().copies(&window);
        let c = Augmenter::new(&cfg, 4).unwrap().copies(&window);
        assert_eq!(a.len(), 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn perturbation_is_small() {
        let cfg = AugmentConfig::default();
        let mut aug = Augmenter::new(&cfg, 0).unwrap();
        let out = aug.augment(&vec![1.0; 500]);
        let mean = out.iter().sum::<f64>() / out.len() as f64;
        assert!((0.94..=1.06).contains(&mean), "mean {mean}");
        assert!(out.iter().all(|v| (v - mean).abs() < 0.05));
    }

    #[test]
    fn rejects_negative_noise() {
        let cfg = AugmentConfig {
            noise_std: -1.0,
            ..AugmentConfig::default()
        };
        assert!(matches!(
            Augmenter::new(&cfg, 0),
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_nan_noise_and_accepts_zero() {
        let nan = AugmentConfig {
            noise_std: f64::NAN,
            ..AugmentConfig::default()
        };
        assert!(Augmenter::new(&nan, 0).is_err());
        let silent = AugmentConfig {
            noise_std: 0.0,
            scale: 0.0,
            ..AugmentConfig::default()
        };
        let mut aug = Augmenter::new(&silent, 0).unwrap();
        assert_eq!(aug.augment(&[1.0, -2.0]), vec![1.0, -2.0]);
    }
}
