use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Fixed-length segment of a conditioned recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// Start index in the source signal
    pub offset: usize,
    pub samples: Vec<f64>,
}

/// Window length, hop and jitter, all in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPlan {
    pub len: usize,
    pub step: usize,
    /// Maximum offset perturbation; 0 disables jitter
    pub jitter: usize,
}

impl WindowPlan {
    pub fn new(len: usize, overlap: f64, jitter_fraction: f64) -> PipelineResult<Self> {
        if len == 0 {
            return Err(PipelineError::InvalidInput("window length must be at least one sample".into()));
        }
        if !(0.0..1.0).contains(&overlap) {
            return Err(PipelineError::InvalidInput(format!("overlap must be in [0, 1), got {overlap}")));
        }
        let step = ((len as f64 * (1.0 - overlap)).floor() as usize).max(1);
        let jitter = (step as f64 * jitter_fraction.max(0.0)).floor() as usize;
        Ok(Self { len, step, jitter })
    }

    pub fn from_config(cfg: &PipelineConfig) -> PipelineResult<Self> {
        Self::new(cfg.window_len(), cfg.window.overlap, cfg.window.jitter_fraction)
    }

    /// Number of windows a signal of `total` samples yields.
    pub fn count(&self, total: usize) -> usize {
        if total < self.len {
            0
        } else {
            (total - self.len) / self.step + 1
        }
    }

    /// Nominal windows at offsets `0, step, 2*step, ...`; the trailing
    /// remainder shorter than a window is dropped.
    pub fn windows<'a>(&self, signal: &'a [f64]) -> Windows<'a> {
        Windows {
            plan: *self,
            signal,
            index: 0,
            rng: None,
        }
    }

    /// Same windows with each offset moved by a uniform draw from
    /// `[-jitter, jitter]`, clamped to stay inside the signal.
    pub fn jittered<'a>(&self, signal: &'a [f64], seed: u64) -> Windows<'a> {
        Windows {
            plan: *self,
            signal,
            index: 0,
            rng: (self.jitter > 0).then(|| StdRng::seed_from_u64(seed)),
        }
    }
}

/// Lazy window iterator; ask the plan again to restart.
pub struct Windows<'a> {
    plan: WindowPlan,
    signal: &'a [f64],
    index: usize,
    rng: Option<StdRng>,
}

impl Iterator for Windows<'_> {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.index >= self.plan.count(self.signal.len()) {
            return None;
        }
        let nominal = self.index * self.plan.step;
        self.index += 1;
        let offset = match self.rng.as_mut() {
            Some(rng) => {
                let j = self.plan.jitter as i64;
                let last = (self.signal.len() - self.plan.len) as i64;
                (nominal as i64 + rng.gen_range(-j..=j)).clamp(0, last) as usize
            }
            None => nominal,
        };
        Some(Window {
            offset,
            samples: self.signal[offset..offset + self.plan.len].to_vec(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.plan.count(self.signal.len()) - self.index;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Windows<'_> {}
