use serde::{Deserialize, Serialize};

pub const NAMES: [&str; 6] = ["dc", "ac_amp", "rms", "skewness", "kurtosis", "zcr"];

/// Amplitude and distribution shape of one window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BasicStats {
    pub dc: f64,
    /// Peak-to-peak amplitude
    pub ac_amp: f64,
    pub rms: f64,
    pub skewness: f64,
    /// Excess (Fisher) kurtosis
    pub kurtosis: f64,
    /// Sign changes between consecutive samples per sample
    pub zcr: f64,
}

impl BasicStats {
    pub fn values(&self) -> [f64; 6] {
        [self.dc, self.ac_amp, self.rms, self.skewness, self.kurtosis, self.zcr]
    }
}

pub fn basic_stats(x: &[f64]) -> BasicStats {
    if x.is_empty() {
        return BasicStats {
            dc: f64::NAN,
            ac_amp: f64::NAN,
            rms: f64::NAN,
            skewness: f64::NAN,
            kurtosis: f64::NAN,
            zcr: f64::NAN,
        };
    }
    let n = x.len() as f64;
    let mean = x.iter().sum::<f64>() / n;
    let (min, max) = x
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let rms = (x.iter().map(|v| v * v).sum::<f64>() / n).sqrt();
    let moment = |k: i32| x.iter().map(|v| (v - mean).powi(k)).sum::<f64>() / n;
    let (m2, m3, m4) = (moment(2), moment(3), moment(4));
    // variance lost in rounding counts as zero
    let flat = m2 <= (1e-15 * mean).powi(2);
    let (skewness, kurtosis) = if flat {
        (f64::NAN, f64::NAN)
    } else {
        (m3 / m2.powf(1.5), m4 / (m2 * m2) - 3.0)
    };
    let crossings = x.windows(2).filter(|w| w[0] * w[1] < 0.0).count();
    BasicStats {
        dc: mean,
        ac_amp: max - min,
        rms,
        skewness,
        kurtosis,
        zcr: crossings as f64 / n,
    }
}
