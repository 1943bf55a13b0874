use crate::signal::Events;
use serde::{Deserialize, Serialize};

pub const NAMES: [&str; 3] = ["crest_t", "dwell_t", "pwtf"];

/// Pulse-wave timing averaged over the complete cycles in a window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Morphology {
    /// Foot-to-peak rise time (s)
    pub crest_t: f64,
    /// Foot-to-foot cycle time (s)
    pub dwell_t: f64,
    /// crest_t / dwell_t
    pub pwtf: f64,
}

impl Morphology {
    pub fn values(&self) -> [f64; 3] {
        [self.crest_t, self.dwell_t, self.pwtf]
    }
}

/// A cycle is a peak with a trough on both sides; the nearest ones are used.
pub fn pulse_morphology(peaks: &Events, troughs: &Events, fs: f64) -> Morphology {
    let t = &troughs.indices;
    let mut crest = 0.0;
    let mut dwell = 0.0;
    let mut cycles = 0usize;
    for &p in &peaks.indices {
        let after = t.partition_point(|&i| i <= p);
        if after == 0 || after == t.len() {
            continue;
        }
        let before = t[..after].partition_point(|&i| i < p);
        if before == 0 {
            continue;
        }
        let (prev, next) = (t[before - 1], t[after]);
        crest += (p - prev) as f64 / fs;
        dwell += (next - prev) as f64 / fs;
        cycles += 1;
    }
    if cycles == 0 {
        return Morphology {
            crest_t: f64::NAN,
            dwell_t: f64::NAN,
            pwtf: f64::NAN,
        };
    }
    let crest_t = crest / cycles as f64;
    let dwell_t = dwell / cycles as f64;
    let pwtf = if dwell_t == 0.0 { f64::NAN } else { crest_t / dwell_t };
    Morphology {
        crest_t,
        dwell_t,
        pwtf,
    }
}
