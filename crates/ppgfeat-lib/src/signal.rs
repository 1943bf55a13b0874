use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// Uniformly sampled channel, optionally paired with millisecond timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Nominal sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
    /// Per-sample timestamps (ms), same length as `data` when present
    #[serde(default)]
    pub timestamps_ms: Option<Vec<f64>>,
}

impl TimeSeries {
    pub fn new(fs: f64, data: Vec<f64>) -> Self {
        Self {
            fs,
            data,
            timestamps_ms: None,
        }
    }

    /// Pair samples with timestamps, rejecting length mismatches and
    /// timestamps that run backwards.
    pub fn with_timestamps(fs: f64, data: Vec<f64>, timestamps_ms: Vec<f64>) -> PipelineResult<Self> {
        if timestamps_ms.len() != data.len() {
            return Err(PipelineError::InvalidInput(format!(
                "{} timestamps for {} samples",
                timestamps_ms.len(),
                data.len()
            )));
        }
        if let Some(pos) = timestamps_ms.windows(2).position(|w| w[1] < w[0]) {
            return Err(PipelineError::InvalidInput(format!(
                "timestamps decrease at sample {}",
                pos + 1
            )));
        }
        Ok(Self {
            fs,
            data,
            timestamps_ms: Some(timestamps_ms),
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drop the sensor settling period at the start of a recording.
    ///
    /// With timestamps, samples earlier than `ts[0] + warmup_s * 1000` go;
    /// without them the cut is `round(warmup_s * fs)` samples.
    pub fn trim_warmup(&self, warmup_s: f64) -> TimeSeries {
        if warmup_s <= 0.0 || self.is_empty() {
            return self.clone();
        }
        let start = match &self.timestamps_ms {
            Some(ts) => {
                let cutoff = ts[0] + warmup_s * 1000.0;
                ts.iter().position(|&t| t >= cutoff).unwrap_or(ts.len())
            }
            None => ((warmup_s * self.fs).round() as usize).min(self.data.len()),
        };
        TimeSeries {
            fs: self.fs,
            data: self.data[start..].to_vec(),
            timestamps_ms: self.timestamps_ms.as_ref().map(|ts| ts[start..].to_vec()),
        }
    }
}

/// Point events on a window (peak or trough sample indices, ascending).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }
    pub fn len(&self) -> usize {
        self.indices.len()
    }
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Peak-to-peak intervals in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntervalSeries {
    pub intervals_ms: Vec<f64>,
}

impl IntervalSeries {
    pub fn from_events(events: &Events, fs: f64) -> Self {
        let intervals_ms = events
            .indices
            .windows(2)
            .map(|w| (w[1] - w[0]) as f64 * 1000.0 / fs)
            .collect();
        Self { intervals_ms }
    }

    pub fn len(&self) -> usize {
        self.intervals_ms.len()
    }
    pub fn is_empty(&self) -> bool {
        self.intervals_ms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_timestamps() {
        let err = TimeSeries::with_timestamps(25.0, vec![1.0, 2.0], vec![0.0]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn rejects_decreasing_timestamps() {
        let err =
            TimeSeries::with_timestamps(25.0, vec![1.0, 2.0, 3.0], vec![0.0, 40.0, 20.0]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn warmup_uses_timestamps_when_present() {
        let data: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let ts: Vec<f64> = (0..10).map(|i| i as f64 * 500.0).collect();
        let series = TimeSeries::with_timestamps(2.0, data, ts).unwrap();
        let trimmed = series.trim_warmup(2.0);
        assert_eq!(trimmed.data[0], 4.0);
        assert_eq!(trimmed.len(), 6);
        assert_eq!(trimmed.timestamps_ms.unwrap()[0], 2000.0);
    }

    #[test]
    fn warmup_falls_back_to_sample_count() {
        let series = TimeSeries::new(25.0, vec![0.0; 200]);
        assert_eq!(series.trim_warmup(5.0).len(), 75);
        assert_eq!(series.trim_warmup(0.0).len(), 200);
    }

    #[test]
    fn intervals_in_milliseconds() {
        let events = Events::from_indices(vec![0, 25, 50]);
        let rr = IntervalSeries::from_events(&events, 25.0);
        assert_eq!(rr.intervals_ms, vec![1000.0, 1000.0]);
    }
}
