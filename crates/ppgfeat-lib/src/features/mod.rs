//! Per-window biomarkers.
//!
//! Every family returns a fixed number of values in a fixed order so a
//! [`FeatureVector`] always matches its [`FeatureSchema`]; values that
//! cannot be computed are `NaN`.

pub mod derivative;
pub mod hrv;
pub mod morphology;
pub mod peaks;
pub mod spectral;
pub mod stats;

use crate::config::{FeatureSet, PipelineConfig, SpectralConfig};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::Arc;

pub use derivative::{derivative_features, DerivativeFeatures};
pub use hrv::{hrv_features, HrvFeatures};
pub use morphology::{pulse_morphology, Morphology};
pub use peaks::{find_peaks, find_troughs};
pub use spectral::{spectral_features, welch, Psd, SpectralFeatures};
pub use stats::{basic_stats, BasicStats};

/// Ordered feature names shared by every vector of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema(Arc<[String]>);

impl FeatureSchema {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn for_set(set: &FeatureSet) -> Self {
        let mut names: Vec<&str> = Vec::new();
        if set.basic {
            names.extend(stats::NAMES);
        }
        if set.hrv {
            names.extend(hrv::NAMES);
        }
        if set.morphology {
            names.extend(morphology::NAMES);
        }
        if set.spectral {
            names.extend(spectral::NAMES);
        }
        if set.derivative {
            names.extend(derivative::NAMES);
        }
        Self::new(names)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|n| n == name)
    }
}

/// Feature values in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    schema: FeatureSchema,
    values: Vec<f64>,
}

impl FeatureVector {
    /// Pair values with a schema; `None` when the lengths differ.
    pub fn new(schema: FeatureSchema, values: Vec<f64>) -> Option<Self> {
        (schema.len() == values.len()).then_some(Self { schema, values })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.schema.position(name).map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.schema
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Copy with NaN and infinite values replaced by zero.
    pub fn imputed(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            values: self
                .values
                .iter()
                .map(|v| if v.is_finite() { *v } else { 0.0 })
                .collect(),
        }
    }

    pub fn has_undefined(&self) -> bool {
        self.values.iter().any(|v| !v.is_finite())
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            // JSON has no NaN; undefined values become null
            map.serialize_entry(name, &value.is_finite().then_some(value))?;
        }
        map.end()
    }
}

/// Deterministic window-to-features function.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    fs: f64,
    set: FeatureSet,
    peak_distance: usize,
    spectral: SpectralConfig,
    schema: FeatureSchema,
}

impl FeatureExtractor {
    pub fn new(fs: f64, set: FeatureSet, min_peak_distance_s: f64, spectral: SpectralConfig) -> Self {
        Self {
            fs,
            set,
            peak_distance: peaks::distance_samples(min_peak_distance_s, fs),
            spectral,
            schema: FeatureSchema::for_set(&set),
        }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::new(
            cfg.sample_rate_hz,
            cfg.features,
            cfg.peaks.min_distance_s,
            cfg.spectral,
        )
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn extract(&self, window: &[f64]) -> FeatureVector {
        let mut values = Vec::with_capacity(self.schema.len());
        if self.set.basic {
            values.extend(basic_stats(window).values());
        }
        if self.set.hrv || self.set.morphology {
            let peaks = find_peaks(window, self.peak_distance);
            if self.set.hrv {
                values.extend(hrv_features(&peaks, self.fs).values());
            }
            if self.set.morphology {
                let troughs = find_troughs(window, self.peak_distance);
                values.extend(pulse_morphology(&peaks, &troughs, self.fs).values());
            }
        }
        if self.set.spectral {
            values.extend(spectral_features(window, self.fs, &self.spectral).values());
        }
        if self.set.derivative {
            values.extend(derivative_features(window, self.fs, self.spectral.lf_band).values());
        }
        FeatureVector {
            schema: self.schema.clone(),
            values,
        }
    }
}
