//! Recording-to-dataset driver.
//!
//! Each recording goes through load, label normalization, warm-up trim,
//! conditioning, windowing, the quality gate, the optional plausibility gate,
//! feature extraction and optional augmentation. Recordings are spread over
//! scoped worker threads; rows are merged back in entry order.

use crate::augment::Augmenter;
use crate::config::{PhysioGate, PipelineConfig};
use crate::dataset::{Dataset, LabeledSample};
use crate::error::{PipelineError, PipelineResult};
use crate::features::{FeatureExtractor, FeatureVector};
use crate::filter::Conditioner;
use crate::label::LabelMap;
use crate::quality::QualityGate;
use crate::source::{Recording, RecordingEntry, RecordingSource};
use crate::window::WindowPlan;
use crossbeam_channel::unbounded;
use log::{debug, info, warn};
use serde::Serialize;
use std::thread;

/// Bookkeeping for one assembly run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssemblyReport {
    pub recordings_seen: usize,
    pub recordings_used: usize,
    pub recordings_skipped: usize,
    pub windows_total: usize,
    pub windows_rejected_quality: usize,
    pub windows_rejected_physio: usize,
    pub rows: usize,
}

#[derive(Debug, Default)]
struct WindowCounts {
    total: usize,
    rejected_quality: usize,
    rejected_physio: usize,
}

enum Outcome {
    Rows(Vec<LabeledSample>, WindowCounts),
    Skipped,
}

pub struct Assembler {
    cfg: PipelineConfig,
    labels: LabelMap,
    conditioner: Conditioner,
    gate: QualityGate,
    plan: WindowPlan,
    extractor: FeatureExtractor,
}

impl Assembler {
    pub fn new(cfg: &PipelineConfig) -> PipelineResult<Self> {
        cfg.validate()?;
        if cfg.physio.is_some() && !cfg.features.hrv {
            return Err(PipelineError::InvalidInput(
                "the physiological gate needs the hrv feature family".into(),
            ));
        }
        Ok(Self {
            cfg: cfg.clone(),
            labels: LabelMap::from_config(&cfg.labels),
            conditioner: Conditioner::from_config(cfg)?,
            gate: QualityGate::from_config(cfg)?,
            plan: WindowPlan::from_config(cfg)?,
            extractor: FeatureExtractor::from_config(cfg),
        })
    }

    pub fn empty_dataset(&self) -> Dataset {
        Dataset::new(
            self.extractor.schema().clone(),
            self.cfg.sample_rate_hz,
            self.plan.len,
        )
    }

    /// Run every recording of `source` through the pipeline.
    ///
    /// Recordings that fail to load, carry an unknown label or are too short
    /// to filter are logged and skipped. A run that yields no rows at all is
    /// an error.
    pub fn assemble(&self, source: &dyn RecordingSource) -> PipelineResult<(Dataset, AssemblyReport)> {
        let entries = source
            .entries()
            .map_err(|e| PipelineError::Source(format!("{e:#}")))?;
        let workers = self
            .cfg
            .workers
            .unwrap_or_else(|| thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .clamp(1, entries.len().max(1));
        info!("assembling {} recordings on {} workers", entries.len(), workers);

        let (tx, rx) = unbounded::<usize>();
        for index in 0..entries.len() {
            tx.send(index).map_err(|e| PipelineError::Source(e.to_string()))?;
        }
        drop(tx);

        let mut outcomes: Vec<(usize, Outcome)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let rx = rx.clone();
                    let entries = &entries;
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        while let Ok(index) = rx.recv() {
                            done.push((index, self.run_entry(index, source, &entries[index])));
                        }
                        done
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        });
        outcomes.sort_by_key(|(index, _)| *index);

        let mut dataset = self.empty_dataset();
        let mut report = AssemblyReport {
            recordings_seen: entries.len(),
            ..AssemblyReport::default()
        };
        for (_, outcome) in outcomes {
            match outcome {
                Outcome::Rows(rows, counts) => {
                    report.recordings_used += 1;
                    report.windows_total += counts.total;
                    report.windows_rejected_quality += counts.rejected_quality;
                    report.windows_rejected_physio += counts.rejected_physio;
                    dataset.extend(rows)?;
                }
                Outcome::Skipped => report.recordings_skipped += 1,
            }
        }
        report.rows = dataset.len();
        info!(
            "assembled {} rows from {}/{} recordings ({} of {} windows rejected)",
            report.rows,
            report.recordings_used,
            report.recordings_seen,
            report.windows_rejected_quality + report.windows_rejected_physio,
            report.windows_total
        );
        if dataset.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }
        Ok((dataset, report))
    }

    fn run_entry(&self, index: usize, source: &dyn RecordingSource, entry: &RecordingEntry) -> Outcome {
        let recording = match source.load(entry) {
            Ok(r) => r,
            Err(e) => {
                warn!("skipping {}: {e:#}", entry.id);
                return Outcome::Skipped;
            }
        };
        match self.process(index, &recording) {
            Ok((rows, counts)) => {
                debug!(
                    "{}: {} rows from {} windows ({} low quality, {} implausible)",
                    entry.id,
                    rows.len(),
                    counts.total,
                    counts.rejected_quality,
                    counts.rejected_physio
                );
                Outcome::Rows(rows, counts)
            }
            Err(e) => {
                warn!("skipping {}: {e}", entry.id);
                Outcome::Skipped
            }
        }
    }

    /// Rows for a single recording; `index` seeds its jitter and augmentation.
    fn process(&self, index: usize, recording: &Recording) -> PipelineResult<(Vec<LabeledSample>, WindowCounts)> {
        let label = self.labels.normalize(&recording.label)?;
        let series = recording.series.trim_warmup(self.cfg.warmup_s);
        let conditioned = self.conditioner.condition(&series.data)?;

        let stream = index as u64;
        let windows = if self.plan.jitter > 0 {
            self.plan.jittered(&conditioned, self.cfg.window.seed.wrapping_add(stream))
        } else {
            self.plan.windows(&conditioned)
        };
        let mut augmenter = match &self.cfg.augment {
            Some(aug) => Some(Augmenter::new(aug, stream)?),
            None => None,
        };

        let mut rows = Vec::new();
        let mut counts = WindowCounts::default();
        for window in windows {
            counts.total += 1;
            if !self.gate.accepts(&window.samples) {
                counts.rejected_quality += 1;
                continue;
            }
            let features = self.extractor.extract(&window.samples);
            if let Some(physio) = &self.cfg.physio {
                if !plausible(physio, &features) {
                    counts.rejected_physio += 1;
                    continue;
                }
            }
            rows.push(self.row(recording, &label, features, &window.samples));
            if let Some(aug) = augmenter.as_mut() {
                for copy in aug.copies(&window.samples) {
                    let features = self.extractor.extract(&copy);
                    rows.push(self.row(recording, &label, features, &copy));
                }
            }
        }
        Ok((rows, counts))
    }

    fn row(&self, recording: &Recording, label: &str, features: FeatureVector, samples: &[f64]) -> LabeledSample {
        LabeledSample {
            subject: recording.subject.clone(),
            label: label.to_string(),
            features: if self.cfg.impute_undefined {
                features.imputed()
            } else {
                features
            },
            raw: self
                .cfg
                .keep_raw
                .then(|| samples.iter().map(|&x| x as f32).collect()),
        }
    }
}

/// Heart rate, mean interval and peak count inside physiological bounds;
/// undefined values fail.
pub fn plausible(gate: &PhysioGate, features: &FeatureVector) -> bool {
    let within = |name: &str, lo: f64, hi: f64| {
        features
            .get(name)
            .map_or(false, |v| v > lo && v < hi)
    };
    within("hr_mean", gate.hr_min, gate.hr_max)
        && within("rr_mean", gate.rr_min_ms, gate.rr_max_ms)
        && features
            .get("n_peaks")
            .map_or(false, |n| n <= gate.max_peaks as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::TimeSeries;
    use crate::source::{Limited, MemorySource};
    use std::f64::consts::PI;

    fn pulse(n: usize, fs: f64, hz: f64) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64 / fs;
                (2.0 * PI * hz * t).sin() + 0.3 * (4.0 * PI * hz * t).sin() + 100.0
            })
            .collect()
    }

    fn source() -> MemorySource {
        let mut src = MemorySource::default();
        src.push("s1", "standing", TimeSeries::new(25.0, pulse(1500, 25.0, 1.2)));
        src.push("s2", "눕혀진 누운 자세", TimeSeries::new(25.0, pulse(1500, 25.0, 1.0)));
        src
    }

    fn config() -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        cfg.quality.enabled = false;
        cfg.workers = Some(2);
        cfg
    }

    #[test]
    fn two_recordings_give_eleven_rows_each() {
        let (ds, report) = Assembler::new(&config()).unwrap().assemble(&source()).unwrap();
        assert_eq!(ds.len(), 22);
        assert_eq!(report.rows, 22);
        assert_eq!(report.windows_total, 22);
        assert_eq!(report.recordings_used, 2);
        assert_eq!(ds.label_counts()["standing"], 11);
        assert_eq!(ds.label_counts()["supine-lying"], 11);
        // entry order is preserved whatever the scheduling
        assert!(ds.samples()[..11].iter().all(|s| s.subject == "s1"));
        assert!(ds.samples()[11..].iter().all(|s| s.subject == "s2"));
    }

    #[test]
    fn assembly_is_deterministic_across_worker_counts() {
        let mut one = config();
        one.workers = Some(1);
        let (a, _) = Assembler::new(&one).unwrap().assemble(&source()).unwrap();
        let mut four = config();
        four.workers = Some(4);
        let (b, _) = Assembler::new(&four).unwrap().assemble(&source()).unwrap();
        assert_eq!(a.samples(), b.samples());
    }

    #[test]
    fn unmapped_and_short_recordings_are_skipped() {
        let mut src = source();
        src.push("s3", "walking", TimeSeries::new(25.0, pulse(1500, 25.0, 1.1)));
        src.push("s4", "standing", TimeSeries::new(25.0, pulse(15, 25.0, 1.1)));
        let (ds, report) = Assembler::new(&config()).unwrap().assemble(&src).unwrap();
        assert_eq!(ds.len(), 22);
        assert_eq!(report.recordings_seen, 4);
        assert_eq!(report.recordings_skipped, 2);
    }

    #[test]
    fn no_rows_is_an_error() {
        let mut src = MemorySource::default();
        src.push("s1", "walking", TimeSeries::new(25.0, pulse(1500, 25.0, 1.2)));
        let err = Assembler::new(&config()).unwrap().assemble(&src).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyDataset));
    }

    #[test]
    fn unlistable_source_is_a_source_error() {
        let missing = crate::source::DirectorySource::new("/nonexistent/ppgfeat-root", "green", 25.0);
        let err = Assembler::new(&config()).unwrap().assemble(&missing).unwrap_err();
        match err {
            PipelineError::Source(msg) => assert!(msg.contains("nonexistent"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn quality_gate_drops_noisy_windows() {
        let mut cfg = config();
        cfg.quality.enabled = true;
        cfg.quality.threshold_db = 20.0;
        let mut src = MemorySource::default();
        src.push("s1", "standing", TimeSeries::new(25.0, pulse(1500, 25.0, 1.2)));
        // 6 Hz sits just above the pass band and leaks through the band-pass
        let noise: Vec<f64> = (0..1500)
            .map(|i| (2.0 * PI * 6.0 * i as f64 / 25.0).sin())
            .collect();
        src.push("s2", "standing", TimeSeries::new(25.0, noise));
        let (ds, report) = Assembler::new(&cfg).unwrap().assemble(&src).unwrap();
        assert_eq!(ds.subject_counts().get("s2"), None);
        assert_eq!(report.windows_rejected_quality, 11);
        assert_eq!(ds.len(), 11);
    }

    #[test]
    fn augmentation_adds_copies_with_raw_windows() {
        let mut cfg = config();
        cfg.keep_raw = true;
        cfg.augment = Some(Default::default());
        let (ds, _) = Assembler::new(&cfg).unwrap().assemble(&Limited::new(source(), 1)).unwrap();
        assert_eq!(ds.len(), 33);
        assert!(ds.samples().iter().all(|s| s.raw.as_ref().map(Vec::len) == Some(250)));
        assert_ne!(ds.samples()[0].raw, ds.samples()[1].raw);
    }

    #[test]
    fn imputation_removes_undefined_values() {
        let mut src = MemorySource::default();
        src.push("s1", "standing", TimeSeries::new(25.0, vec![1.0; 1500]));
        let (ds, _) = Assembler::new(&config()).unwrap().assemble(&src).unwrap();
        assert!(ds.samples().iter().all(|s| !s.features.has_undefined()));

        let mut raw_cfg = config();
        raw_cfg.impute_undefined = false;
        let (ds, _) = Assembler::new(&raw_cfg).unwrap().assemble(&src).unwrap();
        assert!(ds.samples()[0].features.get("hr_mean").unwrap().is_nan());
    }

    #[test]
    fn physio_gate_needs_plausible_heart_rate() {
        let gate = PhysioGate::default();
        let schema = crate::features::FeatureSchema::new(["n_peaks", "rr_mean", "hr_mean"]);
        let ok = FeatureVector::new(schema.clone(), vec![12.0, 800.0, 75.0]).unwrap();
        let fast = FeatureVector::new(schema.clone(), vec![25.0, 400.0, 150.0]).unwrap();
        let undefined = FeatureVector::new(schema, vec![0.0, f64::NAN, f64::NAN]).unwrap();
        assert!(plausible(&gate, &ok));
        assert!(!plausible(&gate, &fast));
        assert!(!plausible(&gate, &undefined));
    }

    #[test]
    fn physio_gate_requires_hrv_family() {
        let mut cfg = config();
        cfg.physio = Some(PhysioGate::default());
        cfg.features.hrv = false;
        assert!(Assembler::new(&cfg).is_err());
    }
}
