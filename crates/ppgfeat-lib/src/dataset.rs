//! Labeled feature table and its columnar archive.
//!
//! Archive layout (Parquet, Snappy): `label` and `subject` as Utf8, one
//! Float32 column per feature in schema order, and, when the windows were
//! kept, a `raw` column of Float32 lists. Sample rate, window length and the
//! feature names are stored as Arrow schema metadata, which the writer
//! serializes into the file footer alongside the schema itself.

use crate::error::{PipelineError, PipelineResult};
use crate::features::{FeatureSchema, FeatureVector};
use arrow::array::{Array, ListArray, PrimitiveArray, Utf8Array};
use arrow::chunk::Chunk;
use arrow::datatypes::{DataType, Field, Metadata, Schema};
use arrow::io::parquet::read;
use arrow::io::parquet::write::{
    transverse, CompressionOptions, Encoding, FileWriter, RowGroupIterator, Version,
    WriteOptions,
};
use arrow::offset::{Offsets, OffsetsBuffer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

const META_FS: &str = "ppgfeat.sample_rate_hz";
const META_WINDOW: &str = "ppgfeat.window_len";
const META_FEATURES: &str = "ppgfeat.feature_names";
const ROWS_PER_GROUP: usize = 8192;

/// One window's worth of training data.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSample {
    pub subject: String,
    pub label: String,
    pub features: FeatureVector,
    /// Conditioned window samples, when kept
    pub raw: Option<Vec<f32>>,
}

/// Ordered samples sharing one feature schema.
#[derive(Debug, Clone)]
pub struct Dataset {
    schema: FeatureSchema,
    fs: f64,
    window_len: usize,
    samples: Vec<LabeledSample>,
}

/// Row and class counts of a dataset.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub sample_rate_hz: f64,
    pub window_len: usize,
    pub has_raw: bool,
    pub features: Vec<String>,
    pub labels: BTreeMap<String, usize>,
    pub subjects: BTreeMap<String, usize>,
}

impl Dataset {
    pub fn new(schema: FeatureSchema, fs: f64, window_len: usize) -> Self {
        Self {
            schema,
            fs,
            window_len,
            samples: Vec::new(),
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }
    pub fn sample_rate_hz(&self) -> f64 {
        self.fs
    }
    pub fn window_len(&self) -> usize {
        self.window_len
    }
    pub fn samples(&self) -> &[LabeledSample] {
        &self.samples
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn has_raw(&self) -> bool {
        self.samples.first().map_or(false, |s| s.raw.is_some())
    }

    /// Append a sample; its schema must equal the dataset's, and raw windows
    /// are all-or-nothing.
    pub fn push(&mut self, sample: LabeledSample) -> PipelineResult<()> {
        if sample.features.schema() != &self.schema {
            return Err(PipelineError::SchemaMismatch {
                expected: self.schema.names().to_vec(),
                actual: sample.features.schema().names().to_vec(),
            });
        }
        if let Some(first) = self.samples.first() {
            if first.raw.is_some() != sample.raw.is_some() {
                return Err(PipelineError::InvalidInput(
                    "raw windows must be kept for every sample or none".into(),
                ));
            }
        }
        if let Some(raw) = &sample.raw {
            if raw.len() != self.window_len {
                return Err(PipelineError::InvalidInput(format!(
                    "raw window has {} samples, expected {}",
                    raw.len(),
                    self.window_len
                )));
            }
        }
        self.samples.push(sample);
        Ok(())
    }

    pub fn extend<I: IntoIterator<Item = LabeledSample>>(&mut self, samples: I) -> PipelineResult<()> {
        for sample in samples {
            self.push(sample)?;
        }
        Ok(())
    }

    pub fn label_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.samples {
            *counts.entry(s.label.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn subject_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.samples {
            *counts.entry(s.subject.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            rows: self.len(),
            sample_rate_hz: self.fs,
            window_len: self.window_len,
            has_raw: self.has_raw(),
            features: self.schema.names().to_vec(),
            labels: self.label_counts(),
            subjects: self.subject_counts(),
        }
    }

    fn arrow_schema(&self) -> PipelineResult<Schema> {
        let mut fields = vec![
            Field::new("label", DataType::Utf8, false),
            Field::new("subject", DataType::Utf8, false),
        ];
        fields.extend(
            self.schema
                .names()
                .iter()
                .map(|name| Field::new(name.as_str(), DataType::Float32, false)),
        );
        if self.has_raw() {
            fields.push(Field::new("raw", raw_datatype(), false));
        }
        let names = serde_json::to_string(self.schema.names())
            .map_err(|e| PipelineError::Archive(e.to_string()))?;
        let metadata = Metadata::from([
            (META_FS.to_string(), self.fs.to_string()),
            (META_WINDOW.to_string(), self.window_len.to_string()),
            (META_FEATURES.to_string(), names),
        ]);
        Ok(Schema::from(fields).with_metadata(metadata))
    }

    fn chunk(&self, rows: &[LabeledSample]) -> PipelineResult<Chunk<Box<dyn Array>>> {
        let mut columns: Vec<Box<dyn Array>> = vec![
            Utf8Array::<i32>::from_iter_values(rows.iter().map(|s| s.label.as_str())).boxed(),
            Utf8Array::<i32>::from_iter_values(rows.iter().map(|s| s.subject.as_str())).boxed(),
        ];
        for col in 0..self.schema.len() {
            let values: Vec<f32> = rows.iter().map(|s| s.features.values()[col] as f32).collect();
            columns.push(PrimitiveArray::<f32>::from_vec(values).boxed());
        }
        if self.has_raw() {
            let windows: Vec<&Vec<f32>> = rows.iter().filter_map(|s| s.raw.as_ref()).collect();
            let offsets = Offsets::<i32>::try_from_lengths(windows.iter().map(|w| w.len()))?;
            let values: Vec<f32> = windows.iter().flat_map(|w| w.iter().copied()).collect();
            let list = ListArray::<i32>::try_new(
                raw_datatype(),
                OffsetsBuffer::from(offsets),
                PrimitiveArray::<f32>::from_vec(values).boxed(),
                None,
            )?;
            columns.push(list.boxed());
        }
        Ok(Chunk::try_new(columns)?)
    }

    /// Write the table as a Snappy-compressed Parquet file.
    pub fn write_parquet(&self, path: &Path) -> PipelineResult<()> {
        let schema = self.arrow_schema()?;
        let options = WriteOptions {
            write_statistics: false,
            version: Version::V2,
            compression: CompressionOptions::Snappy,
            data_pagesize_limit: None,
        };
        let encodings: Vec<Vec<Encoding>> = schema
            .fields
            .iter()
            .map(|f| transverse(&f.data_type, |_| Encoding::Plain))
            .collect();
        let file = File::create(path)?;
        let mut writer = FileWriter::try_new(file, schema.clone(), options)?;
        for rows in self.samples.chunks(ROWS_PER_GROUP) {
            let chunk = self.chunk(rows)?;
            let row_groups = RowGroupIterator::try_new(
                std::iter::once(arrow::error::Result::Ok(chunk)),
                &schema,
                options,
                encodings.clone(),
            )?;
            for group in row_groups {
                writer.write(group?)?;
            }
        }
        writer.end(None)?;
        log::debug!("wrote {} rows to {}", self.len(), path.display());
        Ok(())
    }

    /// Load an archive written by [`Dataset::write_parquet`], checking that the
    /// feature columns agree with the recorded feature names.
    pub fn read_parquet(path: &Path) -> PipelineResult<Self> {
        let mut file = File::open(path)?;
        let metadata = read::read_metadata(&mut file)?;
        let schema = read::infer_schema(&metadata)?;
        let fs: f64 = meta_value(&schema, META_FS)?;
        let window_len: usize = meta_value(&schema, META_WINDOW)?;
        let names: Vec<String> = schema
            .metadata
            .get(META_FEATURES)
            .ok_or_else(|| PipelineError::Archive(format!("missing {META_FEATURES}")))
            .and_then(|s| serde_json::from_str(s).map_err(|e| PipelineError::Archive(e.to_string())))?;

        let columns: Vec<String> = schema.fields.iter().map(|f| f.name.clone()).collect();
        let has_raw = columns.last().map_or(false, |c| c == "raw");
        let feature_end = columns.len() - usize::from(has_raw);
        if columns.len() < 2 || columns[0] != "label" || columns[1] != "subject" || columns[2..feature_end] != names[..] {
            return Err(PipelineError::SchemaMismatch {
                expected: names,
                actual: columns,
            });
        }

        let feature_schema = FeatureSchema::new(names);
        let mut dataset = Dataset::new(feature_schema.clone(), fs, window_len);
        let reader = read::FileReader::new(file, metadata.row_groups, schema, None, None, None);
        for chunk in reader {
            let chunk = chunk?;
            let arrays = chunk.arrays();
            let labels = downcast::<Utf8Array<i32>>(arrays[0].as_ref(), "label")?;
            let subjects = downcast::<Utf8Array<i32>>(arrays[1].as_ref(), "subject")?;
            let mut features = Vec::with_capacity(feature_schema.len());
            for (offset, name) in feature_schema.names().iter().enumerate() {
                features.push(downcast::<PrimitiveArray<f32>>(arrays[2 + offset].as_ref(), name)?);
            }
            let raw_column = if has_raw {
                Some(downcast::<ListArray<i32>>(arrays[feature_end].as_ref(), "raw")?)
            } else {
                None
            };
            for row in 0..chunk.len() {
                let values = features.iter().map(|col| col.value(row) as f64).collect();
                let vector = FeatureVector::new(feature_schema.clone(), values).ok_or_else(|| {
                    PipelineError::Archive(format!("row {row} does not match the feature schema"))
                })?;
                let raw = match raw_column {
                    Some(list) => {
                        let window = list.value(row);
                        let window = downcast::<PrimitiveArray<f32>>(window.as_ref(), "raw item")?;
                        Some(window.values().to_vec())
                    }
                    None => None,
                };
                dataset.push(LabeledSample {
                    subject: subjects.value(row).to_string(),
                    label: labels.value(row).to_string(),
                    features: vector,
                    raw,
                })?;
            }
        }
        Ok(dataset)
    }

    /// Feature table as CSV: `label,subject,<features...>`.
    pub fn write_csv(&self, path: &Path) -> PipelineResult<()> {
        let mut writer = csv::Writer::from_path(path)?;
        let mut header = vec!["label".to_string(), "subject".to_string()];
        header.extend(self.schema.names().iter().cloned());
        writer.write_record(&header)?;
        for s in &self.samples {
            let mut record = vec![s.label.clone(), s.subject.clone()];
            record.extend(s.features.values().iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn raw_datatype() -> DataType {
    ListArray::<i32>::default_datatype(DataType::Float32)
}

fn meta_value<T: std::str::FromStr>(schema: &Schema, key: &str) -> PipelineResult<T> {
    schema
        .metadata
        .get(key)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| PipelineError::Archive(format!("missing or invalid {key}")))
}

fn downcast<'a, A: 'static>(array: &'a dyn Array, column: &str) -> PipelineResult<&'a A> {
    array
        .as_any()
        .downcast_ref::<A>()
        .ok_or_else(|| PipelineError::Archive(format!("unexpected type for column {column}")))
}
