use crate::signal::TimeSeries;
use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Separator between the free-form name and the label in recording file stems,
/// e.g. `2024-05-01T10-00---standing.json`.
pub const STEM_LABEL_SEPARATOR: &str = "---";

/// One decoded recording file before label normalization.
#[derive(Debug, Clone)]
pub struct RecordingFile {
    pub label: String,
    pub series: TimeSeries,
}

#[derive(Deserialize)]
struct JsonRecording {
    #[serde(default)]
    label: Option<String>,
    data: JsonData,
}

#[derive(Deserialize)]
struct JsonData {
    ppg_continuous: JsonChannels,
}

#[derive(Deserialize)]
struct JsonChannels {
    #[serde(default)]
    ts: Option<Vec<f64>>,
    #[serde(flatten)]
    channels: BTreeMap<String, serde_json::Value>,
}

/// Label encoded in a file stem after the last `---`.
pub fn label_from_stem(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let (_, label) = stem.rsplit_once(STEM_LABEL_SEPARATOR)?;
    let label = label.trim();
    (!label.is_empty()).then(|| label.to_string())
}

/// Decode a JSON recording; returns the embedded label (if any) and the channel.
pub fn parse_json_recording(text: &str, channel: &str, fs: f64) -> Result<(Option<String>, TimeSeries)> {
    let rec: JsonRecording = serde_json::from_str(text).context("parsing recording JSON")?;
    let JsonChannels { ts, mut channels } = rec.data.ppg_continuous;
    let values = channels
        .remove(channel)
        .with_context(|| format!("missing channel '{}'", channel))?;
    let data: Vec<f64> = serde_json::from_value(values)
        .with_context(|| format!("channel '{}' is not a numeric array", channel))?;
    if data.is_empty() {
        bail!("channel '{}' has no samples", channel);
    }
    let series = match ts {
        Some(ts) => TimeSeries::with_timestamps(fs, data, ts)?,
        None => TimeSeries::new(fs, data),
    };
    let label = rec.label.filter(|l| !l.trim().is_empty());
    Ok((label, series))
}

/// Read one channel (and the `ts` column when present) from a headed CSV.
pub fn read_csv_series(path: &Path, channel: &str, fs: f64) -> Result<TimeSeries> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers = reader.headers().context("reading header")?.clone();
    let column = locate_column(&headers, channel, "signal")?;
    let ts_idx = locate_column(&headers, "ts", "timestamp").ok();

    let mut data = Vec::new();
    let mut timestamps = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.context("reading record")?;
        let value = record
            .get(column)
            .ok_or_else(|| anyhow::anyhow!("row {} has no '{}' value", row + 1, channel))?;
        data.push(
            value
                .parse::<f64>()
                .with_context(|| format!("row {}: parsing sample {}", row + 1, value))?,
        );
        if let Some(idx) = ts_idx {
            let ts = record
                .get(idx)
                .ok_or_else(|| anyhow::anyhow!("row {} has no timestamp", row + 1))?;
            timestamps.push(
                ts.parse::<f64>()
                    .with_context(|| format!("row {}: parsing timestamp {}", row + 1, ts))?,
            );
        }
    }
    if data.is_empty() {
        bail!("no samples in {}", path.display());
    }
    Ok(match ts_idx {
        Some(_) => TimeSeries::with_timestamps(fs, data, timestamps)?,
        None => TimeSeries::new(fs, data),
    })
}

/// Parse newline-delimited floating point series, ignoring blank/comment lines.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val: f64 = trimmed
            .parse()
            .with_context(|| format!("line {} is not f64: {}", idx + 1, trimmed))?;
        out.push(val);
    }
    if out.is_empty() {
        bail!("no numeric samples found");
    }
    Ok(out)
}

/// Read a newline-delimited floating point series from disk.
pub fn read_f64_series(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_f64_series(&text)
}

/// Whether `read_recording` knows how to decode this file.
pub fn is_recording_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json" | "csv" | "txt")
    )
}

/// Decode a `.json`, `.csv` or `.txt` recording. JSON files may carry their
/// own label; otherwise it comes from the file stem.
pub fn read_recording(path: &Path, channel: &str, fs: f64) -> Result<RecordingFile> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let (embedded, series) = match ext {
        "json" => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            parse_json_recording(&text, channel, fs)
                .with_context(|| format!("decoding {}", path.display()))?
        }
        "csv" => (None, read_csv_series(path, channel, fs)?),
        "txt" => (None, TimeSeries::new(fs, read_f64_series(path)?)),
        other => bail!("unsupported recording format '{}' ({})", other, path.display()),
    };
    let label = embedded
        .or_else(|| label_from_stem(path))
        .with_context(|| format!("no label in {}", path.display()))?;
    Ok(RecordingFile { label, series })
}

fn locate_column(headers: &csv::StringRecord, requested: &str, hint: &str) -> Result<usize> {
    headers
        .iter()
        .position(|name| name.eq_ignore_ascii_case(requested))
        .ok_or_else(|| anyhow::anyhow!("missing {} column ({})", hint, requested))
}
