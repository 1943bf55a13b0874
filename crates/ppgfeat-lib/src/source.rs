//! Where recordings come from.
//!
//! The assembler only sees [`RecordingSource`], so tests and subset runs swap
//! in [`MemorySource`] or wrap any source in [`Limited`].

use crate::io::recording::{is_recording_file, read_recording, RecordingFile};
use crate::signal::TimeSeries;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Addressable recording: enough to load it and to attribute it to a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingEntry {
    pub subject: String,
    /// Source-specific locator (a file path for [`DirectorySource`])
    pub id: String,
}

/// A loaded recording with its raw, not yet normalized, label.
#[derive(Debug, Clone)]
pub struct Recording {
    pub subject: String,
    pub label: String,
    pub series: TimeSeries,
}

pub trait RecordingSource: Sync {
    /// All recordings, in a stable order.
    fn entries(&self) -> Result<Vec<RecordingEntry>>;
    fn load(&self, entry: &RecordingEntry) -> Result<Recording>;
}

/// `root/<subject>/<recording>` tree of `.json`, `.csv` and `.txt` files.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    channel: String,
    fs: f64,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>, channel: impl Into<String>, fs: f64) -> Self {
        Self {
            root: root.into(),
            channel: channel.into(),
            fs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RecordingSource for DirectorySource {
    fn entries(&self) -> Result<Vec<RecordingEntry>> {
        let mut subjects = sorted_dir(&self.root)?;
        subjects.retain(|p| p.is_dir());
        let mut out = Vec::new();
        for subject_dir in subjects {
            let subject = subject_dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            for path in sorted_dir(&subject_dir)? {
                if path.is_file() && is_recording_file(&path) {
                    out.push(RecordingEntry {
                        subject: subject.clone(),
                        id: path.to_string_lossy().into_owned(),
                    });
                }
            }
        }
        Ok(out)
    }

    fn load(&self, entry: &RecordingEntry) -> Result<Recording> {
        let RecordingFile { label, series } = read_recording(Path::new(&entry.id), &self.channel, self.fs)?;
        Ok(Recording {
            subject: entry.subject.clone(),
            label,
            series,
        })
    }
}

fn sorted_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = std::fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("listing {}", dir.display()))?;
    paths.sort();
    Ok(paths)
}

/// Recordings held in memory; entry ids are positions.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    recordings: Vec<Recording>,
}

impl MemorySource {
    pub fn new(recordings: Vec<Recording>) -> Self {
        Self { recordings }
    }

    pub fn push(&mut self, subject: &str, label: &str, series: TimeSeries) {
        self.recordings.push(Recording {
            subject: subject.into(),
            label: label.into(),
            series,
        });
    }
}

impl RecordingSource for MemorySource {
    fn entries(&self) -> Result<Vec<RecordingEntry>> {
        Ok(self
            .recordings
            .iter()
            .enumerate()
            .map(|(i, r)| RecordingEntry {
                subject: r.subject.clone(),
                id: i.to_string(),
            })
            .collect())
    }

    fn load(&self, entry: &RecordingEntry) -> Result<Recording> {
        let idx: usize = entry
            .id
            .parse()
            .with_context(|| format!("bad in-memory recording id {}", entry.id))?;
        self.recordings
            .get(idx)
            .cloned()
            .with_context(|| format!("no in-memory recording {}", idx))
    }
}

/// First `limit` entries of another source.
#[derive(Debug, Clone)]
pub struct Limited<S> {
    inner: S,
    limit: usize,
}

impl<S: RecordingSource> Limited<S> {
    pub fn new(inner: S, limit: usize) -> Self {
        Self { inner, limit }
    }
}

impl<S: RecordingSource> RecordingSource for Limited<S> {
    fn entries(&self) -> Result<Vec<RecordingEntry>> {
        let mut entries = self.inner.entries()?;
        entries.truncate(self.limit);
        Ok(entries)
    }

    fn load(&self, entry: &RecordingEntry) -> Result<Recording> {
        self.inner.load(entry)
    }
}
