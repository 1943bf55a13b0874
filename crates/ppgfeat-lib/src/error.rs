use thiserror::Error;

/// Failures raised by the windowing and feature pipeline.
///
/// Per-recording and per-window variants are recoverable: the assembler logs
/// them and moves on. Only [`PipelineError::EmptyDataset`] ends a build.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("insufficient data: need more than {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },
    #[error("unmapped label {0:?}")]
    UnmappedLabel(String),
    #[error("assembled dataset has zero rows")]
    EmptyDataset,
    #[error("feature schema mismatch: expected {expected:?}, got {actual:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },
    #[error("recording source: {0}")]
    Source(String),
    #[error("archive error: {0}")]
    Archive(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl From<arrow::error::Error> for PipelineError {
    fn from(err: arrow::error::Error) -> Self {
        PipelineError::Archive(err.to_string())
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        PipelineError::Parse(err.to_string())
    }
}
