//! Domain failures raised by the pipeline stages.
//!
//! Stages return `anyhow::Result` and raise these through `anyhow`, so callers keep the
//! context chain; the report layer recovers the kind with [`ErrorKind::classify`].

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("input has no sampleable records: {path}")]
    EmptyInput { path: PathBuf },

    #[error("chunk {chunk} does not match the canonical schema: expected {expected:?}, found {found:?}")]
    SchemaMismatch {
        chunk: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("chunk {chunk}, line {line}: record has {found} fields but the header declares {expected}")]
    MalformedRecord {
        chunk: usize,
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("job cancelled before {stage}")]
    Cancelled { stage: &'static str },
}

impl PipelineError {
    /// Failures that belong to a single chunk and may be quarantined instead of aborting.
    pub fn is_chunk_local(&self) -> bool {
        matches!(self, PipelineError::SchemaMismatch { .. } | PipelineError::MalformedRecord { .. })
    }
}

/// Coarse failure category carried by a failed [`crate::JobReport`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyInput,
    SchemaMismatch,
    MalformedRecord,
    Config,
    Cancelled,
    Io,
    Columnar,
    Internal,
}

impl ErrorKind {
    /// Walk the error chain and return the most specific kind found.
    pub fn classify(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(p) = cause.downcast_ref::<PipelineError>() {
                return match p {
                    PipelineError::EmptyInput { .. } => ErrorKind::EmptyInput,
                    PipelineError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
                    PipelineError::MalformedRecord { .. } => ErrorKind::MalformedRecord,
                    PipelineError::Config(_) => ErrorKind::Config,
                    PipelineError::Cancelled { .. } => ErrorKind::Cancelled,
                };
            }
        }
        for cause in err.chain() {
            if cause.is::<std::io::Error>() {
                return ErrorKind::Io;
            }
            if cause.is::<parquet::errors::ParquetError>() || cause.is::<arrow::error::ArrowError>() {
                return ErrorKind::Columnar;
            }
        }
        ErrorKind::Internal
    }
}
