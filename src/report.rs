//! Structured job outcome handed back to the driving caller.

use crate::error::ErrorKind;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct JobStats {
    pub bytes_per_record: f64,
    pub chunk_rows: usize,
    /// Conversion workers and the rows each may buffer (budget shared between them).
    pub workers: usize,
    pub worker_batch_rows: usize,
    pub input_rows: u64,
    pub intermediate_chunks: usize,
    pub oversized_chunks: usize,
    pub converted_chunks: usize,
    pub quarantined: Vec<PathBuf>,
    pub final_files: usize,
    pub output_rows: u64,
    pub output_bytes: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub detail: String,
}

/// What a job returns instead of failing: success flag, message, outputs or error.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobReport {
    pub success: bool,
    pub message: String,
    pub outputs: Vec<PathBuf>,
    pub error: Option<JobError>,
    pub stats: JobStats,
}

impl JobReport {
    pub fn succeeded(outputs: Vec<PathBuf>, stats: JobStats) -> Self {
        let message = if stats.quarantined.is_empty() {
            format!("wrote {} file(s), {} rows", outputs.len(), stats.output_rows)
        } else {
            format!(
                "wrote {} file(s), {} rows; {} chunk(s) quarantined",
                outputs.len(),
                stats.output_rows,
                stats.quarantined.len()
            )
        };
        Self { success: true, message, outputs, error: None, stats }
    }

    pub fn failed(err: &anyhow::Error, stats: JobStats) -> Self {
        let kind = ErrorKind::classify(err);
        Self {
            success: false,
            message: format!("conversion failed: {err}"),
            outputs: Vec::new(),
            error: Some(JobError { kind, detail: format!("{err:#}") }),
            stats,
        }
    }

    pub fn panicked(detail: String) -> Self {
        Self {
            success: false,
            message: "conversion aborted by an internal fault".to_string(),
            outputs: Vec::new(),
            error: Some(JobError { kind: ErrorKind::Internal, detail }),
            stats: JobStats::default(),
        }
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"success\":{},\"message\":\"{}\"}}", self.success, e))
    }
}
